//! Configuration management for Turnstile.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{PolicyBook, RateLimitConfig, StrategyKind};

/// Environment variable prefix, e.g. `TURNSTILE_STRATEGY=fixed_window`.
const ENV_PREFIX: &str = "TURNSTILE";

/// Top-level settings for an application embedding Turnstile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnstileConfig {
    /// Admission strategy to start with
    pub strategy: StrategyKind,

    /// Optional path to a policy book (see [`PolicyBook`])
    pub policy_file: Option<PathBuf>,

    /// Policy used when no policy book entry applies
    pub default_policy: RateLimitConfig,
}

impl Default for TurnstileConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::TokenBucket,
            policy_file: None,
            default_policy: RateLimitConfig::new(default_capacity(), default_refill_rate()),
        }
    }
}

fn default_capacity() -> u64 {
    5
}

fn default_refill_rate() -> u64 {
    2
}

impl TurnstileConfig {
    /// Load settings from an optional file, overridden by `TURNSTILE_*`
    /// environment variables.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `TURNSTILE_DEFAULT_POLICY__CAPACITY=10`.
    /// Either field of `default_policy` may be overridden on its own; the
    /// other keeps its default.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("default_policy.capacity", default_capacity() as i64)
            .and_then(|b| {
                b.set_default(
                    "default_policy.refill_rate_per_minute",
                    default_refill_rate() as i64,
                )
            })
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(env.prefix_separator("_").separator("__").try_parsing(true));

        let config: TurnstileConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the default policy.
    pub fn validate(&self) -> Result<()> {
        self.default_policy.validate()
    }

    /// Load the configured policy book, or an empty one when none is set.
    pub fn policy_book(&self) -> Result<PolicyBook> {
        match &self.policy_file {
            Some(path) => PolicyBook::from_file(path),
            None => Ok(PolicyBook::new()),
        }
    }
}
