//! Policy assignment rules.
//!
//! This module loads named rate limit policies and maps caller keys onto
//! them, so a caller can pick the [`RateLimitConfig`] to pass to
//! [`RateLimiter::admit`](super::RateLimiter::admit) for a given key.
//!
//! ```yaml
//! default_policy: standard
//! policies:
//!   standard:
//!     capacity: 5
//!     refill_rate_per_minute: 2
//!   premium:
//!     capacity: 100
//!     refill_rate_per_minute: 50
//! assignments:
//!   alice: premium
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use super::policy::RateLimitConfig;
use crate::error::{Result, TurnstileError};

/// A set of named policies plus per-key assignments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyBook {
    /// Map of policy name to policy
    #[serde(default)]
    pub policies: HashMap<String, RateLimitConfig>,
    /// Map of caller key to policy name
    #[serde(default)]
    pub assignments: HashMap<String, String>,
    /// Policy for keys without an explicit assignment
    #[serde(default)]
    pub default_policy: Option<String>,
}

impl PolicyBook {
    /// Create an empty policy book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate policies from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit policies");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load and validate policies from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let book: PolicyBook = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse policy file: {}", e)))?;
        book.validate()?;
        Ok(book)
    }

    /// Register a policy under `name`, replacing any previous one.
    pub fn insert_policy(&mut self, name: impl Into<String>, policy: RateLimitConfig) -> Result<()> {
        policy.validate()?;
        self.policies.insert(name.into(), policy);
        Ok(())
    }

    /// Assign `key` to the policy called `policy`.
    pub fn assign(&mut self, key: impl Into<String>, policy: &str) -> Result<()> {
        if !self.policies.contains_key(policy) {
            return Err(TurnstileError::UnknownPolicy(policy.to_string()));
        }
        self.assignments.insert(key.into(), policy.to_string());
        Ok(())
    }

    /// Check that every policy is usable and every reference resolves.
    pub fn validate(&self) -> Result<()> {
        for policy in self.policies.values() {
            policy.validate()?;
        }

        if let Some(name) = &self.default_policy {
            if !self.policies.contains_key(name) {
                return Err(TurnstileError::Config(format!(
                    "default policy '{}' is not defined",
                    name
                )));
            }
        }

        for (key, name) in &self.assignments {
            if !self.policies.contains_key(name) {
                return Err(TurnstileError::Config(format!(
                    "key '{}' is assigned to undefined policy '{}'",
                    key, name
                )));
            }
        }

        Ok(())
    }

    /// Look up a policy by name.
    pub fn policy(&self, name: &str) -> Result<&RateLimitConfig> {
        self.policies
            .get(name)
            .ok_or_else(|| TurnstileError::UnknownPolicy(name.to_string()))
    }

    /// Find the policy that applies to `key`.
    ///
    /// An explicit assignment wins over the default policy. Returns `None`
    /// when the key is unassigned and there is no default.
    pub fn policy_for(&self, key: &str) -> Option<&RateLimitConfig> {
        self.assignments
            .get(key)
            .or(self.default_policy.as_ref())
            .and_then(|name| self.policies.get(name))
    }
}
