use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use turnstile::config::TurnstileConfig;
use turnstile::ratelimit::{PolicyBook, RateLimitConfig, RateLimiter, StrategyKind};

/// Replay a burst of requests from simulated users through a rate limiter.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Cli {
    /// Settings file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured admission strategy
    #[arg(short, long, value_enum)]
    strategy: Option<StrategyKind>,

    /// Number of simulated users
    #[arg(short, long, default_value_t = 2)]
    users: usize,

    /// Requests issued per user
    #[arg(short, long, default_value_t = 8)]
    requests: usize,

    /// Concurrent tasks per user
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Switch to the other strategy after this many requests per user
    #[arg(long)]
    switch_after: Option<usize>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Default, Serialize)]
struct UserSummary {
    admitted: usize,
    rejected: usize,
    remaining_tokens: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Starting Turnstile simulation");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TurnstileConfig::load(cli.config.as_deref()).context("loading settings")?;
    if let Some(strategy) = cli.strategy {
        config.strategy = strategy;
    }
    let book = config.policy_book().context("loading policy book")?;
    info!(strategy = ?config.strategy, policies = book.policies.len(), "Configuration loaded");

    let limiter = Arc::new(RateLimiter::<Uuid>::new().with_strategy(config.strategy.build()));

    let users = resolve_users(&book, &config, cli.users);
    let mut summary = BTreeMap::new();

    let (first, second) = match cli.switch_after {
        Some(n) => (n.min(cli.requests), cli.requests.saturating_sub(n)),
        None => (cli.requests, 0),
    };

    for (user, result) in run_phase(&limiter, &users, first, cli.concurrency).await? {
        merge(&mut summary, user, result);
    }

    if cli.switch_after.is_some() {
        let next = match config.strategy {
            StrategyKind::TokenBucket => StrategyKind::FixedWindow,
            StrategyKind::FixedWindow => StrategyKind::TokenBucket,
        };
        info!(strategy = ?next, "Switching strategy mid-run");
        limiter.set_strategy(next.build());

        for (user, result) in run_phase(&limiter, &users, second, cli.concurrency).await? {
            merge(&mut summary, user, result);
        }
    }

    for (user, entry) in summary.iter_mut() {
        entry.remaining_tokens = limiter.tokens(user);
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for (user, entry) in &summary {
            println!(
                "{user}: admitted={} rejected={} remaining={}",
                entry.admitted,
                entry.rejected,
                entry
                    .remaining_tokens
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
        }
    }

    info!("Turnstile simulation finished");
    Ok(())
}

/// Fire `requests` requests per user, spread over `concurrency` tasks each.
async fn run_phase(
    limiter: &Arc<RateLimiter<Uuid>>,
    users: &[(Uuid, RateLimitConfig)],
    requests: usize,
    concurrency: usize,
) -> anyhow::Result<Vec<(Uuid, UserSummary)>> {
    let concurrency = concurrency.max(1);
    let mut handles = Vec::new();

    for &(user, policy) in users {
        for worker in 0..concurrency {
            // Split the requests as evenly as possible across workers.
            let share = requests / concurrency + usize::from(worker < requests % concurrency);
            let limiter = Arc::clone(limiter);
            handles.push(tokio::spawn(async move {
                let mut result = UserSummary::default();
                for _ in 0..share {
                    if limiter.admit(&user, &policy)? {
                        result.admitted += 1;
                    } else {
                        result.rejected += 1;
                    }
                }
                Ok::<_, turnstile::error::TurnstileError>((user, result))
            }));
        }
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await??);
    }
    Ok(results)
}

/// Create `count` users and pick each one's policy.
///
/// Done once per run so every phase reuses the same resolution.
fn resolve_users(book: &PolicyBook, config: &TurnstileConfig, count: usize) -> Vec<(Uuid, RateLimitConfig)> {
    (0..count)
        .map(|_| {
            let user = Uuid::new_v4();
            (user, policy_for(book, config, &user))
        })
        .collect()
}

fn policy_for(book: &PolicyBook, config: &TurnstileConfig, user: &Uuid) -> RateLimitConfig {
    match book.policy_for(&user.to_string()) {
        Some(policy) => *policy,
        None => {
            if !book.policies.is_empty() {
                warn!(user = %user, "No policy assigned, using default policy");
            }
            config.default_policy
        }
    }
}

fn merge(summary: &mut BTreeMap<Uuid, UserSummary>, user: Uuid, result: UserSummary) {
    let entry = summary.entry(user).or_default();
    entry.admitted += result.admitted;
    entry.rejected += result.rejected;
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
