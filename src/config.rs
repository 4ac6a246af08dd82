//! Process configuration, read from command-line flags with `LEDGER_*` environment fallbacks.

use crate::application::seed::{DEFAULT_STARTING_BALANCE, DEFAULT_WALLETS};
use crate::application::transfer::RetryPolicy;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Wallet ledger service", long_about = None)]
pub struct Config {
    /// Address the HTTP API listens on.
    #[arg(long, env = "LEDGER_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "LEDGER_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Wallets created on first start of an empty ledger.
    #[arg(long, env = "LEDGER_SEED_WALLETS", default_value_t = DEFAULT_WALLETS)]
    pub seed_wallets: usize,

    /// Starting balance of each seeded wallet, in minor units.
    #[arg(
        long,
        env = "LEDGER_SEED_BALANCE",
        default_value_t = DEFAULT_STARTING_BALANCE,
        value_parser = clap::value_parser!(i64).range(0..)
    )]
    pub seed_balance: i64,

    /// Attempts per transfer before giving up on lock contention.
    #[arg(
        long,
        env = "LEDGER_MAX_ATTEMPTS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_attempts: u32,

    /// Linear backoff step between retries, in milliseconds.
    #[arg(long, env = "LEDGER_BASE_BACKOFF_MS", default_value_t = 15)]
    pub base_backoff_ms: u64,

    /// Upper bound of the random jitter added to each backoff, in milliseconds.
    #[arg(long, env = "LEDGER_MAX_JITTER_MS", default_value_t = 15)]
    pub max_jitter_ms: u64,

    /// How long a transaction waits for a row lock, in milliseconds.
    #[arg(
        long,
        env = "LEDGER_LOCK_TIMEOUT_MS",
        default_value_t = 2_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub lock_timeout_ms: u64,

    /// Deadline for a single transfer request, in milliseconds.
    #[arg(long, env = "LEDGER_TRANSFER_TIMEOUT_MS", default_value_t = 15_000)]
    pub transfer_timeout_ms: u64,

    /// Deadline for read-only requests, in milliseconds.
    #[arg(long, env = "LEDGER_QUERY_TIMEOUT_MS", default_value_t = 5_000)]
    pub query_timeout_ms: u64,

    /// Log filter directive; `RUST_LOG` takes precedence when set.
    #[arg(long, env = "LEDGER_LOG", default_value = "info")]
    pub log: String,
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}
