//! # CLI Interface
//!
//! Command-line arguments for `nova-walletd`, via `clap` derive. Every
//! `run` flag also reads a `NOVA_WALLET_*` environment variable.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// NOVA wallet daemon.
///
/// Serves payment build, review and send-check sessions to wallet
/// frontends over JSON-RPC, streams review updates over WebSocket and
/// exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "nova-walletd",
    about = "NOVA wallet payment build daemon",
    version,
    propagate_version = true
)]
pub struct NovaWalletCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the daemon.
    Run(RunArgs),
    /// Load a cache fixture and print what it contains.
    Check(CheckArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// JSON fixture that seeds the account and recipient cache.
    ///
    /// Without one the daemon starts with an empty cache and every build
    /// reports a missing primary account.
    #[arg(long, short = 'f', env = "NOVA_WALLET_FIXTURE")]
    pub fixture: Option<PathBuf>,

    /// Port for the JSON-RPC and WebSocket API.
    #[arg(long, env = "NOVA_WALLET_RPC_PORT", default_value_t = 9751)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "NOVA_WALLET_METRICS_PORT", default_value_t = 9752)]
    pub metrics_port: u16,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "NOVA_WALLET_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// How long an operation waits for a build's data lock, in milliseconds.
    #[arg(long, env = "NOVA_WALLET_LOCK_TIMEOUT_MS", default_value_t = 5000)]
    pub lock_timeout_ms: u64,

    /// How long a review waits for the frontend to acknowledge the enabled
    /// send button, in seconds.
    #[arg(long, env = "NOVA_WALLET_ACK_TIMEOUT_SECS", default_value_t = 30)]
    pub ack_timeout_secs: u64,
}

/// Arguments for the `check` subcommand.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Fixture file to load.
    pub fixture: PathBuf,
}
