// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # NOVA Wallet Daemon
//!
//! Entry point for the `nova-walletd` binary. Parses CLI arguments,
//! initializes logging and metrics, seeds the lookup cache from a fixture
//! and serves the payment build API.
//!
//! - `run`: start the daemon
//! - `check`: load a cache fixture and summarize it
//! - `version`: print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod notifier;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use nova_wallet::cache::CacheFixture;
use nova_wallet::{BuildConfig, MemoryCache, PaymentBuildService};

use cli::{Commands, NovaWalletCli};
use logging::LogFormat;
use metrics::WalletMetrics;
use notifier::WsReviewNotifier;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = NovaWalletCli::parse();

    match cli.command {
        Commands::Run(args) => run_daemon(args).await,
        Commands::Check(args) => check_fixture(&args.fixture),
        Commands::Version => {
            println!("nova-walletd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Reads and parses a cache fixture file.
fn load_fixture(path: &Path) -> Result<CacheFixture> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid fixture {}", path.display()))
}

/// Starts the API server and the metrics endpoint.
async fn run_daemon(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        logging::DEFAULT_FILTER,
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        lock_timeout_ms = args.lock_timeout_ms,
        ack_timeout_secs = args.ack_timeout_secs,
        "starting nova-walletd"
    );

    // --- Cache ---
    let (cache, fixture_name) = match &args.fixture {
        Some(path) => {
            let cache = MemoryCache::from_fixture(load_fixture(path)?);
            tracing::info!(
                path = %path.display(),
                accounts = cache.owned_accounts().len(),
                "cache seeded from fixture"
            );
            (cache, path.display().to_string())
        }
        None => {
            tracing::warn!("no fixture given, starting with an empty cache");
            (MemoryCache::builder().build(), "empty".to_string())
        }
    };

    // --- Engine ---
    let notifier = Arc::new(WsReviewNotifier::new(Duration::from_secs(
        args.ack_timeout_secs,
    )));
    let config = BuildConfig {
        data_lock_timeout: Duration::from_millis(args.lock_timeout_ms),
        ..BuildConfig::default()
    };
    let service = Arc::new(PaymentBuildService::new(
        Arc::new(cache),
        notifier.clone(),
        config,
    ));

    // --- Metrics ---
    let wallet_metrics = Arc::new(WalletMetrics::new().context("failed to register metrics")?);

    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        fixture: fixture_name,
        started_at: chrono::Utc::now(),
        service: Arc::clone(&service),
        notifier,
        metrics: Arc::clone(&wallet_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/WS server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&wallet_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    service.shutdown();
    wallet_metrics.active_builds.set(0);
    tracing::info!("nova-walletd stopped");
    Ok(())
}

/// Loads a fixture and prints its accounts, recipients and rates.
fn check_fixture(path: &Path) -> Result<()> {
    let fixture = load_fixture(path)?;
    let users = fixture.users.len();
    let rates: Vec<String> = fixture.rates.keys().cloned().collect();
    let cache = MemoryCache::from_fixture(fixture);

    println!("Fixture {} is valid.", path.display());
    println!("  Accounts   :");
    for account in cache.owned_accounts() {
        println!("    {}", account);
    }
    println!("  Recipients : {}", users);
    println!("  Rates      : {}", rates.join(", "));
    Ok(())
}

/// Waits for SIGINT or SIGTERM. A signal that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
