//! fxledger - forex back-office ledger service
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────────┐    ┌──────────┐
//! │  Config  │───▶│  Store   │───▶│   Services   │───▶│ Gateway  │
//! │  (YAML)  │    │(PG / mem)│    │(FSM, payout) │    │  (axum)  │
//! └──────────┘    └──────────┘    └──────────────┘    └──────────┘
//!                                        │
//!                          reconciliation sweep, payout scheduler
//! ```

use std::time::Duration;

use anyhow::Context;
use fxledger::config::AppConfig;
use fxledger::gateway;
use fxledger::logging::init_logging;
use fxledger::services::LedgerServices;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut config = AppConfig::load(&env).with_context(|| format!("loading {} config", env))?;
    if let Some(port) = get_port_override() {
        config.gateway.port = port;
    }
    let _log_guard = init_logging(&config);

    tracing::info!(
        env = %env,
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        "Starting fxledger"
    );

    let services = LedgerServices::from_config(&config)
        .await
        .context("initialising ledger services")?;

    if config.reconciliation.enabled {
        let worker = services
            .reconciliation_worker(Duration::from_secs(config.reconciliation.interval_secs));
        tokio::spawn(async move {
            worker.run().await;
        });
    }
    if config.payout_scheduler.enabled {
        let scheduler = services.payout_scheduler(Duration::from_secs(
            config.payout_scheduler.check_interval_secs,
        ));
        tokio::spawn(async move {
            scheduler.run().await;
        });
    }

    gateway::run_server(&config.gateway, services)
        .await
        .context("gateway server")?;
    Ok(())
}
