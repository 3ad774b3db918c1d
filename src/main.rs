//! favorites_sync service entry point
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌────────────┐
//! │  Config  │───▶│  AppContext  │───▶│  Ctrl-C    │
//! │  (YAML)  │    │ (PG + Mongo) │    │ (shutdown) │
//! └──────────┘    └──────────────┘    └────────────┘
//! ```

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;

use favorites_sync::{AppConfig, AppContext};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config =
        AppConfig::load(&env).with_context(|| format!("loading config/{}.yaml", env))?;
    let _log_guard =
        favorites_sync::logging::init_logging(&app_config).context("initializing logging")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting favorites_sync in {} mode",
        env
    );

    let ctx = AppContext::build(&app_config)
        .await
        .context("building application context")?;

    let mut failures = ctx.repairs.subscribe_failures();
    let monitor = tokio::spawn(async move {
        loop {
            match failures.recv().await {
                Ok(failure) => tracing::warn!(
                    upk = %failure.upk,
                    kind = failure.kind,
                    "Repair pending until next reconciliation"
                ),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Repair failure monitor lagged")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    let stats = ctx.repairs.stats();
    ctx.shutdown().await;
    monitor.abort();
    tracing::info!(
        submitted = stats.submitted,
        completed = stats.completed,
        failed = stats.failed,
        dropped = stats.dropped,
        coalesced = stats.coalesced,
        "Stopped"
    );
    Ok(())
}
