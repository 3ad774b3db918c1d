//! Log setup: rolling file output plus stdout in text mode, file only in
//! JSON mode. `RUST_LOG` overrides the configured level.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;
use crate::error::{StoreError, StoreResult};

/// Database drivers log every statement at info
const QUIET_DRIVERS: &str = "sqlx=warn,mongodb=warn";

pub fn rotation_of(name: &str) -> Rotation {
    match name {
        "minutely" => Rotation::MINUTELY,
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    }
}

pub fn filter_directives(level: &str) -> String {
    format!("{},{}", level, QUIET_DRIVERS)
}

/// Install the global subscriber. Keep the guard alive for the whole run or
/// buffered lines are lost.
pub fn init_logging(config: &AppConfig) -> StoreResult<WorkerGuard> {
    std::fs::create_dir_all(&config.log_dir)?;
    let file_appender = RollingFileAppender::new(
        rotation_of(&config.rotation),
        &config.log_dir,
        &config.log_file,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config.log_level)));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).try_init()
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).try_init()
    };
    installed.map_err(|e| StoreError::Config(format!("logging already initialized: {}", e)))?;

    Ok(guard)
}
