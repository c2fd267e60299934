//! Logging initialization for the GridScope binaries
//!
//! Sets up `tracing` with an environment filter, JSON or human-readable
//! output, and optional daily-rotated file logging. `RUST_LOG` overrides the
//! configured default filter.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Keeps the non-blocking file writer alive for the program duration.
/// Dropping it flushes buffered log lines.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(env_filter);

    let file_guard = match &config.file_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "gridscope.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);

            if config.json {
                let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
                registry
                    .with(fmt::layer().json())
                    .with(file_layer)
                    .try_init()?;
            } else {
                let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
                registry.with(fmt::layer()).with(file_layer).try_init()?;
            }
            Some(guard)
        }
        None => {
            if config.json {
                registry.with(fmt::layer().json()).try_init()?;
            } else {
                registry.with(fmt::layer()).try_init()?;
            }
            None
        }
    };

    tracing::info!(json = config.json, "Logging initialized");

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
