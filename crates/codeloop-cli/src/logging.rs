//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set. Otherwise the filter is the configured level
//! (or `debug` with `-v`) followed by any per-crate `filters`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use codeloop_core::config::LoggingConfig;

/// Quiet by default so log lines do not interleave with the chat.
const DEFAULT_LEVEL: &str = "warn";

pub fn init_logging(cfg: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(directives(cfg, verbose))?,
    };

    let writer = match cfg.output.as_str() {
        "stdout" => BoxMakeWriter::new(std::io::stdout),
        _ => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    let result = match cfg.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.with_target(true).compact().try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))
}

fn directives(cfg: &LoggingConfig, verbose: bool) -> String {
    let level = if verbose {
        "debug"
    } else {
        cfg.level.as_deref().unwrap_or(DEFAULT_LEVEL)
    };
    std::iter::once(level)
        .chain(cfg.filters.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(",")
}
