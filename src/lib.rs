// padchat - ask questions of the PAD-US protected areas database in plain English
// Questions become DuckDB SQL; results with a geometry column become a map

pub mod cache;
pub mod commands;
pub mod core;
pub mod error;
pub mod geo;
pub mod integrations;
pub mod llm;
pub mod pipeline;
pub mod render;
pub mod sql;

use anyhow::Result;
use tracing::info;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Initialize logging to stderr so stdout carries only answers
///
/// `RUST_LOG` wins when set; otherwise padchat logs at `info`, or `debug`
/// with `verbose`. Pass `ansi_colors = false` when stderr is not a terminal.
pub fn init_with_logger(ansi_colors: bool, verbose: bool) -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "padchat=debug" } else { "padchat=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if !ansi_colors {
        // Plain format for logs captured to files or pipes
        fmt::Subscriber::builder()
            .with_ansi(false)
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    } else {
        fmt::Subscriber::builder()
            .with_ansi(true)
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .with_target(verbose)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    }

    info!("Initializing padchat v{}", version());
    Ok(())
}
