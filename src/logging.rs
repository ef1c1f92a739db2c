//! Tracing subscriber setup for the CLI.

use anyhow::Context as _;

/// Installs a stderr subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` picks the level
/// (0 = info, 1 = debug, 2+ = trace).
pub fn init(verbose: u8) -> anyhow::Result<()> {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_level))
        .context("build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
