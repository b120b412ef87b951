use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber. Respects `RUST_LOG`, defaults to `info`.
///
/// Records emitted through the `log` facade are forwarded to tracing.
pub fn init(json: bool) -> Result<()> {
    tracing_log::LogTracer::init().context("failed to install log bridge")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        let subscriber = registry.with(fmt::layer().json().with_writer(std::io::stderr));
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = registry.with(fmt::layer().with_writer(std::io::stderr));
        tracing::subscriber::set_global_default(subscriber)
    }
    .context("failed to install tracing subscriber")
}
