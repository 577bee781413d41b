use anyhow::{Context, Result, anyhow};
use std::io::{self, IsTerminal};
use tracing_subscriber::EnvFilter;

/// Installs the stderr subscriber. Only the binary does this; the libraries just emit.
pub(crate) fn init(directive: &str) -> Result<()> {
    let filter = EnvFilter::try_new(directive)
        .with_context(|| format!("invalid log filter '{directive}'"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("failed installing log subscriber: {err}"))
}
