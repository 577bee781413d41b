mod commands;
mod logging;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use jsrt_capi::host;
use jsrt_config::{
    CliOverrides, EnvConfig, Selection, load_file_config, parse_list, resolve_selection,
};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "jsrt",
    version,
    about = "Inspect and drive pluggable JavaScript runtime factories"
)]
struct Cli {
    /// Config file to use instead of ./jsrt.json or the user config dir.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level unless JSRT_LOG says otherwise.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct BackendArgs {
    /// Preferred backend id.
    #[arg(long)]
    backend: Option<String>,
    /// Comma separated backends tried after the preferred one.
    #[arg(long)]
    fallback: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List registered backends.
    Backends,
    /// Create and release a factory for each backend and report the outcome.
    Probe {
        #[arg(long = "backend")]
        backends: Vec<String>,
    },
    /// Evaluate inline JavaScript through a runtime factory.
    Eval {
        code: String,
        #[command(flatten)]
        backend: BackendArgs,
    },
    /// Run a JavaScript file through a runtime factory.
    Run {
        file: PathBuf,
        #[command(flatten)]
        backend: BackendArgs,
    },
}

fn resolve(cli: &Cli, backend: Option<&BackendArgs>) -> Result<Selection> {
    let cwd = env::current_dir().context("failed reading current directory")?;
    let file_cfg = load_file_config(cli.config.as_deref(), &cwd)?;
    let overrides = CliOverrides {
        backend: backend.and_then(|b| b.backend.clone()),
        fallback: backend.and_then(|b| b.fallback.as_deref().map(parse_list)),
        verbose: cli.verbose.then_some(true),
    };
    Ok(resolve_selection(
        &overrides,
        &EnvConfig::from_current_env(),
        file_cfg.as_ref(),
    ))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let backend_args = match &cli.command {
        Commands::Eval { backend, .. } | Commands::Run { backend, .. } => Some(backend),
        Commands::Backends | Commands::Probe { .. } => None,
    };
    let selection = resolve(&cli, backend_args)?;
    logging::init(&selection.log_filter())?;

    let host = host();
    match cli.command {
        Commands::Backends => commands::backends_command(host),
        Commands::Probe { backends } => commands::probe_command(host, backends),
        Commands::Eval { code, .. } => commands::eval_command(host, &selection, &code),
        Commands::Run { file, .. } => commands::run_command(host, &selection, &file),
    }
}
