use anyhow::{Context, Result, anyhow};
use jsrt_config::Selection;
use jsrt_core::{FactoryError, FactoryHost, Sharing};
use jsrt_engine::{EvalOutput, ScriptError};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub(crate) fn backends_command(host: &FactoryHost) -> Result<()> {
    for descriptor in host.registry().descriptors() {
        let sharing = match descriptor.sharing {
            Sharing::Independent => "independent",
            Sharing::Shared => "shared",
        };
        println!(
            "{:<12} abi={} {sharing}",
            descriptor.id, descriptor.abi_version
        );
    }
    Ok(())
}

/// Creates and immediately releases one factory per backend.
///
/// Unavailable backends are reported, not fatal; asking for an id nobody
/// registered is.
pub(crate) fn probe_command(host: &FactoryHost, requested: Vec<String>) -> Result<()> {
    let ids: Vec<String> = if requested.is_empty() {
        host.registry().list().map(|id| id.to_string()).collect()
    } else {
        requested
    };

    let mut unknown = Vec::new();
    for id in ids {
        match host.create(&id) {
            Ok(handle) => {
                host.release(handle)?;
                println!("{id}: ok");
            }
            Err(FactoryError::UnknownBackend(_)) => {
                println!("{id}: unknown");
                unknown.push(id);
            }
            Err(FactoryError::ConstructionFailed { reason, .. }) => {
                println!("{id}: unavailable ({reason:#})");
            }
            Err(err) => println!("{id}: unavailable ({err})"),
        }
    }

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("unknown backend(s): {}", unknown.join(", ")))
    }
}

pub(crate) fn eval_command(host: &FactoryHost, selection: &Selection, code: &str) -> Result<()> {
    let output = eval_with_factory(host, selection, code, "<eval>")?;
    print_output(output);
    Ok(())
}

pub(crate) fn run_command(host: &FactoryHost, selection: &Selection, file: &Path) -> Result<()> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("failed reading script file {}", file.display()))?;
    let source_name = file.display().to_string();
    let output = eval_with_factory(host, selection, &source, &source_name)
        .with_context(|| format!("failed running {}", file.display()))?;
    print_output(output);
    Ok(())
}

fn eval_with_factory(
    host: &FactoryHost,
    selection: &Selection,
    source: &str,
    source_name: &str,
) -> Result<EvalOutput> {
    let candidates = selection.candidates();
    debug!(?candidates, "selecting backend");
    let handle = host.create_first(&candidates)?;
    let backend = host.backend_of(handle)?;
    info!(%backend, "using backend");

    let outcome = host.with_factory(handle, |factory| {
        let mut engine = factory.create_engine()?;
        engine.eval_script(source, source_name)
    });
    // Released even when evaluation failed.
    host.release(handle)?;
    outcome?.inspect_err(|err| {
        if let Some(script) = err.downcast_ref::<ScriptError>() {
            print_console(&script.console);
        }
    })
}

fn print_console(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

fn print_output(output: EvalOutput) {
    print_console(&output.console);
    if let Some(value) = output.value {
        println!("{value}");
    }
}
