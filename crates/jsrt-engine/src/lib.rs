use anyhow::{Result, anyhow};
use boa_engine::{Context, Source};
use thiserror::Error;
use tracing::debug;

pub const BOA_ENGINE_NAME: &str = "boa";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalOutput {
    pub value: Option<String>,
    /// Lines written through `console.log`/`console.error` during the evaluation.
    pub console: Vec<String>,
}

/// A script threw or failed to parse. Console lines written before the
/// failure travel with the error.
#[derive(Debug, Error)]
#[error("failed evaluating {source_name}: {message}")]
pub struct ScriptError {
    pub source_name: String,
    pub message: String,
    pub console: Vec<String>,
}

pub trait JsEngine {
    fn name(&self) -> &'static str;
    fn eval_script(&mut self, source: &str, source_name: &str) -> Result<EvalOutput>;
}

pub struct BoaEngine {
    ctx: Context,
}

impl BoaEngine {
    pub fn new() -> Self {
        let mut engine = Self {
            ctx: Context::default(),
        };
        engine.install_console_shim();
        engine
    }

    fn install_console_shim(&mut self) {
        // Buffer console output so the embedder decides where it goes.
        let installed = self.ctx.eval(Source::from_bytes(
            r#"
globalThis.__jsrt_console_logs = [];
globalThis.console = globalThis.console || {};
globalThis.console.log = (...args) => {
  globalThis.__jsrt_console_logs.push(args.map((v) => String(v)).join(" "));
};
globalThis.console.error = (...args) => {
  globalThis.__jsrt_console_logs.push(args.map((v) => String(v)).join(" "));
};
globalThis.__jsrt_flush_console = () => {
  const out = globalThis.__jsrt_console_logs.join("\n");
  globalThis.__jsrt_console_logs = [];
  return out;
};
"#,
        ));
        if let Err(err) = installed {
            debug!(%err, "console shim unavailable");
        }
    }

    fn drain_console(&mut self) -> Vec<String> {
        let flushed = self
            .ctx
            .eval(Source::from_bytes("globalThis.__jsrt_flush_console?.() ?? ''"));
        let Ok(value) = flushed else {
            return Vec::new();
        };
        let Ok(text) = value.to_string(&mut self.ctx) else {
            return Vec::new();
        };
        let rendered = text.to_std_string_escaped();
        if rendered.is_empty() {
            return Vec::new();
        }
        rendered.lines().map(str::to_string).collect()
    }
}

impl Default for BoaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl JsEngine for BoaEngine {
    fn name(&self) -> &'static str {
        BOA_ENGINE_NAME
    }

    fn eval_script(&mut self, source: &str, source_name: &str) -> Result<EvalOutput> {
        debug!(source_name, bytes = source.len(), "evaluating script");
        let evaluated = self.ctx.eval(Source::from_bytes(source));
        let console = self.drain_console();
        let result = match evaluated {
            Ok(result) => result,
            Err(err) => {
                return Err(ScriptError {
                    source_name: source_name.to_string(),
                    message: err.to_string(),
                    console,
                }
                .into());
            }
        };

        if result.is_undefined() {
            return Ok(EvalOutput {
                value: None,
                console,
            });
        }

        let rendered = result
            .to_string(&mut self.ctx)
            .map_err(|err| anyhow!("failed converting JS value to string: {err}"))?
            .to_std_string_escaped();

        Ok(EvalOutput {
            value: Some(rendered),
            console,
        })
    }
}
