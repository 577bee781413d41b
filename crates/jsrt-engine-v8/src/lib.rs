use anyhow::{Result, anyhow};
use jsrt_engine::{EvalOutput, JsEngine};

pub const V8_ENGINE_NAME: &str = "v8";

const UNAVAILABLE: &str =
    "V8 backend is scaffolded but not linked into this build. Use the boa backend for now.";

/// Placeholder V8 backend entrypoint.
///
/// The crate holds the engine boundary and dependency wiring so a real V8
/// binding can slot in behind the same factory id without touching hosts.
#[derive(Debug)]
pub struct V8Engine;

impl V8Engine {
    pub fn new() -> Result<Self> {
        Err(anyhow!(UNAVAILABLE))
    }
}

impl JsEngine for V8Engine {
    fn name(&self) -> &'static str {
        V8_ENGINE_NAME
    }

    fn eval_script(&mut self, _source: &str, _source_name: &str) -> Result<EvalOutput> {
        Err(anyhow!(UNAVAILABLE))
    }
}
