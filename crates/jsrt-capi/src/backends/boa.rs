use crate::{JsRuntimeFactoryRef, create_handle, release_handle};
use anyhow::Result;
use jsrt_core::{BackendDescriptor, FactoryError, RuntimeFactory};
use jsrt_engine::{BOA_ENGINE_NAME, BoaEngine, JsEngine};

pub const BACKEND_ID: &str = BOA_ENGINE_NAME;

/// Stateless: every engine it creates gets its own Boa context.
struct BoaFactory;

impl RuntimeFactory for BoaFactory {
    fn backend_id(&self) -> &str {
        BACKEND_ID
    }

    fn create_engine(&self) -> Result<Box<dyn JsEngine>> {
        Ok(Box::new(BoaEngine::new()))
    }
}

fn construct() -> Result<Box<dyn RuntimeFactory>> {
    Ok(Box::new(BoaFactory))
}

pub fn descriptor() -> Result<BackendDescriptor, FactoryError> {
    BackendDescriptor::native(BACKEND_ID, construct)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsrt_create_boa_factory() -> JsRuntimeFactoryRef {
    create_handle(BACKEND_ID)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsrt_release_boa_factory(factory: JsRuntimeFactoryRef) {
    release_handle(Some(BACKEND_ID), factory)
}
