use crate::{JsRuntimeFactoryRef, create_handle, release_handle};
use anyhow::Result;
use jsrt_core::{BackendDescriptor, FactoryError, RuntimeFactory};
use jsrt_engine::JsEngine;
use jsrt_engine_v8::{V8_ENGINE_NAME, V8Engine};

pub const BACKEND_ID: &str = V8_ENGINE_NAME;

struct V8Factory;

impl RuntimeFactory for V8Factory {
    fn backend_id(&self) -> &str {
        BACKEND_ID
    }

    fn create_engine(&self) -> Result<Box<dyn JsEngine>> {
        Ok(Box::new(V8Engine::new()?))
    }
}

// A factory is only handed out when V8 can build engines.
fn construct() -> Result<Box<dyn RuntimeFactory>> {
    V8Engine::new()?;
    Ok(Box::new(V8Factory))
}

pub fn descriptor() -> Result<BackendDescriptor, FactoryError> {
    BackendDescriptor::native(BACKEND_ID, construct)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsrt_create_v8_factory() -> JsRuntimeFactoryRef {
    create_handle(BACKEND_ID)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsrt_release_v8_factory(factory: JsRuntimeFactoryRef) {
    release_handle(Some(BACKEND_ID), factory)
}
