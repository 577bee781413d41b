//! Built-in backends. Each module owns its id, its constructor and its
//! exported provider pair.

pub mod boa;
pub mod v8;

use jsrt_core::{BackendDescriptor, FactoryError, FactoryHost};
use tracing::error;

pub fn builtin_descriptors() -> Vec<Result<BackendDescriptor, FactoryError>> {
    vec![boa::descriptor(), v8::descriptor()]
}

pub(crate) fn register_builtins(host: &FactoryHost) {
    for descriptor in builtin_descriptors() {
        if let Err(err) = descriptor.and_then(|d| host.ensure_registered(d)) {
            error!(%err, "failed registering built-in backend");
        }
    }
}
