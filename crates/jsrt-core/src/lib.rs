//! Backend registry and opaque factory handles for pluggable JavaScript runtimes.
//!
//! A [`FactoryHost`] owns a [`Registry`] of backend descriptors and the table of
//! live [`FactoryHandle`]s. Hosts only ever see handles; the factory behind a
//! handle stays on this side of the boundary.

mod backend;
mod error;
mod handle;
mod host;
mod registry;

pub use backend::{
    BackendDescriptor, BackendId, EntryPoint, ForeignVTable, NativeConstructor, RuntimeFactory,
    Sharing,
};
pub use error::{BackendAttempt, FactoryError, SelectionError};
pub use handle::{FactoryHandle, Released};
pub use host::{FactoryHost, ViolationPolicy};
pub use registry::{BackendIds, Registry};

/// Version of the factory ABI. Backends built against another version are refused.
pub const ABI_VERSION: u32 = 1;
