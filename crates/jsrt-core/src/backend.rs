use crate::ABI_VERSION;
use crate::error::FactoryError;
use anyhow::{Result, anyhow};
use jsrt_engine::JsEngine;
use std::borrow::Borrow;
use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

const MAX_BACKEND_ID_LEN: usize = 64;

/// The object living behind a factory handle.
///
/// Implementations must be shareable across threads: the host may hand a
/// handle to another thread and create engines there.
pub trait RuntimeFactory: Send + Sync {
    fn backend_id(&self) -> &str;

    fn create_engine(&self) -> Result<Box<dyn JsEngine>>;

    /// Backend-owned instance pointer for factories built across the C ABI.
    fn raw_instance(&self) -> *mut c_void {
        std::ptr::null_mut()
    }
}

pub type NativeConstructor = fn() -> Result<Box<dyn RuntimeFactory>>;

/// Function table a separately compiled backend hands to the registry.
///
/// Both entries are nullable on the C side; a table missing either one is
/// refused at registration. `construct` returns null on failure. `destroy` is
/// called exactly once per non-null instance, possibly from a different thread
/// than `construct`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ForeignVTable {
    pub construct: Option<unsafe extern "C" fn() -> *mut c_void>,
    pub destroy: Option<unsafe extern "C" fn(*mut c_void)>,
}

impl ForeignVTable {
    fn missing_entry(&self) -> Option<&'static str> {
        match (self.construct, self.destroy) {
            (None, _) => Some("construct"),
            (_, None) => Some("destroy"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum EntryPoint {
    Native(NativeConstructor),
    Foreign(ForeignVTable),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sharing {
    /// Every create call builds a fresh instance.
    #[default]
    Independent,
    /// One instance per process; creates return the same reference-counted handle.
    Shared,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BackendId(String);

impl BackendId {
    pub fn parse(raw: &str) -> Result<Self, FactoryError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_BACKEND_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(FactoryError::InvalidBackendId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for BackendId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BackendId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct BackendDescriptor {
    pub id: BackendId,
    pub abi_version: u32,
    pub sharing: Sharing,
    pub entry_point: EntryPoint,
}

impl BackendDescriptor {
    pub fn native(id: &str, constructor: NativeConstructor) -> Result<Self, FactoryError> {
        Ok(Self {
            id: BackendId::parse(id)?,
            abi_version: ABI_VERSION,
            sharing: Sharing::Independent,
            entry_point: EntryPoint::Native(constructor),
        })
    }

    pub fn foreign(id: &str, abi_version: u32, vtable: ForeignVTable) -> Result<Self, FactoryError> {
        let id = BackendId::parse(id)?;
        if let Some(missing) = vtable.missing_entry() {
            return Err(FactoryError::IncompleteVTable {
                backend: id.to_string(),
                missing,
            });
        }
        Ok(Self {
            id,
            abi_version,
            sharing: Sharing::Independent,
            entry_point: EntryPoint::Foreign(vtable),
        })
    }

    pub fn shared(mut self) -> Self {
        self.sharing = Sharing::Shared;
        self
    }

    pub(crate) fn construct(&self) -> Result<Arc<dyn RuntimeFactory>, FactoryError> {
        let built: Result<Arc<dyn RuntimeFactory>> = match self.entry_point {
            EntryPoint::Native(constructor) => constructor().map(Arc::from),
            EntryPoint::Foreign(vtable) => ForeignFactory::construct(self.id.clone(), vtable)
                .map(|factory| Arc::new(factory) as Arc<dyn RuntimeFactory>),
        };
        built.map_err(|reason| FactoryError::ConstructionFailed {
            backend: self.id.to_string(),
            reason,
        })
    }
}

struct ForeignFactory {
    backend: BackendId,
    instance: NonNull<c_void>,
    destroy: unsafe extern "C" fn(*mut c_void),
}

// SAFETY: the instance pointer is never dereferenced on this side; it is only
// handed back to the backend's `destroy`, which the vtable contract allows
// from any thread.
unsafe impl Send for ForeignFactory {}
unsafe impl Sync for ForeignFactory {}

impl ForeignFactory {
    fn construct(backend: BackendId, vtable: ForeignVTable) -> Result<Self> {
        // Descriptors built by hand can skip `BackendDescriptor::foreign`.
        let (Some(construct), Some(destroy)) = (vtable.construct, vtable.destroy) else {
            return Err(anyhow!("foreign vtable is missing a function"));
        };
        // SAFETY: `construct` takes no arguments and is non-null; the backend
        // promised a callable function when it registered.
        let raw = unsafe { construct() };
        let instance =
            NonNull::new(raw).ok_or_else(|| anyhow!("foreign constructor returned null"))?;
        Ok(Self {
            backend,
            instance,
            destroy,
        })
    }
}

impl RuntimeFactory for ForeignFactory {
    fn backend_id(&self) -> &str {
        self.backend.as_str()
    }

    fn create_engine(&self) -> Result<Box<dyn JsEngine>> {
        Err(anyhow!(
            "backend '{}' is foreign; create engines through its own ABI using the raw instance",
            self.backend
        ))
    }

    fn raw_instance(&self) -> *mut c_void {
        self.instance.as_ptr()
    }
}

impl Drop for ForeignFactory {
    fn drop(&mut self) {
        // SAFETY: `instance` came from this vtable's `construct` and is dropped once.
        unsafe { (self.destroy)(self.instance.as_ptr()) };
    }
}
