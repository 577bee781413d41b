//! C ABI for pluggable JavaScript runtime factories.
//!
//! Hosts include `include/jsrt.h`, call a per-backend provider such as
//! `jsrt_create_boa_factory()` and get back an opaque `JSRuntimeFactoryRef`.
//! Nothing crosses the boundary except that pointer-sized handle, plain
//! integers and C strings. Failures come back as a null handle or a negative
//! status code, with the message available from `jsrt_last_error_message`.
//!
//! The process-wide [`host`] registers the built-in backends the first time
//! anything touches it, so hosts never need an explicit registration step.

pub mod backends;
mod last_error;

use jsrt_core::{BackendDescriptor, FactoryError, FactoryHandle, FactoryHost, ForeignVTable};
use std::any::Any;
use std::ffi::{CStr, c_char, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::OnceLock;
use tracing::{error, warn};

pub use backends::boa::{jsrt_create_boa_factory, jsrt_release_boa_factory};
pub use backends::v8::{jsrt_create_v8_factory, jsrt_release_v8_factory};
pub use jsrt_core::ABI_VERSION;

/// The opaque handle as seen from C: `typedef void *JSRuntimeFactoryRef;`.
pub type JsRuntimeFactoryRef = *mut c_void;

pub const JSRT_OK: i32 = 0;
pub const JSRT_ERR_UNKNOWN_BACKEND: i32 = -1;
pub const JSRT_ERR_DUPLICATE_BACKEND: i32 = -2;
pub const JSRT_ERR_CONSTRUCTION_FAILED: i32 = -3;
pub const JSRT_ERR_DOUBLE_RELEASE: i32 = -4;
pub const JSRT_ERR_USE_AFTER_RELEASE: i32 = -5;
pub const JSRT_ERR_REGISTRATION_CLOSED: i32 = -6;
pub const JSRT_ERR_INVALID_ARGUMENT: i32 = -7;
pub const JSRT_ERR_ABI_MISMATCH: i32 = -8;
pub const JSRT_ERR_PANIC: i32 = -9;

static HOST: OnceLock<FactoryHost> = OnceLock::new();

/// The process-wide factory host behind the exported functions.
pub fn host() -> &'static FactoryHost {
    HOST.get_or_init(|| {
        let host = FactoryHost::new();
        backends::register_builtins(&host);
        host
    })
}

pub fn status_code(err: &FactoryError) -> i32 {
    match err {
        FactoryError::UnknownBackend(_) => JSRT_ERR_UNKNOWN_BACKEND,
        FactoryError::DuplicateBackend(_) => JSRT_ERR_DUPLICATE_BACKEND,
        FactoryError::ConstructionFailed { .. } => JSRT_ERR_CONSTRUCTION_FAILED,
        FactoryError::DoubleRelease { .. } => JSRT_ERR_DOUBLE_RELEASE,
        FactoryError::UseAfterRelease { .. } | FactoryError::BackendMismatch { .. } => {
            JSRT_ERR_USE_AFTER_RELEASE
        }
        FactoryError::NullHandle
        | FactoryError::InvalidBackendId(_)
        | FactoryError::IncompleteVTable { .. } => JSRT_ERR_INVALID_ARGUMENT,
        FactoryError::AbiMismatch { .. } => JSRT_ERR_ABI_MISMATCH,
        FactoryError::RegistrationClosed(_) => JSRT_ERR_REGISTRATION_CLOSED,
    }
}

/// Runs `f` with the thread's last error cleared, converting a panic into
/// `fallback` so no unwind reaches the C caller.
fn guarded<T>(fallback: T, f: impl FnOnce() -> T) -> T {
    last_error::clear();
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(%message, "panic caught at the C boundary");
            last_error::set(JSRT_ERR_PANIC, &message);
            fallback
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

fn invalid_argument(message: &str) {
    warn!(message, "invalid argument at the C boundary");
    last_error::set(JSRT_ERR_INVALID_ARGUMENT, message);
}

/// # Safety
/// `raw` must be null or point to a NUL-terminated string.
unsafe fn read_id<'a>(raw: *const c_char) -> Option<&'a str> {
    if raw.is_null() {
        invalid_argument("backend id is null");
        return None;
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract.
    let id = unsafe { CStr::from_ptr(raw) };
    match id.to_str() {
        Ok(id) => Some(id),
        Err(_) => {
            invalid_argument("backend id is not valid UTF-8");
            None
        }
    }
}

pub(crate) fn create_handle(backend: &str) -> JsRuntimeFactoryRef {
    guarded(ptr::null_mut(), || match host().create(backend) {
        Ok(handle) => handle.into_raw(),
        Err(err) => {
            last_error::record(&err);
            ptr::null_mut()
        }
    })
}

pub(crate) fn release_handle(backend: Option<&str>, factory: JsRuntimeFactoryRef) {
    guarded((), || {
        let handle = FactoryHandle::from_raw(factory);
        let released = match backend {
            Some(backend) => host().release_for(backend, handle),
            None => host().release(handle),
        };
        if let Err(err) = released {
            last_error::record(&err);
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn jsrt_abi_version() -> u32 {
    ABI_VERSION
}

/// Creates a factory for the backend named by `backend_id`. Null on failure.
///
/// # Safety
/// `backend_id` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jsrt_create_factory(backend_id: *const c_char) -> JsRuntimeFactoryRef {
    guarded(ptr::null_mut(), || {
        // SAFETY: forwarded caller contract.
        match unsafe { read_id(backend_id) } {
            Some(id) => create_handle(id),
            None => ptr::null_mut(),
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn jsrt_release_factory(factory: JsRuntimeFactoryRef) {
    release_handle(None, factory)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsrt_factory_is_valid(factory: JsRuntimeFactoryRef) -> bool {
    guarded(false, || host().is_valid(FactoryHandle::from_raw(factory)))
}

/// The backend-owned instance behind a handle from a foreign backend, or null.
#[unsafe(no_mangle)]
pub extern "C" fn jsrt_factory_instance(factory: JsRuntimeFactoryRef) -> *mut c_void {
    guarded(ptr::null_mut(), || {
        match host().with_factory(FactoryHandle::from_raw(factory), |f| f.raw_instance()) {
            Ok(instance) => instance,
            Err(err) => {
                last_error::record(&err);
                ptr::null_mut()
            }
        }
    })
}

/// Registers a separately compiled backend. Returns `JSRT_OK` or a negative status.
///
/// # Safety
/// `backend_id` must be null or a NUL-terminated string; `vtable` must be null
/// or point to a table whose non-null functions stay callable for the process
/// lifetime. A table with a null entry is refused.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jsrt_register_backend(
    backend_id: *const c_char,
    abi_version: u32,
    shared: bool,
    vtable: *const ForeignVTable,
) -> i32 {
    guarded(JSRT_ERR_PANIC, || {
        // SAFETY: forwarded caller contract.
        let Some(id) = (unsafe { read_id(backend_id) }) else {
            return JSRT_ERR_INVALID_ARGUMENT;
        };
        if vtable.is_null() {
            invalid_argument("backend vtable is null");
            return JSRT_ERR_INVALID_ARGUMENT;
        }
        // SAFETY: non-null and valid per the caller's contract; copied out by value.
        let vtable = unsafe { *vtable };

        let registered = BackendDescriptor::foreign(id, abi_version, vtable)
            .map(|d| if shared { d.shared() } else { d })
            .and_then(|d| host().register(d));
        match registered {
            Ok(()) => JSRT_OK,
            Err(err) => {
                warn!(backend = id, %err, "backend registration refused");
                last_error::record(&err);
                status_code(&err)
            }
        }
    })
}

/// Ends the registration phase; later lookups are lock-free.
#[unsafe(no_mangle)]
pub extern "C" fn jsrt_seal_registry() {
    guarded((), || host().registry().seal())
}

#[unsafe(no_mangle)]
pub extern "C" fn jsrt_backend_count() -> usize {
    guarded(0, || host().registry().len())
}

/// Writes the `index`-th registered backend id (sorted order) into `buf`.
/// Returns the id length, or 0 if `index` is out of range.
///
/// # Safety
/// `buf` must be null or valid for writes of `len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jsrt_backend_name(index: usize, buf: *mut c_char, len: usize) -> usize {
    guarded(0, || match host().registry().list().nth(index) {
        // SAFETY: forwarded caller contract.
        Some(id) => unsafe { last_error::copy_out(id.as_str(), buf, len) },
        None => 0,
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn jsrt_last_error_code() -> i32 {
    last_error::code()
}

/// Copies the calling thread's last error message into `buf`.
/// Returns the full message length, or 0 when the last call succeeded.
///
/// # Safety
/// `buf` must be null or valid for writes of `len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jsrt_last_error_message(buf: *mut c_char, len: usize) -> usize {
    match last_error::message() {
        // SAFETY: forwarded caller contract.
        Some(message) => unsafe { last_error::copy_out(&message, buf, len) },
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::{JSRT_ERR_CONSTRUCTION_FAILED, JSRT_ERR_PANIC, guarded, last_error, status_code};
    use jsrt_core::FactoryError;

    #[test]
    fn panics_become_fallback_values() {
        let value = guarded(7, || -> i32 { panic!("backend exploded") });
        assert_eq!(value, 7);
        assert_eq!(last_error::code(), JSRT_ERR_PANIC);
        assert_eq!(last_error::message().as_deref(), Some("backend exploded"));
    }

    #[test]
    fn construction_failures_map_to_their_code() {
        let err = FactoryError::ConstructionFailed {
            backend: "v8".to_string(),
            reason: anyhow::anyhow!("missing snapshot"),
        };
        assert_eq!(status_code(&err), JSRT_ERR_CONSTRUCTION_FAILED);
    }
}
