use crate::backend::{BackendId, RuntimeFactory};
use crate::error::FactoryError;
use std::collections::HashMap;
use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Opaque, pointer-sized reference to one live runtime factory.
///
/// The value is an identity token issued by the [`FactoryHost`](crate::FactoryHost)
/// that created it. It is never dereferenced; every use goes through the host's
/// live-handle table.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FactoryHandle(*mut c_void);

// SAFETY: the pointer is an opaque token, not an address that is read or written.
unsafe impl Send for FactoryHandle {}
unsafe impl Sync for FactoryHandle {}

impl FactoryHandle {
    pub const NULL: Self = Self(ptr::null_mut());

    pub fn from_raw(raw: *mut c_void) -> Self {
        Self(raw)
    }

    pub fn into_raw(self) -> *mut c_void {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    fn from_token(token: usize) -> Self {
        Self(ptr::without_provenance_mut(token))
    }

    fn token(self) -> usize {
        self.0.addr()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    /// The last reference went away and the factory was destroyed.
    Destroyed,
    /// A shared factory lost one reference and stays alive for the others.
    Retained { remaining: usize },
}

struct LiveEntry {
    backend: BackendId,
    factory: Arc<dyn RuntimeFactory>,
    refs: usize,
}

#[derive(Default)]
pub(crate) struct HandleTable {
    live: Mutex<HashMap<usize, LiveEntry>>,
    issued: AtomicUsize,
}

impl HandleTable {
    pub(crate) fn insert(&self, backend: BackendId, factory: Arc<dyn RuntimeFactory>) -> FactoryHandle {
        // Tokens are never reused.
        let token = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        self.lock().insert(
            token,
            LiveEntry {
                backend,
                factory,
                refs: 1,
            },
        );
        FactoryHandle::from_token(token)
    }

    /// Adds a reference to a live shared handle. Returns false if it is gone.
    pub(crate) fn retain(&self, handle: FactoryHandle) -> bool {
        match self.lock().get_mut(&handle.token()) {
            Some(entry) => {
                entry.refs += 1;
                true
            }
            None => false,
        }
    }

    pub(crate) fn get(
        &self,
        handle: FactoryHandle,
    ) -> Result<(BackendId, Arc<dyn RuntimeFactory>), FactoryError> {
        if handle.is_null() {
            return Err(FactoryError::NullHandle);
        }
        self.lock()
            .get(&handle.token())
            .map(|entry| (entry.backend.clone(), Arc::clone(&entry.factory)))
            .ok_or(FactoryError::UseAfterRelease {
                handle: handle.token(),
            })
    }

    pub(crate) fn contains(&self, handle: FactoryHandle) -> bool {
        !handle.is_null() && self.lock().contains_key(&handle.token())
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn release(
        &self,
        handle: FactoryHandle,
        expected_backend: Option<&str>,
    ) -> Result<Released, FactoryError> {
        if handle.is_null() {
            return Err(FactoryError::NullHandle);
        }
        let token = handle.token();

        let removed = {
            let mut live = self.lock();
            let Some(entry) = live.get_mut(&token) else {
                return Err(self.stale(token));
            };
            if let Some(expected) = expected_backend {
                if entry.backend.as_str() != expected {
                    return Err(FactoryError::BackendMismatch {
                        expected: expected.to_string(),
                        found: entry.backend.to_string(),
                    });
                }
            }
            entry.refs -= 1;
            if entry.refs > 0 {
                return Ok(Released::Retained {
                    remaining: entry.refs,
                });
            }
            live.remove(&token)
        };

        // Dropped outside the lock.
        drop(removed);
        Ok(Released::Destroyed)
    }

    fn stale(&self, token: usize) -> FactoryError {
        if token <= self.issued.load(Ordering::Relaxed) {
            FactoryError::DoubleRelease { handle: token }
        } else {
            FactoryError::UseAfterRelease { handle: token }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<usize, LiveEntry>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{FactoryHandle, HandleTable, Released};
    use crate::backend::{BackendId, RuntimeFactory};
    use crate::error::FactoryError;
    use anyhow::{Result, anyhow};
    use jsrt_engine::JsEngine;
    use std::sync::Arc;

    struct Dummy;

    impl RuntimeFactory for Dummy {
        fn backend_id(&self) -> &str {
            "dummy"
        }

        fn create_engine(&self) -> Result<Box<dyn JsEngine>> {
            Err(anyhow!("no engines here"))
        }
    }

    fn id(raw: &str) -> BackendId {
        BackendId::parse(raw).expect("valid id")
    }

    #[test]
    fn handles_are_distinct_and_non_null() {
        let table = HandleTable::default();
        let first = table.insert(id("dummy"), Arc::new(Dummy));
        let second = table.insert(id("dummy"), Arc::new(Dummy));
        assert_ne!(first, second);
        assert!(!first.is_null());
        assert_eq!(FactoryHandle::from_raw(first.into_raw()), first);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn second_release_is_detected() {
        let table = HandleTable::default();
        let handle = table.insert(id("dummy"), Arc::new(Dummy));
        assert_eq!(table.release(handle, None).expect("first release"), Released::Destroyed);

        let err = table.release(handle, None).expect_err("double release");
        assert!(matches!(err, FactoryError::DoubleRelease { .. }));
        assert!(!table.contains(handle));
    }

    #[test]
    fn never_issued_and_null_handles_are_rejected() {
        let table = HandleTable::default();
        let forged = FactoryHandle::from_token(0xdead);
        assert!(matches!(
            table.release(forged, None),
            Err(FactoryError::UseAfterRelease { .. })
        ));
        assert!(matches!(
            table.release(FactoryHandle::NULL, None),
            Err(FactoryError::NullHandle)
        ));
        assert!(!table.contains(FactoryHandle::NULL));
    }

    #[test]
    fn retained_handles_need_matching_releases() {
        let table = HandleTable::default();
        let handle = table.insert(id("dummy"), Arc::new(Dummy));
        assert!(table.retain(handle));

        assert_eq!(
            table.release(handle, None).expect("first release"),
            Released::Retained { remaining: 1 }
        );
        assert!(table.contains(handle));
        assert_eq!(table.release(handle, None).expect("last release"), Released::Destroyed);
        assert!(!table.retain(handle));
    }

    #[test]
    fn release_checks_expected_backend() {
        let table = HandleTable::default();
        let handle = table.insert(id("dummy"), Arc::new(Dummy));

        let err = table
            .release(handle, Some("other"))
            .expect_err("mismatched backend");
        assert!(matches!(err, FactoryError::BackendMismatch { ref found, .. } if found == "dummy"));
        assert!(table.contains(handle));
        assert!(table.release(handle, Some("dummy")).is_ok());
    }
}
