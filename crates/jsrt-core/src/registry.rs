use crate::ABI_VERSION;
use crate::backend::{BackendDescriptor, BackendId};
use crate::error::FactoryError;
use std::collections::BTreeMap;
use std::sync::{OnceLock, PoisonError, RwLock};
use tracing::debug;

type BackendMap = BTreeMap<BackendId, BackendDescriptor>;

/// Backend id to descriptor mapping.
///
/// Registration is serialized by a lock held only for the map operation.
/// Once [`Registry::seal`] runs the map is frozen and lookups take no lock.
#[derive(Debug, Default)]
pub struct Registry {
    pending: RwLock<BackendMap>,
    sealed: OnceLock<BackendMap>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, descriptor: BackendDescriptor) -> Result<(), FactoryError> {
        if descriptor.abi_version != ABI_VERSION {
            return Err(FactoryError::AbiMismatch {
                backend: descriptor.id.to_string(),
                expected: ABI_VERSION,
                found: descriptor.abi_version,
            });
        }

        let mut pending = self.pending.write().unwrap_or_else(PoisonError::into_inner);
        if self.sealed.get().is_some() {
            return Err(FactoryError::RegistrationClosed(descriptor.id.to_string()));
        }
        if pending.contains_key(&descriptor.id) {
            return Err(FactoryError::DuplicateBackend(descriptor.id.to_string()));
        }

        debug!(backend = %descriptor.id, sharing = ?descriptor.sharing, "registered backend");
        pending.insert(descriptor.id.clone(), descriptor);
        Ok(())
    }

    pub fn lookup(&self, id: &str) -> Result<BackendDescriptor, FactoryError> {
        self.with_map(|map| map.get(id).cloned())
            .ok_or_else(|| FactoryError::UnknownBackend(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.with_map(|map| map.contains_key(id))
    }

    /// Snapshot of the registered ids, in sorted order.
    pub fn list(&self) -> BackendIds {
        BackendIds {
            inner: self.with_map(|map| map.keys().cloned().collect::<Vec<_>>()).into_iter(),
        }
    }

    pub fn descriptors(&self) -> Vec<BackendDescriptor> {
        self.with_map(|map| map.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.with_map(BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes registration. Idempotent.
    pub fn seal(&self) {
        let mut pending = self.pending.write().unwrap_or_else(PoisonError::into_inner);
        if self.sealed.get().is_none() {
            let frozen = std::mem::take(&mut *pending);
            debug!(backends = frozen.len(), "sealed backend registry");
            let _ = self.sealed.set(frozen);
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.get().is_some()
    }

    fn with_map<R>(&self, f: impl FnOnce(&BackendMap) -> R) -> R {
        if let Some(map) = self.sealed.get() {
            return f(map);
        }
        let pending = self.pending.read().unwrap_or_else(PoisonError::into_inner);
        // A seal may have completed while we waited for the lock.
        match self.sealed.get() {
            Some(map) => f(map),
            None => f(&pending),
        }
    }
}

/// Restartable iterator over a registry snapshot; clone it to iterate again.
#[derive(Debug, Clone)]
pub struct BackendIds {
    inner: std::vec::IntoIter<BackendId>,
}

impl Iterator for BackendIds {
    type Item = BackendId;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for BackendIds {}
