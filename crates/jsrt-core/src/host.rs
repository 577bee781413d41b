use crate::backend::{BackendDescriptor, BackendId, RuntimeFactory, Sharing};
use crate::error::{BackendAttempt, FactoryError, SelectionError};
use crate::handle::{FactoryHandle, HandleTable, Released};
use crate::registry::Registry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, warn};

/// What happens when a caller breaks the handle contract (double release,
/// use after release, wrong backend).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationPolicy {
    /// Log and abort the process.
    Abort,
    /// Log and hand the error back to the caller.
    Report,
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Abort
        } else {
            Self::Report
        }
    }
}

type SharedSlot = Arc<Mutex<Option<FactoryHandle>>>;

/// Registry plus live handles: the provider side of the factory ABI.
///
/// Tests build their own host; the C surface uses one process-wide instance.
pub struct FactoryHost {
    registry: Registry,
    handles: HandleTable,
    shared: Mutex<HashMap<BackendId, SharedSlot>>,
    abort_on_violation: AtomicBool,
}

impl Default for FactoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FactoryHost {
    pub fn new() -> Self {
        Self::with_policy(ViolationPolicy::default())
    }

    pub fn with_policy(policy: ViolationPolicy) -> Self {
        Self {
            registry: Registry::new(),
            handles: HandleTable::default(),
            shared: Mutex::new(HashMap::new()),
            abort_on_violation: AtomicBool::new(policy == ViolationPolicy::Abort),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn register(&self, descriptor: BackendDescriptor) -> Result<(), FactoryError> {
        self.registry.register(descriptor)
    }

    /// Registers `descriptor` unless its id is already present.
    pub fn ensure_registered(&self, descriptor: BackendDescriptor) -> Result<(), FactoryError> {
        match self.registry.register(descriptor) {
            Err(FactoryError::DuplicateBackend(_)) => Ok(()),
            other => other,
        }
    }

    pub fn violation_policy(&self) -> ViolationPolicy {
        if self.abort_on_violation.load(Ordering::Relaxed) {
            ViolationPolicy::Abort
        } else {
            ViolationPolicy::Report
        }
    }

    pub fn set_violation_policy(&self, policy: ViolationPolicy) {
        self.abort_on_violation
            .store(policy == ViolationPolicy::Abort, Ordering::Relaxed);
    }

    pub fn create(&self, backend: &str) -> Result<FactoryHandle, FactoryError> {
        let descriptor = self.registry.lookup(backend).inspect_err(|err| {
            warn!(backend, %err, "factory requested for unregistered backend");
        })?;

        match descriptor.sharing {
            Sharing::Independent => self.construct(&descriptor),
            Sharing::Shared => {
                let slot = self.shared_slot(&descriptor.id);
                // Only creates of this same backend wait on the slot.
                let mut current = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(handle) = *current {
                    if self.handles.retain(handle) {
                        debug!(backend, "reusing shared factory");
                        return Ok(handle);
                    }
                }
                let handle = self.construct(&descriptor)?;
                *current = Some(handle);
                Ok(handle)
            }
        }
    }

    /// Tries each candidate in order and returns the first factory that constructs.
    pub fn create_first<I, S>(&self, candidates: I) -> Result<FactoryHandle, SelectionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut attempts = Vec::new();
        for candidate in candidates {
            let backend = candidate.as_ref();
            match self.create(backend) {
                Ok(handle) => return Ok(handle),
                Err(err) => {
                    debug!(backend, %err, "falling back to next backend");
                    attempts.push(BackendAttempt {
                        backend: backend.to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }
        Err(SelectionError { attempts })
    }

    pub fn release(&self, handle: FactoryHandle) -> Result<Released, FactoryError> {
        self.release_checked(handle, None)
    }

    /// Like [`release`](Self::release), but refuses handles from other backends.
    pub fn release_for(&self, backend: &str, handle: FactoryHandle) -> Result<Released, FactoryError> {
        self.release_checked(handle, Some(backend))
    }

    pub fn is_valid(&self, handle: FactoryHandle) -> bool {
        self.handles.contains(handle)
    }

    pub fn backend_of(&self, handle: FactoryHandle) -> Result<BackendId, FactoryError> {
        self.handles
            .get(handle)
            .map(|(backend, _)| backend)
            .map_err(|err| self.violation(err))
    }

    /// Runs `f` against the factory behind `handle`, without holding any lock.
    pub fn with_factory<R>(
        &self,
        handle: FactoryHandle,
        f: impl FnOnce(&dyn RuntimeFactory) -> R,
    ) -> Result<R, FactoryError> {
        let (_, factory) = self.handles.get(handle).map_err(|err| self.violation(err))?;
        Ok(f(factory.as_ref()))
    }

    pub fn live_count(&self) -> usize {
        self.handles.len()
    }

    fn construct(&self, descriptor: &BackendDescriptor) -> Result<FactoryHandle, FactoryError> {
        let factory = descriptor.construct().inspect_err(|err| {
            warn!(backend = %descriptor.id, %err, "backend constructor failed");
        })?;
        let handle = self.handles.insert(descriptor.id.clone(), factory);
        debug!(backend = %descriptor.id, handle = ?handle, "created factory");
        Ok(handle)
    }

    fn release_checked(
        &self,
        handle: FactoryHandle,
        expected_backend: Option<&str>,
    ) -> Result<Released, FactoryError> {
        let released = self
            .handles
            .release(handle, expected_backend)
            .map_err(|err| self.violation(err))?;
        debug!(handle = ?handle, outcome = ?released, "released factory");
        Ok(released)
    }

    fn shared_slot(&self, backend: &BackendId) -> SharedSlot {
        let mut slots = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(backend.clone()).or_default())
    }

    fn violation(&self, err: FactoryError) -> FactoryError {
        if !err.is_contract_violation() {
            return err;
        }
        warn!(%err, "factory handle contract violated");
        if self.violation_policy() == ViolationPolicy::Abort {
            error!(%err, "aborting on factory handle contract violation");
            std::process::abort();
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::{FactoryHost, ViolationPolicy};

    #[test]
    fn default_policy_follows_build_profile() {
        let expected = if cfg!(debug_assertions) {
            ViolationPolicy::Abort
        } else {
            ViolationPolicy::Report
        };
        assert_eq!(ViolationPolicy::default(), expected);
        assert_eq!(FactoryHost::new().violation_policy(), expected);
    }

    #[test]
    fn policy_can_be_switched() {
        let host = FactoryHost::with_policy(ViolationPolicy::Abort);
        host.set_violation_policy(ViolationPolicy::Report);
        assert_eq!(host.violation_policy(), ViolationPolicy::Report);
    }
}
