use thiserror::Error;

#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),
    #[error("backend '{0}' is already registered")]
    DuplicateBackend(String),
    #[error("backend '{backend}' failed to construct its factory: {reason:#}")]
    ConstructionFailed {
        backend: String,
        reason: anyhow::Error,
    },
    #[error("factory handle {handle:#x} was already released")]
    DoubleRelease { handle: usize },
    #[error("factory handle {handle:#x} is not live")]
    UseAfterRelease { handle: usize },
    #[error("null factory handle")]
    NullHandle,
    #[error("factory handle belongs to backend '{found}', not '{expected}'")]
    BackendMismatch { expected: String, found: String },
    #[error("invalid backend id '{0}'")]
    InvalidBackendId(String),
    #[error("backend '{backend}' supplied a vtable without `{missing}`")]
    IncompleteVTable {
        backend: String,
        missing: &'static str,
    },
    #[error("backend '{backend}' was built against ABI {found}, expected {expected}")]
    AbiMismatch {
        backend: String,
        expected: u32,
        found: u32,
    },
    #[error("registry is sealed; cannot register backend '{0}'")]
    RegistrationClosed(String),
}

impl FactoryError {
    /// Contract violations on a live-or-once-live handle, as opposed to
    /// recoverable failures. A null handle is only an invalid argument.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::DoubleRelease { .. } | Self::UseAfterRelease { .. } | Self::BackendMismatch { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendAttempt {
    pub backend: String,
    pub error: String,
}

#[derive(Debug, Error)]
#[error("no backend could be constructed: {}", render_attempts(.attempts))]
pub struct SelectionError {
    pub attempts: Vec<BackendAttempt>,
}

fn render_attempts(attempts: &[BackendAttempt]) -> String {
    if attempts.is_empty() {
        return "no candidates given".to_string();
    }
    attempts
        .iter()
        .map(|a| a.error.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
