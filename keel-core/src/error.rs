use thiserror::Error;

/// Error kinds raised by the engine.
///
/// They travel inside [`crate::Error`], use `downcast_ref::<OrmError>()` to tell them apart
/// from the errors produced by the executor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrmError {
    /// Navigation through a property that does not exist or cannot be navigated.
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// Inverse join whose back property does not point to the source table type.
    #[error("ambiguous inverse join: {0}")]
    AmbiguousInverseJoin(String),
    /// Construct that the dialect or the operation cannot express.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Draft mutation rejected.
    #[error("invalid draft: {0}")]
    InvalidDraft(String),
    /// Result shape or type does not match the requested one.
    #[error("mapping error: {0}")]
    Mapping(String),
    /// Statement touched a different number of rows than required.
    #[error("expected {expected} affected row(s), the statement reported {actual}")]
    UnexpectedRowCount { expected: u64, actual: u64 },
    /// At least one trigger listener failed, the writes were already executed.
    #[error("{failed} listener(s) failed, first error: {first}")]
    Listener { failed: usize, first: String },
}

impl OrmError {
    pub fn invalid_path(message: impl Into<String>) -> crate::Error {
        OrmError::InvalidPath(message.into()).into()
    }
    pub fn unsupported(message: impl Into<String>) -> crate::Error {
        OrmError::Unsupported(message.into()).into()
    }
    pub fn invalid_draft(message: impl Into<String>) -> crate::Error {
        OrmError::InvalidDraft(message.into()).into()
    }
    pub fn mapping(message: impl Into<String>) -> crate::Error {
        OrmError::Mapping(message.into()).into()
    }
}

/// Returns the engine error kind carried by `error`, if any.
pub fn error_kind(error: &crate::Error) -> Option<&OrmError> {
    error.chain().find_map(|e| e.downcast_ref::<OrmError>())
}
