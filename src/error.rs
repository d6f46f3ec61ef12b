//! Error types for stores, contracts, and configuration.

use std::rc::Rc;

use thiserror::Error;

/// Argument canonicalization errors
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Arguments cannot be encoded as a registry key: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Store registration and dispatch errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Getter already registered: {0}")]
    DuplicateGetter(String),

    #[error("Setter already registered: {0}")]
    DuplicateSetter(String),

    #[error("Unknown getter: {0}")]
    UnknownGetter(String),

    #[error("Unknown setter: {0}")]
    UnknownSetter(String),
}

/// Outcome of a deferred contract execution that did not produce a value
#[derive(Debug, Error)]
pub enum ExecutionError<E> {
    /// The wrapped operation rejected; the same failure is kept as `errors()`.
    #[error("Operation failed")]
    Failed(Rc<E>),

    /// The task settling this execution was dropped before it delivered.
    #[error("Execution abandoned before settling")]
    Abandoned,

    /// Execution is restricted to the client site and none was cached.
    #[error("Execution skipped: contract is client-only")]
    ClientOnly,

    /// Called from a thread with no tokio runtime to run the operation on.
    #[error("Execution skipped: no tokio runtime on this thread")]
    NoRuntime,
}

impl<E> ExecutionError<E> {
    /// The operation failure, if this error carries one.
    pub fn failure(&self) -> Option<&Rc<E>> {
        match self {
            ExecutionError::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl<E> Clone for ExecutionError<E> {
    fn clone(&self) -> Self {
        match self {
            ExecutionError::Failed(err) => ExecutionError::Failed(Rc::clone(err)),
            ExecutionError::Abandoned => ExecutionError::Abandoned,
            ExecutionError::ClientOnly => ExecutionError::ClientOnly,
            ExecutionError::NoRuntime => ExecutionError::NoRuntime,
        }
    }
}

/// Configuration and logging setup errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Invalid(String),

    #[error("Configuration source error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}
