//! Error types for the weft runtime

use core::fmt;

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors surfaced to callers of the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeError {
    /// Every eligible core's slot map is at capacity
    OutOfSlots,

    /// Entry closure exceeds the in-place invocation storage
    InvocationTooLarge,

    /// Runtime has not been initialized yet
    NotInitialized,

    /// Runtime is already initialized
    AlreadyInitialized,

    /// Configuration failed validation
    InvalidConfig(&'static str),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::OutOfSlots => write!(f, "no thread slots available on any core"),
            RuntimeError::InvocationTooLarge => {
                write!(f, "entry closure exceeds invocation storage")
            }
            RuntimeError::NotInitialized => write!(f, "runtime not initialized"),
            RuntimeError::AlreadyInitialized => write!(f, "runtime already initialized"),
            RuntimeError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for RuntimeError {}
