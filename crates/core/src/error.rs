//! Errors of the public attach/detach/context API

use rendergate_engine::ModuleError;
use rendergate_sdk::RgError;

/// Error type for session lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A session is already attached to this process
    #[error("Engine already attached")]
    AlreadyAttached,

    /// Engine handle is null or does not name the attached session
    #[error("Invalid engine handle")]
    InvalidHandle,

    /// Host module handle is null or not the module that attached
    #[error("Invalid module handle")]
    InvalidModuleHandle,

    /// Pinning the host module failed
    #[error("Failed to pin host module: {0}")]
    ReferenceIncrement(#[from] ModuleError),

    /// Worker thread could not be spawned
    #[error("Failed to create worker thread: {0}")]
    ThreadCreation(#[source] std::io::Error),

    /// Session state could not be allocated
    #[error("Failed to allocate engine session")]
    Allocation,

    /// Cancellation or readiness signal could not be created
    #[error("Failed to create event: {0}")]
    EventCreation(String),

    /// No log sink could be opened
    #[error("Failed to create logger: {0}")]
    LoggerCreation(String),

    #[error("Failed to allocate {0} bytes of custom context")]
    ContextAllocation(usize),
}

impl EngineError {
    /// Stable code reported across the C boundary
    pub fn code(&self) -> RgError {
        match self {
            EngineError::AlreadyAttached => RgError::EngineAlreadyAllocated,
            EngineError::InvalidHandle => RgError::InvalidEngineHandle,
            EngineError::InvalidModuleHandle => RgError::InvalidHmoduleHandle,
            EngineError::ReferenceIncrement(_) => RgError::ReferenceIncrementFailed,
            EngineError::ThreadCreation(_) => RgError::CreateThreadFailed,
            EngineError::Allocation => RgError::EngineAllocationFailed,
            EngineError::EventCreation(_) => RgError::CreateEventFailed,
            EngineError::LoggerCreation(_) => RgError::CreateLoggerFailed,
            EngineError::ContextAllocation(_) => RgError::ContextAllocationFailed,
        }
    }
}

/// Result type for session operations
pub type EngineResult<T> = Result<T, EngineError>;
