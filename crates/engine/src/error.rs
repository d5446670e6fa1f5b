//! Error types for target probing and module handling

/// Error returned by a [`crate::TargetCatalog`] probe
///
/// A subsystem that is simply not present is `Ok(None)`, not an error.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The throwaway probe instance could not be constructed
    #[error("Probe instance creation failed for {kind}: {reason}")]
    InstanceCreation { kind: &'static str, reason: String },

    /// The catalog returned a raw status the engine does not understand
    #[error("Catalog returned status {0}")]
    Status(i32),

    /// The probe instance exposed a table without the required entries
    #[error("Entry table for {0} is missing required entries")]
    IncompleteTable(&'static str),
}

/// Error type for host module operations
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// Null or unknown module handle
    #[error("Invalid module handle: {0:x}")]
    InvalidHandle(usize),

    /// Incrementing the module reference count failed
    #[error("Failed to pin module: {0}")]
    PinFailed(String),

    /// The module path could not be determined
    #[error("Module path unavailable for {0:x}")]
    PathUnavailable(usize),
}
