//! Error codes and plain enumerations of the C API

/// Result of every fallible API call
///
/// Values are stable; hosts compare against them directly.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RgError {
    /// Success
    None = 0x2000_0000,
    /// Engine handle is null or not the attached session
    InvalidEngineHandle = 0xE000_0001,
    /// Worker thread could not be spawned
    CreateThreadFailed = 0xE000_0002,
    /// Session allocation failed
    EngineAllocationFailed = 0xE000_0003,
    /// A session is already attached
    EngineAlreadyAllocated = 0xE000_0004,
    /// Host module handle is null or unknown
    InvalidHmoduleHandle = 0xE000_0005,
    /// Pinning the host module failed
    ReferenceIncrementFailed = 0xE000_0006,
    /// Custom context allocation failed
    ContextAllocationFailed = 0xE000_0007,
    /// Cancellation signal could not be created
    CreateEventFailed = 0xE000_0008,
    /// No log sink could be created
    CreateLoggerFailed = 0xE000_0009,
}

impl RgError {
    pub const fn is_success(self) -> bool {
        matches!(self, RgError::None)
    }
}

/// Crash dump verbosity
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RgDumpType {
    /// Threads and stacks only
    Minimal = 0,
    /// Adds data segments, handles and unloaded modules
    #[default]
    Normal = 1,
    /// Full process memory
    Full = 2,
}

impl RgDumpType {
    /// Converts a raw value coming from the host, clamping unknown values to `Normal`
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => RgDumpType::Minimal,
            2 => RgDumpType::Full,
            _ => RgDumpType::Normal,
        }
    }
}
