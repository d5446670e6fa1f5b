//! Opaque handles passed across the C boundary

use std::ffi::c_void;

/// Opaque type for an attached engine session
///
/// Hosts only ever hold a pointer to it and pass it back to the API.
#[repr(C)]
pub struct RgEngine {
    _opaque: [u8; 0],
}

/// Extra data handed to every pre/post event callback
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RgEventExtension {
    /// Engine handle for API calls from inside the callback
    pub engine: *mut RgEngine,
    /// Custom context, or null if none was allocated
    pub context: *mut c_void,
}

impl RgEventExtension {
    pub const fn new(engine: *mut RgEngine, context: *mut c_void) -> Self {
        Self { engine, context }
    }
}
