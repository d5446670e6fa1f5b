//! Vtables for the host-provided collaborators
//!
//! The target catalog knows the concrete dispatch-table layout of each
//! subsystem. The code patcher performs the actual redirection. Both are
//! plain function-pointer records with an opaque `user` pointer.

use std::ffi::c_void;

use crate::{RgSubsystem, RG_ENTRY_COUNT};

/// Resolved patch targets, indexed by the `RG_ENTRY_*` constants
///
/// Zero marks an entry point the subsystem does not expose.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RgEntryTable {
    pub entries: [usize; RG_ENTRY_COUNT],
}

impl Default for RgEntryTable {
    fn default() -> Self {
        Self {
            entries: [0; RG_ENTRY_COUNT],
        }
    }
}

/// Probe result: the subsystem is present and `table` was filled
pub const RG_PROBE_PRESENT: i32 = 1;
/// Probe result: the subsystem is absent on this host
pub const RG_PROBE_ABSENT: i32 = 0;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RgTargetCatalog {
    pub user: *mut c_void,
    /// Builds a throwaway instance, copies its entry addresses, releases it.
    /// Returns [`RG_PROBE_PRESENT`], [`RG_PROBE_ABSENT`] or a negative error.
    pub probe: Option<
        unsafe extern "system" fn(
            user: *mut c_void,
            subsystem: RgSubsystem,
            table: *mut RgEntryTable,
        ) -> i32,
    >,
    /// Capability probe on a live handle (for example `GetDevice` on a swap chain)
    pub supports: Option<
        unsafe extern "system" fn(user: *mut c_void, handle: *mut c_void, subsystem: RgSubsystem)
            -> bool,
    >,
    /// Returns the owning device of a device child without adding a reference
    pub device_of:
        Option<unsafe extern "system" fn(user: *mut c_void, object: *mut c_void) -> *mut c_void>,
    /// True when `object` is a Direct3D 12 command queue
    pub is_command_queue:
        Option<unsafe extern "system" fn(user: *mut c_void, object: *mut c_void) -> bool>,
    pub retain: Option<unsafe extern "system" fn(user: *mut c_void, object: *mut c_void)>,
    pub release: Option<unsafe extern "system" fn(user: *mut c_void, object: *mut c_void)>,
    /// Patch target of the process-termination primitive, or zero
    pub terminate_target: usize,
    /// Patch target of the application quit notification, or zero
    pub quit_target: usize,
}

/// Status codes returned by the [`RgCodePatcher`] entries
pub const RG_PATCH_OK: i32 = 0;
pub const RG_PATCH_TARGET_TOO_SMALL: i32 = 1;
pub const RG_PATCH_ALREADY_PATCHED: i32 = 2;
pub const RG_PATCH_TRANSACTION_CONFLICT: i32 = 3;
pub const RG_PATCH_OUT_OF_MEMORY: i32 = 4;
pub const RG_PATCH_INVALID_TARGET: i32 = 5;

/// Transactional code patcher (a Detours-style engine)
///
/// A null pointer passed to `rg_engine_create` selects the built-in
/// dispatch-table slot patcher.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RgCodePatcher {
    pub user: *mut c_void,
    pub begin: Option<unsafe extern "system" fn(user: *mut c_void) -> i32>,
    pub update_thread: Option<unsafe extern "system" fn(user: *mut c_void) -> i32>,
    /// On success `original` receives the address that reaches the pre-patch code
    pub attach: Option<
        unsafe extern "system" fn(
            user: *mut c_void,
            target: usize,
            detour: usize,
            original: *mut usize,
        ) -> i32,
    >,
    pub detach: Option<
        unsafe extern "system" fn(
            user: *mut c_void,
            target: usize,
            original: usize,
            detour: usize,
        ) -> i32,
    >,
    pub commit: Option<unsafe extern "system" fn(user: *mut c_void) -> i32>,
    pub abort: Option<unsafe extern "system" fn(user: *mut c_void)>,
}
