//! Target catalog collaborator and entry tables
//!
//! The catalog owns all knowledge of concrete dispatch-table layouts. The
//! engine only ever sees named entry points mapped to patch targets.

use std::ffi::c_void;
use std::num::NonZeroUsize;

use rendergate_sdk::{RgEntryTable, RG_ENTRY_COUNT};

use crate::error::ProbeError;
use crate::kind::SubsystemKind;

/// Named entry point of a subsystem
///
/// Discriminants are the `RG_ENTRY_*` indices of the C entry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum EntryPoint {
    Present = 0,
    Reset = 1,
    EndScene = 2,
    PresentEx = 3,
    ResetEx = 4,
    ResizeTarget = 5,
    ResizeBuffers = 6,
    Present1 = 7,
    ResizeBuffers1 = 8,
    CreateSwapChain = 9,
    CreateSwapChainForHwnd = 10,
    ExecuteCommandLists = 11,
    GetBuffer = 12,
    ReleaseBuffer = 13,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; RG_ENTRY_COUNT] = [
        EntryPoint::Present,
        EntryPoint::Reset,
        EntryPoint::EndScene,
        EntryPoint::PresentEx,
        EntryPoint::ResetEx,
        EntryPoint::ResizeTarget,
        EntryPoint::ResizeBuffers,
        EntryPoint::Present1,
        EntryPoint::ResizeBuffers1,
        EntryPoint::CreateSwapChain,
        EntryPoint::CreateSwapChainForHwnd,
        EntryPoint::ExecuteCommandLists,
        EntryPoint::GetBuffer,
        EntryPoint::ReleaseBuffer,
    ];

    /// Entries that live on the DXGI swap chain itself
    pub const SWAP_CHAIN: [EntryPoint; 5] = [
        EntryPoint::Present,
        EntryPoint::ResizeTarget,
        EntryPoint::ResizeBuffers,
        EntryPoint::Present1,
        EntryPoint::ResizeBuffers1,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn is_swap_chain(self) -> bool {
        matches!(
            self,
            EntryPoint::Present
                | EntryPoint::ResizeTarget
                | EntryPoint::ResizeBuffers
                | EntryPoint::Present1
                | EntryPoint::ResizeBuffers1
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            EntryPoint::Present => "Present",
            EntryPoint::Reset => "Reset",
            EntryPoint::EndScene => "EndScene",
            EntryPoint::PresentEx => "PresentEx",
            EntryPoint::ResetEx => "ResetEx",
            EntryPoint::ResizeTarget => "ResizeTarget",
            EntryPoint::ResizeBuffers => "ResizeBuffers",
            EntryPoint::Present1 => "Present1",
            EntryPoint::ResizeBuffers1 => "ResizeBuffers1",
            EntryPoint::CreateSwapChain => "CreateSwapChain",
            EntryPoint::CreateSwapChainForHwnd => "CreateSwapChainForHwnd",
            EntryPoint::ExecuteCommandLists => "ExecuteCommandLists",
            EntryPoint::GetBuffer => "GetBuffer",
            EntryPoint::ReleaseBuffer => "ReleaseBuffer",
        }
    }
}

/// Resolved patch targets for one subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryTable {
    entries: [Option<NonZeroUsize>; RG_ENTRY_COUNT],
}

impl EntryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, entry: EntryPoint, target: usize) -> Self {
        self.set(entry, target);
        self
    }

    /// Sets a target; zero clears the entry
    pub fn set(&mut self, entry: EntryPoint, target: usize) {
        self.entries[entry.index()] = NonZeroUsize::new(target);
    }

    pub fn get(&self, entry: EntryPoint) -> Option<usize> {
        self.entries[entry.index()].map(NonZeroUsize::get)
    }

    pub fn contains(&self, entry: EntryPoint) -> bool {
        self.entries[entry.index()].is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }

    /// Present entries with their targets
    pub fn iter(&self) -> impl Iterator<Item = (EntryPoint, usize)> + '_ {
        EntryPoint::ALL
            .iter()
            .filter_map(|&entry| self.get(entry).map(|target| (entry, target)))
    }

    /// True when both tables resolve `Present` to the same target
    ///
    /// This is how two Direct3D versions are detected as sharing one
    /// physical swap-chain table.
    pub fn shares_swap_chain_with(&self, other: &EntryTable) -> bool {
        match (self.get(EntryPoint::Present), other.get(EntryPoint::Present)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Copies entries this table lacks from `other`
    pub fn merge_missing(&mut self, other: &EntryTable) {
        for (entry, target) in other.iter() {
            if !self.contains(entry) {
                self.set(entry, target);
            }
        }
    }
}

impl From<RgEntryTable> for EntryTable {
    fn from(raw: RgEntryTable) -> Self {
        let mut table = EntryTable::new();
        for entry in EntryPoint::ALL {
            table.set(entry, raw.entries[entry.index()]);
        }
        table
    }
}

/// Patch targets of the two process-level shutdown triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LifecycleTargets {
    /// Process-termination primitive
    pub terminate: Option<usize>,
    /// Application-level quit notification
    pub quit: Option<usize>,
}

/// Collaborator that knows the concrete layout of each subsystem
///
/// Implementations construct throwaway probe instances, read their dispatch
/// tables by fixed structural offset and release them immediately.
pub trait TargetCatalog: Send + Sync {
    /// Resolves the entry table of `kind`
    ///
    /// Returns `Ok(None)` when the subsystem is not present on this host.
    fn probe(&self, kind: SubsystemKind) -> Result<Option<EntryTable>, ProbeError>;

    /// Capability probe: does the live `handle` belong to `kind`?
    ///
    /// # Safety
    /// `handle` must be the first argument the host passed to a hooked entry point.
    unsafe fn supports(&self, handle: *mut c_void, kind: SubsystemKind) -> bool;

    /// Owning device of a device child, or null
    ///
    /// # Safety
    /// `object` must be a live device child.
    unsafe fn device_of(&self, _object: *mut c_void) -> *mut c_void {
        std::ptr::null_mut()
    }

    /// True when `object` is a Direct3D 12 command queue
    ///
    /// # Safety
    /// `object` must be a live interface pointer.
    unsafe fn is_command_queue(&self, _object: *mut c_void) -> bool {
        false
    }

    /// Adds a reference to `object`
    ///
    /// # Safety
    /// `object` must be a live reference-counted interface.
    unsafe fn retain(&self, _object: *mut c_void) {}

    /// Drops a reference previously added with [`TargetCatalog::retain`]
    ///
    /// # Safety
    /// `object` must have been retained.
    unsafe fn release(&self, _object: *mut c_void) {}

    /// Shutdown triggers to intercept
    fn lifecycle_targets(&self) -> LifecycleTargets {
        LifecycleTargets::default()
    }
}
