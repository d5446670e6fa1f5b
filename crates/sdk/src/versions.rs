//! Direct3D version values and entry-point table indices
//!
//! The indices must match the order of `EntryPoint` in the engine crate.

/// Render API reported through the "hooked" notification
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RgDirect3DVersion {
    Unknown = 0,
    Direct3D9 = 1 << 0,
    Direct3D10 = 1 << 1,
    Direct3D11 = 1 << 2,
    Direct3D12 = 1 << 3,
}

/// Subsystem selector used by the target catalog vtable
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RgSubsystem {
    Direct3D9 = 0,
    Direct3D10 = 1,
    Direct3D11 = 2,
    Direct3D12 = 3,
    CoreAudio = 4,
}

pub const RG_ENTRY_PRESENT: usize = 0;
pub const RG_ENTRY_RESET: usize = 1;
pub const RG_ENTRY_END_SCENE: usize = 2;
pub const RG_ENTRY_PRESENT_EX: usize = 3;
pub const RG_ENTRY_RESET_EX: usize = 4;
pub const RG_ENTRY_RESIZE_TARGET: usize = 5;
pub const RG_ENTRY_RESIZE_BUFFERS: usize = 6;
pub const RG_ENTRY_PRESENT1: usize = 7;
pub const RG_ENTRY_RESIZE_BUFFERS1: usize = 8;
pub const RG_ENTRY_CREATE_SWAP_CHAIN: usize = 9;
pub const RG_ENTRY_CREATE_SWAP_CHAIN_FOR_HWND: usize = 10;
pub const RG_ENTRY_EXECUTE_COMMAND_LISTS: usize = 11;
pub const RG_ENTRY_GET_BUFFER: usize = 12;
pub const RG_ENTRY_RELEASE_BUFFER: usize = 13;

/// Number of slots in [`crate::RgEntryTable`]
pub const RG_ENTRY_COUNT: usize = 14;
