//! Per-subsystem event callback tables
//!
//! Every entry is nullable. A null entry is skipped at dispatch time.
//! Pre and post callbacks share a signature and receive the same arguments
//! the intercepted call received, plus the [`RgEventExtension`].

use std::ffi::c_void;

use crate::{RgDirect3DVersion, RgEngine, RgEventExtension};

// ============================================================================
// Direct3D 9
// ============================================================================

pub type RgD3D9PresentFn = Option<
    unsafe extern "system" fn(
        device: *mut c_void,
        source_rect: *const c_void,
        dest_rect: *const c_void,
        dest_window: *mut c_void,
        dirty_region: *const c_void,
        extension: *const RgEventExtension,
    ),
>;

pub type RgD3D9ResetFn = Option<
    unsafe extern "system" fn(
        device: *mut c_void,
        presentation_parameters: *mut c_void,
        extension: *const RgEventExtension,
    ),
>;

pub type RgD3D9EndSceneFn =
    Option<unsafe extern "system" fn(device: *mut c_void, extension: *const RgEventExtension)>;

pub type RgD3D9PresentExFn = Option<
    unsafe extern "system" fn(
        device: *mut c_void,
        source_rect: *const c_void,
        dest_rect: *const c_void,
        dest_window: *mut c_void,
        dirty_region: *const c_void,
        flags: u32,
        extension: *const RgEventExtension,
    ),
>;

pub type RgD3D9ResetExFn = Option<
    unsafe extern "system" fn(
        device: *mut c_void,
        presentation_parameters: *mut c_void,
        fullscreen_display_mode: *mut c_void,
        extension: *const RgEventExtension,
    ),
>;

/// Direct3D 9 / 9Ex device callbacks
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RgD3D9Callbacks {
    pub pre_present: RgD3D9PresentFn,
    pub post_present: RgD3D9PresentFn,
    pub pre_reset: RgD3D9ResetFn,
    pub post_reset: RgD3D9ResetFn,
    pub pre_end_scene: RgD3D9EndSceneFn,
    pub post_end_scene: RgD3D9EndSceneFn,
    pub pre_present_ex: RgD3D9PresentExFn,
    pub post_present_ex: RgD3D9PresentExFn,
    pub pre_reset_ex: RgD3D9ResetExFn,
    pub post_reset_ex: RgD3D9ResetExFn,
}

// ============================================================================
// DXGI swap chain (Direct3D 10, 11 and 12)
// ============================================================================

pub type RgDxgiPresentFn = Option<
    unsafe extern "system" fn(
        swap_chain: *mut c_void,
        sync_interval: u32,
        flags: u32,
        extension: *const RgEventExtension,
    ),
>;

pub type RgDxgiResizeTargetFn = Option<
    unsafe extern "system" fn(
        swap_chain: *mut c_void,
        new_target_parameters: *const c_void,
        extension: *const RgEventExtension,
    ),
>;

pub type RgDxgiResizeBuffersFn = Option<
    unsafe extern "system" fn(
        swap_chain: *mut c_void,
        buffer_count: u32,
        width: u32,
        height: u32,
        new_format: u32,
        swap_chain_flags: u32,
        extension: *const RgEventExtension,
    ),
>;

/// Swap chain callbacks, registered separately for Direct3D 10, 11 and 12
///
/// `Present1` and `ResizeBuffers1` calls are reported through the
/// `present` and `resize_buffers` entries.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RgDxgiCallbacks {
    pub pre_present: RgDxgiPresentFn,
    pub post_present: RgDxgiPresentFn,
    pub pre_resize_target: RgDxgiResizeTargetFn,
    pub post_resize_target: RgDxgiResizeTargetFn,
    pub pre_resize_buffers: RgDxgiResizeBuffersFn,
    pub post_resize_buffers: RgDxgiResizeBuffersFn,
}

// ============================================================================
// Core Audio render client
// ============================================================================

pub type RgAudioGetBufferFn = Option<
    unsafe extern "system" fn(
        client: *mut c_void,
        frames_requested: u32,
        data: *mut *mut u8,
        extension: *const RgEventExtension,
    ),
>;

pub type RgAudioReleaseBufferFn = Option<
    unsafe extern "system" fn(
        client: *mut c_void,
        frames_written: u32,
        flags: u32,
        extension: *const RgEventExtension,
    ),
>;

/// Core Audio `IAudioRenderClient` callbacks
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RgCoreAudioCallbacks {
    pub pre_get_buffer: RgAudioGetBufferFn,
    pub post_get_buffer: RgAudioGetBufferFn,
    pub pre_release_buffer: RgAudioReleaseBufferFn,
    pub post_release_buffer: RgAudioReleaseBufferFn,
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Invoked once when a render API has been identified
pub type RgGameHookedFn =
    Option<unsafe extern "system" fn(engine: *mut RgEngine, version: RgDirect3DVersion)>;

/// Invoked before and after the worker removes its hooks
pub type RgGameUnhookedFn = Option<unsafe extern "system" fn(engine: *mut RgEngine)>;

/// Invoked when host process shutdown is detected
pub type RgGameExitFn = Option<unsafe extern "system" fn(engine: *mut RgEngine)>;

/// Invoked from the fault path before a dump is written
///
/// Returning zero skips the dump file.
pub type RgCrashHandlerFn = Option<
    unsafe extern "system" fn(
        engine: *mut RgEngine,
        exception_code: u32,
        exception_info: *mut c_void,
    ) -> i32,
>;
