//! C engine configuration record

use std::ffi::c_char;

use crate::{RgCrashHandlerFn, RgDumpType, RgGameExitFn, RgGameHookedFn, RgGameUnhookedFn};

/// Default fallback log path written by `rg_engine_config_init`
pub const RG_DEFAULT_LOG_PATH: &[u8] = b"%TEMP%/RenderGate.log\0";

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RgDirect3DConfig {
    pub hook_direct3d9: bool,
    pub hook_direct3d10: bool,
    pub hook_direct3d11: bool,
    pub hook_direct3d12: bool,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RgCoreAudioConfig {
    pub hook_core_audio: bool,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RgLoggingConfig {
    pub is_enabled: bool,
    /// Fallback log path used when the process and module directories fail
    pub file_path: *const c_char,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RgCrashHandlerConfig {
    pub is_enabled: bool,
    /// Dump directory, or null for the default fallback chain
    pub dump_directory_path: *const c_char,
    pub dump_type: RgDumpType,
    pub evt_crash_handler: RgCrashHandlerFn,
}

/// Engine configuration passed to `rg_engine_create`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RgEngineConfig {
    pub evt_game_hooked: RgGameHookedFn,
    pub evt_game_pre_unhook: RgGameUnhookedFn,
    pub evt_game_post_unhook: RgGameUnhookedFn,
    pub evt_game_pre_exit: RgGameExitFn,
    pub direct3d: RgDirect3DConfig,
    pub core_audio: RgCoreAudioConfig,
    pub logging: RgLoggingConfig,
    pub crash_handler: RgCrashHandlerConfig,
}

impl Default for RgEngineConfig {
    fn default() -> Self {
        Self {
            evt_game_hooked: None,
            evt_game_pre_unhook: None,
            evt_game_post_unhook: None,
            evt_game_pre_exit: None,
            direct3d: RgDirect3DConfig::default(),
            core_audio: RgCoreAudioConfig::default(),
            logging: RgLoggingConfig {
                is_enabled: true,
                file_path: RG_DEFAULT_LOG_PATH.as_ptr() as *const c_char,
            },
            crash_handler: RgCrashHandlerConfig {
                is_enabled: false,
                dump_directory_path: std::ptr::null(),
                dump_type: RgDumpType::Normal,
                evt_crash_handler: None,
            },
        }
    }
}
