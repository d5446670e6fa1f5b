//! Conversion of the C configuration record
//!
//! C callbacks are wrapped in closures so the core only ever sees
//! [`EngineConfig`].

use std::ffi::{c_char, c_void, CStr};
use std::sync::Arc;

use rendergate_core::config::{Direct3DConfig, EngineConfig};
use rendergate_core::crash::FaultReport;
use rendergate_core::engine::SubsystemKind;
use rendergate_core::EngineSession;
use rendergate_sdk::{RgEngine, RgEngineConfig};

/// Owned copy of a nullable C string
///
/// # Safety
/// `raw` must be null or point to a NUL-terminated string.
pub unsafe fn c_string(raw: *const c_char) -> Option<String> {
    if raw.is_null() {
        return None;
    }
    let value = CStr::from_ptr(raw).to_string_lossy().into_owned();
    (!value.is_empty()).then_some(value)
}

/// Build the engine configuration described by `raw`
///
/// # Safety
/// String fields must be null or NUL-terminated, and callbacks must stay
/// callable for the session's lifetime.
pub unsafe fn engine_config(raw: &RgEngineConfig) -> EngineConfig {
    let mut config = EngineConfig::default();

    config.direct3d = Direct3DConfig {
        hook_direct3d9: raw.direct3d.hook_direct3d9,
        hook_direct3d10: raw.direct3d.hook_direct3d10,
        hook_direct3d11: raw.direct3d.hook_direct3d11,
        hook_direct3d12: raw.direct3d.hook_direct3d12,
    };
    config.core_audio.hook_core_audio = raw.core_audio.hook_core_audio;

    config.logging.enabled = raw.logging.is_enabled;
    if let Some(path) = c_string(raw.logging.file_path) {
        config.logging.file_path = path;
    }

    let crash = &raw.crash_handler;
    config.crash_handler.enabled = crash.is_enabled;
    config.crash_handler.dump_directory = c_string(crash.dump_directory_path);
    config.crash_handler.dump_type = crash.dump_type.into();
    if let Some(handler) = crash.evt_crash_handler {
        config.crash_handler.on_fault = Some(Arc::new(move |report: &FaultReport| unsafe {
            handler(
                report.engine as *mut RgEngine,
                report.code,
                report.exception_pointers as *mut c_void,
            ) != 0
        }));
    }

    let events = &mut config.events;
    if let Some(hooked) = raw.evt_game_hooked {
        events.on_hooked = Some(Arc::new(move |session: &EngineSession, kind: SubsystemKind| unsafe {
            hooked(session.handle(), kind.to_version_raw())
        }));
    }
    if let Some(pre_unhook) = raw.evt_game_pre_unhook {
        events.pre_unhook = Some(Arc::new(move |session: &EngineSession| unsafe {
            pre_unhook(session.handle())
        }));
    }
    if let Some(post_unhook) = raw.evt_game_post_unhook {
        events.post_unhook = Some(Arc::new(move |session: &EngineSession| unsafe {
            post_unhook(session.handle())
        }));
    }
    if let Some(pre_exit) = raw.evt_game_pre_exit {
        events.pre_exit = Some(Arc::new(move |session: &EngineSession| unsafe {
            pre_exit(session.handle())
        }));
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendergate_core::config::DumpType;
    use rendergate_sdk::RgDumpType;

    unsafe extern "system" fn exit(_: *mut RgEngine) {}

    #[test]
    fn test_default_record_matches_default_config() {
        let config = unsafe { engine_config(&RgEngineConfig::default()) };
        let expected = EngineConfig::default();
        assert_eq!(config.logging, expected.logging);
        assert!(config.enabled_kinds().is_empty());
        assert!(!config.crash_handler.enabled);
        assert!(config.crash_handler.dump_directory.is_none());
        assert!(config.events.pre_exit.is_none());
    }

    #[test]
    fn test_fields_and_callbacks_carry_over() {
        let mut raw = RgEngineConfig::default();
        raw.direct3d.hook_direct3d11 = true;
        raw.core_audio.hook_core_audio = true;
        raw.logging.is_enabled = false;
        raw.crash_handler.is_enabled = true;
        raw.crash_handler.dump_directory_path = b"C:/dumps\0".as_ptr() as *const c_char;
        raw.crash_handler.dump_type = RgDumpType::Full;
        raw.evt_game_pre_exit = Some(exit);

        let config = unsafe { engine_config(&raw) };
        assert_eq!(
            config.enabled_kinds(),
            vec![SubsystemKind::Direct3D11, SubsystemKind::CoreAudio]
        );
        assert!(!config.logging.enabled);
        assert_eq!(config.crash_handler.dump_directory.as_deref(), Some("C:/dumps"));
        assert_eq!(config.crash_handler.dump_type, DumpType::Full);
        assert!(config.events.pre_exit.is_some());
        assert!(config.events.on_hooked.is_none());
    }

    #[test]
    fn test_empty_string_is_none() {
        assert!(unsafe { c_string(b"\0".as_ptr() as *const c_char) }.is_none());
        assert!(unsafe { c_string(std::ptr::null()) }.is_none());
    }
}
