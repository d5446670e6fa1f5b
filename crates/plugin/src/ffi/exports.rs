//! C-compatible exports
//!
//! Every export that runs engine code is wrapped in `catch_unwind`, so a
//! panic is reported as an error value and never unwinds into the host.

use std::ffi::{c_char, c_void, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use rendergate_core::engine::{HostModule, SubsystemKind};
use rendergate_core::logging::{self, HostLevel};
use rendergate_core::session::CallbackSlot;
use rendergate_core::{AttachOptions, EngineError, EngineSession};
use rendergate_sdk::{
    RgCodePatcher, RgCoreAudioCallbacks, RgD3D9Callbacks, RgDxgiCallbacks, RgEngine,
    RgEngineConfig, RgError, RgTargetCatalog,
};

use super::config::engine_config;
use super::{CatalogAdapter, PatcherAdapter};

/// Run `f`, mapping a panic to `fallback`
fn guarded<R>(fallback: R, f: impl FnOnce() -> R) -> R {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            tracing::error!("Panic caught at the C boundary");
            fallback
        }
    }
}

fn code(result: Result<(), EngineError>) -> RgError {
    match result {
        Ok(()) => RgError::None,
        Err(e) => {
            tracing::error!("{}", e);
            e.code()
        }
    }
}

/// Fill `config` with the default configuration
///
/// # Safety
/// - `config` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn rg_engine_config_init(config: *mut RgEngineConfig) {
    if !config.is_null() {
        config.write(RgEngineConfig::default());
    }
}

/// Attach the engine on behalf of `host_instance`
///
/// `patcher` may be null to use the built-in dispatch-table slot patcher.
///
/// # Safety
/// - `host_instance` must be the handle of the calling module
/// - `config` and `catalog` must be valid; `patcher` must be valid or null
/// - `engine` must be valid for writes
/// - Callbacks and vtables must stay callable until `rg_engine_destroy` returns
#[no_mangle]
#[instrument(skip_all)]
pub unsafe extern "C" fn rg_engine_create(
    host_instance: *mut c_void,
    config: *const RgEngineConfig,
    catalog: *const RgTargetCatalog,
    patcher: *const RgCodePatcher,
    engine: *mut *mut RgEngine,
) -> RgError {
    guarded(RgError::EngineAllocationFailed, || {
        let Some(host) = HostModule::from_raw(host_instance) else {
            return RgError::InvalidHmoduleHandle;
        };
        if config.is_null() || catalog.is_null() || engine.is_null() {
            return RgError::EngineAllocationFailed;
        }

        let mut options = AttachOptions::new(Arc::new(CatalogAdapter::new(*catalog)))
            .with_config(engine_config(&*config));
        if !patcher.is_null() {
            match PatcherAdapter::new(*patcher) {
                Some(adapter) => options = options.with_patcher(Arc::new(adapter)),
                None => return RgError::EngineAllocationFailed,
            }
        }

        match EngineSession::create(host, options) {
            Ok(session) => {
                *engine = session.handle();
                RgError::None
            }
            Err(e) => {
                *engine = std::ptr::null_mut();
                code(Err(e))
            }
        }
    })
}

/// Detach the engine created for `host_instance`
///
/// Meant for module detach; safe to call after a shutdown trigger already ran.
///
/// # Safety
/// - `host_instance` must be the handle passed to `rg_engine_create`
#[no_mangle]
#[instrument(skip_all)]
pub unsafe extern "C" fn rg_engine_destroy(host_instance: *mut c_void) -> RgError {
    guarded(RgError::InvalidHmoduleHandle, || {
        let Some(host) = HostModule::from_raw(host_instance) else {
            return RgError::InvalidHmoduleHandle;
        };
        code(EngineSession::destroy(host))
    })
}

/// Block until hooks are installed or `timeout_ms` elapses
#[no_mangle]
pub extern "C" fn rg_engine_wait_ready(engine: *mut RgEngine, timeout_ms: u32) -> bool {
    guarded(false, || {
        EngineSession::from_handle(engine)
            .is_some_and(|s| s.wait_ready(Duration::from_millis(u64::from(timeout_ms))))
    })
}

/// Allocate a zeroed custom context of `size` bytes, replacing any previous one
///
/// # Safety
/// - `context` must be valid for writes
#[no_mangle]
pub unsafe extern "C" fn rg_engine_alloc_custom_context(
    engine: *mut RgEngine,
    context: *mut *mut c_void,
    size: usize,
) -> RgError {
    guarded(RgError::ContextAllocationFailed, || {
        let Some(session) = EngineSession::from_handle(engine) else {
            return RgError::InvalidEngineHandle;
        };
        match session.alloc_context(size) {
            Ok(block) => {
                if !context.is_null() {
                    *context = block;
                }
                RgError::None
            }
            Err(e) => code(Err(e)),
        }
    })
}

#[no_mangle]
pub extern "C" fn rg_engine_free_custom_context(engine: *mut RgEngine) -> RgError {
    guarded(RgError::InvalidEngineHandle, || {
        let Some(session) = EngineSession::from_handle(engine) else {
            return RgError::InvalidEngineHandle;
        };
        session.free_context();
        RgError::None
    })
}

/// Current custom context, or null
#[no_mangle]
pub extern "C" fn rg_engine_get_custom_context(engine: *mut RgEngine) -> *mut c_void {
    guarded(std::ptr::null_mut(), || {
        EngineSession::from_handle(engine).map_or(std::ptr::null_mut(), |s| s.context())
    })
}

unsafe fn set_callbacks<T: Copy>(
    engine: *mut RgEngine,
    callbacks: *const T,
    slot: impl FnOnce(&EngineSession) -> Option<&CallbackSlot<T>>,
) -> RgError {
    guarded(RgError::InvalidEngineHandle, || {
        let Some(session) = EngineSession::from_handle(engine) else {
            return RgError::InvalidEngineHandle;
        };
        if let Some(slot) = slot(session.as_ref()) {
            slot.set(callbacks.as_ref().copied());
        }
        RgError::None
    })
}

/// Register Direct3D 9 callbacks; null clears them
///
/// # Safety
/// - `callbacks` must be valid or null
#[no_mangle]
pub unsafe extern "C" fn rg_engine_set_d3d9_callbacks(
    engine: *mut RgEngine,
    callbacks: *const RgD3D9Callbacks,
) -> RgError {
    set_callbacks(engine, callbacks, |s| Some(&s.callbacks().d3d9))
}

/// # Safety
/// - `callbacks` must be valid or null
#[no_mangle]
pub unsafe extern "C" fn rg_engine_set_d3d10_callbacks(
    engine: *mut RgEngine,
    callbacks: *const RgDxgiCallbacks,
) -> RgError {
    set_callbacks(engine, callbacks, |s| s.callbacks().dxgi(SubsystemKind::Direct3D10))
}

/// # Safety
/// - `callbacks` must be valid or null
#[no_mangle]
pub unsafe extern "C" fn rg_engine_set_d3d11_callbacks(
    engine: *mut RgEngine,
    callbacks: *const RgDxgiCallbacks,
) -> RgError {
    set_callbacks(engine, callbacks, |s| s.callbacks().dxgi(SubsystemKind::Direct3D11))
}

/// # Safety
/// - `callbacks` must be valid or null
#[no_mangle]
pub unsafe extern "C" fn rg_engine_set_d3d12_callbacks(
    engine: *mut RgEngine,
    callbacks: *const RgDxgiCallbacks,
) -> RgError {
    set_callbacks(engine, callbacks, |s| s.callbacks().dxgi(SubsystemKind::Direct3D12))
}

/// # Safety
/// - `callbacks` must be valid or null
#[no_mangle]
pub unsafe extern "C" fn rg_engine_set_core_audio_callbacks(
    engine: *mut RgEngine,
    callbacks: *const RgCoreAudioCallbacks,
) -> RgError {
    set_callbacks(engine, callbacks, |s| Some(&s.callbacks().core_audio))
}

/// Direct3D 12 command queue that presents to `swap_chain`, or null
///
/// # Safety
/// - `swap_chain` must be a live swap chain or null
/// - A non-null result carries a reference owned by the caller, who must
///   `Release` it when done
#[no_mangle]
pub unsafe extern "C" fn rg_engine_get_command_queue(
    engine: *mut RgEngine,
    swap_chain: *mut c_void,
) -> *mut c_void {
    guarded(std::ptr::null_mut(), || {
        EngineSession::from_handle(engine)
            .map_or(std::ptr::null_mut(), |s| s.command_queue_for(swap_chain))
    })
}

/// Engine whose Direct3D 9 hooks first presented through `device`, or null
#[no_mangle]
pub extern "C" fn rg_engine_get_handle_from_d3d9_device(device: *mut c_void) -> *mut RgEngine {
    guarded(std::ptr::null_mut(), || {
        EngineSession::from_d3d9_device(device).map_or(std::ptr::null_mut(), |s| s.handle())
    })
}

/// Engine whose Direct3D 9Ex hooks first presented through `device`, or null
#[no_mangle]
pub extern "C" fn rg_engine_get_handle_from_d3d9ex_device(device: *mut c_void) -> *mut RgEngine {
    guarded(std::ptr::null_mut(), || {
        EngineSession::from_d3d9ex_device(device).map_or(std::ptr::null_mut(), |s| s.handle())
    })
}

unsafe fn log(engine: *mut RgEngine, level: HostLevel, message: *const c_char) {
    if message.is_null() || EngineSession::from_handle(engine).is_none() {
        return;
    }
    let message = CStr::from_ptr(message).to_string_lossy();
    guarded((), || logging::host_message(level, &message));
}

/// # Safety
/// - `message` must be a NUL-terminated string or null
#[no_mangle]
pub unsafe extern "C" fn rg_log_debug(engine: *mut RgEngine, message: *const c_char) {
    log(engine, HostLevel::Debug, message)
}

/// # Safety
/// - `message` must be a NUL-terminated string or null
#[no_mangle]
pub unsafe extern "C" fn rg_log_info(engine: *mut RgEngine, message: *const c_char) {
    log(engine, HostLevel::Info, message)
}

/// # Safety
/// - `message` must be a NUL-terminated string or null
#[no_mangle]
pub unsafe extern "C" fn rg_log_warning(engine: *mut RgEngine, message: *const c_char) {
    log(engine, HostLevel::Warning, message)
}

/// # Safety
/// - `message` must be a NUL-terminated string or null
#[no_mangle]
pub unsafe extern "C" fn rg_log_error(engine: *mut RgEngine, message: *const c_char) {
    log(engine, HostLevel::Error, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_init_writes_defaults() {
        let mut raw = std::mem::MaybeUninit::<RgEngineConfig>::uninit();
        unsafe { rg_engine_config_init(raw.as_mut_ptr()) };
        let raw = unsafe { raw.assume_init() };
        assert!(raw.logging.is_enabled);
        assert!(!raw.crash_handler.is_enabled);
        assert!(!raw.direct3d.hook_direct3d12);
    }

    #[test]
    fn test_null_handles_are_rejected() {
        assert_eq!(
            unsafe { rg_engine_destroy(std::ptr::null_mut()) },
            RgError::InvalidHmoduleHandle
        );
        assert_eq!(
            rg_engine_free_custom_context(std::ptr::null_mut()),
            RgError::InvalidEngineHandle
        );
        assert!(rg_engine_get_custom_context(std::ptr::null_mut()).is_null());
        assert!(!rg_engine_wait_ready(std::ptr::null_mut(), 0));
        assert!(rg_engine_get_handle_from_d3d9_device(std::ptr::null_mut()).is_null());
        assert!(rg_engine_get_handle_from_d3d9ex_device(0x90 as *mut c_void).is_null());
    }

    #[test]
    fn test_create_rejects_null_config() {
        let mut engine = std::ptr::null_mut();
        let host = test_create_rejects_null_config as fn() as *mut c_void;
        let result = unsafe {
            rg_engine_create(
                host,
                std::ptr::null(),
                std::ptr::null(),
                std::ptr::null(),
                &mut engine,
            )
        };
        assert_eq!(result, RgError::EngineAllocationFailed);
    }

    #[test]
    fn test_guarded_catches_panic() {
        assert_eq!(guarded(7, || panic!("boom")), 7);
    }
}
