//! Core Audio render client hooks
//!
//! Audio has one version and raises no "hooked" notification.

use std::ffi::c_void;

use rendergate_engine::{EntryPoint, EntryTable};
use rendergate_sdk::{RgCoreAudioCallbacks, RgEventExtension};

use super::dispatch::{around, Dispatch, E_FAIL};
use super::Installer;
use crate::static_hook;

/// `IAudioRenderClient::GetBuffer`
type GetBufferFn = unsafe extern "system" fn(*mut c_void, u32, *mut *mut u8) -> i32;
/// `IAudioRenderClient::ReleaseBuffer`
type ReleaseBufferFn = unsafe extern "system" fn(*mut c_void, u32, u32) -> i32;

static_hook!(audio_get_buffer: GetBufferFn);
static_hook!(audio_release_buffer: ReleaseBufferFn);

pub(super) unsafe fn install(installer: &mut Installer<'_>, table: &EntryTable) {
    installer.attach(
        &AUDIO_GET_BUFFER_HOOK,
        table,
        EntryPoint::GetBuffer,
        get_buffer as GetBufferFn,
    );
    installer.attach(
        &AUDIO_RELEASE_BUFFER_HOOK,
        table,
        EntryPoint::ReleaseBuffer,
        release_buffer as ReleaseBufferFn,
    );
}

fn active(dispatch: &Dispatch) -> Option<(RgCoreAudioCallbacks, RgEventExtension)> {
    let session = dispatch.session()?;
    Some((session.callbacks().core_audio.get()?, session.extension()))
}

unsafe extern "system" fn get_buffer(client: *mut c_void, frames: u32, data: *mut *mut u8) -> i32 {
    let dispatch = Dispatch::enter();
    let Some(original) = audio_get_buffer_original() else {
        return E_FAIL;
    };
    let active = active(&dispatch);
    around!(
        active,
        pre_get_buffer,
        post_get_buffer,
        (client, frames, data),
        original(client, frames, data)
    )
}

unsafe extern "system" fn release_buffer(client: *mut c_void, frames: u32, flags: u32) -> i32 {
    let dispatch = Dispatch::enter();
    let Some(original) = audio_release_buffer_original() else {
        return E_FAIL;
    };
    let active = active(&dispatch);
    around!(
        active,
        pre_release_buffer,
        post_release_buffer,
        (client, frames, flags),
        original(client, frames, flags)
    )
}
