//! Direct3D 9 / 9Ex device hooks

use std::ffi::c_void;

use rendergate_engine::{EntryPoint, EntryTable, VersionSet};
use rendergate_sdk::{RgD3D9Callbacks, RgEventExtension};

use super::dispatch::{around, Dispatch, E_FAIL};
use super::Installer;
use crate::hooks::{identify, DIRECT3D9_VERSION};
use crate::static_hook;

type PresentFn = unsafe extern "system" fn(
    *mut c_void,
    *const c_void,
    *const c_void,
    *mut c_void,
    *const c_void,
) -> i32;
type ResetFn = unsafe extern "system" fn(*mut c_void, *mut c_void) -> i32;
type EndSceneFn = unsafe extern "system" fn(*mut c_void) -> i32;
type PresentExFn = unsafe extern "system" fn(
    *mut c_void,
    *const c_void,
    *const c_void,
    *mut c_void,
    *const c_void,
    u32,
) -> i32;
type ResetExFn = unsafe extern "system" fn(*mut c_void, *mut c_void, *mut c_void) -> i32;

static_hook!(d3d9_present: PresentFn);
static_hook!(d3d9_reset: ResetFn);
static_hook!(d3d9_end_scene: EndSceneFn);
static_hook!(d3d9_present_ex: PresentExFn);
static_hook!(d3d9_reset_ex: ResetExFn);

pub(super) unsafe fn install(installer: &mut Installer<'_>, table: &EntryTable) {
    installer.attach(&D3D9_PRESENT_HOOK, table, EntryPoint::Present, present as PresentFn);
    installer.attach(&D3D9_RESET_HOOK, table, EntryPoint::Reset, reset as ResetFn);
    installer.attach(&D3D9_END_SCENE_HOOK, table, EntryPoint::EndScene, end_scene as EndSceneFn);
    installer.attach(
        &D3D9_PRESENT_EX_HOOK,
        table,
        EntryPoint::PresentEx,
        present_ex as PresentExFn,
    );
    installer.attach(&D3D9_RESET_EX_HOOK, table, EntryPoint::ResetEx, reset_ex as ResetExFn);
}

/// Direct3D 9 has a single version, so identification never probes
fn active(dispatch: &Dispatch) -> Option<(RgD3D9Callbacks, RgEventExtension)> {
    let session = dispatch.session()?;
    identify(
        &DIRECT3D9_VERSION,
        VersionSet::DIRECT3D9,
        |_| true,
        |kind| session.notify_hooked(kind),
    )?;
    Some((session.callbacks().d3d9.get()?, session.extension()))
}

unsafe extern "system" fn present(
    device: *mut c_void,
    source: *const c_void,
    dest: *const c_void,
    window: *mut c_void,
    dirty: *const c_void,
) -> i32 {
    let dispatch = Dispatch::enter();
    let Some(original) = d3d9_present_original() else {
        return E_FAIL;
    };
    if let Some(session) = dispatch.session() {
        session.record_d3d9_device(device);
    }
    let active = active(&dispatch);
    around!(
        active,
        pre_present,
        post_present,
        (device, source, dest, window, dirty),
        original(device, source, dest, window, dirty)
    )
}

unsafe extern "system" fn reset(device: *mut c_void, parameters: *mut c_void) -> i32 {
    let dispatch = Dispatch::enter();
    let Some(original) = d3d9_reset_original() else {
        return E_FAIL;
    };
    let active = active(&dispatch);
    around!(
        active,
        pre_reset,
        post_reset,
        (device, parameters),
        original(device, parameters)
    )
}

unsafe extern "system" fn end_scene(device: *mut c_void) -> i32 {
    let dispatch = Dispatch::enter();
    let Some(original) = d3d9_end_scene_original() else {
        return E_FAIL;
    };
    let active = active(&dispatch);
    around!(active, pre_end_scene, post_end_scene, (device), original(device))
}

unsafe extern "system" fn present_ex(
    device: *mut c_void,
    source: *const c_void,
    dest: *const c_void,
    window: *mut c_void,
    dirty: *const c_void,
    flags: u32,
) -> i32 {
    let dispatch = Dispatch::enter();
    let Some(original) = d3d9_present_ex_original() else {
        return E_FAIL;
    };
    if let Some(session) = dispatch.session() {
        session.record_d3d9ex_device(device);
    }
    let active = active(&dispatch);
    around!(
        active,
        pre_present_ex,
        post_present_ex,
        (device, source, dest, window, dirty, flags),
        original(device, source, dest, window, dirty, flags)
    )
}

unsafe extern "system" fn reset_ex(
    device: *mut c_void,
    parameters: *mut c_void,
    display_mode: *mut c_void,
) -> i32 {
    let dispatch = Dispatch::enter();
    let Some(original) = d3d9_reset_ex_original() else {
        return E_FAIL;
    };
    let active = active(&dispatch);
    around!(
        active,
        pre_reset_ex,
        post_reset_ex,
        (device, parameters, display_mode),
        original(device, parameters, display_mode)
    )
}
