//! DXGI swap chain hooks shared by Direct3D 10, 11 and 12
//!
//! Each distinct swap-chain table gets its own slot of hooks. A slot knows
//! which versions resolved to its table; the first call through it
//! identifies the version actually in use and every later call reuses it.

use std::ffi::c_void;
use std::sync::atomic::{AtomicU32, Ordering};

use rendergate_engine::{EntryPoint, EntryTable, TargetDescriptor, VersionSet};
use rendergate_sdk::{RgDxgiCallbacks, RgEventExtension};

use super::dispatch::{around, Dispatch, E_FAIL};
use super::Installer;
use crate::hooks::{identify, Hook, DXGI_VERSION};

/// Distinct swap-chain tables: one per Direct3D version at most
pub const SLOTS: usize = 3;

type PresentFn = unsafe extern "system" fn(*mut c_void, u32, u32) -> i32;
type ResizeTargetFn = unsafe extern "system" fn(*mut c_void, *const c_void) -> i32;
type ResizeBuffersFn = unsafe extern "system" fn(*mut c_void, u32, u32, u32, u32, u32) -> i32;
type Present1Fn = unsafe extern "system" fn(*mut c_void, u32, u32, *const c_void) -> i32;
type ResizeBuffers1Fn = unsafe extern "system" fn(
    *mut c_void,
    u32,
    u32,
    u32,
    u32,
    u32,
    *const u32,
    *const *mut c_void,
) -> i32;

static CANDIDATES: [AtomicU32; SLOTS] = [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)];

static PRESENT: [Hook<PresentFn>; SLOTS] = [
    Hook::new("IDXGISwapChain::Present#0"),
    Hook::new("IDXGISwapChain::Present#1"),
    Hook::new("IDXGISwapChain::Present#2"),
];
static RESIZE_TARGET: [Hook<ResizeTargetFn>; SLOTS] = [
    Hook::new("IDXGISwapChain::ResizeTarget#0"),
    Hook::new("IDXGISwapChain::ResizeTarget#1"),
    Hook::new("IDXGISwapChain::ResizeTarget#2"),
];
static RESIZE_BUFFERS: [Hook<ResizeBuffersFn>; SLOTS] = [
    Hook::new("IDXGISwapChain::ResizeBuffers#0"),
    Hook::new("IDXGISwapChain::ResizeBuffers#1"),
    Hook::new("IDXGISwapChain::ResizeBuffers#2"),
];
static PRESENT1: [Hook<Present1Fn>; SLOTS] = [
    Hook::new("IDXGISwapChain1::Present1#0"),
    Hook::new("IDXGISwapChain1::Present1#1"),
    Hook::new("IDXGISwapChain1::Present1#2"),
];
static RESIZE_BUFFERS1: [Hook<ResizeBuffers1Fn>; SLOTS] = [
    Hook::new("IDXGISwapChain3::ResizeBuffers1#0"),
    Hook::new("IDXGISwapChain3::ResizeBuffers1#1"),
    Hook::new("IDXGISwapChain3::ResizeBuffers1#2"),
];

/// Hook one swap-chain table into `slot`
pub(super) unsafe fn install(installer: &mut Installer<'_>, slot: usize, descriptor: &TargetDescriptor) {
    let table = &descriptor.table;
    match slot {
        0 => install_slot::<0>(installer, descriptor.candidates, table),
        1 => install_slot::<1>(installer, descriptor.candidates, table),
        2 => install_slot::<2>(installer, descriptor.candidates, table),
        _ => tracing::warn!("No free swap chain slot for {}, skipping", descriptor.kind),
    }
}

unsafe fn install_slot<const SLOT: usize>(
    installer: &mut Installer<'_>,
    candidates: VersionSet,
    table: &EntryTable,
) {
    CANDIDATES[SLOT].store(candidates.bits(), Ordering::Release);
    tracing::debug!("Swap chain slot {} serves {:?}", SLOT, candidates);

    installer.attach(&PRESENT[SLOT], table, EntryPoint::Present, present::<SLOT> as PresentFn);
    installer.attach(
        &RESIZE_TARGET[SLOT],
        table,
        EntryPoint::ResizeTarget,
        resize_target::<SLOT> as ResizeTargetFn,
    );
    installer.attach(
        &RESIZE_BUFFERS[SLOT],
        table,
        EntryPoint::ResizeBuffers,
        resize_buffers::<SLOT> as ResizeBuffersFn,
    );
    installer.attach(
        &PRESENT1[SLOT],
        table,
        EntryPoint::Present1,
        present1::<SLOT> as Present1Fn,
    );
    installer.attach(
        &RESIZE_BUFFERS1[SLOT],
        table,
        EntryPoint::ResizeBuffers1,
        resize_buffers1::<SLOT> as ResizeBuffers1Fn,
    );
}

/// Identify the version behind `swap_chain` and fetch its callbacks
///
/// A slot serving a single version needs no capability probe.
unsafe fn active(
    dispatch: &Dispatch,
    slot: usize,
    swap_chain: *mut c_void,
) -> Option<(RgDxgiCallbacks, RgEventExtension)> {
    let session = dispatch.session()?;
    let candidates = VersionSet::from_bits_truncate(CANDIDATES[slot].load(Ordering::Acquire));
    let single = candidates.single().is_some();

    let kind = identify(
        &DXGI_VERSION,
        candidates,
        |kind| single || session.catalog().supports(swap_chain, kind),
        |kind| session.notify_hooked(kind),
    )?;
    let callbacks = session.callbacks().dxgi(kind)?.get()?;
    Some((callbacks, session.extension()))
}

unsafe extern "system" fn present<const SLOT: usize>(
    swap_chain: *mut c_void,
    sync_interval: u32,
    flags: u32,
) -> i32 {
    let dispatch = Dispatch::enter();
    let Some(original) = PRESENT[SLOT].original() else {
        return E_FAIL;
    };
    let active = active(&dispatch, SLOT, swap_chain);
    around!(
        active,
        pre_present,
        post_present,
        (swap_chain, sync_interval, flags),
        original(swap_chain, sync_interval, flags)
    )
}

unsafe extern "system" fn resize_target<const SLOT: usize>(
    swap_chain: *mut c_void,
    parameters: *const c_void,
) -> i32 {
    let dispatch = Dispatch::enter();
    let Some(original) = RESIZE_TARGET[SLOT].original() else {
        return E_FAIL;
    };
    let active = active(&dispatch, SLOT, swap_chain);
    around!(
        active,
        pre_resize_target,
        post_resize_target,
        (swap_chain, parameters),
        original(swap_chain, parameters)
    )
}

unsafe extern "system" fn resize_buffers<const SLOT: usize>(
    swap_chain: *mut c_void,
    buffer_count: u32,
    width: u32,
    height: u32,
    format: u32,
    flags: u32,
) -> i32 {
    let dispatch = Dispatch::enter();
    let Some(original) = RESIZE_BUFFERS[SLOT].original() else {
        return E_FAIL;
    };
    let active = active(&dispatch, SLOT, swap_chain);
    around!(
        active,
        pre_resize_buffers,
        post_resize_buffers,
        (swap_chain, buffer_count, width, height, format, flags),
        original(swap_chain, buffer_count, width, height, format, flags)
    )
}

/// Reported through the `present` callbacks
unsafe extern "system" fn present1<const SLOT: usize>(
    swap_chain: *mut c_void,
    sync_interval: u32,
    flags: u32,
    parameters: *const c_void,
) -> i32 {
    let dispatch = Dispatch::enter();
    let Some(original) = PRESENT1[SLOT].original() else {
        return E_FAIL;
    };
    let active = active(&dispatch, SLOT, swap_chain);
    around!(
        active,
        pre_present,
        post_present,
        (swap_chain, sync_interval, flags),
        original(swap_chain, sync_interval, flags, parameters)
    )
}

/// Reported through the `resize_buffers` callbacks
#[allow(clippy::too_many_arguments)]
unsafe extern "system" fn resize_buffers1<const SLOT: usize>(
    swap_chain: *mut c_void,
    buffer_count: u32,
    width: u32,
    height: u32,
    format: u32,
    flags: u32,
    node_masks: *const u32,
    queues: *const *mut c_void,
) -> i32 {
    let dispatch = Dispatch::enter();
    let Some(original) = RESIZE_BUFFERS1[SLOT].original() else {
        return E_FAIL;
    };
    let active = active(&dispatch, SLOT, swap_chain);
    around!(
        active,
        pre_resize_buffers,
        post_resize_buffers,
        (swap_chain, buffer_count, width, height, format, flags),
        original(swap_chain, buffer_count, width, height, format, flags, node_masks, queues)
    )
}
