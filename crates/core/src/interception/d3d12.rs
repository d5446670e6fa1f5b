//! Direct3D 12 command queue capture
//!
//! Nothing here raises user callbacks. The hooks only feed the
//! swap chain to command queue lookup.

use std::ffi::c_void;

use rendergate_engine::{EntryPoint, EntryTable};

use super::dispatch::{Dispatch, E_FAIL};
use super::Installer;
use crate::static_hook;

/// `IDXGIFactory::CreateSwapChain`; the device argument is the queue on Direct3D 12
type CreateSwapChainFn =
    unsafe extern "system" fn(*mut c_void, *mut c_void, *mut c_void, *mut *mut c_void) -> i32;
/// `IDXGIFactory2::CreateSwapChainForHwnd`
type CreateSwapChainForHwndFn = unsafe extern "system" fn(
    *mut c_void,
    *mut c_void,
    *mut c_void,
    *const c_void,
    *const c_void,
    *mut c_void,
    *mut *mut c_void,
) -> i32;
/// `ID3D12CommandQueue::ExecuteCommandLists`
type ExecuteCommandListsFn = unsafe extern "system" fn(*mut c_void, u32, *const *mut c_void);

static_hook!(create_swap_chain: CreateSwapChainFn);
static_hook!(create_swap_chain_for_hwnd: CreateSwapChainForHwndFn);
static_hook!(execute_command_lists: ExecuteCommandListsFn);

pub(super) unsafe fn install(installer: &mut Installer<'_>, table: &EntryTable) {
    installer.attach(
        &CREATE_SWAP_CHAIN_HOOK,
        table,
        EntryPoint::CreateSwapChain,
        on_create_swap_chain as CreateSwapChainFn,
    );
    installer.attach(
        &CREATE_SWAP_CHAIN_FOR_HWND_HOOK,
        table,
        EntryPoint::CreateSwapChainForHwnd,
        on_create_swap_chain_for_hwnd as CreateSwapChainForHwndFn,
    );
    installer.attach(
        &EXECUTE_COMMAND_LISTS_HOOK,
        table,
        EntryPoint::ExecuteCommandLists,
        on_execute_command_lists as ExecuteCommandListsFn,
    );
}

unsafe fn record_creation(dispatch: &Dispatch, result: i32, queue: *mut c_void, out: *mut *mut c_void) {
    if result < 0 || out.is_null() {
        return;
    }
    if let Some(session) = dispatch.session() {
        session.queues().record_creation(session.catalog(), *out, queue);
    }
}

unsafe extern "system" fn on_create_swap_chain(
    factory: *mut c_void,
    device: *mut c_void,
    desc: *mut c_void,
    swap_chain: *mut *mut c_void,
) -> i32 {
    let dispatch = Dispatch::enter();
    let Some(original) = create_swap_chain_original() else {
        return E_FAIL;
    };
    let result = original(factory, device, desc, swap_chain);
    record_creation(&dispatch, result, device, swap_chain);
    result
}

unsafe extern "system" fn on_create_swap_chain_for_hwnd(
    factory: *mut c_void,
    device: *mut c_void,
    window: *mut c_void,
    desc: *const c_void,
    fullscreen_desc: *const c_void,
    restrict_to_output: *mut c_void,
    swap_chain: *mut *mut c_void,
) -> i32 {
    let dispatch = Dispatch::enter();
    let Some(original) = create_swap_chain_for_hwnd_original() else {
        return E_FAIL;
    };
    let result = original(
        factory,
        device,
        window,
        desc,
        fullscreen_desc,
        restrict_to_output,
        swap_chain,
    );
    record_creation(&dispatch, result, device, swap_chain);
    result
}

unsafe extern "system" fn on_execute_command_lists(
    queue: *mut c_void,
    count: u32,
    lists: *const *mut c_void,
) {
    let dispatch = Dispatch::enter();
    let Some(original) = execute_command_lists_original() else {
        return;
    };
    if let Some(session) = dispatch.session() {
        session.queues().record_submission(session.catalog(), queue);
    }
    original(queue, count, lists);
}
