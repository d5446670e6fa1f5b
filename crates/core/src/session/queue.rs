//! Swap chain to command queue lookup
//!
//! Direct3D 12 swap chains are created from a command queue, but the swap
//! chain does not expose it. Two maps recover it:
//! - early: swap chain -> queue, filled when the swap chain is created
//! - late: device -> queue, filled by observing command-list submissions,
//!   for swap chains created before the engine attached
//!
//! Swap chain destruction is not observed, so the early map is bounded: past
//! [`EARLY_CAPACITY`] entries the oldest one is evicted and its queue
//! released. An evicted swap chain falls back to the late map.

use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use rendergate_engine::TargetCatalog;

/// Swap chains remembered by the early map
pub const EARLY_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy)]
struct Created {
    queue: usize,
    sequence: u64,
}

/// Both lookup tiers; every stored queue holds one retained reference
#[derive(Default)]
pub struct QueueMaps {
    early: DashMap<usize, Created>,
    late: DashMap<usize, usize>,
    sequence: AtomicU64,
}

impl QueueMaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the queue a swap chain was created from
    ///
    /// # Safety
    /// `swap_chain` and `queue` must be live interfaces known to `catalog`.
    pub unsafe fn record_creation(
        &self,
        catalog: &dyn TargetCatalog,
        swap_chain: *mut c_void,
        queue: *mut c_void,
    ) {
        if swap_chain.is_null() || queue.is_null() || !catalog.is_command_queue(queue) {
            return;
        }
        catalog.retain(queue);
        let created = Created {
            queue: queue as usize,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        if let Some(previous) = self.early.insert(swap_chain as usize, created) {
            catalog.release(previous.queue as *mut c_void);
        }
        tracing::debug!("Swap chain {:p} created on queue {:p}", swap_chain, queue);
        self.evict_oldest(catalog);
    }

    unsafe fn evict_oldest(&self, catalog: &dyn TargetCatalog) {
        while self.early.len() > EARLY_CAPACITY {
            let oldest = self
                .early
                .iter()
                .min_by_key(|entry| entry.value().sequence)
                .map(|entry| *entry.key());
            let Some(swap_chain) = oldest else {
                return;
            };
            if let Some((_, evicted)) = self.early.remove(&swap_chain) {
                catalog.release(evicted.queue as *mut c_void);
                tracing::debug!("Forgot queue of swap chain {:#x}", swap_chain);
            }
        }
    }

    /// Record the queue a submission went to, keyed by its device
    ///
    /// # Safety
    /// `queue` must be a live command queue known to `catalog`.
    pub unsafe fn record_submission(&self, catalog: &dyn TargetCatalog, queue: *mut c_void) {
        if queue.is_null() {
            return;
        }
        let device = catalog.device_of(queue);
        if device.is_null() {
            return;
        }
        if self.late.get(&(device as usize)).is_some_and(|q| *q == queue as usize) {
            return;
        }
        catalog.retain(queue);
        if let Some(previous) = self.late.insert(device as usize, queue as usize) {
            catalog.release(previous as *mut c_void);
        }
        tracing::debug!("Device {:p} submits on queue {:p}", device, queue);
    }

    /// Queue for `swap_chain`, or null
    ///
    /// A returned queue carries a new reference that the caller must release.
    /// It is taken while the entry is locked, so a concurrent
    /// [`release_all`](Self::release_all) cannot free it first.
    ///
    /// # Safety
    /// `swap_chain` must be a live swap chain known to `catalog`.
    pub unsafe fn command_queue_for(
        &self,
        catalog: &dyn TargetCatalog,
        swap_chain: *mut c_void,
    ) -> *mut c_void {
        if swap_chain.is_null() {
            return std::ptr::null_mut();
        }
        if let Some(created) = self.early.get(&(swap_chain as usize)) {
            let queue = created.queue as *mut c_void;
            catalog.retain(queue);
            return queue;
        }
        let device = catalog.device_of(swap_chain);
        if device.is_null() {
            return std::ptr::null_mut();
        }
        match self.late.get(&(device as usize)) {
            Some(entry) => {
                let queue = *entry as *mut c_void;
                catalog.retain(queue);
                queue
            }
            None => std::ptr::null_mut(),
        }
    }

    /// Drop every stored reference
    ///
    /// # Safety
    /// Must be called with the same catalog that retained the queues.
    pub unsafe fn release_all(&self, catalog: &dyn TargetCatalog) {
        let mut released = 0;
        let keys: Vec<usize> = self.early.iter().map(|entry| *entry.key()).collect();
        for key in keys {
            if let Some((_, created)) = self.early.remove(&key) {
                catalog.release(created.queue as *mut c_void);
                released += 1;
            }
        }
        let keys: Vec<usize> = self.late.iter().map(|entry| *entry.key()).collect();
        for key in keys {
            if let Some((_, queue)) = self.late.remove(&key) {
                catalog.release(queue as *mut c_void);
                released += 1;
            }
        }
        if released > 0 {
            tracing::debug!("Released {} command queue reference(s)", released);
        }
    }

    pub fn len(&self) -> usize {
        self.early.len() + self.late.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
