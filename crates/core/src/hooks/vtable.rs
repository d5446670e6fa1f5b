//! Dispatch-table slot patcher
//!
//! Redirects a function by replacing the pointer stored in a vtable (or
//! import table) slot. A patch target is the slot address; the pre-patch
//! entry is simply the pointer the slot held.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::ThreadId;

use parking_lot::Mutex;

use super::patcher::{CodePatcher, PatchError};

const SLOT_SIZE: usize = std::mem::size_of::<usize>();

/// Queued slot replacement, validated at commit
#[derive(Debug, Clone, Copy)]
struct SlotWrite {
    slot: usize,
    expected: usize,
    value: usize,
}

#[derive(Debug)]
struct Pending {
    owner: ThreadId,
    threads: usize,
    writes: Vec<SlotWrite>,
}

/// [`CodePatcher`] for pointer-sized dispatch-table slots
///
/// Aligned pointer-sized stores are atomic, so no thread suspension is
/// needed. Commit compare-exchanges every slot against the value seen when
/// the write was queued and restores the already-written slots if any of
/// them changed in between.
#[derive(Debug, Default)]
pub struct SlotPatcher {
    pending: Mutex<Option<Pending>>,
}

impl SlotPatcher {
    pub const fn new() -> Self {
        Self {
            pending: parking_lot::const_mutex(None),
        }
    }

    fn with_owned<R>(
        &self,
        f: impl FnOnce(&mut Pending) -> Result<R, PatchError>,
    ) -> Result<R, PatchError> {
        let mut pending = self.pending.lock();
        match pending.as_mut() {
            Some(p) if p.owner == std::thread::current().id() => f(p),
            _ => Err(PatchError::TransactionConflict),
        }
    }

    fn validate(slot: usize) -> Result<(), PatchError> {
        if slot == 0 {
            return Err(PatchError::InvalidTarget(slot));
        }
        if slot % SLOT_SIZE != 0 {
            return Err(PatchError::TargetTooSmall);
        }
        region::query(slot as *const u8).map_err(|_| PatchError::InvalidTarget(slot))?;
        Ok(())
    }

    unsafe fn cell<'a>(slot: usize) -> &'a AtomicUsize {
        &*(slot as *const AtomicUsize)
    }

    fn queue(pending: &mut Pending, write: SlotWrite) -> Result<(), PatchError> {
        if pending.writes.iter().any(|w| w.slot == write.slot) {
            return Err(PatchError::AlreadyPatched);
        }
        pending
            .writes
            .try_reserve(1)
            .map_err(|_| PatchError::OutOfMemory)?;
        pending.writes.push(write);
        Ok(())
    }
}

impl CodePatcher for SlotPatcher {
    fn begin(&self) -> Result<(), PatchError> {
        let mut pending = self.pending.lock();
        if pending.is_some() {
            return Err(PatchError::TransactionConflict);
        }
        *pending = Some(Pending {
            owner: std::thread::current().id(),
            threads: 0,
            writes: Vec::new(),
        });
        Ok(())
    }

    fn update_thread(&self) -> Result<(), PatchError> {
        self.with_owned(|p| {
            p.threads += 1;
            Ok(())
        })
    }

    unsafe fn attach(&self, target: usize, detour: usize) -> Result<usize, PatchError> {
        Self::validate(target)?;
        self.with_owned(|p| {
            let current = Self::cell(target).load(Ordering::Acquire);
            if current == detour {
                return Err(PatchError::AlreadyPatched);
            }
            Self::queue(
                p,
                SlotWrite {
                    slot: target,
                    expected: current,
                    value: detour,
                },
            )?;
            tracing::trace!(
                "Queued slot attach {:#x}: {:#x} -> {:#x}",
                target,
                current,
                detour
            );
            Ok(current)
        })
    }

    unsafe fn detach(
        &self,
        target: usize,
        original: usize,
        detour: usize,
    ) -> Result<(), PatchError> {
        Self::validate(target)?;
        self.with_owned(|p| {
            Self::queue(
                p,
                SlotWrite {
                    slot: target,
                    expected: detour,
                    value: original,
                },
            )
        })
    }

    fn commit(&self) -> Result<(), PatchError> {
        let pending = {
            let mut guard = self.pending.lock();
            match guard.as_ref() {
                Some(p) if p.owner == std::thread::current().id() => guard.take(),
                _ => None,
            }
        };
        let Some(pending) = pending else {
            return Err(PatchError::TransactionConflict);
        };

        // Make every slot writable before touching any of them
        let mut protections = Vec::with_capacity(pending.writes.len());
        for write in &pending.writes {
            let guard = unsafe {
                region::protect_with_handle(
                    write.slot as *const u8,
                    SLOT_SIZE,
                    region::Protection::READ_WRITE,
                )
            }
            .map_err(|e| PatchError::Unknown(format!("protect {:#x}: {}", write.slot, e)));
            match guard {
                Ok(guard) => protections.push(guard),
                Err(e) => {
                    while let Some(guard) = protections.pop() {
                        drop(guard);
                    }
                    return Err(e);
                }
            }
        }

        let mut result = Ok(());
        for (i, write) in pending.writes.iter().enumerate() {
            let cell = unsafe { Self::cell(write.slot) };
            if cell
                .compare_exchange(write.expected, write.value, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                tracing::warn!("Slot {:#x} changed before commit, rolling back", write.slot);
                for done in pending.writes[..i].iter().rev() {
                    unsafe { Self::cell(done.slot) }.store(done.expected, Ordering::Release);
                }
                result = Err(PatchError::TransactionConflict);
                break;
            }
        }

        // Restore protections in reverse so shared pages end up as they started
        while let Some(guard) = protections.pop() {
            drop(guard);
        }

        if result.is_ok() {
            tracing::trace!(
                "Committed {} slot writes ({} threads recorded)",
                pending.writes.len(),
                pending.threads
            );
        }
        result
    }

    fn abort(&self) {
        let mut pending = self.pending.lock();
        if matches!(pending.as_ref(), Some(p) if p.owner == std::thread::current().id()) {
            *pending = None;
        }
    }
}
