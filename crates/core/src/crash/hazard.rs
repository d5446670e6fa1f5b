//! Lock-free published value with reader accounting
//!
//! Readers register in the current epoch around each access and never
//! block. Writers swap the pointer, flip the epoch and wait, bounded, for the
//! previous epoch's readers to leave before freeing the old value. Readers
//! arriving after the flip register in the new epoch, so a steady stream of
//! readers cannot starve a writer. If old readers do not leave in time the
//! old value is leaked instead of freed, so a reader can never see freed
//! memory.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const RETIRE_TIMEOUT: Duration = Duration::from_secs(1);

pub struct HazardCell<T> {
    value: AtomicPtr<T>,
    epoch: AtomicUsize,
    readers: [AtomicUsize; 2],
    writer: Mutex<()>,
}

impl<T> HazardCell<T> {
    pub const fn new() -> Self {
        Self {
            value: AtomicPtr::new(ptr::null_mut()),
            epoch: AtomicUsize::new(0),
            readers: [AtomicUsize::new(0), AtomicUsize::new(0)],
            writer: parking_lot::const_mutex(()),
        }
    }

    /// Run `f` on the current value without blocking
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let epoch = loop {
            let epoch = self.epoch.load(Ordering::SeqCst);
            self.readers[epoch].fetch_add(1, Ordering::SeqCst);
            if self.epoch.load(Ordering::SeqCst) == epoch {
                break epoch;
            }
            self.readers[epoch].fetch_sub(1, Ordering::SeqCst);
        };
        let _reader = Reader(&self.readers[epoch]);
        let value = self.value.load(Ordering::SeqCst);
        // SAFETY: a value is only freed once its epoch has no readers
        unsafe { value.as_ref() }.map(f)
    }

    pub fn is_set(&self) -> bool {
        !self.value.load(Ordering::SeqCst).is_null()
    }

    /// Replace the value; the previous one is retired
    pub fn publish(&self, value: Option<Box<T>>) {
        let _writer = self.writer.lock();
        let new = value.map_or(ptr::null_mut(), Box::into_raw);
        let old = self.value.swap(new, Ordering::SeqCst);
        let previous = self.epoch.load(Ordering::SeqCst);
        self.epoch.store(previous ^ 1, Ordering::SeqCst);
        self.retire(old, previous);
    }

    pub fn clear(&self) {
        self.publish(None);
    }

    fn retire(&self, old: *mut T, epoch: usize) {
        let deadline = Instant::now() + RETIRE_TIMEOUT;
        // Drain even for a null value so the next writer finds this epoch empty
        while self.readers[epoch].load(Ordering::SeqCst) != 0 {
            if Instant::now() >= deadline {
                tracing::warn!("Readers still active after {:?}, leaking retired value", RETIRE_TIMEOUT);
                return;
            }
            std::thread::yield_now();
        }
        if !old.is_null() {
            // SAFETY: unpublished and no reader can still hold it
            drop(unsafe { Box::from_raw(old) });
        }
    }
}

/// Leaves the reader's epoch, also when the read unwinds
struct Reader<'a>(&'a AtomicUsize);

impl Drop for Reader<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T> Default for HazardCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for HazardCell<T> {
    fn drop(&mut self) {
        let value = *self.value.get_mut();
        if !value.is_null() {
            // SAFETY: exclusive access
            drop(unsafe { Box::from_raw(value) });
        }
    }
}

// SAFETY: the cell hands out shared references only; T is dropped on whichever
// thread retires it
unsafe impl<T: Send + Sync> Send for HazardCell<T> {}
unsafe impl<T: Send + Sync> Sync for HazardCell<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    struct Tracked(Arc<AtomicUsize>, u32);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_publish_read_clear() {
        let drops = Arc::new(AtomicUsize::new(0));
        let cell = HazardCell::new();
        assert_eq!(cell.read(|t: &Tracked| t.1), None);

        cell.publish(Some(Box::new(Tracked(drops.clone(), 7))));
        assert_eq!(cell.read(|t| t.1), Some(7));

        cell.publish(Some(Box::new(Tracked(drops.clone(), 8))));
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        cell.clear();
        assert!(!cell.is_set());
        assert_eq!(drops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_reader_does_not_block_retire() {
        let drops = Arc::new(AtomicUsize::new(0));
        let cell = HazardCell::new();
        cell.publish(Some(Box::new(Tracked(drops.clone(), 1))));

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            cell.read(|_: &Tracked| panic!("reader failed"))
        }));
        assert!(outcome.is_err());

        let started = Instant::now();
        cell.publish(Some(Box::new(Tracked(drops.clone(), 2))));
        assert!(started.elapsed() < RETIRE_TIMEOUT);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(cell.read(|t| t.1), Some(2));
    }

    #[test]
    fn test_readers_never_observe_freed_value() {
        let drops = Arc::new(AtomicUsize::new(0));
        let cell = Arc::new(HazardCell::new());
        let stop = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let (cell, stop) = (cell.clone(), stop.clone());
                std::thread::spawn(move || {
                    let mut seen = 0u64;
                    while !stop.load(Ordering::SeqCst) {
                        if let Some(v) = cell.read(|t: &Tracked| t.1) {
                            assert!(v < 1000);
                            seen += 1;
                        }
                    }
                    seen
                })
            })
            .collect();

        for i in 0..500 {
            cell.publish(Some(Box::new(Tracked(drops.clone(), i))));
            if i % 3 == 0 {
                cell.clear();
            }
        }
        stop.store(true, Ordering::SeqCst);
        for r in readers {
            r.join().unwrap();
        }
        cell.clear();
        assert_eq!(drops.load(Ordering::SeqCst), 500);
    }
}
