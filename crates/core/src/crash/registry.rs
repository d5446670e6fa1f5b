//! Reference-counted ownership of the process-wide fault handlers
//!
//! Install and uninstall are serialized by a mutex. The fault path only
//! ever touches the snapshot cell and never takes that mutex.

use parking_lot::Mutex;

use super::hazard::HazardCell;
use super::CrashSnapshot;

/// Registers and restores the process-wide handlers
pub trait HandlerBackend: Send + Sync {
    /// Whatever must be put back on restore
    type Previous: Send;

    fn install(&self) -> Self::Previous;

    fn restore(&self, previous: Self::Previous);
}

struct State<P> {
    refcount: usize,
    previous: Option<P>,
}

pub struct Registry<B: HandlerBackend> {
    backend: B,
    state: Mutex<State<B::Previous>>,
    snapshot: HazardCell<CrashSnapshot>,
}

impl<B: HandlerBackend> Registry<B> {
    pub const fn new(backend: B) -> Self {
        Self {
            backend,
            state: parking_lot::const_mutex(State {
                refcount: 0,
                previous: None,
            }),
            snapshot: HazardCell::new(),
        }
    }

    /// Take a reference on the global handlers
    ///
    /// The first installer registers the handlers and publishes its snapshot;
    /// later installers only add a reference. Returns the new count.
    pub fn install(&self, snapshot: CrashSnapshot) -> usize {
        let mut state = self.state.lock();
        if state.refcount == 0 {
            let owner = snapshot.owner;
            self.snapshot.publish(Some(Box::new(snapshot)));
            state.previous = Some(self.backend.install());
            tracing::info!("Crash handler installed (owner {})", owner);
        }
        state.refcount += 1;
        state.refcount
    }

    /// Drop a reference taken by `owner`
    ///
    /// The owner's snapshot is unpublished before this returns, so the
    /// owner's memory may be freed afterwards. The last reference restores
    /// the previous handlers. Returns the remaining count.
    pub fn uninstall(&self, owner: u64) -> usize {
        let mut state = self.state.lock();
        if state.refcount == 0 {
            return 0;
        }
        state.refcount -= 1;

        if self.snapshot.read(|s| s.owner == owner).unwrap_or(false) {
            self.snapshot.clear();
        }

        if state.refcount == 0 {
            if let Some(previous) = state.previous.take() {
                self.backend.restore(previous);
            }
            self.snapshot.clear();
            tracing::info!("Crash handler uninstalled");
        }
        state.refcount
    }

    pub fn refcount(&self) -> usize {
        self.state.lock().refcount
    }

    /// Cell read by the fault path
    pub fn snapshot(&self) -> &HazardCell<CrashSnapshot> {
        &self.snapshot
    }

    pub fn owner(&self) -> Option<u64> {
        self.snapshot.read(|s| s.owner)
    }
}
