//! Crash and exception reporting
//!
//! Process-wide fault handlers are shared by every session through a
//! reference-counted [`Registry`]. The fault path reads a [`CrashSnapshot`]
//! published in a [`HazardCell`](hazard::HazardCell), never the session
//! itself, so a session can detach while another thread is faulting.
//!
//! Handlers:
//! - Windows: unhandled-exception filter, CRT invalid-parameter and
//!   pure-call handlers
//! - Unix: `SIGSEGV`, `SIGBUS`, `SIGILL`, `SIGFPE` and `SIGABRT`
//! - Both: the panic hook, reporting abnormal termination
//!
//! [`translator`] is independent of all of the above.

pub mod handlers;
pub mod hazard;
pub mod registry;
pub mod report;
pub mod translator;
pub mod writer;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rendergate_engine::HostModule;

pub use handlers::PlatformBackend;
pub use registry::{HandlerBackend, Registry};
pub use report::{exception_name, FaultContext, FaultReport, Register};
pub use translator::FaultError;
pub use writer::{default_writer, JsonReportWriter, SnapshotWriter};

use crate::config::{CrashHandlerConfig, DumpType};
use hazard::HazardCell;

/// User fault gate; returning false skips the snapshot file
pub type FaultCallback = Arc<dyn Fn(&FaultReport) -> bool + Send + Sync>;

/// Crash configuration as seen by the fault path
///
/// Self-contained: nothing in it points into the owning session.
#[derive(Clone)]
pub struct CrashSnapshot {
    /// Session id of the installer
    pub owner: u64,
    /// Engine handle passed back to the host, zero if none
    pub engine: usize,
    pub host: Option<HostModule>,
    pub dump_directory: Option<String>,
    pub dump_type: DumpType,
    pub on_fault: Option<FaultCallback>,
    pub writer: Arc<dyn SnapshotWriter>,
}

impl CrashSnapshot {
    pub fn for_owner(owner: u64) -> Self {
        Self {
            owner,
            engine: 0,
            host: None,
            dump_directory: None,
            dump_type: DumpType::Normal,
            on_fault: None,
            writer: default_writer(),
        }
    }

    pub fn from_config(
        owner: u64,
        engine: usize,
        host: Option<HostModule>,
        config: &CrashHandlerConfig,
        writer: Arc<dyn SnapshotWriter>,
    ) -> Self {
        Self {
            owner,
            engine,
            host,
            dump_directory: config.dump_directory.clone().filter(|d| !d.is_empty()),
            dump_type: config.dump_type,
            on_fault: config.on_fault.clone(),
            writer,
        }
    }
}

/// The process-wide registry used by the real handlers
pub static CRASH: Registry<PlatformBackend> = Registry::new(PlatformBackend);

/// Join the global crash handling
pub fn install(snapshot: CrashSnapshot) -> usize {
    CRASH.install(snapshot)
}

/// Leave the global crash handling
pub fn uninstall(owner: u64) -> usize {
    CRASH.uninstall(owner)
}

/// Set while a report is being written
static REPORTING: AtomicBool = AtomicBool::new(false);

/// Entry point of every platform handler
pub fn report_fault(context: FaultContext) -> Option<PathBuf> {
    report_exclusive(&REPORTING, CRASH.snapshot(), context)
}

struct Reporting<'a>(&'a AtomicBool);

impl Drop for Reporting<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Report `context` unless another report holds `busy`
///
/// A fault raised by the report path itself, or by another thread while a
/// report is being written, is passed on unreported.
fn report_exclusive(
    busy: &AtomicBool,
    cell: &HazardCell<CrashSnapshot>,
    context: FaultContext,
) -> Option<PathBuf> {
    if busy.swap(true, Ordering::AcqRel) {
        return None;
    }
    let _reporting = Reporting(busy);
    report::handle_fault(cell, context)
}

/// Serializes tests that change the process signal table
#[cfg(test)]
pub(crate) static SIGNAL_TEST_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

#[cfg(test)]
mod tests {
    use super::registry::testing::CountingBackend;
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Records reports in memory instead of touching the filesystem
    #[derive(Default)]
    struct MemoryWriter {
        written: Mutex<Vec<(PathBuf, u32)>>,
    }

    impl SnapshotWriter for MemoryWriter {
        fn extension(&self) -> &'static str {
            "mem"
        }

        fn write(&self, path: &std::path::Path, report: &FaultReport, _: DumpType) -> std::io::Result<()> {
            self.written.lock().push((path.to_path_buf(), report.code));
            Ok(())
        }
    }

    fn fault(code: u32) -> FaultContext {
        FaultContext {
            trigger: "synthetic",
            code,
            ..Default::default()
        }
    }

    #[test]
    fn test_callback_gates_snapshot() {
        let registry = Registry::new(CountingBackend::default());
        let writer = Arc::new(MemoryWriter::default());
        let allow = Arc::new(AtomicBool::new(false));

        let gate = allow.clone();
        let mut snapshot = CrashSnapshot::for_owner(1);
        snapshot.writer = writer.clone();
        snapshot.dump_directory = Some(std::env::temp_dir().display().to_string());
        snapshot.on_fault = Some(Arc::new(move |_: &FaultReport| gate.load(Ordering::SeqCst)));
        registry.install(snapshot);

        assert!(report::handle_fault(registry.snapshot(), fault(0xC000_0005)).is_none());
        allow.store(true, Ordering::SeqCst);
        let path = report::handle_fault(registry.snapshot(), fault(0xC000_0005)).unwrap();

        assert!(path.starts_with(std::env::temp_dir()));
        assert!(path.to_string_lossy().ends_with("-0xC0000005.mem"));
        assert_eq!(writer.written.lock().len(), 1);
    }

    #[test]
    fn test_callback_receives_engine_handle() {
        let registry = Registry::new(CountingBackend::default());
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();

        let mut snapshot = CrashSnapshot::for_owner(1);
        snapshot.engine = 0x5000;
        snapshot.writer = Arc::new(MemoryWriter::default());
        snapshot.on_fault = Some(Arc::new(move |r: &FaultReport| {
            s.store(r.engine, Ordering::SeqCst);
            false
        }));
        registry.install(snapshot);

        report::handle_fault(registry.snapshot(), fault(1));
        assert_eq!(seen.load(Ordering::SeqCst), 0x5000);
    }

    #[test]
    fn test_detached_owner_never_seen_by_fault_path() {
        let registry = Arc::new(Registry::new(CountingBackend::default()));
        let stop = Arc::new(AtomicBool::new(false));
        let violations = Arc::new(AtomicUsize::new(0));

        let faulting: Vec<_> = (0..3)
            .map(|_| {
                let registry = registry.clone();
                let stop = stop.clone();
                std::thread::spawn(move || {
                    while !stop.load(Ordering::SeqCst) {
                        registry.snapshot().read(|snapshot| {
                            let report =
                                FaultReport::new(fault(7), snapshot.engine, chrono::Local::now());
                            snapshot.on_fault.as_ref().map(|on_fault| on_fault(&report))
                        });
                    }
                })
            })
            .collect();

        for owner in 1..=200u64 {
            let detached = Arc::new(AtomicBool::new(false));
            let (seen, count) = (detached.clone(), violations.clone());
            let mut snapshot = CrashSnapshot::for_owner(owner);
            snapshot.writer = Arc::new(MemoryWriter::default());
            snapshot.on_fault = Some(Arc::new(move |_: &FaultReport| {
                std::thread::yield_now();
                if seen.load(Ordering::SeqCst) {
                    count.fetch_add(1, Ordering::SeqCst);
                }
                false
            }));

            registry.install(snapshot);
            std::thread::yield_now();
            registry.uninstall(owner);
            detached.store(true, Ordering::SeqCst);
        }

        stop.store(true, Ordering::SeqCst);
        for thread in faulting {
            thread.join().unwrap();
        }
        assert_eq!(violations.load(Ordering::SeqCst), 0);
        assert_eq!(registry.refcount(), 0);
        assert!(!registry.snapshot().is_set());
    }

    #[test]
    fn test_fault_inside_report_is_not_reported_again() {
        let registry = Arc::new(Registry::new(CountingBackend::default()));
        let busy = Arc::new(AtomicBool::new(false));
        let nested = Arc::new(Mutex::new(None));
        let writer = Arc::new(MemoryWriter::default());

        let (inner_registry, inner_busy) = (registry.clone(), busy.clone());
        let inner_nested = nested.clone();
        let mut snapshot = CrashSnapshot::for_owner(1);
        snapshot.writer = writer.clone();
        snapshot.dump_directory = Some(std::env::temp_dir().display().to_string());
        snapshot.on_fault = Some(Arc::new(move |report: &FaultReport| {
            if report.code == 0xC000_0005 {
                let again =
                    report_exclusive(&inner_busy, inner_registry.snapshot(), fault(0xC000_001D));
                *inner_nested.lock() = Some(again);
            }
            true
        }));
        registry.install(snapshot);

        assert!(report_exclusive(&busy, registry.snapshot(), fault(0xC000_0005)).is_some());
        assert_eq!(*nested.lock(), Some(None));
        assert!(!busy.load(Ordering::SeqCst));

        // released again once the first report is written
        assert!(report_exclusive(&busy, registry.snapshot(), fault(0xC000_0094)).is_some());
        assert_eq!(writer.written.lock().len(), 2);
    }

    #[test]
    fn test_from_config_drops_empty_directory() {
        let config = CrashHandlerConfig {
            enabled: true,
            dump_directory: Some(String::new()),
            dump_type: DumpType::Full,
            on_fault: None,
        };
        let snapshot = CrashSnapshot::from_config(4, 0, None, &config, default_writer());
        assert!(snapshot.dump_directory.is_none());
        assert_eq!(snapshot.dump_type, DumpType::Full);
    }
}
