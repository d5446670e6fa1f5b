//! Engine sessions
//!
//! A session is the per-attach context: configuration, collaborators,
//! callback tables, the custom context block, the worker and its signals.
//! One session may be attached per process, because hook bodies and the
//! active-version cells are process-wide.

pub mod callbacks;
pub mod context;
pub mod queue;

use std::ffi::c_void;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use rendergate_engine::{HostModule, ModulePin, SubsystemKind, TargetCatalog};
use rendergate_sdk::{RgEngine, RgEventExtension};

pub use callbacks::{CallbackSlot, SessionCallbacks};
pub use context::CustomContext;
pub use queue::QueueMaps;

use crate::config::{self, EngineConfig};
use crate::crash::{self, CrashSnapshot, SnapshotWriter};
use crate::error::{EngineError, EngineResult};
use crate::hooks::{CodePatcher, HookSet, SlotPatcher};
use crate::lifecycle::{self, triggers, worker, ShutdownOrigin, ShutdownOutcome, WorkerSignals};
use crate::logging;

static SESSION: Mutex<Option<Arc<EngineSession>>> = parking_lot::const_mutex(None);
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Everything `create` needs besides the host module
pub struct AttachOptions {
    pub config: EngineConfig,
    pub catalog: Arc<dyn TargetCatalog>,
    /// `None` selects [`SlotPatcher`]
    pub patcher: Option<Arc<dyn CodePatcher>>,
    /// `None` selects the platform's default snapshot writer
    pub writer: Option<Arc<dyn SnapshotWriter>>,
}

impl AttachOptions {
    pub fn new(catalog: Arc<dyn TargetCatalog>) -> Self {
        Self {
            config: EngineConfig::default(),
            catalog,
            patcher: None,
            writer: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_patcher(mut self, patcher: Arc<dyn CodePatcher>) -> Self {
        self.patcher = Some(patcher);
        self
    }

    pub fn with_snapshot_writer(mut self, writer: Arc<dyn SnapshotWriter>) -> Self {
        self.writer = Some(writer);
        self
    }
}

/// First device seen by a hook, kept for reverse lookups
#[derive(Default)]
struct DeviceCell(AtomicUsize);

impl DeviceCell {
    /// Bind `device` unless one is bound already
    fn bind(&self, device: *mut c_void) -> bool {
        !device.is_null()
            && self.0.load(Ordering::Relaxed) == 0
            && self
                .0
                .compare_exchange(0, device as usize, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
    }

    fn is(&self, device: *mut c_void) -> bool {
        !device.is_null() && self.0.load(Ordering::Acquire) == device as usize
    }
}

/// One attached engine
pub struct EngineSession {
    id: u64,
    host: HostModule,
    config: EngineConfig,
    catalog: Arc<dyn TargetCatalog>,
    patcher: Arc<dyn CodePatcher>,
    callbacks: SessionCallbacks,
    context: CustomContext,
    queues: QueueMaps,
    d3d9_device: DeviceCell,
    d3d9ex_device: DeviceCell,
    hooks: HookSet,
    signals: WorkerSignals,
    worker: Mutex<Option<JoinHandle<()>>>,
    pin: Mutex<Option<ModulePin>>,
    pub(crate) cleanup_started: AtomicBool,
    crash_installed: AtomicBool,
    log_file: Option<PathBuf>,
}

impl EngineSession {
    /// Attach to the process on behalf of `host`
    ///
    /// Loads the override file, starts logging, pins `host`, joins crash
    /// handling when enabled and spawns the worker. Returns before hooks are
    /// installed; see [`EngineSession::wait_ready`].
    pub fn create(host: HostModule, options: AttachOptions) -> EngineResult<Arc<EngineSession>> {
        let mut slot = SESSION.lock();
        if slot.is_some() {
            return Err(EngineError::AlreadyAttached);
        }

        let AttachOptions {
            mut config,
            catalog,
            patcher,
            writer,
        } = options;

        let loaded = config::override_path(host).and_then(|path| {
            config::load_override(&path).map(|file| file.map(|file| (path, file)))
        });
        let mut applied_override = None;
        match loaded {
            Ok(Some((path, file))) => {
                config.merge_file(file);
                applied_override = Some(Ok(path));
            }
            Ok(None) | Err(config::ConfigError::NoConfigDirectory) => {}
            Err(e) => applied_override = Some(Err(e)),
        }

        let log_file = logging::init(&config.logging, Some(host))?;
        match applied_override {
            Some(Ok(path)) => tracing::info!("Applied configuration override {:?}", path),
            Some(Err(e)) => tracing::warn!("Ignoring invalid configuration override: {}", e),
            None => {}
        }

        let pin = ModulePin::acquire(host)?;

        let session = Arc::new(EngineSession {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            host,
            config,
            catalog,
            patcher: patcher.unwrap_or_else(|| Arc::new(SlotPatcher::new())),
            callbacks: SessionCallbacks::default(),
            context: CustomContext::new(),
            queues: QueueMaps::new(),
            d3d9_device: DeviceCell::default(),
            d3d9ex_device: DeviceCell::default(),
            hooks: HookSet::new(),
            signals: WorkerSignals::new(),
            worker: Mutex::new(None),
            pin: Mutex::new(Some(pin)),
            cleanup_started: AtomicBool::new(false),
            crash_installed: AtomicBool::new(false),
            log_file,
        });

        if session.config.crash_handler.enabled {
            let snapshot = CrashSnapshot::from_config(
                session.id,
                session.handle() as usize,
                Some(host),
                &session.config.crash_handler,
                writer.unwrap_or_else(crash::default_writer),
            );
            crash::install(snapshot);
            session.crash_installed.store(true, Ordering::Release);
        }

        let worker_session = session.clone();
        let spawned = thread::Builder::new()
            .name("rendergate-worker".into())
            .spawn(move || worker::run(worker_session));
        match spawned {
            Ok(handle) => *session.worker.lock() = Some(handle),
            Err(e) => {
                session.leave_crash_handling();
                return Err(EngineError::ThreadCreation(e));
            }
        }

        *slot = Some(session.clone());
        tracing::info!(
            "Created engine session {} for host module {:#x}",
            session.id,
            host.address()
        );
        Ok(session)
    }

    /// Detach the session created for `host`
    ///
    /// Runs the module-detach shutdown (a no-op when a trigger already ran),
    /// unhooks any trigger left applied and leaves crash handling before the
    /// session is released.
    pub fn destroy(host: HostModule) -> EngineResult<()> {
        let session = {
            let mut slot = SESSION.lock();
            match slot.take() {
                Some(session) if session.host == host => session,
                other => {
                    *slot = other;
                    return Err(EngineError::InvalidModuleHandle);
                }
            }
        };

        tracing::info!("Freeing remaining resources of session {}", session.id);
        lifecycle::shutdown(&session, ShutdownOrigin::ModuleDetach);
        triggers::remove_nothrow();
        session.leave_crash_handling();

        tracing::info!("Engine shutdown complete");
        Ok(())
    }

    /// The attached session, if any
    pub fn current() -> Option<Arc<EngineSession>> {
        SESSION.lock().clone()
    }

    /// Resolve an opaque handle handed out by [`EngineSession::handle`]
    pub fn from_handle(engine: *const RgEngine) -> Option<Arc<EngineSession>> {
        if engine.is_null() {
            return None;
        }
        Self::current().filter(|session| session.handle() as *const RgEngine == engine)
    }

    /// Session whose Direct3D 9 `Present` first saw `device`
    pub fn from_d3d9_device(device: *mut c_void) -> Option<Arc<EngineSession>> {
        Self::current().filter(|session| session.d3d9_device.is(device))
    }

    /// Session whose Direct3D 9Ex `PresentEx` first saw `device`
    pub fn from_d3d9ex_device(device: *mut c_void) -> Option<Arc<EngineSession>> {
        Self::current().filter(|session| session.d3d9ex_device.is(device))
    }

    fn leave_crash_handling(&self) {
        if self.crash_installed.swap(false, Ordering::AcqRel) {
            crash::uninstall(self.id);
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn host(&self) -> HostModule {
        self.host
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Opaque handle passed to C callbacks
    pub fn handle(&self) -> *mut RgEngine {
        self as *const EngineSession as *mut RgEngine
    }

    pub fn catalog(&self) -> &dyn TargetCatalog {
        self.catalog.as_ref()
    }

    pub fn patcher(&self) -> &Arc<dyn CodePatcher> {
        &self.patcher
    }

    pub fn callbacks(&self) -> &SessionCallbacks {
        &self.callbacks
    }

    pub fn hooks(&self) -> &HookSet {
        &self.hooks
    }

    pub fn queues(&self) -> &QueueMaps {
        &self.queues
    }

    pub(crate) fn signals(&self) -> &WorkerSignals {
        &self.signals
    }

    pub fn log_file(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    pub fn is_crash_handler_installed(&self) -> bool {
        self.crash_installed.load(Ordering::Acquire)
    }

    /// Names of the subsystem hooks currently applied
    pub fn installed_hooks(&self) -> Vec<&'static str> {
        self.hooks.applied()
    }

    /// Extension record handed to every event callback
    pub fn extension(&self) -> RgEventExtension {
        RgEventExtension::new(self.handle(), self.context.get())
    }

    /// Replace the custom context with `size` zeroed bytes
    pub fn alloc_context(&self, size: usize) -> EngineResult<*mut c_void> {
        self.context.alloc(size)
    }

    pub fn free_context(&self) {
        self.context.free()
    }

    /// Current custom context, or null
    pub fn context(&self) -> *mut c_void {
        self.context.get()
    }

    /// Direct3D 12 command queue behind `swap_chain`, or null
    ///
    /// # Safety
    /// `swap_chain` must be a live swap chain.
    pub unsafe fn command_queue_for(&self, swap_chain: *mut c_void) -> *mut c_void {
        self.queues.command_queue_for(self.catalog(), swap_chain)
    }

    /// Remember the device behind the first Direct3D 9 `Present`
    pub(crate) fn record_d3d9_device(&self, device: *mut c_void) {
        if self.d3d9_device.bind(device) {
            tracing::debug!("IDirect3DDevice9 {:p} bound to session {}", device, self.id);
        }
    }

    /// Remember the device behind the first Direct3D 9Ex `PresentEx`
    pub(crate) fn record_d3d9ex_device(&self, device: *mut c_void) {
        if self.d3d9ex_device.bind(device) {
            tracing::debug!("IDirect3DDevice9Ex {:p} bound to session {}", device, self.id);
        }
    }

    /// Wait until the worker finished installing hooks
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        self.signals.wait_ready(timeout)
    }

    /// Wait until the worker removed its hooks and exited
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        self.signals.wait_done(timeout)
    }

    /// Run the shutdown sequence from `origin`
    pub fn shutdown(&self, origin: ShutdownOrigin) -> ShutdownOutcome {
        lifecycle::shutdown(self, origin)
    }

    pub fn is_shut_down(&self) -> bool {
        self.cleanup_started.load(Ordering::Acquire)
    }

    pub(crate) fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.worker.lock().take()
    }

    pub(crate) fn take_pin(&self) -> Option<ModulePin> {
        self.pin.lock().take()
    }

    pub(crate) fn notify_hooked(&self, kind: SubsystemKind) {
        tracing::info!("Hooked {}", kind);
        if let Some(event) = &self.config.events.on_hooked {
            event(self, kind);
        }
    }

    pub(crate) fn notify_pre_unhook(&self) {
        if let Some(event) = &self.config.events.pre_unhook {
            tracing::debug!("Raising pre-unhook event");
            event(self);
        }
    }

    pub(crate) fn notify_post_unhook(&self) {
        if let Some(event) = &self.config.events.post_unhook {
            tracing::debug!("Raising post-unhook event");
            event(self);
        }
    }

    pub(crate) fn notify_pre_exit(&self) {
        if let Some(event) = &self.config.events.pre_exit {
            tracing::debug!("Raising pre-exit event");
            event(self);
        }
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.leave_crash_handling();
        tracing::debug!("Session {} released", self.id);
    }
}
