//! Typed hook primitive
//!
//! A [`Hook`] owns one redirection: the patch target, the detour and the
//! address that reaches the pre-patch code. Installation and removal each run
//! in a single patcher transaction.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::patcher::{CodePatcher, PatchError, Transaction};

/// One installable redirection with a typed original
///
/// `F` is the function-pointer type of the target. Hooks are usually
/// `static` so detour bodies can reach their original without any context.
pub struct Hook<F: Copy> {
    name: &'static str,
    target: AtomicUsize,
    original: AtomicUsize,
    detour: AtomicUsize,
    applied: AtomicBool,
    open_transaction: AtomicBool,
    /// Patcher that applied the hook; also serializes install and removal
    patcher: Mutex<Option<Arc<dyn CodePatcher>>>,
    _signature: PhantomData<F>,
}

impl<F: Copy> Hook<F> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            target: AtomicUsize::new(0),
            original: AtomicUsize::new(0),
            detour: AtomicUsize::new(0),
            applied: AtomicBool::new(false),
            open_transaction: AtomicBool::new(false),
            patcher: parking_lot::const_mutex(None),
            _signature: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Redirect `target` to `detour`
    ///
    /// Runs begin, record-thread, attach and commit in one transaction. Any
    /// failure aborts the transaction, so the target is left untouched.
    ///
    /// # Safety
    /// `target` must be a patch target `patcher` understands whose function
    /// has signature `F`.
    pub unsafe fn install(
        &self,
        patcher: &Arc<dyn CodePatcher>,
        target: usize,
        detour: F,
    ) -> Result<(), PatchError> {
        let detour = fn_to_addr(detour);
        let mut owner = self.patcher.lock();
        if self.applied.load(Ordering::Acquire) {
            return Err(PatchError::AlreadyPatched);
        }

        self.open_transaction.store(true, Ordering::Release);
        let result = Self::apply(patcher.as_ref(), target, detour, &self.original);
        self.open_transaction.store(false, Ordering::Release);

        match result {
            Ok(original) => {
                self.target.store(target, Ordering::Release);
                self.detour.store(detour, Ordering::Release);
                self.applied.store(true, Ordering::Release);
                *owner = Some(patcher.clone());
                tracing::info!(
                    "Installed hook '{}' at {:x} (original {:x})",
                    self.name,
                    target,
                    original
                );
                Ok(())
            }
            Err(e) => {
                self.original.store(0, Ordering::Release);
                tracing::warn!("Failed to install hook '{}' at {:x}: {}", self.name, target, e);
                Err(e)
            }
        }
    }

    unsafe fn apply(
        patcher: &dyn CodePatcher,
        target: usize,
        detour: usize,
        original: &AtomicUsize,
    ) -> Result<usize, PatchError> {
        let txn = Transaction::begin(patcher)?;
        txn.update_thread()?;
        let trampoline = txn.attach(target, detour)?;
        // The detour may run the moment commit lands
        original.store(trampoline, Ordering::Release);
        txn.commit()?;
        Ok(trampoline)
    }

    /// Undo the redirection
    ///
    /// Removing a hook that is not applied is a no-op.
    pub fn remove(&self) -> Result<(), PatchError> {
        let owner = self.patcher.lock();
        if !self.applied.load(Ordering::Acquire) {
            return Ok(());
        }
        let Some(patcher) = owner.as_ref() else {
            return Ok(());
        };

        self.open_transaction.store(true, Ordering::Release);
        let result = (|| {
            let txn = Transaction::begin(patcher.as_ref())?;
            txn.update_thread()?;
            unsafe {
                txn.detach(
                    self.target.load(Ordering::Acquire),
                    self.original.load(Ordering::Acquire),
                    self.detour.load(Ordering::Acquire),
                )?;
            }
            txn.commit()
        })();
        self.open_transaction.store(false, Ordering::Release);

        result?;
        self.applied.store(false, Ordering::Release);
        tracing::info!("Removed hook '{}'", self.name);
        Ok(())
    }

    /// Removal for the module-unload path
    ///
    /// Never blocks on the hook's own lock and never returns an error. Every
    /// failed step aborts the patcher transaction explicitly. Returns whether
    /// the hook is no longer applied.
    pub fn remove_nothrow(&self) -> bool {
        let Some(owner) = self.patcher.try_lock() else {
            tracing::warn!("Hook '{}' busy, skipping removal", self.name);
            return false;
        };
        if !self.applied.load(Ordering::Acquire) {
            return true;
        }
        let Some(patcher) = owner.as_ref() else {
            return true;
        };

        if let Err(e) = patcher.begin() {
            tracing::warn!("Hook '{}': begin failed during removal: {}", self.name, e);
            return false;
        }
        self.open_transaction.store(true, Ordering::Release);

        let failed = |step: &str, e: PatchError| {
            patcher.abort();
            self.open_transaction.store(false, Ordering::Release);
            tracing::warn!("Hook '{}': {} failed during removal: {}", self.name, step, e);
            false
        };

        if let Err(e) = patcher.update_thread() {
            return failed("update_thread", e);
        }
        let detached = unsafe {
            patcher.detach(
                self.target.load(Ordering::Acquire),
                self.original.load(Ordering::Acquire),
                self.detour.load(Ordering::Acquire),
            )
        };
        if let Err(e) = detached {
            return failed("detach", e);
        }
        if let Err(e) = patcher.commit() {
            return failed("commit", e);
        }

        self.open_transaction.store(false, Ordering::Release);
        self.applied.store(false, Ordering::Release);
        true
    }

    /// Entry that reaches the pre-patch code
    ///
    /// Only meaningful while the hook is applied.
    #[inline]
    pub fn original(&self) -> Option<F> {
        match self.original.load(Ordering::Acquire) {
            0 => None,
            addr => Some(unsafe { addr_to_fn(addr) }),
        }
    }

    #[inline]
    pub fn is_applied(&self) -> bool {
        self.applied.load(Ordering::Acquire)
    }

    pub fn has_open_transaction(&self) -> bool {
        self.open_transaction.load(Ordering::Acquire)
    }

    pub fn target(&self) -> Option<usize> {
        match self.target.load(Ordering::Acquire) {
            0 => None,
            target => Some(target),
        }
    }
}

fn fn_to_addr<F: Copy>(f: F) -> usize {
    debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<usize>());
    // SAFETY: F is a thin function pointer type
    unsafe { std::mem::transmute_copy(&f) }
}

unsafe fn addr_to_fn<F: Copy>(addr: usize) -> F {
    debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<usize>());
    std::mem::transmute_copy(&addr)
}

/// Declare a static [`Hook`] with typed helpers
///
/// ```ignore
/// static_hook!(end_scene: unsafe extern "system" fn(*mut c_void) -> i32);
/// // END_SCENE_HOOK, end_scene_original()
/// ```
#[macro_export]
macro_rules! static_hook {
    ($vis:vis $name:ident : $sig:ty) => {
        paste::paste! {
            $vis static [<$name:upper _HOOK>]: $crate::hooks::Hook<$sig> =
                $crate::hooks::Hook::new(stringify!($name));

            #[allow(dead_code)]
            #[inline]
            $vis fn [<$name _original>]() -> Option<$sig> {
                [<$name:upper _HOOK>].original()
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::super::patcher::testing::ScriptedPatcher;
    use super::super::vtable::SlotPatcher;
    use super::*;

    type AddFn = extern "C" fn(i32) -> i32;

    extern "C" fn add_one(x: i32) -> i32 {
        x + 1
    }

    extern "C" fn add_ten(x: i32) -> i32 {
        x + 10
    }

    fn slot_patcher() -> Arc<dyn CodePatcher> {
        Arc::new(SlotPatcher::new())
    }

    fn call(slot: &usize, x: i32) -> i32 {
        let f: AddFn = unsafe { std::mem::transmute(*slot) };
        f(x)
    }

    #[test]
    fn test_install_redirects_and_keeps_original() {
        let hook: Hook<AddFn> = Hook::new("add");
        let table = Box::new(add_one as AddFn as usize);
        let slot = &*table as *const usize as usize;

        unsafe { hook.install(&slot_patcher(), slot, add_ten) }.unwrap();
        assert!(hook.is_applied());
        assert_eq!(call(&table, 1), 11);
        assert_eq!((hook.original().unwrap())(1), 2);

        hook.remove().unwrap();
        assert!(!hook.is_applied());
        assert_eq!(call(&table, 1), 2);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let hook: Hook<AddFn> = Hook::new("add");
        for _ in 0..3 {
            assert!(hook.remove().is_ok());
            assert!(hook.remove_nothrow());
        }

        let table = Box::new(add_one as AddFn as usize);
        let slot = &*table as *const usize as usize;
        unsafe { hook.install(&slot_patcher(), slot, add_ten) }.unwrap();
        for _ in 0..3 {
            assert!(hook.remove().is_ok());
        }
        assert_eq!(call(&table, 0), 1);
    }

    #[test]
    fn test_second_install_is_rejected() {
        let hook: Hook<AddFn> = Hook::new("add");
        let table = Box::new(add_one as AddFn as usize);
        let slot = &*table as *const usize as usize;
        let patcher = slot_patcher();

        unsafe { hook.install(&patcher, slot, add_ten) }.unwrap();
        assert_eq!(
            unsafe { hook.install(&patcher, slot, add_ten) },
            Err(PatchError::AlreadyPatched)
        );
        hook.remove().unwrap();
    }

    #[test]
    fn test_failed_install_leaves_target_unchanged() {
        for fail in ["attach", "commit"] {
            let mut scripted = ScriptedPatcher::default();
            match fail {
                "attach" => scripted.fail_attach = Some(PatchError::TargetTooSmall),
                _ => scripted.fail_commit = Some(PatchError::TransactionConflict),
            }
            let scripted = Arc::new(scripted);
            let patcher: Arc<dyn CodePatcher> = scripted.clone();

            let hook: Hook<AddFn> = Hook::new("add");
            assert!(unsafe { hook.install(&patcher, 0x1000, add_ten) }.is_err());
            assert!(!hook.is_applied());
            assert!(!hook.has_open_transaction());
            assert!(hook.original().is_none());
            assert_eq!(scripted.calls().last(), Some(&"abort"));
        }
    }

    #[test]
    fn test_failed_slot_commit_is_not_observable() {
        let hook: Hook<AddFn> = Hook::new("add");
        let table = Box::new(add_one as AddFn as usize);
        let bytes_before = *table;

        // misaligned target fails inside the transaction
        let slot = &*table as *const usize as usize + 1;
        assert_eq!(
            unsafe { hook.install(&slot_patcher(), slot, add_ten) },
            Err(PatchError::TargetTooSmall)
        );
        assert_eq!(*table, bytes_before);
        assert_eq!(call(&table, 5), 6);
    }

    #[test]
    fn test_remove_nothrow_aborts_on_failure() {
        let scripted = Arc::new(ScriptedPatcher {
            fail_detach: Some(PatchError::TransactionConflict),
            ..Default::default()
        });
        let patcher: Arc<dyn CodePatcher> = scripted.clone();
        let hook: Hook<AddFn> = Hook::new("add");
        unsafe { hook.install(&patcher, 0x1000, add_ten) }.unwrap();

        assert!(!hook.remove_nothrow());
        assert!(hook.is_applied());
        assert!(!hook.has_open_transaction());
        assert_eq!(
            &scripted.calls()[4..],
            &["begin", "update_thread", "detach", "abort"]
        );
    }

    #[test]
    fn test_remove_reports_failure_and_stays_applied() {
        let scripted = Arc::new(ScriptedPatcher {
            fail_commit: None,
            fail_detach: Some(PatchError::InvalidTarget(0x1000)),
            ..Default::default()
        });
        let patcher: Arc<dyn CodePatcher> = scripted.clone();
        let hook: Hook<AddFn> = Hook::new("add");
        unsafe { hook.install(&patcher, 0x1000, add_ten) }.unwrap();

        assert_eq!(hook.remove(), Err(PatchError::InvalidTarget(0x1000)));
        assert!(hook.is_applied());
        assert_eq!(scripted.calls().last(), Some(&"abort"));
    }
}
