//! Installed-hook bookkeeping
//!
//! Sessions record every hook they applied so teardown can remove them in
//! one pass without knowing their signatures.

use parking_lot::Mutex;

use super::hook::Hook;
use super::patcher::PatchError;

/// Signature-erased view of a [`Hook`]
pub trait ManagedHook: Send + Sync {
    fn name(&self) -> &'static str;
    fn is_applied(&self) -> bool;
    fn remove(&self) -> Result<(), PatchError>;
    fn remove_nothrow(&self) -> bool;
}

impl<F: Copy> ManagedHook for Hook<F>
where
    Hook<F>: Send + Sync,
{
    fn name(&self) -> &'static str {
        Hook::name(self)
    }

    fn is_applied(&self) -> bool {
        Hook::is_applied(self)
    }

    fn remove(&self) -> Result<(), PatchError> {
        Hook::remove(self)
    }

    fn remove_nothrow(&self) -> bool {
        Hook::remove_nothrow(self)
    }
}

/// Hooks installed by one session, in installation order
#[derive(Default)]
pub struct HookSet {
    hooks: Mutex<Vec<&'static dyn ManagedHook>>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, hook: &'static dyn ManagedHook) {
        self.hooks.lock().push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.lock().is_empty()
    }

    /// Names of the hooks that are currently applied
    pub fn applied(&self) -> Vec<&'static str> {
        self.hooks
            .lock()
            .iter()
            .filter(|h| h.is_applied())
            .map(|h| h.name())
            .collect()
    }

    /// Remove every hook, newest first
    ///
    /// `nothrow` selects the module-unload removal. Hooks that failed to
    /// come off stay recorded and are counted in the result. A busy set is
    /// skipped by the non-throwing path.
    pub fn remove_all(&self, nothrow: bool) -> usize {
        let mut hooks = if nothrow {
            let Some(hooks) = self.hooks.try_lock() else {
                tracing::warn!("Hook set busy, skipping removal");
                return 0;
            };
            hooks
        } else {
            self.hooks.lock()
        };

        let mut failed = Vec::new();
        while let Some(hook) = hooks.pop() {
            let removed = if nothrow {
                hook.remove_nothrow()
            } else {
                match hook.remove() {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!("Failed to remove hook '{}': {}", hook.name(), e);
                        false
                    }
                }
            };
            if !removed {
                failed.push(hook);
            }
        }

        failed.reverse();
        let count = failed.len();
        *hooks = failed;
        count
    }
}

#[cfg(test)]
mod tests {
    use super::super::patcher::testing::ScriptedPatcher;
    use super::super::patcher::CodePatcher;
    use super::*;
    use std::sync::Arc;

    type Fn0 = extern "C" fn();

    extern "C" fn detour() {}

    static FIRST: Hook<Fn0> = Hook::new("first");
    static SECOND: Hook<Fn0> = Hook::new("second");

    #[test]
    fn test_remove_all_empties_set() {
        let patcher: Arc<dyn CodePatcher> = Arc::new(ScriptedPatcher::default());
        let set = HookSet::new();
        unsafe {
            FIRST.install(&patcher, 0x1000, detour).unwrap();
            SECOND.install(&patcher, 0x2000, detour).unwrap();
        }
        set.record(&FIRST);
        set.record(&SECOND);
        assert_eq!(set.applied(), vec!["first", "second"]);

        assert_eq!(set.remove_all(false), 0);
        assert!(set.is_empty());
        assert!(!FIRST.is_applied() && !SECOND.is_applied());
        // idempotent
        assert_eq!(set.remove_all(true), 0);
    }
}
