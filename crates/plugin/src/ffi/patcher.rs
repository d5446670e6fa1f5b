//! [`CodePatcher`] over the host-supplied C vtable

use rendergate_core::hooks::{CodePatcher, PatchError};
use rendergate_sdk::{
    RgCodePatcher, RG_PATCH_ALREADY_PATCHED, RG_PATCH_INVALID_TARGET, RG_PATCH_OK,
    RG_PATCH_OUT_OF_MEMORY, RG_PATCH_TARGET_TOO_SMALL, RG_PATCH_TRANSACTION_CONFLICT,
};

/// Owned copy of an [`RgCodePatcher`]
pub struct PatcherAdapter {
    raw: RgCodePatcher,
}

// SAFETY: the host promises the vtable may be driven from the worker thread
unsafe impl Send for PatcherAdapter {}
unsafe impl Sync for PatcherAdapter {}

impl PatcherAdapter {
    /// Returns `None` when a required entry is null
    ///
    /// # Safety
    /// Every entry of `raw` must stay callable for the session's lifetime.
    pub unsafe fn new(raw: RgCodePatcher) -> Option<Self> {
        let complete = raw.begin.is_some()
            && raw.update_thread.is_some()
            && raw.attach.is_some()
            && raw.detach.is_some()
            && raw.commit.is_some()
            && raw.abort.is_some();
        complete.then_some(Self { raw })
    }
}

/// Map a vtable status onto [`PatchError`]
fn status(code: i32, target: usize) -> Result<(), PatchError> {
    match code {
        RG_PATCH_OK => Ok(()),
        RG_PATCH_TARGET_TOO_SMALL => Err(PatchError::TargetTooSmall),
        RG_PATCH_ALREADY_PATCHED => Err(PatchError::AlreadyPatched),
        RG_PATCH_TRANSACTION_CONFLICT => Err(PatchError::TransactionConflict),
        RG_PATCH_OUT_OF_MEMORY => Err(PatchError::OutOfMemory),
        RG_PATCH_INVALID_TARGET => Err(PatchError::InvalidTarget(target)),
        other => Err(PatchError::Unknown(format!("patcher status {}", other))),
    }
}

fn missing() -> PatchError {
    PatchError::Unknown("patcher entry missing".to_string())
}

impl CodePatcher for PatcherAdapter {
    fn begin(&self) -> Result<(), PatchError> {
        let begin = self.raw.begin.ok_or_else(missing)?;
        status(unsafe { begin(self.raw.user) }, 0)
    }

    fn update_thread(&self) -> Result<(), PatchError> {
        let update_thread = self.raw.update_thread.ok_or_else(missing)?;
        status(unsafe { update_thread(self.raw.user) }, 0)
    }

    unsafe fn attach(&self, target: usize, detour: usize) -> Result<usize, PatchError> {
        let attach = self.raw.attach.ok_or_else(missing)?;
        let mut original = 0usize;
        status(attach(self.raw.user, target, detour, &mut original), target)?;
        if original == 0 {
            return Err(PatchError::InvalidTarget(target));
        }
        Ok(original)
    }

    unsafe fn detach(&self, target: usize, original: usize, detour: usize) -> Result<(), PatchError> {
        let detach = self.raw.detach.ok_or_else(missing)?;
        status(detach(self.raw.user, target, original, detour), target)
    }

    fn commit(&self) -> Result<(), PatchError> {
        let commit = self.raw.commit.ok_or_else(missing)?;
        status(unsafe { commit(self.raw.user) }, 0)
    }

    fn abort(&self) {
        if let Some(abort) = self.raw.abort {
            unsafe { abort(self.raw.user) };
        }
    }
}
