//! Code patcher collaborator and scoped transactions
//!
//! A patcher redirects a target to a detour inside a transaction:
//! begin, record threads, queue attach/detach operations, then commit or
//! abort. Nothing is observable until commit succeeds.

/// Error type for patch operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    /// Target cannot hold the redirection
    #[error("Target too small to patch")]
    TargetTooSmall,

    /// Target is already redirected to this detour
    #[error("Target already patched")]
    AlreadyPatched,

    /// Another transaction is open, or the target changed before commit
    #[error("Transaction conflict")]
    TransactionConflict,

    #[error("Out of memory")]
    OutOfMemory,

    /// Target address is null or not mapped
    #[error("Invalid target: {0:x}")]
    InvalidTarget(usize),

    #[error("Patch failed: {0}")]
    Unknown(String),
}

/// Transactional code patcher
///
/// Implementations must make a failed or aborted transaction leave every
/// target byte-for-byte unchanged.
pub trait CodePatcher: Send + Sync {
    /// Open a transaction owned by the calling thread
    fn begin(&self) -> Result<(), PatchError>;

    /// Record the calling thread so its instruction pointer is fixed up at commit
    fn update_thread(&self) -> Result<(), PatchError>;

    /// Queue a redirect of `target` to `detour`
    ///
    /// Returns the address that reaches the pre-patch code once committed.
    ///
    /// # Safety
    /// `target` must be a patch target this patcher understands and `detour`
    /// a function with the target's signature.
    unsafe fn attach(&self, target: usize, detour: usize) -> Result<usize, PatchError>;

    /// Queue removal of a redirect created by [`CodePatcher::attach`]
    ///
    /// # Safety
    /// The arguments must match a committed attach.
    unsafe fn detach(&self, target: usize, original: usize, detour: usize)
        -> Result<(), PatchError>;

    /// Apply every queued operation atomically
    fn commit(&self) -> Result<(), PatchError>;

    /// Discard the open transaction
    fn abort(&self);
}

/// Open transaction that aborts on drop unless committed
pub struct Transaction<'p> {
    patcher: &'p dyn CodePatcher,
    open: bool,
}

impl<'p> Transaction<'p> {
    pub fn begin(patcher: &'p dyn CodePatcher) -> Result<Self, PatchError> {
        patcher.begin()?;
        Ok(Self {
            patcher,
            open: true,
        })
    }

    pub fn update_thread(&self) -> Result<(), PatchError> {
        self.patcher.update_thread()
    }

    /// # Safety
    /// See [`CodePatcher::attach`].
    pub unsafe fn attach(&self, target: usize, detour: usize) -> Result<usize, PatchError> {
        self.patcher.attach(target, detour)
    }

    /// # Safety
    /// See [`CodePatcher::detach`].
    pub unsafe fn detach(
        &self,
        target: usize,
        original: usize,
        detour: usize,
    ) -> Result<(), PatchError> {
        self.patcher.detach(target, original, detour)
    }

    pub fn commit(mut self) -> Result<(), PatchError> {
        self.open = false;
        self.patcher.commit().inspect_err(|_| self.patcher.abort())
    }

    /// Abort explicitly; same as dropping
    pub fn abort(mut self) {
        self.open = false;
        self.patcher.abort();
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.open {
            self.patcher.abort();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedPatcher;
    use super::*;

    #[test]
    fn test_dropped_transaction_aborts() {
        let patcher = ScriptedPatcher::default();
        {
            let txn = Transaction::begin(&patcher).unwrap();
            txn.update_thread().unwrap();
        }
        assert_eq!(patcher.calls(), vec!["begin", "update_thread", "abort"]);
    }

    #[test]
    fn test_committed_transaction_does_not_abort() {
        let patcher = ScriptedPatcher::default();
        let txn = Transaction::begin(&patcher).unwrap();
        txn.commit().unwrap();
        assert_eq!(patcher.calls(), vec!["begin", "commit"]);
    }

    #[test]
    fn test_failed_commit_aborts() {
        let patcher = ScriptedPatcher {
            fail_commit: Some(PatchError::TransactionConflict),
            ..Default::default()
        };
        let txn = Transaction::begin(&patcher).unwrap();
        assert_eq!(txn.commit(), Err(PatchError::TransactionConflict));
        assert_eq!(patcher.calls(), vec!["begin", "commit", "abort"]);
    }

    #[test]
    fn test_failed_begin_never_aborts() {
        let patcher = ScriptedPatcher {
            fail_begin: Some(PatchError::TransactionConflict),
            ..Default::default()
        };
        assert!(Transaction::begin(&patcher).is_err());
        assert_eq!(patcher.calls(), vec!["begin"]);
    }
}
