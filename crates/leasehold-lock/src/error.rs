//! Lock helper error types

use leasehold_store::StoreError;

/// Error surfaced by [`ExclusiveLock::in_lock`](crate::lock::ExclusiveLock::in_lock)
///
/// The three variants keep the failure modes of a critical section apart:
/// the lease was busy for the whole retry budget, the store itself was
/// unreachable, or the protected work failed after the lease was held.
#[derive(Debug, thiserror::Error)]
pub enum LockError<E>
where
    E: std::error::Error,
{
    /// Every acquisition attempt was refused. The unit of work never ran
    /// and the protected resource was not touched.
    #[error("failed to obtain lock '{key}' after {attempts} attempts")]
    FailedToObtainLock { key: String, attempts: u32 },

    /// The lease store failed during acquisition. Distinct from a busy
    /// lease, which is retried; a broken store fails fast.
    #[error("lease store error: {0}")]
    Store(#[from] StoreError),

    /// The unit of work itself failed while the lease was held. Surfaced
    /// unchanged, after the lease was released.
    #[error(transparent)]
    Work(E),
}
