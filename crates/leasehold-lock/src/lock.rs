//! Exclusive lock helper
//!
//! Runs a caller-supplied unit of work while holding an exclusive lease,
//! retrying acquisition with a bounded polling loop and releasing the lease
//! on every exit path. The lease store is the single source of truth for
//! mutual exclusion; this helper keeps no shared state across invocations
//! and offers no in-process fast path, so callers in one process compete
//! exactly like callers in different processes.

use std::future::Future;
use std::sync::Arc;

use leasehold_store::{LeaseStore, LeaseToken};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::LockError;
use crate::options::LockOptions;

/// Critical-section helper over a lease store
///
/// Cloning is cheap; clones share the underlying store client.
pub struct ExclusiveLock<S> {
    store: Arc<S>,
}

impl<S> Clone for ExclusiveLock<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S> ExclusiveLock<S>
where
    S: LeaseStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Run `work` while holding the exclusive lease for `key`.
    ///
    /// `key` must be non-empty and identical across all callers competing
    /// for the same resource. The calling task blocks until the lease is
    /// obtained or `options.retries` re-attempts have been refused, sleeping
    /// `options.retry_interval` between attempts; it then blocks again for
    /// the duration of `work`. No fairness is guaranteed between competing
    /// callers beyond mutual exclusion itself.
    ///
    /// `work` runs at most once, and only while the lease is held. Its error
    /// is surfaced unchanged as [`LockError::Work`] after the lease has been
    /// released; release is never skipped because the work failed. A release
    /// that fails on the store side is logged and otherwise ignored, since
    /// the lease expires via its ttl anyway.
    ///
    /// If the returned future is dropped before `work` completes, the lease
    /// is cancelled on a best-effort background task when a runtime is still
    /// available; otherwise it is left to expire via its ttl.
    pub async fn in_lock<F, Fut, T, E>(
        &self,
        key: &str,
        options: LockOptions,
        work: F,
    ) -> Result<T, LockError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error,
    {
        let attempts = options.retries.saturating_add(1);
        let mut remaining = options.retries;

        let token = loop {
            match self.store.try_obtain(key, options.ttl).await? {
                Some(token) => break token,
                None if remaining > 0 => {
                    remaining -= 1;
                    debug!(key = %key, remaining = remaining, "lease busy, retrying");
                    tokio::time::sleep(options.retry_interval).await;
                }
                None => {
                    debug!(key = %key, attempts = attempts, "giving up on lease");
                    return Err(LockError::FailedToObtainLock {
                        key: key.to_string(),
                        attempts,
                    });
                }
            }
        };

        debug!(key = %key, token = %token, "lease held, entering critical section");
        let held = HeldLease::new(self.store.clone(), key, token);

        let result = work().await;

        held.release().await;

        result.map_err(LockError::Work)
    }
}

/// Lease held for the duration of one critical section.
///
/// Released explicitly once the work has finished. If dropped without
/// release (the enclosing future was cancelled, or the work panicked) it
/// schedules a background cancel when a runtime is available and otherwise
/// leaves the lease to expire via its ttl.
struct HeldLease<S>
where
    S: LeaseStore + 'static,
{
    store: Arc<S>,
    key: String,
    token: Option<LeaseToken>,
}

impl<S> HeldLease<S>
where
    S: LeaseStore + 'static,
{
    fn new(store: Arc<S>, key: &str, token: LeaseToken) -> Self {
        Self {
            store,
            key: key.to_string(),
            token: Some(token),
        }
    }

    async fn release(mut self) {
        if let Some(token) = self.token.take() {
            match self.store.cancel(&self.key, &token).await {
                Ok(()) => debug!(key = %self.key, "lease released"),
                Err(err) => {
                    warn!(key = %self.key, error = %err, "lease release failed, waiting for ttl expiry");
                }
            }
        }
    }
}

impl<S> Drop for HeldLease<S>
where
    S: LeaseStore + 'static,
{
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);

        match Handle::try_current() {
            Ok(handle) => {
                warn!(key = %key, "critical section dropped mid-flight, releasing lease in background");
                handle.spawn(async move {
                    if let Err(err) = store.cancel(&key, &token).await {
                        warn!(key = %key, error = %err, "background lease release failed, waiting for ttl expiry");
                    }
                });
            }
            Err(_) => {
                warn!(key = %key, "no runtime to release dropped lease, waiting for ttl expiry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use leasehold_store::{Lease, StoreError};
    use tokio::time::Instant;

    #[derive(Debug, PartialEq, thiserror::Error)]
    #[error("{0}")]
    struct WorkFailed(&'static str);

    /// Store double that refuses the first `refusals` obtain calls and
    /// records everything handed out or cancelled.
    struct ScriptedStore {
        refusals: u32,
        broken: bool,
        obtain_calls: AtomicU32,
        handed: Mutex<Option<LeaseToken>>,
        cancelled: Mutex<Vec<(String, LeaseToken)>>,
    }

    impl ScriptedStore {
        fn refusing(refusals: u32) -> Self {
            Self {
                refusals,
                broken: false,
                obtain_calls: AtomicU32::new(0),
                handed: Mutex::new(None),
                cancelled: Mutex::new(Vec::new()),
            }
        }

        fn broken() -> Self {
            Self {
                broken: true,
                ..Self::refusing(0)
            }
        }

        fn obtain_calls(&self) -> u32 {
            self.obtain_calls.load(Ordering::SeqCst)
        }

        fn cancelled(&self) -> Vec<(String, LeaseToken)> {
            self.cancelled.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LeaseStore for ScriptedStore {
        async fn try_obtain(
            &self,
            _key: &str,
            _ttl: Duration,
        ) -> Result<Option<LeaseToken>, StoreError> {
            let call = self.obtain_calls.fetch_add(1, Ordering::SeqCst);
            if self.broken {
                return Err(StoreError::Unavailable("connection refused".to_string()));
            }
            if call < self.refusals {
                return Ok(None);
            }
            let token = LeaseToken::generate();
            *self.handed.lock().unwrap() = Some(token.clone());
            Ok(Some(token))
        }

        async fn cancel(&self, key: &str, token: &LeaseToken) -> Result<(), StoreError> {
            self.cancelled
                .lock()
                .unwrap()
                .push((key.to_string(), token.clone()));
            Ok(())
        }

        async fn renew(
            &self,
            _key: &str,
            _token: &LeaseToken,
            _ttl: Duration,
        ) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn held(&self, _key: &str) -> Result<bool, StoreError> {
            Ok(self.handed.lock().unwrap().is_some())
        }

        async fn current(&self, _key: &str) -> Result<Option<Lease>, StoreError> {
            Ok(None)
        }
    }

    fn fast_options(retries: u32) -> LockOptions {
        LockOptions::new()
            .with_ttl(Duration::from_secs(1))
            .with_retries(retries)
            .with_retry_interval(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_first_attempt_success_runs_work_and_releases() {
        let store = Arc::new(ScriptedStore::refusing(0));
        let lock = ExclusiveLock::new(store.clone());

        let value = lock
            .in_lock("job:42", fast_options(0), || async { Ok::<_, WorkFailed>(7) })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(store.obtain_calls(), 1);

        let cancelled = store.cancelled();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].0, "job:42");
        let handed = store.handed.lock().unwrap().clone().unwrap();
        assert_eq!(cancelled[0].1, handed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fail_without_running_work() {
        let store = Arc::new(ScriptedStore::refusing(u32::MAX));
        let lock = ExclusiveLock::new(store.clone());
        let ran = AtomicBool::new(false);

        let started = Instant::now();
        let err = lock
            .in_lock("job:42", fast_options(2), || async {
                ran.store(true, Ordering::SeqCst);
                Ok::<_, WorkFailed>(())
            })
            .await
            .unwrap_err();

        match err {
            LockError::FailedToObtainLock { key, attempts } => {
                assert_eq!(key, "job:42");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(store.obtain_calls(), 3);
        assert!(store.cancelled().is_empty());

        // Two sleeps between the three attempts on the paused clock
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(20));
        assert!(elapsed < Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_work_error_propagates_after_release() {
        let store = Arc::new(ScriptedStore::refusing(0));
        let lock = ExclusiveLock::new(store.clone());

        let err = lock
            .in_lock("job:42", fast_options(5), || async {
                Err::<(), _>(WorkFailed("bad state"))
            })
            .await
            .unwrap_err();

        match err {
            LockError::Work(inner) => assert_eq!(inner, WorkFailed("bad state")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.cancelled().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_contention_clears() {
        let store = Arc::new(ScriptedStore::refusing(2));
        let lock = ExclusiveLock::new(store.clone());

        let value = lock
            .in_lock("job:42", fast_options(10), || async {
                Ok::<_, WorkFailed>("done")
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(store.obtain_calls(), 3);
        assert_eq!(store.cancelled().len(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_fails_fast() {
        let store = Arc::new(ScriptedStore::broken());
        let lock = ExclusiveLock::new(store.clone());
        let ran = AtomicBool::new(false);

        let err = lock
            .in_lock("job:42", fast_options(10), || async {
                ran.store(true, Ordering::SeqCst);
                Ok::<_, WorkFailed>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LockError::Store(_)));
        assert!(!ran.load(Ordering::SeqCst));
        // A broken store is not retried like a busy lease
        assert_eq!(store.obtain_calls(), 1);
        assert!(store.cancelled().is_empty());
    }
}
