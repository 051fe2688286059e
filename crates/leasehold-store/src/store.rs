//! Lease store client interface

use std::time::Duration;

use async_trait::async_trait;

use crate::model::{Lease, LeaseToken};

/// Transport or availability failure of the lease store itself.
///
/// A contended lease is not an error: `try_obtain` reports it as `Ok(None)`
/// and callers may keep polling. Errors here mean the store could not be
/// reached or answered out of protocol, and callers should fail fast instead.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("lease store unavailable: {0}")]
    Unavailable(String),

    #[error("lease store protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Client interface to a lease store
///
/// A lease store hands out time-bounded exclusive ownership of string keys,
/// backed by an atomic set-if-absent-with-expiry primitive. At most one live
/// lease exists per key at any instant; an unreleased lease is reclaimed
/// automatically once its ttl elapses, which protects against crashed holders.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Attempt to obtain the lease for `key` with the given validity.
    ///
    /// Returns a fresh ownership token when the key was free (or its previous
    /// lease had expired), `None` when a live lease is held by someone else.
    async fn try_obtain(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LeaseToken>, StoreError>;

    /// Release the lease identified by `token`.
    ///
    /// Idempotent. A stale or mismatched token is a no-op, so a caller can
    /// never destroy a lease that has since been handed to a different holder.
    async fn cancel(&self, key: &str, token: &LeaseToken) -> Result<(), StoreError>;

    /// Extend the expiry of a held lease by `ttl` from now.
    ///
    /// Returns `false` when `token` is no longer the current holder.
    async fn renew(
        &self,
        key: &str,
        token: &LeaseToken,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Whether a live lease currently exists for `key`
    async fn held(&self, key: &str) -> Result<bool, StoreError>;

    /// Snapshot of the current lease for diagnostics
    async fn current(&self, key: &str) -> Result<Option<Lease>, StoreError>;
}
