//! Leasehold Lock - exclusive critical sections over a lease store
//!
//! This crate provides:
//! - `ExclusiveLock`, a helper that runs a unit of work while holding an
//!   exclusive lease for a named resource
//! - Bounded polling acquisition with configurable ttl, retry count and
//!   retry interval
//! - Guaranteed lease release on every exit path, with ttl expiry as the
//!   backstop for crashed or cancelled holders
//!
//! At most one of the competing callers for a key runs its unit of work at
//! any instant, across threads and across processes sharing the same store.
//! Callers that cannot obtain the lease within their retry budget receive
//! [`LockError::FailedToObtainLock`] and their work is never started.

pub mod error;
pub mod lock;
pub mod options;

// Re-exports for convenience
pub use error::LockError;
pub use lock::ExclusiveLock;
pub use options::{DEFAULT_RETRIES, DEFAULT_RETRY_INTERVAL, DEFAULT_TTL, LockOptions};
