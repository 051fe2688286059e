//! Lease data model

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque proof of ownership for a single lease acquisition.
///
/// A fresh token is minted for every successful acquisition and is required
/// to release or renew that specific lease. Tokens are never reused, so a
/// holder whose lease expired cannot touch the lease a later holder obtained
/// under the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseToken(String);

impl LeaseToken {
    /// Mint a new unique token
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for LeaseToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for LeaseToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Snapshot of a live lease.
///
/// Diagnostic view only. Mutual exclusion is decided by the store's atomic
/// acquire primitive, never by reading a snapshot and acting on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    /// Key of the protected resource
    pub key: String,
    /// Token held by the current owner
    pub token: LeaseToken,
    /// Expiration timestamp (Unix millis)
    pub expires_at: i64,
}
