//! In-memory lease store
//!
//! Single-process implementation of [`LeaseStore`] using DashMap. Atomicity
//! comes from the per-key map entry, expiry from the tokio clock so the store
//! stays deterministic under a paused test runtime. Expired entries are
//! treated as absent by every operation; the optional background scanner only
//! reclaims the memory they occupy.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::debug;

use crate::model::{Lease, LeaseToken};
use crate::store::{LeaseStore, StoreError};

/// A live lease entry
struct LeaseEntry {
    token: LeaseToken,
    acquired_at: Instant,
    ttl: Duration,
    expires_at_ms: i64,
}

impl LeaseEntry {
    fn new(ttl: Duration) -> Self {
        Self {
            token: LeaseToken::generate(),
            acquired_at: Instant::now(),
            ttl,
            expires_at_ms: unix_millis() + ttl.as_millis() as i64,
        }
    }

    fn is_expired(&self) -> bool {
        self.acquired_at.elapsed() > self.ttl
    }
}

/// In-memory lease store using DashMap
pub struct MemoryLeaseStore {
    leases: Arc<DashMap<String, LeaseEntry>>,
    _scanner_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Default for MemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self {
            leases: Arc::new(DashMap::new()),
            _scanner_handle: None,
        }
    }

    /// Start a background task that removes expired entries on the given
    /// interval and publishes the alive-count gauge. Must be called from
    /// within a tokio runtime.
    pub fn with_expiry_scanner(self, interval: Duration) -> Self {
        let leases = self.leases.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                Self::scan_expired(&leases);
            }
        });

        Self {
            leases: self.leases,
            _scanner_handle: Some(handle),
        }
    }

    fn scan_expired(leases: &Arc<DashMap<String, LeaseEntry>>) {
        let expired_keys: Vec<String> = leases
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();

        for key in &expired_keys {
            // Re-check under the entry lock so a lease re-acquired after the
            // snapshot above is left alone
            leases.remove_if(key, |_, entry| entry.is_expired());
        }

        metrics::gauge!("leasehold_leases_alive").set(leases.len() as f64);

        if !expired_keys.is_empty() {
            debug!(count = expired_keys.len(), "reclaimed expired lease entries");
        }
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn try_obtain(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LeaseToken>, StoreError> {
        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_expired() {
                    return Ok(None);
                }
                let fresh = LeaseEntry::new(ttl);
                let token = fresh.token.clone();
                entry.insert(fresh);
                debug!(key = %key, token = %token, "lease obtained after expiry");
                Ok(Some(token))
            }
            Entry::Vacant(entry) => {
                let fresh = LeaseEntry::new(ttl);
                let token = fresh.token.clone();
                entry.insert(fresh);
                debug!(key = %key, token = %token, "lease obtained");
                Ok(Some(token))
            }
        }
    }

    async fn cancel(&self, key: &str, token: &LeaseToken) -> Result<(), StoreError> {
        let removed = self.leases.remove_if(key, |_, entry| entry.token == *token);
        if removed.is_some() {
            debug!(key = %key, "lease cancelled");
        }
        Ok(())
    }

    async fn renew(
        &self,
        key: &str,
        token: &LeaseToken,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        if let Some(mut entry) = self.leases.get_mut(key)
            && entry.token == *token
            && !entry.is_expired()
        {
            entry.acquired_at = Instant::now();
            entry.ttl = ttl;
            entry.expires_at_ms = unix_millis() + ttl.as_millis() as i64;
            debug!(key = %key, "lease renewed");
            return Ok(true);
        }
        Ok(false)
    }

    async fn held(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .leases
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false))
    }

    async fn current(&self, key: &str) -> Result<Option<Lease>, StoreError> {
        Ok(self.leases.get(key).and_then(|entry| {
            if entry.is_expired() {
                return None;
            }
            Some(Lease {
                key: key.to_string(),
                token: entry.token.clone(),
                expires_at: entry.expires_at_ms,
            })
        }))
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
