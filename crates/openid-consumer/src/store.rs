//! Association store and nonce ledger
//!
//! The verifier reads associations from, and records nonces in, an
//! [`OpenIdStore`]. Implementations must make [`OpenIdStore::use_nonce`]
//! atomic: two concurrent calls with the same nonce must not both succeed.

use crate::association::Association;
use crate::nonce::Nonce;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::Duration;
use tracing::debug;

/// Persistent association and nonce storage
#[async_trait]
pub trait OpenIdStore: Send + Sync + std::fmt::Debug {
    /// Store an association for `server_url`
    async fn store_association(&self, server_url: &str, association: Association);

    /// Look up an association by server URL and handle
    async fn get_association(&self, server_url: &str, handle: &str) -> Option<Association>;

    /// Remove an association; returns whether one was removed
    async fn remove_association(&self, server_url: &str, handle: &str) -> bool;

    /// Atomically check and record a nonce.
    ///
    /// Returns `false` if the nonce was already used for `server_url` or its
    /// timestamp is outside the store's accepted window.
    async fn use_nonce(&self, server_url: &str, timestamp: i64, salt: &str) -> bool;
}

/// In-memory [`OpenIdStore`]
///
/// Suitable for a single process; associations and nonces are lost on restart.
#[derive(Debug)]
pub struct MemoryStore {
    associations: DashMap<(String, String), Association>,
    nonces: DashMap<(String, i64, String), ()>,
    skew: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a store accepting nonces within [`crate::nonce::DEFAULT_SKEW`]
    pub fn new() -> Self {
        Self::with_skew(crate::nonce::DEFAULT_SKEW)
    }

    /// Create a store with a custom nonce window
    pub fn with_skew(skew: Duration) -> Self {
        Self {
            associations: DashMap::new(),
            nonces: DashMap::new(),
            skew,
        }
    }

    /// Record a nonce as of `now`
    pub fn use_nonce_at(&self, server_url: &str, timestamp: i64, salt: &str, now: DateTime<Utc>) -> bool {
        let in_window = DateTime::from_timestamp(timestamp, 0)
            .is_some_and(|issued| Nonce::new(issued, salt).is_within(self.skew, now));
        if !in_window {
            debug!(server_url = server_url, timestamp = timestamp, "Nonce outside accepted window");
            return false;
        }
        match self
            .nonces
            .entry((server_url.to_string(), timestamp, salt.to_string()))
        {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(());
                true
            }
        }
    }

    /// Drop nonces that fell out of the window and expired associations.
    ///
    /// Returns `(nonces_removed, associations_removed)`.
    pub fn cleanup_at(&self, now: DateTime<Utc>) -> (usize, usize) {
        let skew = i64::try_from(self.skew.as_secs()).unwrap_or(i64::MAX);
        let horizon = now.timestamp().saturating_sub(skew);

        let nonces_before = self.nonces.len();
        self.nonces.retain(|(_, timestamp, _), _| *timestamp >= horizon);

        let associations_before = self.associations.len();
        let now = std::time::SystemTime::from(now);
        self.associations
            .retain(|_, association| association.expires_in_at(now) > 0);

        (
            nonces_before - self.nonces.len(),
            associations_before - self.associations.len(),
        )
    }

    /// Number of recorded nonces
    pub fn nonce_count(&self) -> usize {
        self.nonces.len()
    }
}

#[async_trait]
impl OpenIdStore for MemoryStore {
    async fn store_association(&self, server_url: &str, association: Association) {
        self.associations.insert(
            (server_url.to_string(), association.handle().to_string()),
            association,
        );
    }

    async fn get_association(&self, server_url: &str, handle: &str) -> Option<Association> {
        self.associations
            .get(&(server_url.to_string(), handle.to_string()))
            .map(|entry| entry.value().clone())
    }

    async fn remove_association(&self, server_url: &str, handle: &str) -> bool {
        self.associations
            .remove(&(server_url.to_string(), handle.to_string()))
            .is_some()
    }

    async fn use_nonce(&self, server_url: &str, timestamp: i64, salt: &str) -> bool {
        self.use_nonce_at(server_url, timestamp, salt, Utc::now())
    }
}
