//! Identity cache: sanitized user snapshots keyed by user id.
//!
//! Entries never expire on their own; they are overwritten on every
//! write-through and removed explicitly (logout, invalidation). Concurrent
//! writers race last-writer-wins.

use async_trait::async_trait;
use dashmap::DashMap;

use super::AuthError;

/// Key-value store of JSON identity snapshots.
///
/// A missing entry is `Ok(None)`, never an error.
#[async_trait]
pub trait IdentityCache: Send + Sync {
    /// Fetch the raw snapshot stored for `user_id`.
    async fn get(&self, user_id: &str) -> Result<Option<String>, AuthError>;

    /// Store `snapshot` for `user_id`, replacing any previous entry.
    async fn set(&self, user_id: &str, snapshot: String) -> Result<(), AuthError>;

    /// Remove the entry for `user_id` if present.
    async fn delete(&self, user_id: &str) -> Result<(), AuthError>;
}

/// In-process cache backed by a `DashMap`.
#[derive(Debug, Default)]
pub struct MemoryIdentityCache {
    entries: DashMap<String, String>,
}

impl MemoryIdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached snapshots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl IdentityCache for MemoryIdentityCache {
    async fn get(&self, user_id: &str) -> Result<Option<String>, AuthError> {
        Ok(self.entries.get(user_id).map(|entry| entry.value().clone()))
    }

    async fn set(&self, user_id: &str, snapshot: String) -> Result<(), AuthError> {
        self.entries.insert(user_id.to_string(), snapshot);
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<(), AuthError> {
        self.entries.remove(user_id);
        Ok(())
    }
}
