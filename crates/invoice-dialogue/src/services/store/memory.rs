use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::SessionStore;
use crate::utils::error::DialogueError;

struct Entry {
    value: Bytes,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe in-memory session store with per-key expiry.
/// Expired entries are removed lazily on read or by [`cleanup_expired`].
///
/// [`cleanup_expired`]: MemorySessionStore::cleanup_expired
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    storage: Arc<DashMap<String, Entry>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        info!("Initializing in-memory session store with DashMap");
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Returns number of sessions removed
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let start_len = self.storage.len();
        self.storage.retain(|_, entry| !entry.is_expired(now));
        let count = start_len.saturating_sub(self.storage.len());

        if count > 0 {
            info!("Cleaned up {} expired sessions", count);
        }

        count
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, DialogueError> {
        let Some(entry) = self.storage.get(key) else {
            return Ok(None);
        };

        if entry.is_expired(Instant::now()) {
            drop(entry); // Release read lock
            self.storage.remove(key);
            debug!("Session {} expired, removed from store", key);
            return Ok(None);
        }

        Ok(Some(entry.value.clone()))
    }

    async fn set_ex(&self, key: &str, ttl: Duration, value: Bytes) -> Result<(), DialogueError> {
        self.storage.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        debug!("Updated session {} in store (ttl {:?})", key, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), DialogueError> {
        self.storage.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_basic_operations() {
        let store = MemorySessionStore::new();
        store
            .set_ex("k1", Duration::from_secs(60), Bytes::from_static(b"{}"))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);

        let value = store.get("k1").await.unwrap();
        assert_eq!(value.as_deref(), Some(&b"{}"[..]));

        store.delete("k1").await.unwrap();
        assert!(store.is_empty());
        assert!(store.get("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_gone() {
        let store = MemorySessionStore::new();
        store
            .set_ex("k1", Duration::ZERO, Bytes::from_static(b"{}"))
            .await
            .unwrap();
        assert!(store.get("k1").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let store = MemorySessionStore::new();
        store
            .set_ex("old", Duration::ZERO, Bytes::from_static(b"a"))
            .await
            .unwrap();
        store
            .set_ex("live", Duration::from_secs(60), Bytes::from_static(b"b"))
            .await
            .unwrap();
        assert_eq!(store.cleanup_expired(), 1);
        assert_eq!(store.len(), 1);
    }
}
