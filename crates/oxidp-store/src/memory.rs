//! In-memory backend with a TTL janitor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::Backend;

struct Row {
    data: Vec<u8>,
    expire_at: Option<i64>,
}

impl Row {
    fn expired(&self, now: i64) -> bool {
        self.expire_at.is_some_and(|at| at < now)
    }
}

/// In-memory key/value backend.
///
/// A single janitor task periodically deletes rows whose expiry has
/// passed; readers additionally treat expired rows as absent so TTL
/// semantics do not depend on janitor timing.
pub struct MemoryBackend {
    rows: Arc<Mutex<HashMap<String, Row>>>,
}

impl MemoryBackend {
    /// Creates a backend without a janitor, for embedding in tests.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Creates a backend and spawns the janitor on the current runtime.
    #[must_use]
    pub fn with_janitor(cleaning_window: Duration) -> Self {
        let backend = Self::new();
        let rows = Arc::clone(&backend.rows);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleaning_window);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let now = Utc::now().timestamp();
                let mut rows = rows.lock();
                let before = rows.len();
                rows.retain(|_, row| !row.expired(now));
                let evicted = before - rows.len();
                if evicted > 0 {
                    debug!(evicted, "janitor evicted expired rows");
                }
            }
        });
        backend
    }

    /// Number of live (non-expired) rows, for tests and diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Utc::now().timestamp();
        self.rows.lock().values().filter(|r| !r.expired(now)).count()
    }

    /// Returns whether the backend holds no live rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn create(&self, path: &str, data: Vec<u8>, expire_at: Option<i64>) -> StoreResult<()> {
        let now = Utc::now().timestamp();
        let mut rows = self.rows.lock();
        if rows.get(path).is_some_and(|row| !row.expired(now)) {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        rows.insert(path.to_string(), Row { data, expire_at });
        Ok(())
    }

    async fn set(&self, path: &str, data: Vec<u8>, expire_at: Option<i64>) -> StoreResult<()> {
        self.rows
            .lock()
            .insert(path.to_string(), Row { data, expire_at });
        Ok(())
    }

    async fn get(&self, path: &str) -> StoreResult<Vec<u8>> {
        let now = Utc::now().timestamp();
        let rows = self.rows.lock();
        match rows.get(path) {
            Some(row) if !row.expired(now) => Ok(row.data.clone()),
            _ => Err(StoreError::NotFound(path.to_string())),
        }
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        self.rows.lock().remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_fails_on_existing_key() {
        let backend = MemoryBackend::new();
        backend.create("k", b"1".to_vec(), None).await.unwrap();
        let err = backend.create("k", b"2".to_vec(), None).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn expired_rows_read_as_absent() {
        let backend = MemoryBackend::new();
        let past = Utc::now().timestamp() - 10;
        backend.create("k", b"1".to_vec(), Some(past)).await.unwrap();
        assert!(backend.get("k").await.unwrap_err().is_not_found());
        // An expired row does not block re-creation.
        backend.create("k", b"2".to_vec(), None).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), b"2".to_vec());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let backend = MemoryBackend::new();
        backend.delete("missing").await.unwrap();
        backend.create("k", b"1".to_vec(), None).await.unwrap();
        backend.delete("k").await.unwrap();
        backend.delete("k").await.unwrap();
        assert!(backend.get("k").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn janitor_evicts_expired_rows() {
        let backend = MemoryBackend::with_janitor(Duration::from_millis(10));
        let past = Utc::now().timestamp() - 10;
        backend.create("old", b"1".to_vec(), Some(past)).await.unwrap();
        backend.create("live", b"2".to_vec(), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.len(), 1);
        assert!(backend.get("live").await.is_ok());
    }
}
