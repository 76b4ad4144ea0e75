//! Capability traits, raw backend contract and the typed facade.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};
use crate::interceptor::InterceptorRegistry;

/// A value that knows its own store key.
pub trait Pathable {
    /// Returns the store key of this value.
    fn path(&self) -> String;
}

/// A value with a hard TTL.
///
/// Rows whose expiry lies in the past are eligible for eviction and must
/// be treated as absent by all readers.
pub trait Expirable {
    /// Expiry as Unix seconds, or `None` for rows that never expire.
    fn expire_at_unix(&self) -> Option<i64>;
}

/// A storable value: keyed, serializable and optionally expiring.
pub trait Storable: Pathable + Expirable + Serialize + DeserializeOwned + Send + Sync {}

impl<T: Pathable + Expirable + Serialize + DeserializeOwned + Send + Sync> Storable for T {}

/// Raw byte-level store contract implemented by backends.
///
/// Operations are atomic per key. `create` fails with
/// [`StoreError::AlreadyExists`] when the key is taken; `delete` is
/// idempotent.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Creates a row; fails when the key already exists.
    async fn create(&self, path: &str, data: Vec<u8>, expire_at: Option<i64>) -> StoreResult<()>;

    /// Creates or replaces a row.
    async fn set(&self, path: &str, data: Vec<u8>, expire_at: Option<i64>) -> StoreResult<()>;

    /// Reads a row; expired rows read as absent.
    async fn get(&self, path: &str) -> StoreResult<Vec<u8>>;

    /// Deletes a row; absent rows are not an error.
    async fn delete(&self, path: &str) -> StoreResult<()>;
}

/// Typed facade over a [`Backend`] with write interceptors.
///
/// Cloning is cheap; all clones share the backend and registry.
#[derive(Clone)]
pub struct ObjectStore {
    backend: Arc<dyn Backend>,
    interceptors: Arc<InterceptorRegistry>,
}

impl ObjectStore {
    /// Creates a facade without interceptors.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            interceptors: Arc::new(InterceptorRegistry::new()),
        }
    }

    /// Creates a facade with a pre-built interceptor registry.
    #[must_use]
    pub fn with_interceptors(backend: Arc<dyn Backend>, interceptors: InterceptorRegistry) -> Self {
        Self {
            backend,
            interceptors: Arc::new(interceptors),
        }
    }

    /// Creates a typed value; fails when its key already exists.
    ///
    /// # Errors
    ///
    /// Propagates backend and serialization errors.
    pub async fn create<T: Storable + 'static>(&self, value: &T) -> StoreResult<()> {
        let data = encode(value)?;
        self.backend
            .create(&value.path(), data, value.expire_at_unix())
            .await?;
        self.interceptors.dispatch(self, value).await;
        Ok(())
    }

    /// Creates or replaces a typed value.
    ///
    /// # Errors
    ///
    /// Propagates backend and serialization errors.
    pub async fn set<T: Storable + 'static>(&self, value: &T) -> StoreResult<()> {
        let data = encode(value)?;
        self.backend
            .set(&value.path(), data, value.expire_at_unix())
            .await?;
        self.interceptors.dispatch(self, value).await;
        Ok(())
    }

    /// Loads the stored value behind `probe`'s key.
    ///
    /// The probe carries only the key fields; the returned value is the
    /// fully hydrated row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for absent or expired rows.
    pub async fn get<T: Storable>(&self, probe: &T) -> StoreResult<T> {
        let data = self.backend.get(&probe.path()).await?;
        decode(&data)
    }

    /// Loads a value by its raw key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for absent or expired rows.
    pub async fn get_path<T: Storable>(&self, path: &str) -> StoreResult<T> {
        let data = self.backend.get(path).await?;
        decode(&data)
    }

    /// Deletes the row behind `probe`'s key; absent rows are fine.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub async fn delete<T: Storable>(&self, probe: &T) -> StoreResult<()> {
        self.backend.delete(&probe.path()).await
    }

    /// Deletes a row by its raw key.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub async fn delete_path(&self, path: &str) -> StoreResult<()> {
        self.backend.delete(path).await
    }
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(data: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(data).map_err(|e| StoreError::Serialization(e.to_string()))
}
