//! # oxidp-store
//!
//! Storage abstraction for the oxidp OpenID Provider.
//!
//! The provider core treats persistence as a keyed object store with a
//! small CRUD+TTL contract: values know their own key ([`Pathable`]) and
//! optionally their expiry ([`Expirable`]); backends implement [`Backend`]
//! over raw bytes; [`ObjectStore`] adds typed serialization and write
//! interceptors on top. An in-memory backend with a TTL janitor ships for
//! embedding and tests; production deployments bring their own backend.

#![forbid(unsafe_code)]

pub mod error;
pub mod interceptor;
pub mod memory;
pub mod retry;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use interceptor::{InterceptorRegistry, WriteInterceptor};
pub use memory::MemoryBackend;
pub use retry::retry_if_error;
pub use store::{Backend, Expirable, ObjectStore, Pathable, Storable};
