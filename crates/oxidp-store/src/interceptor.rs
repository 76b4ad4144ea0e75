//! Typed write interceptors.
//!
//! An interceptor registered for a value type runs after every successful
//! `create`/`set` of that type. The registry is keyed by `TypeId`, so
//! dispatch is a typed map lookup, not string matching. The provider uses
//! this to maintain the token side-indexes that make mass revocation a
//! simple key-list walk.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::store::ObjectStore;

/// A hook running after every write of `T`.
///
/// Interceptor failures must not fail the triggering write; implementations
/// log and swallow their own errors.
#[async_trait]
pub trait WriteInterceptor<T>: Send + Sync {
    /// Called after `value` was persisted.
    async fn on_write(&self, store: &ObjectStore, value: &T);
}

type InterceptorList<T> = Vec<Arc<dyn WriteInterceptor<T>>>;

/// Registry of write interceptors, keyed by value type.
#[derive(Default)]
pub struct InterceptorRegistry {
    entries: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl InterceptorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an interceptor for writes of `T`.
    pub fn register<T: 'static>(&mut self, interceptor: Arc<dyn WriteInterceptor<T>>) {
        self.entries
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(InterceptorList::<T>::new()))
            .downcast_mut::<InterceptorList<T>>()
            .expect("registry entry type matches its key")
            .push(interceptor);
    }

    /// Runs every interceptor registered for `T`.
    pub(crate) async fn dispatch<T: 'static>(&self, store: &ObjectStore, value: &T) {
        let Some(entry) = self.entries.get(&TypeId::of::<T>()) else {
            return;
        };
        let Some(list) = entry.downcast_ref::<InterceptorList<T>>() else {
            return;
        };
        for interceptor in list {
            interceptor.on_write(store, value).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::store::{Expirable, Pathable};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Serialize, Deserialize)]
    struct Row {
        id: String,
    }

    impl Pathable for Row {
        fn path(&self) -> String {
            format!("rows/{}", self.id)
        }
    }

    impl Expirable for Row {
        fn expire_at_unix(&self) -> Option<i64> {
            None
        }
    }

    struct Counter(AtomicUsize);

    #[async_trait]
    impl WriteInterceptor<Row> for Counter {
        async fn on_write(&self, _store: &ObjectStore, _value: &Row) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn interceptor_runs_on_create_and_set() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let mut registry = InterceptorRegistry::new();
        registry.register::<Row>(counter.clone());
        let store = ObjectStore::with_interceptors(Arc::new(MemoryBackend::new()), registry);

        let row = Row {
            id: "a".to_string(),
        };
        store.create(&row).await.unwrap();
        store.set(&row).await.unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unregistered_type_dispatches_nothing() {
        let store = ObjectStore::new(Arc::new(MemoryBackend::new()));
        let row = Row {
            id: "b".to_string(),
        };
        store.create(&row).await.unwrap();
    }
}
