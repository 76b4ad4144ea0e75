//! Token side-indexing and the default mass-revocation callbacks.
//!
//! Every persisted [`TokenIdentifier`] is recorded under its request id
//! and (when present) its session id, so revoking "everything minted for
//! this request/session" is one link read plus a delete per identifier.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use oxidp_model::{TokenIdentifier, TokenIdentifierLink};
use oxidp_store::{
    Backend, InterceptorRegistry, ObjectStore, StoreResult, WriteInterceptor,
};
use tracing::warn;

use crate::callbacks::ProviderCallbacks;

/// Write interceptor maintaining the request/session side-indexes.
pub struct TokenLinkInterceptor;

#[async_trait]
impl WriteInterceptor<TokenIdentifier> for TokenLinkInterceptor {
    async fn on_write(&self, store: &ObjectStore, token: &TokenIdentifier) {
        let now = Utc::now();
        let issuer_id = &token.authorized.issuer_id;

        if !token.authorized.request_id.is_empty() {
            let probe = TokenIdentifierLink::for_request(issuer_id, &token.authorized.request_id);
            let mut link = store.get(&probe).await.unwrap_or(probe);
            link.push(&token.identifier, now);
            if let Err(err) = store.set(&link).await {
                warn!(error = %err, "failed to record request token link");
            }
        }

        if !token.authorized.session_id.is_empty() {
            let probe = TokenIdentifierLink::for_session(issuer_id, &token.authorized.session_id);
            let mut link = store.get(&probe).await.unwrap_or(probe);
            link.push(&token.identifier, now);
            if let Err(err) = store.set(&link).await {
                warn!(error = %err, "failed to record session token link");
            }
        }
    }
}

/// [`ProviderCallbacks`] implementation over the side-indexes.
pub struct SideIndexCallbacks {
    store: ObjectStore,
}

impl SideIndexCallbacks {
    /// Creates the callbacks over the same store the provider uses.
    #[must_use]
    pub fn new(store: ObjectStore) -> Self {
        Self { store }
    }

    async fn delete_linked(&self, issuer_id: &str, link: TokenIdentifierLink) -> StoreResult<()> {
        let link = match self.store.get(&link).await {
            Ok(link) => link,
            // Nothing recorded means nothing to revoke.
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        };
        for identifier in &link.list {
            self.store
                .delete(&TokenIdentifier::probe(issuer_id, identifier))
                .await?;
        }
        self.store.delete(&link).await
    }
}

#[async_trait]
impl ProviderCallbacks for SideIndexCallbacks {
    async fn delete_tokens_with_request_id(
        &self,
        issuer_id: &str,
        request_id: &str,
    ) -> StoreResult<()> {
        self.delete_linked(
            issuer_id,
            TokenIdentifierLink::for_request(issuer_id, request_id),
        )
        .await
    }

    async fn delete_tokens_with_session_id(
        &self,
        issuer_id: &str,
        session_id: &str,
    ) -> StoreResult<()> {
        self.delete_linked(
            issuer_id,
            TokenIdentifierLink::for_session(issuer_id, session_id),
        )
        .await
    }
}

/// Builds an [`ObjectStore`] with the token side-indexing interceptor
/// registered, plus the matching revocation callbacks.
#[must_use]
pub fn side_indexed_store(backend: Arc<dyn Backend>) -> (ObjectStore, Arc<SideIndexCallbacks>) {
    let mut registry = InterceptorRegistry::new();
    registry.register::<TokenIdentifier>(Arc::new(TokenLinkInterceptor));
    let store = ObjectStore::with_interceptors(backend, registry);
    let callbacks = Arc::new(SideIndexCallbacks::new(store.clone()));
    (store, callbacks)
}
