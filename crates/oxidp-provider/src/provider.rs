//! The provider engine and its shared plumbing.

use std::sync::Arc;
use std::time::Duration;

use oxidp_model::{Client, Issuer};
use oxidp_store::{retry_if_error, ObjectStore, StoreError};

use crate::callbacks::{ProviderCallbacks, SdkCallbacks};
use crate::error::ProviderError;

/// Attempts for retried store operations.
pub(crate) const RETRY_COUNT: u32 = 5;

/// Timeout applied to outbound fetches (`request_uri`, `jwks_uri`,
/// `sector_identifier_uri`).
const OUTBOUND_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// The OpenID Provider engine.
///
/// One instance serves every configured issuer; endpoints take the issuer
/// id alongside the request. Construction wires the three external
/// collaborators together: the object store, the provider callbacks
/// (token revocation) and the SDK callbacks (user claims, login UI).
pub struct Provider {
    pub(crate) store: ObjectStore,
    pub(crate) provider_callbacks: Arc<dyn ProviderCallbacks>,
    pub(crate) sdk_callbacks: Arc<dyn SdkCallbacks>,
    pub(crate) http: reqwest::Client,
}

impl Provider {
    /// Creates a provider over the given store and callbacks.
    #[must_use]
    pub fn new(
        store: ObjectStore,
        provider_callbacks: Arc<dyn ProviderCallbacks>,
        sdk_callbacks: Arc<dyn SdkCallbacks>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(OUTBOUND_HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            store,
            provider_callbacks,
            sdk_callbacks,
            http,
        }
    }

    /// Returns the underlying object store.
    #[must_use]
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Loads an issuer, mapping an absent row to [`ProviderError::NotFound`].
    pub(crate) async fn load_issuer(&self, issuer_id: &str) -> Result<Issuer, ProviderError> {
        match self.store.get(&Issuer::probe(issuer_id)).await {
            Ok(issuer) => Ok(issuer),
            Err(StoreError::NotFound(_)) => {
                Err(ProviderError::NotFound(format!("issuer {issuer_id}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Loads a client of an issuer.
    pub(crate) async fn load_client(
        &self,
        issuer_id: &str,
        client_id: &str,
    ) -> Result<Client, StoreError> {
        self.store.get(&Client::probe(issuer_id, client_id)).await
    }

    /// Loads a record with the standard bounded retry.
    pub(crate) async fn get_with_retry<T: oxidp_store::Storable>(
        &self,
        probe: &T,
    ) -> Result<T, StoreError> {
        retry_if_error(RETRY_COUNT, || self.store.get(probe)).await
    }

    /// Fetches a URL body with the shared outbound HTTP client.
    pub(crate) async fn fetch_text(&self, url: &str) -> Result<String, String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        response.text().await.map_err(|e| e.to_string())
    }
}
