//! Discovery document and JWKS endpoints.

use jsonwebtoken::jwk::JwkSet;
use oxidp_crypto::KeyPair;
use oxidp_model::Key;
use tracing::warn;

use crate::error::ProviderError;
use crate::provider::Provider;

impl Provider {
    /// Serializes the issuer metadata as the OIDC discovery document.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the issuer cannot be loaded.
    pub async fn discovery(&self, issuer_id: &str) -> Result<String, ProviderError> {
        let issuer = self.load_issuer(issuer_id).await?;
        serde_json::to_string_pretty(&issuer.meta)
            .map_err(|e| ProviderError::Internal(e.to_string()))
    }

    /// Builds the issuer's JWKS: the public half of the current and every
    /// reserved key of each populated key ring.
    ///
    /// A key that fails to load or convert is logged and skipped rather
    /// than failing the whole document.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the issuer cannot be loaded.
    pub async fn jwks(&self, issuer_id: &str) -> Result<JwkSet, ProviderError> {
        let issuer = self.load_issuer(issuer_id).await?;
        let mut keys = Vec::new();
        for (key_type, ring) in &issuer.key_rings {
            for key_id in ring.all_key_ids() {
                let stored = match self
                    .store
                    .get(&Key::probe(issuer_id, *key_type, key_id))
                    .await
                {
                    Ok(stored) => stored,
                    Err(err) => {
                        warn!(key_id, error = %err, "jwks: skipping unloadable key");
                        continue;
                    }
                };
                let pair = match KeyPair::from_pkcs8_der(stored.key_type, &stored.serialized_key) {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(key_id, error = %err, "jwks: skipping unparsable key");
                        continue;
                    }
                };
                match pair.public_jwk(key_id) {
                    Ok(jwk) => keys.push(jwk),
                    Err(err) => {
                        warn!(key_id, error = %err, "jwks: skipping unexportable key");
                    }
                }
            }
        }
        Ok(JwkSet { keys })
    }
}
