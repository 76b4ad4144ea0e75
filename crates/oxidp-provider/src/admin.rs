//! Issuer, client, session-group and key administration.

use oxidp_crypto::{KeyType, SigningAlgorithm};
use oxidp_model::{
    Client, Issuer, IssuerAttributes, IssuerMeta, IssuerSecret, KeyRing, Request, SessionGroup,
    SessionGroupAttributes,
};
use oxidp_store::StoreError;
use std::collections::BTreeSet;

use crate::callbacks::RequestInfo;
use crate::error::ProviderError;
use crate::provider::Provider;

/// Parameters for creating an issuer.
#[derive(Debug, Clone)]
pub struct IssuerConfig {
    /// Unique issuer id.
    pub id: String,
    /// Issuer password.
    pub password: String,
    /// Discovery metadata.
    pub meta: IssuerMeta,
    /// Tenant toggles.
    pub attributes: IssuerAttributes,
}

impl Provider {
    /// Creates an issuer, validating its metadata and provisioning one
    /// signing key per key type implied by the advertised algorithms.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidArgument`] for incomplete metadata
    /// and store/key errors otherwise.
    pub async fn create_issuer(&self, config: IssuerConfig) -> Result<Issuer, ProviderError> {
        let mut meta = config.meta;
        meta.validate_and_complete()
            .map_err(|e| ProviderError::InvalidArgument(e.to_string()))?;

        let mut issuer = Issuer {
            id: config.id,
            secret: IssuerSecret {
                password: config.password,
            },
            meta,
            attributes: config.attributes,
            key_rings: Default::default(),
        };

        // One key per key type reachable from the advertised signing
        // algorithms (ID Token, JARM, userinfo).
        let mut key_types = BTreeSet::new();
        let advertised = issuer
            .meta
            .id_token_signing_alg_values_supported
            .iter()
            .chain(issuer.meta.authorization_signing_alg_values_supported.iter())
            .chain(issuer.meta.userinfo_signing_alg_values_supported.iter());
        for name in advertised {
            if let Ok(alg) = name.parse::<SigningAlgorithm>() {
                if let Some(key_type) = alg.key_type() {
                    key_types.insert(key_type);
                }
            }
        }
        for key_type in key_types {
            let key = self.generate_issuer_key(&issuer.id, key_type).await?;
            issuer.key_rings.insert(
                key_type,
                KeyRing {
                    current_key_id: key.key_id,
                    reserved_key_ids: Vec::new(),
                },
            );
        }

        self.store.create(&issuer).await?;
        Ok(issuer)
    }

    /// Rotates the issuer's key of one type: a fresh key becomes current,
    /// the previous current moves to the head of the reserved list and
    /// stays published in the JWKS.
    ///
    /// # Errors
    ///
    /// Returns store/key errors; rotating a type with no ring creates one.
    pub async fn rotate_key(&self, issuer_id: &str, key_type: KeyType) -> Result<(), ProviderError> {
        let mut issuer = self.load_issuer(issuer_id).await?;
        let key = self.generate_issuer_key(issuer_id, key_type).await?;
        issuer
            .key_rings
            .entry(key_type)
            .or_default()
            .rotate(key.key_id);
        self.store.set(&issuer).await?;
        Ok(())
    }

    /// Creates a session group.
    ///
    /// # Errors
    ///
    /// Returns store errors, including `AlreadyExists` on id collision.
    pub async fn create_session_group(
        &self,
        issuer_id: &str,
        group_id: &str,
        session_lifetime_seconds: i64,
    ) -> Result<SessionGroup, ProviderError> {
        let group = SessionGroup {
            issuer_id: issuer_id.to_string(),
            id: group_id.to_string(),
            attributes: SessionGroupAttributes {
                authorize_session_lifetime_seconds: session_lifetime_seconds,
            },
        };
        self.store.create(&group).await?;
        Ok(group)
    }

    /// Registers a client by admin fiat (as opposed to dynamic
    /// registration). The client's session group must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidArgument`] when the session group
    /// is missing, store errors otherwise.
    pub async fn create_client(&self, client: Client) -> Result<(), ProviderError> {
        match self
            .store
            .get(&SessionGroup::probe(
                &client.issuer_id,
                &client.attributes.session_group_id,
            ))
            .await
        {
            Ok(_) => {}
            Err(StoreError::NotFound(_)) => {
                return Err(ProviderError::InvalidArgument(format!(
                    "session group {} does not exist",
                    client.attributes.session_group_id
                )));
            }
            Err(err) => return Err(err.into()),
        }
        self.store.create(&client).await?;
        Ok(())
    }

    /// Reads back a pending request for the login UI.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] when the request is gone.
    pub async fn get_request_info(
        &self,
        issuer_id: &str,
        request_id: &str,
    ) -> Result<RequestInfo, ProviderError> {
        let request = match self.store.get(&Request::probe(issuer_id, request_id)).await {
            Ok(request) => request,
            Err(StoreError::NotFound(_)) => {
                return Err(ProviderError::NotFound(format!("request {request_id}")));
            }
            Err(err) => return Err(err.into()),
        };
        let client = self.load_client(issuer_id, &request.client_id).await?;
        Ok(RequestInfo {
            request_id: request.id,
            client: client.meta,
            params: request.params,
        })
    }

    /// Renders the login page for a pending request via the embedder
    /// callback.
    ///
    /// # Errors
    ///
    /// Propagates [`Provider::get_request_info`] errors.
    pub async fn write_login_html(
        &self,
        issuer_id: &str,
        request_id: &str,
    ) -> Result<String, ProviderError> {
        let info = self.get_request_info(issuer_id, request_id).await?;
        Ok(self.sdk_callbacks.write_login_html(&info))
    }
}
