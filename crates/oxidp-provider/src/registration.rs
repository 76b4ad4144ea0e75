//! Dynamic client registration (OIDC Dynamic Client Registration 1.0).

use chrono::Utc;
use oxidp_crypto::random;
use oxidp_model::{Client, SessionGroup, SessionGroupAttributes};
use oxidp_store::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OauthError, ProviderError};
use crate::provider::Provider;

/// Client metadata accepted at registration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationRequest {
    /// Redirection URIs (REQUIRED, fragment-free).
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// `web` (default) or `native`.
    #[serde(default)]
    pub application_type: String,
    /// Response types; defaults to `["code"]`.
    #[serde(default)]
    pub response_types: Vec<String>,
    /// Grant types.
    #[serde(default)]
    pub grant_types: Vec<String>,
    /// Token endpoint auth method; defaults to `client_secret_basic`.
    #[serde(default)]
    pub token_endpoint_auth_method: String,
    /// ID Token signing algorithm; defaults to `RS256`.
    #[serde(default)]
    pub id_token_signed_response_alg: String,
    /// Userinfo response signing algorithm.
    #[serde(default)]
    pub userinfo_signed_response_alg: String,
    /// JARM response signing algorithm.
    #[serde(default)]
    pub authorization_signed_response_alg: String,
    /// Subject type.
    #[serde(default)]
    pub subject_type: String,
    /// Sector identifier URI; when present it must list every redirect
    /// URI.
    #[serde(default)]
    pub sector_identifier_uri: String,
    /// Inline JWKS.
    #[serde(default)]
    pub jwks: Option<Value>,
    /// JWKS by reference.
    #[serde(default)]
    pub jwks_uri: String,
    /// Whether `auth_time` is always required.
    #[serde(default)]
    pub require_auth_time: bool,
    /// Default max authentication age, string-encoded.
    #[serde(default)]
    pub default_max_age: String,
    /// Default ACR values.
    #[serde(default)]
    pub default_acr_values: Vec<String>,
    /// RFC 8705 certificate binding.
    #[serde(default)]
    pub tls_client_certificate_bound_access_tokens: bool,
}

/// Registered client data returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationData {
    /// Issued client id.
    pub client_id: String,
    /// Issued client secret.
    pub client_secret: String,
    /// Token protecting the management endpoints.
    pub registration_access_token: String,
    /// Management URI.
    pub registration_client_uri: String,
    /// Unix time the client id was issued.
    pub client_id_issued_at: i64,
    /// Unix time the secret expires, 0 for never.
    pub client_secret_expires_at: i64,
    /// Effective metadata.
    #[serde(flatten)]
    pub meta: oxidp_model::ClientMeta,
}

impl RegistrationData {
    fn from_client(client: &Client) -> Self {
        Self {
            client_id: client.identity.client_id.clone(),
            client_secret: client.identity.client_secret.clone(),
            registration_access_token: client.identity.registration_access_token.clone(),
            registration_client_uri: client.identity.registration_client_uri.clone(),
            client_id_issued_at: client.identity.client_id_issued_at,
            client_secret_expires_at: client.identity.client_secret_expires_at,
            meta: client.meta.clone(),
        }
    }
}

/// Outcome of the registration endpoints.
#[derive(Debug)]
pub enum RegistrationResponse {
    /// Created/read client data.
    Success(RegistrationData),
    /// Deleted.
    Deleted,
    /// Error status and JSON body.
    Fail {
        /// HTTP status.
        status_code: u16,
        /// Error payload (`invalid_client_metadata`, `invalid_request`).
        error: OauthError,
    },
}

fn metadata_fail(description: impl Into<String>) -> RegistrationResponse {
    RegistrationResponse::Fail {
        status_code: 400,
        error: OauthError::new("invalid_client_metadata", description),
    }
}

fn unknown_client() -> RegistrationResponse {
    RegistrationResponse::Fail {
        status_code: 400,
        error: OauthError::new("invalid_request", "unknown client"),
    }
}

impl Provider {
    /// Registers a new client and its session group.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] only for server-internal conditions.
    pub async fn registration_create(
        &self,
        issuer_id: &str,
        mut request: RegistrationRequest,
    ) -> Result<RegistrationResponse, ProviderError> {
        let issuer = self.load_issuer(issuer_id).await?;
        let now = Utc::now();

        if request.redirect_uris.is_empty() {
            return Ok(metadata_fail("redirect_uris is required"));
        }
        for uri in &request.redirect_uris {
            let parsed = match url::Url::parse(uri) {
                Ok(parsed) => parsed,
                Err(err) => {
                    return Ok(metadata_fail(format!("redirect_uris parse error:{err}")));
                }
            };
            if parsed.fragment().is_some_and(|f| !f.is_empty()) {
                return Ok(metadata_fail(format!("redirect_uris has fragment:{uri}")));
            }
        }

        // https://openid.net/specs/openid-connect-registration-1_0.html#SectorIdentifierValidation
        if !request.sector_identifier_uri.is_empty() {
            let body = match self.fetch_text(&request.sector_identifier_uri).await {
                Ok(body) => body,
                Err(err) => {
                    return Ok(metadata_fail(format!(
                        "sector_identifier_uri fetch error:{err}"
                    )));
                }
            };
            let listed: Vec<String> = match serde_json::from_str(&body) {
                Ok(listed) => listed,
                Err(err) => {
                    return Ok(metadata_fail(format!(
                        "sector_identifier_uri decode error:{err}"
                    )));
                }
            };
            for uri in &request.redirect_uris {
                if !listed.contains(uri) {
                    return Ok(metadata_fail(
                        "sector_identifier_uri target not contains redirect_uris",
                    ));
                }
            }
        }

        // https://openid.net/specs/openid-connect-registration-1_0-errata2.html#ClientMetadata
        if request.application_type.is_empty() {
            request.application_type = "web".to_string();
        }
        if request.id_token_signed_response_alg.is_empty() {
            request.id_token_signed_response_alg = "RS256".to_string();
        }
        if request.response_types.is_empty() {
            request.response_types = vec!["code".to_string()];
        }
        if request.token_endpoint_auth_method.is_empty() {
            request.token_endpoint_auth_method = "client_secret_basic".to_string();
        }

        let client_id = random::unique_id();
        let mut client = Client::with_defaults(&issuer, &client_id, &client_id, now);
        apply_metadata(&mut client, &request);
        client.identity.client_secret = random::unique_id();
        client.identity.registration_access_token = random::uuid_v4();
        client.identity.registration_client_uri = format!(
            "{}?client_id={client_id}",
            issuer.meta.registration_endpoint
        );
        client.identity.client_secret_expires_at = 0;

        let group = SessionGroup {
            issuer_id: issuer_id.to_string(),
            id: client_id.clone(),
            attributes: SessionGroupAttributes {
                authorize_session_lifetime_seconds: 3_600,
            },
        };

        self.store.create(&client).await?;
        self.store.create(&group).await?;

        Ok(RegistrationResponse::Success(RegistrationData::from_client(
            &client,
        )))
    }

    /// Reads a registered client. Requires the registration access token
    /// as a bearer credential.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] only for server-internal conditions.
    pub async fn registration_get(
        &self,
        issuer_id: &str,
        client_id: &str,
        authorization: &str,
    ) -> Result<RegistrationResponse, ProviderError> {
        let client = match self.load_client(issuer_id, client_id).await {
            Ok(client) => client,
            Err(StoreError::NotFound(_)) => return Ok(unknown_client()),
            Err(err) => return Err(err.into()),
        };
        if !registration_token_matches(&client, authorization) {
            return Ok(unknown_client());
        }
        Ok(RegistrationResponse::Success(RegistrationData::from_client(
            &client,
        )))
    }

    /// Deletes a registered client and its session group. Requires the
    /// registration access token as a bearer credential.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] only for server-internal conditions.
    pub async fn registration_delete(
        &self,
        issuer_id: &str,
        client_id: &str,
        authorization: &str,
    ) -> Result<RegistrationResponse, ProviderError> {
        let client = match self.load_client(issuer_id, client_id).await {
            Ok(client) => client,
            Err(StoreError::NotFound(_)) => return Ok(unknown_client()),
            Err(err) => return Err(err.into()),
        };
        if !registration_token_matches(&client, authorization) {
            return Ok(unknown_client());
        }
        self.store.delete(&client).await?;
        self.store
            .delete(&SessionGroup::probe(
                issuer_id,
                &client.attributes.session_group_id,
            ))
            .await?;
        Ok(RegistrationResponse::Deleted)
    }
}

fn apply_metadata(client: &mut Client, request: &RegistrationRequest) {
    let meta = &mut client.meta;
    meta.redirect_uris = request.redirect_uris.clone();
    meta.application_type = request.application_type.clone();
    meta.response_types = request.response_types.clone();
    if !request.grant_types.is_empty() {
        meta.grant_types = request.grant_types.clone();
    }
    meta.token_endpoint_auth_method = request.token_endpoint_auth_method.clone();
    meta.id_token_signed_response_alg = request.id_token_signed_response_alg.clone();
    if !request.userinfo_signed_response_alg.is_empty() {
        meta.userinfo_signed_response_alg = request.userinfo_signed_response_alg.clone();
    }
    if !request.authorization_signed_response_alg.is_empty() {
        meta.authorization_signed_response_alg =
            request.authorization_signed_response_alg.clone();
    }
    if !request.subject_type.is_empty() {
        meta.subject_type = request.subject_type.clone();
    }
    meta.sector_identifier_uri = request.sector_identifier_uri.clone();
    if request.jwks.is_some() {
        meta.jwks = request.jwks.clone();
    }
    meta.jwks_uri = request.jwks_uri.clone();
    meta.require_auth_time = request.require_auth_time;
    if !request.default_max_age.is_empty() {
        meta.default_max_age = request.default_max_age.clone();
    }
    if !request.default_acr_values.is_empty() {
        meta.default_acr_values = request.default_acr_values.clone();
    }
    meta.tls_client_certificate_bound_access_tokens =
        request.tls_client_certificate_bound_access_tokens;
}

/// Compares the bearer credential against the registration access token
/// in constant time.
fn registration_token_matches(client: &Client, authorization: &str) -> bool {
    let token = match authorization.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        _ => return false,
    };
    !client.identity.registration_access_token.is_empty()
        && oxidp_crypto::constant_time_eq(&client.identity.registration_access_token, token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxidp_model::Issuer;

    #[test]
    fn bearer_extraction_is_case_insensitive() {
        let issuer = Issuer::probe("t1");
        let mut client = Client::with_defaults(&issuer, "c1", "c1", Utc::now());
        client.identity.registration_access_token = "tok-1".to_string();
        assert!(registration_token_matches(&client, "Bearer tok-1"));
        assert!(registration_token_matches(&client, "bearer tok-1"));
        assert!(!registration_token_matches(&client, "Bearer other"));
        assert!(!registration_token_matches(&client, "tok-1"));
    }

    #[test]
    fn metadata_application_preserves_defaults() {
        let issuer = Issuer::probe("t1");
        let mut client = Client::with_defaults(&issuer, "c1", "c1", Utc::now());
        let request = RegistrationRequest {
            redirect_uris: vec!["https://rp/cb".to_string()],
            application_type: "web".to_string(),
            response_types: vec!["code".to_string()],
            token_endpoint_auth_method: "client_secret_basic".to_string(),
            id_token_signed_response_alg: "RS256".to_string(),
            ..RegistrationRequest::default()
        };
        apply_metadata(&mut client, &request);
        assert_eq!(client.meta.redirect_uris, vec!["https://rp/cb"]);
        assert_eq!(client.meta.token_endpoint_auth_method, "client_secret_basic");
        // Grant types were not supplied; the defaults survive.
        assert!(client
            .meta
            .grant_types
            .contains(&"authorization_code".to_string()));
    }
}
