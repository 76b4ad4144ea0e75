//! Client (relying party) model.

use chrono::{DateTime, Utc};
use oxidp_store::{Expirable, Pathable};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::issuer::Issuer;
use crate::STORE_PREFIX;

/// Security profile a client is held to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClientProfile {
    /// Plain OIDC/OAuth 2.0 semantics.
    #[default]
    #[serde(rename = "unspecified")]
    Unspecified,
    /// FAPI 1.0 Advanced.
    #[serde(rename = "fapi_1_0")]
    Fapi1,
    /// FAPI 2.0 Security Profile.
    #[serde(rename = "fapi_2_0")]
    Fapi2,
}

impl ClientProfile {
    /// Returns whether any FAPI profile applies.
    #[must_use]
    pub const fn is_fapi(self) -> bool {
        matches!(self, Self::Fapi1 | Self::Fapi2)
    }
}

/// An application registered with an issuer to receive tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Owning issuer id.
    pub issuer_id: String,
    /// Credentials and registration identity.
    pub identity: ClientIdentity,
    /// Registered OIDC metadata.
    #[serde(default)]
    pub meta: ClientMeta,
    /// Artifact lifetimes and session-group binding.
    #[serde(default)]
    pub attributes: ClientAttributes,
    /// Profile and certificate pinning extensions.
    #[serde(default)]
    pub extensions: ClientExtensions,
}

impl Client {
    /// Builds a probe carrying only the key fields, for store reads.
    #[must_use]
    pub fn probe(issuer_id: &str, client_id: &str) -> Self {
        Self {
            issuer_id: issuer_id.to_string(),
            identity: ClientIdentity {
                client_id: client_id.to_string(),
                ..ClientIdentity::default()
            },
            meta: ClientMeta::default(),
            attributes: ClientAttributes::default(),
            extensions: ClientExtensions::default(),
        }
    }

    /// Builds a client with the registration defaults of this provider.
    #[must_use]
    pub fn with_defaults(
        issuer: &Issuer,
        client_id: &str,
        session_group_id: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            issuer_id: issuer.id.clone(),
            identity: ClientIdentity {
                client_id: client_id.to_string(),
                client_secret: "secret".to_string(),
                registration_access_token: String::new(),
                registration_client_uri: String::new(),
                client_id_issued_at: now.timestamp(),
                client_secret_expires_at: 0,
            },
            meta: ClientMeta {
                grant_types: vec![
                    "authorization_code".to_string(),
                    "refresh_token".to_string(),
                ],
                response_types: vec!["code".to_string()],
                id_token_signed_response_alg: "RS256".to_string(),
                authorization_signed_response_alg: "RS256".to_string(),
                subject_type: "public".to_string(),
                token_endpoint_auth_method: "client_secret_post".to_string(),
                ..ClientMeta::default()
            },
            attributes: ClientAttributes {
                session_group_id: session_group_id.to_string(),
                ..ClientAttributes::default()
            },
            extensions: ClientExtensions::default(),
        }
    }
}

impl Pathable for Client {
    fn path(&self) -> String {
        format!(
            "{STORE_PREFIX}/issuers/{}/clients/{}",
            self.issuer_id, self.identity.client_id
        )
    }
}

impl Expirable for Client {
    fn expire_at_unix(&self) -> Option<i64> {
        None
    }
}

/// Client credentials and registration identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientIdentity {
    /// OAuth client identifier.
    pub client_id: String,
    /// Client secret for the secret-based auth methods.
    #[serde(default)]
    pub client_secret: String,
    /// Bearer token protecting the registration management endpoints.
    #[serde(default)]
    pub registration_access_token: String,
    /// Registration management URI returned at registration time.
    #[serde(default)]
    pub registration_client_uri: String,
    /// Unix time the client id was issued.
    #[serde(default)]
    pub client_id_issued_at: i64,
    /// Unix time the secret expires, 0 for never.
    #[serde(default)]
    pub client_secret_expires_at: i64,
}

/// Registered client metadata (OIDC Dynamic Registration §2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientMeta {
    /// Exact-match redirection URIs.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Response types the client may use.
    #[serde(default)]
    pub response_types: Vec<String>,

    /// Grant types the client may use.
    #[serde(default)]
    pub grant_types: Vec<String>,

    /// `web` or `native`.
    #[serde(default)]
    pub application_type: String,

    /// Token endpoint authentication method.
    #[serde(default)]
    pub token_endpoint_auth_method: String,

    /// ID Token signing algorithm.
    #[serde(default)]
    pub id_token_signed_response_alg: String,

    /// Userinfo response signing algorithm; empty means plain JSON.
    #[serde(default)]
    pub userinfo_signed_response_alg: String,

    /// JARM response signing algorithm.
    #[serde(default)]
    pub authorization_signed_response_alg: String,

    /// Subject type (`public`; `pairwise` is advertised-only).
    #[serde(default)]
    pub subject_type: String,

    /// Sector identifier URI for pairwise grouping.
    #[serde(default)]
    pub sector_identifier_uri: String,

    /// Client JWKS document, inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks: Option<Value>,

    /// Client JWKS document, by reference.
    #[serde(default)]
    pub jwks_uri: String,

    /// Whether `auth_time` must always be present in ID Tokens.
    #[serde(default)]
    pub require_auth_time: bool,

    /// Default `max_age` applied when a request object clears the outer
    /// parameters; string-encoded like the request parameter.
    #[serde(default)]
    pub default_max_age: String,

    /// Default ACR values applied when a request object clears the outer
    /// parameters.
    #[serde(default)]
    pub default_acr_values: Vec<String>,

    /// RFC 8705: access tokens are bound to the client certificate.
    #[serde(default)]
    pub tls_client_certificate_bound_access_tokens: bool,
}

/// Artifact lifetimes and session binding, per client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAttributes {
    /// Access token TTL in seconds.
    pub access_token_lifetime_seconds: i64,
    /// Authorization code TTL in seconds.
    pub authorization_code_lifetime_seconds: i64,
    /// ID token TTL in seconds.
    pub id_token_lifetime_seconds: i64,
    /// Refresh token TTL in seconds.
    pub refresh_token_lifetime_seconds: i64,
    /// Pending-request TTL in seconds.
    pub request_lifetime_seconds: i64,
    /// Session group this client signs on with.
    #[serde(default)]
    pub session_group_id: String,
}

impl Default for ClientAttributes {
    fn default() -> Self {
        Self {
            access_token_lifetime_seconds: 3_600,
            authorization_code_lifetime_seconds: 60,
            id_token_lifetime_seconds: 3_600,
            refresh_token_lifetime_seconds: 7_200,
            request_lifetime_seconds: 86_400,
            session_group_id: String::new(),
        }
    }
}

/// Profile and mutual-TLS extensions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientExtensions {
    /// Security profile the client is held to.
    #[serde(default)]
    pub profile: ClientProfile,
    /// Pinned TLS client certificate hashes for FAPI token exchange.
    #[serde(default)]
    pub tls_client_certificates: Vec<String>,
}
