//! Issuer (tenant) model and discovery metadata.

use std::collections::BTreeMap;

use oxidp_crypto::KeyType;
use oxidp_store::{Expirable, Pathable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::STORE_PREFIX;

/// Validation errors for issuer metadata.
///
/// These map onto `invalid_argument` at the admin surface.
#[derive(Debug, Error)]
pub enum IssuerValidationError {
    /// A REQUIRED metadata field is empty.
    #[error("{0} is required")]
    MissingField(&'static str),
}

/// An issuer: one tenant of the provider.
///
/// Owns its clients, keys and every protocol artifact created under it.
/// Created by admin; protocol flows never destroy it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issuer {
    /// Unique issuer id.
    pub id: String,
    /// Immutable issuer secret.
    pub secret: IssuerSecret,
    /// OIDC discovery document values.
    pub meta: IssuerMeta,
    /// Tenant-level toggles.
    #[serde(default)]
    pub attributes: IssuerAttributes,
    /// Key rings, one per populated key type.
    #[serde(default)]
    pub key_rings: BTreeMap<KeyType, KeyRing>,
}

impl Issuer {
    /// Compares a presented password against the issuer secret in
    /// constant time.
    #[must_use]
    pub fn verify_password(&self, password: &str) -> bool {
        oxidp_crypto::constant_time_eq(&self.secret.password, password)
    }

    /// Builds a probe carrying only the key fields, for store reads.
    #[must_use]
    pub fn probe(id: &str) -> Self {
        Self {
            id: id.to_string(),
            secret: IssuerSecret::default(),
            meta: IssuerMeta::default(),
            attributes: IssuerAttributes::default(),
            key_rings: BTreeMap::new(),
        }
    }
}

impl Pathable for Issuer {
    fn path(&self) -> String {
        format!("{STORE_PREFIX}/issuers/{}", self.id)
    }
}

impl Expirable for Issuer {
    fn expire_at_unix(&self) -> Option<i64> {
        None
    }
}

/// The issuer password, compared in constant time at the admin surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssuerSecret {
    /// Issuer password.
    pub password: String,
}

/// Tenant-level toggles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssuerAttributes {
    /// When set, a refresh-token exchange mints a replacement refresh token
    /// and the presented one stays valid only until its own expiry. Off by
    /// default: refresh tokens are reusable.
    #[serde(default)]
    pub refresh_token_rotation: bool,
}

/// A key ring: the current signing key plus previous keys still published
/// in the JWKS so outstanding tokens keep verifying.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyRing {
    /// Key id signatures are currently produced with.
    pub current_key_id: String,
    /// Previous key ids, newest first.
    #[serde(default)]
    pub reserved_key_ids: Vec<String>,
}

impl KeyRing {
    /// Installs a new current key, moving the old one to the head of the
    /// reserved list.
    pub fn rotate(&mut self, new_key_id: String) {
        if !self.current_key_id.is_empty() {
            self.reserved_key_ids
                .insert(0, std::mem::take(&mut self.current_key_id));
        }
        self.current_key_id = new_key_id;
    }

    /// Iterates the current key id followed by every reserved id.
    pub fn all_key_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.current_key_id.as_str())
            .chain(self.reserved_key_ids.iter().map(String::as_str))
            .filter(|id| !id.is_empty())
    }
}

/// OIDC provider metadata, serialized verbatim as the discovery document.
///
/// Field set per OpenID Connect Discovery 1.0 and RFC 8414, plus the PAR
/// (RFC 9126), JARM and RFC 9207 additions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssuerMeta {
    /// Issuer identifier URL (REQUIRED).
    #[serde(default)]
    pub issuer: String,

    /// Authorization endpoint URL (REQUIRED).
    #[serde(default)]
    pub authorization_endpoint: String,

    /// Token endpoint URL (REQUIRED).
    #[serde(default)]
    pub token_endpoint: String,

    /// JWKS URL (REQUIRED).
    #[serde(default)]
    pub jwks_uri: String,

    /// Userinfo endpoint URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub userinfo_endpoint: String,

    /// Dynamic registration endpoint URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub registration_endpoint: String,

    /// Pushed authorization request endpoint URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pushed_authorization_request_endpoint: String,

    /// Scope values supported.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,

    /// Response types supported (REQUIRED).
    #[serde(default)]
    pub response_types_supported: Vec<String>,

    /// Response modes supported.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_modes_supported: Vec<String>,

    /// Grant types supported.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grant_types_supported: Vec<String>,

    /// ACR values supported.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acr_values_supported: Vec<String>,

    /// Subject identifier types supported (REQUIRED).
    #[serde(default)]
    pub subject_types_supported: Vec<String>,

    /// ID Token signing algorithms supported (REQUIRED).
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,

    /// Userinfo signing algorithms supported.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub userinfo_signing_alg_values_supported: Vec<String>,

    /// Token endpoint auth methods supported.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub token_endpoint_auth_methods_supported: Vec<String>,

    /// PKCE code challenge methods supported.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_challenge_methods_supported: Vec<String>,

    /// Whether the `claims` request parameter is supported.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub claims_parameter_supported: bool,

    /// Whether the `request` parameter (JAR by value) is supported.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub request_parameter_supported: bool,

    /// Whether the `request_uri` parameter is supported. The discovery
    /// default is true, so the field is always serialized.
    #[serde(default)]
    pub request_uri_parameter_supported: bool,

    /// Whether every authorization request must arrive via PAR.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub require_pushed_authorization_requests: bool,

    /// JARM response signing algorithms supported.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorization_signing_alg_values_supported: Vec<String>,

    /// RFC 9207 `iss` authorization-response parameter support.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub authorization_response_iss_parameter_supported: bool,

    /// Back-channel logout support.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub backchannel_logout_supported: bool,

    /// Back-channel logout `sid` claim support.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub backchannel_logout_session_supported: bool,

    /// Front-channel logout support.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub frontchannel_logout_supported: bool,

    /// Front-channel logout `sid` claim support.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub frontchannel_logout_session_supported: bool,

    /// RFC 8705 certificate-bound access token support.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tls_client_certificate_bound_access_tokens: bool,
}

impl IssuerMeta {
    /// Validates REQUIRED fields and fills discovery defaults.
    ///
    /// Defaults: `token_endpoint_auth_methods_supported` falls back to
    /// `["client_secret_basic"]`; a dynamic provider (registration
    /// endpoint set) gets `response_modes_supported=["query","fragment"]`
    /// and `grant_types_supported=["authorization_code","implicit"]`.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerValidationError::MissingField`] naming the first
    /// empty REQUIRED field.
    pub fn validate_and_complete(&mut self) -> Result<(), IssuerValidationError> {
        if self.issuer.is_empty() {
            return Err(IssuerValidationError::MissingField("issuer"));
        }
        if self.authorization_endpoint.is_empty() {
            return Err(IssuerValidationError::MissingField("authorization_endpoint"));
        }
        if self.token_endpoint.is_empty() {
            return Err(IssuerValidationError::MissingField("token_endpoint"));
        }
        if self.jwks_uri.is_empty() {
            return Err(IssuerValidationError::MissingField("jwks_uri"));
        }
        if self.response_types_supported.is_empty() {
            return Err(IssuerValidationError::MissingField("response_types_supported"));
        }
        if self.subject_types_supported.is_empty() {
            return Err(IssuerValidationError::MissingField("subject_types_supported"));
        }
        if self.id_token_signing_alg_values_supported.is_empty() {
            return Err(IssuerValidationError::MissingField(
                "id_token_signing_alg_values_supported",
            ));
        }

        if self.token_endpoint_auth_methods_supported.is_empty() {
            self.token_endpoint_auth_methods_supported = vec!["client_secret_basic".to_string()];
        }
        if !self.registration_endpoint.is_empty() {
            if self.response_modes_supported.is_empty() {
                self.response_modes_supported =
                    vec!["query".to_string(), "fragment".to_string()];
            }
            if self.grant_types_supported.is_empty() {
                self.grant_types_supported =
                    vec!["authorization_code".to_string(), "implicit".to_string()];
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_meta() -> IssuerMeta {
        IssuerMeta {
            issuer: "https://op.example.com".to_string(),
            authorization_endpoint: "https://op.example.com/authorize".to_string(),
            token_endpoint: "https://op.example.com/token".to_string(),
            jwks_uri: "https://op.example.com/.well-known/jwks.json".to_string(),
            response_types_supported: vec!["code".to_string()],
            subject_types_supported: vec!["public".to_string()],
            id_token_signing_alg_values_supported: vec!["RS256".to_string()],
            ..IssuerMeta::default()
        }
    }

    #[test]
    fn required_fields_are_enforced() {
        let mut meta = minimal_meta();
        assert!(meta.validate_and_complete().is_ok());

        let mut missing = minimal_meta();
        missing.jwks_uri = String::new();
        assert!(missing.validate_and_complete().is_err());

        let mut missing = minimal_meta();
        missing.id_token_signing_alg_values_supported.clear();
        assert!(missing.validate_and_complete().is_err());

        assert_eq!(
            meta.token_endpoint_auth_methods_supported,
            vec!["client_secret_basic"]
        );
    }

    #[test]
    fn dynamic_provider_defaults() {
        let mut meta = minimal_meta();
        meta.registration_endpoint = "https://op.example.com/registration".to_string();
        meta.validate_and_complete().unwrap();
        assert_eq!(meta.response_modes_supported, vec!["query", "fragment"]);
        assert_eq!(
            meta.grant_types_supported,
            vec!["authorization_code", "implicit"]
        );
    }

    #[test]
    fn key_ring_rotation_order() {
        let mut ring = KeyRing::default();
        ring.rotate("k1".to_string());
        assert_eq!(ring.current_key_id, "k1");
        assert!(ring.reserved_key_ids.is_empty());

        ring.rotate("k2".to_string());
        ring.rotate("k3".to_string());
        assert_eq!(ring.current_key_id, "k3");
        assert_eq!(ring.reserved_key_ids, vec!["k2", "k1"]);
        let all: Vec<&str> = ring.all_key_ids().collect();
        assert_eq!(all, vec!["k3", "k2", "k1"]);
    }

    #[test]
    fn issuer_path() {
        assert_eq!(Issuer::probe("t1").path(), "oxidp/v1/issuers/t1");
    }

    #[test]
    fn password_comparison() {
        let mut issuer = Issuer::probe("t1");
        issuer.secret.password = "hunter2".to_string();
        assert!(issuer.verify_password("hunter2"));
        assert!(!issuer.verify_password("hunter3"));
        assert!(!issuer.verify_password(""));
    }
}
