//! Protocol and server-internal error types.
//!
//! Two families, kept apart per RFC 6749: user-agent-visible protocol
//! errors ([`OauthError`] wrapped in [`AuthorizationFail`]/[`TokenFail`])
//! travel inside endpoint responses and reach the client through the
//! response-mode machinery or a JSON body; server-internal errors
//! ([`ProviderError`]) surface as 5xx and never leak into the OAuth error
//! namespace.

use oxidp_store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::oauth;

/// An OAuth 2.0 / OIDC error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OauthError {
    /// Error code from the OAuth/OIDC registries.
    pub error: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_description: String,
    /// URI with more information.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_uri: String,
}

impl OauthError {
    /// Creates an error payload.
    #[must_use]
    pub fn new(error: &str, description: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            error_description: description.into(),
            error_uri: String::new(),
        }
    }
}

/// A protocol failure of the authorization endpoint, routed to the client
/// via the response-mode machinery.
#[derive(Debug, Clone)]
pub struct AuthorizationFail {
    /// The error payload.
    pub error: OauthError,
}

impl AuthorizationFail {
    fn new(code: &str, description: impl Into<String>) -> Self {
        Self {
            error: OauthError::new(code, description),
        }
    }

    /// `invalid_request` with a description.
    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(oauth::AUTHORIZATION_ERROR_INVALID_REQUEST, description)
    }

    /// `unauthorized_client` with a description.
    #[must_use]
    pub fn unauthorized_client(description: impl Into<String>) -> Self {
        Self::new(oauth::AUTHORIZATION_ERROR_UNAUTHORIZED_CLIENT, description)
    }

    /// `access_denied`, emitted when the end-user cancels.
    #[must_use]
    pub fn access_denied() -> Self {
        Self::new(oauth::AUTHORIZATION_ERROR_ACCESS_DENIED, "")
    }

    /// `login_required`, for `prompt=none` without a usable session.
    #[must_use]
    pub fn login_required() -> Self {
        Self::new(oauth::AUTHORIZATION_ERROR_LOGIN_REQUIRED, "")
    }

    /// `invalid_request_uri` with a description.
    #[must_use]
    pub fn invalid_request_uri(description: impl Into<String>) -> Self {
        Self::new(oauth::AUTHORIZATION_ERROR_INVALID_REQUEST_URI, description)
    }

    /// `invalid_request_object` with a description.
    #[must_use]
    pub fn invalid_request_object(description: impl Into<String>) -> Self {
        Self::new(oauth::AUTHORIZATION_ERROR_INVALID_REQUEST_OBJECT, description)
    }

    /// `request_not_supported`.
    #[must_use]
    pub fn request_not_supported() -> Self {
        Self::new(oauth::AUTHORIZATION_ERROR_REQUEST_NOT_SUPPORTED, "")
    }

    /// `request_uri_not_supported`.
    #[must_use]
    pub fn request_uri_not_supported() -> Self {
        Self::new(oauth::AUTHORIZATION_ERROR_REQUEST_URI_NOT_SUPPORTED, "")
    }
}

/// A protocol failure of the token/PAR endpoints: a JSON error body with
/// an HTTP status.
#[derive(Debug, Clone)]
pub struct TokenFail {
    /// HTTP status to respond with.
    pub status_code: u16,
    /// The error payload.
    pub error: OauthError,
}

impl TokenFail {
    /// Creates a failure with an explicit status.
    #[must_use]
    pub fn new(status_code: u16, code: &str, description: impl Into<String>) -> Self {
        Self {
            status_code,
            error: OauthError::new(code, description),
        }
    }

    /// 400 `invalid_request`.
    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(400, oauth::TOKEN_ERROR_INVALID_REQUEST, description)
    }

    /// 400 `invalid_client`.
    #[must_use]
    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::new(400, oauth::TOKEN_ERROR_INVALID_CLIENT, description)
    }

    /// 400 `invalid_grant`.
    #[must_use]
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(400, oauth::TOKEN_ERROR_INVALID_GRANT, description)
    }

    /// 400 `unsupported_grant_type`.
    #[must_use]
    pub fn unsupported_grant_type(description: impl Into<String>) -> Self {
        Self::new(400, oauth::TOKEN_ERROR_UNSUPPORTED_GRANT_TYPE, description)
    }
}

/// Server-internal errors.
///
/// These never reach the user agent as OAuth errors; the embedding layer
/// maps them to an opaque 5xx (or 4xx for the admin-surface variants).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The store failed after retries; retryable.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A signing key was missing or JWT production failed.
    #[error("signing error: {0}")]
    Signing(String),

    /// The issuer holds no key for the required algorithm family.
    #[error("key not found")]
    KeyNotFound,

    /// An algorithm name outside the supported set.
    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller is not allowed to perform the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Admin-surface payload validation failure.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An embedder callback failed.
    #[error("callback error: {0}")]
    Callback(String),

    /// An outbound HTTP fetch failed.
    #[error("http error: {0}")]
    Http(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Suggested HTTP status for embedders that surface these directly.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Store(_) => 503,
            Self::NotFound(_) => 404,
            Self::PermissionDenied(_) => 403,
            Self::InvalidArgument(_) => 400,
            Self::Signing(_)
            | Self::KeyNotFound
            | Self::UnknownAlgorithm(_)
            | Self::Callback(_)
            | Self::Http(_)
            | Self::Internal(_) => 500,
        }
    }
}

impl From<oxidp_crypto::KeyError> for ProviderError {
    fn from(err: oxidp_crypto::KeyError) -> Self {
        Self::Signing(err.to_string())
    }
}

impl From<oxidp_crypto::JwtError> for ProviderError {
    fn from(err: oxidp_crypto::JwtError) -> Self {
        Self::Signing(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_error_serialization_skips_empty_fields() {
        let body = serde_json::to_value(OauthError::new("invalid_grant", "code was used")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"error": "invalid_grant", "error_description": "code was used"})
        );
        let bare = serde_json::to_value(OauthError::new("access_denied", "")).unwrap();
        assert_eq!(bare, serde_json::json!({"error": "access_denied"}));
    }

    #[test]
    fn provider_error_statuses() {
        assert_eq!(
            ProviderError::Store(StoreError::Backend("x".to_string())).http_status(),
            503
        );
        assert_eq!(ProviderError::KeyNotFound.http_status(), 500);
        assert_eq!(
            ProviderError::InvalidArgument("issuer is required".to_string()).http_status(),
            400
        );
    }
}
