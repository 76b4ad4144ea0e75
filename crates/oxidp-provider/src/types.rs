//! Protocol constants and the response-mode resolution table.

use std::fmt;

/// OAuth 2.0 / OIDC wire constants.
pub mod oauth {
    /// Prefix of PAR handles carried in `request_uri` (RFC 9126 §2.2).
    pub const SCHEME_REQUEST_URI: &str = "urn:ietf:params:oauth:request_uri:";

    /// `application/x-www-form-urlencoded` media type.
    pub const MIME_FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

    /// JWT client-assertion type (RFC 7523).
    pub const CLIENT_ASSERTION_TYPE_JWT: &str =
        "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

    // Grant types.
    /// Authorization code grant.
    pub const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";
    /// Refresh token grant.
    pub const GRANT_TYPE_REFRESH_TOKEN: &str = "refresh_token";
    /// Implicit grant (metadata only).
    pub const GRANT_TYPE_IMPLICIT: &str = "implicit";

    // PKCE methods.
    /// Plain code verifier.
    pub const PKCE_METHOD_PLAIN: &str = "plain";
    /// SHA-256 code challenge.
    pub const PKCE_METHOD_S256: &str = "S256";

    // Token endpoint auth methods.
    /// No client authentication.
    pub const AUTH_METHOD_NONE: &str = "none";
    /// HTTP Basic client secret.
    pub const AUTH_METHOD_CLIENT_SECRET_BASIC: &str = "client_secret_basic";
    /// Form-body client secret.
    pub const AUTH_METHOD_CLIENT_SECRET_POST: &str = "client_secret_post";
    /// HMAC client assertion.
    pub const AUTH_METHOD_CLIENT_SECRET_JWT: &str = "client_secret_jwt";
    /// Asymmetric client assertion.
    pub const AUTH_METHOD_PRIVATE_KEY_JWT: &str = "private_key_jwt";
    /// PKI mutual TLS.
    pub const AUTH_METHOD_TLS_CLIENT_AUTH: &str = "tls_client_auth";
    /// Self-signed mutual TLS.
    pub const AUTH_METHOD_SELF_SIGNED_TLS_CLIENT_AUTH: &str = "self_signed_tls_client_auth";

    // Response types.
    /// `none`.
    pub const RESPONSE_TYPE_NONE: &str = "none";
    /// `code`.
    pub const RESPONSE_TYPE_CODE: &str = "code";
    /// `token`.
    pub const RESPONSE_TYPE_TOKEN: &str = "token";
    /// `id_token`.
    pub const RESPONSE_TYPE_ID_TOKEN: &str = "id_token";

    // Authorization endpoint error codes (RFC 6749 §4.1.2.1, OIDC §3.1.2.6).
    /// `invalid_request`.
    pub const AUTHORIZATION_ERROR_INVALID_REQUEST: &str = "invalid_request";
    /// `unauthorized_client`.
    pub const AUTHORIZATION_ERROR_UNAUTHORIZED_CLIENT: &str = "unauthorized_client";
    /// `access_denied`.
    pub const AUTHORIZATION_ERROR_ACCESS_DENIED: &str = "access_denied";
    /// `unsupported_response_type`.
    pub const AUTHORIZATION_ERROR_UNSUPPORTED_RESPONSE_TYPE: &str = "unsupported_response_type";
    /// `invalid_scope`.
    pub const AUTHORIZATION_ERROR_INVALID_SCOPE: &str = "invalid_scope";
    /// `server_error`.
    pub const AUTHORIZATION_ERROR_SERVER_ERROR: &str = "server_error";
    /// `temporarily_unavailable`.
    pub const AUTHORIZATION_ERROR_TEMPORARILY_UNAVAILABLE: &str = "temporarily_unavailable";
    /// `interaction_required`.
    pub const AUTHORIZATION_ERROR_INTERACTION_REQUIRED: &str = "interaction_required";
    /// `login_required`.
    pub const AUTHORIZATION_ERROR_LOGIN_REQUIRED: &str = "login_required";
    /// `account_selection_required`.
    pub const AUTHORIZATION_ERROR_ACCOUNT_SELECTION_REQUIRED: &str = "account_selection_required";
    /// `consent_required`.
    pub const AUTHORIZATION_ERROR_CONSENT_REQUIRED: &str = "consent_required";
    /// `invalid_request_uri`.
    pub const AUTHORIZATION_ERROR_INVALID_REQUEST_URI: &str = "invalid_request_uri";
    /// `invalid_request_object`.
    pub const AUTHORIZATION_ERROR_INVALID_REQUEST_OBJECT: &str = "invalid_request_object";
    /// `request_not_supported`.
    pub const AUTHORIZATION_ERROR_REQUEST_NOT_SUPPORTED: &str = "request_not_supported";
    /// `request_uri_not_supported`.
    pub const AUTHORIZATION_ERROR_REQUEST_URI_NOT_SUPPORTED: &str = "request_uri_not_supported";
    /// `registration_not_supported`.
    pub const AUTHORIZATION_ERROR_REGISTRATION_NOT_SUPPORTED: &str = "registration_not_supported";

    // Token endpoint error codes (RFC 6749 §5.2).
    /// `invalid_request`.
    pub const TOKEN_ERROR_INVALID_REQUEST: &str = "invalid_request";
    /// `invalid_client`.
    pub const TOKEN_ERROR_INVALID_CLIENT: &str = "invalid_client";
    /// `invalid_grant`.
    pub const TOKEN_ERROR_INVALID_GRANT: &str = "invalid_grant";
    /// `unauthorized_client`.
    pub const TOKEN_ERROR_UNAUTHORIZED_CLIENT: &str = "unauthorized_client";
    /// `unsupported_grant_type`.
    pub const TOKEN_ERROR_UNSUPPORTED_GRANT_TYPE: &str = "unsupported_grant_type";
    /// `invalid_scope`.
    pub const TOKEN_ERROR_INVALID_SCOPE: &str = "invalid_scope";

    /// OIDC-defined `response_type` values this provider accepts.
    #[must_use]
    pub fn response_types_supported() -> Vec<&'static str> {
        vec![
            "none",
            "code",
            "id_token",
            "id_token token",
            "code id_token",
            "code token",
            "code id_token token",
        ]
    }

    /// Response modes this provider can emit.
    #[must_use]
    pub fn response_modes_supported() -> Vec<&'static str> {
        vec![
            "form_post",
            "form_post.jwt",
            "fragment",
            "fragment.jwt",
            "jwt",
            "query",
            "query.jwt",
        ]
    }
}

/// The transport actually used for an authorization response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveResponseMode {
    /// Parameters appended to the redirect URI query.
    Query,
    /// JARM JWT in the query.
    QueryJwt,
    /// Parameters in the URI fragment.
    Fragment,
    /// JARM JWT in the fragment.
    FragmentJwt,
    /// Self-submitting HTML form.
    FormPost,
    /// JARM JWT in a self-submitting form.
    FormPostJwt,
}

impl EffectiveResponseMode {
    /// Returns whether this is a JARM (`*.jwt`) mode.
    #[must_use]
    pub const fn is_jwt(self) -> bool {
        matches!(self, Self::QueryJwt | Self::FragmentJwt | Self::FormPostJwt)
    }

    /// Returns whether the response is delivered as an HTML page.
    #[must_use]
    pub const fn is_form_post(self) -> bool {
        matches!(self, Self::FormPost | Self::FormPostJwt)
    }
}

impl fmt::Display for EffectiveResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Query => "query",
            Self::QueryJwt => "query.jwt",
            Self::Fragment => "fragment",
            Self::FragmentJwt => "fragment.jwt",
            Self::FormPost => "form_post",
            Self::FormPostJwt => "form_post.jwt",
        };
        f.write_str(s)
    }
}

/// A `(response_type, response_mode)` pair that cannot be satisfied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseModeError {
    /// Unknown `response_type`.
    #[error("unknown response_type({0})")]
    UnknownResponseType(String),
    /// Unknown `response_mode`.
    #[error("unknown response_mode({0})")]
    UnknownResponseMode(String),
}

/// Resolves the effective response mode for a request.
///
/// Code-only and `none` flows default to the query family; any flow that
/// issues a token or ID token on the front channel defaults to the
/// fragment family and silently upgrades a requested `query` transport to
/// `fragment` (tokens must never land in a query string). `form_post` and
/// the JARM variants propagate.
///
/// # Errors
///
/// Returns [`ResponseModeError`] for unknown type or mode strings.
pub fn resolve_response_mode(
    response_type: &str,
    requested_mode: &str,
) -> Result<EffectiveResponseMode, ResponseModeError> {
    use EffectiveResponseMode as Mode;

    let query_family = match response_type {
        "none" | "code" => true,
        "token" | "id_token" | "id_token token" | "code id_token" | "code token"
        | "code id_token token" => false,
        other => return Err(ResponseModeError::UnknownResponseType(other.to_string())),
    };

    let mode = match requested_mode {
        "" => {
            if query_family {
                Mode::Query
            } else {
                Mode::Fragment
            }
        }
        "jwt" => {
            if query_family {
                Mode::QueryJwt
            } else {
                Mode::FragmentJwt
            }
        }
        "query" => {
            if query_family {
                Mode::Query
            } else {
                Mode::Fragment
            }
        }
        "query.jwt" => {
            if query_family {
                Mode::QueryJwt
            } else {
                Mode::Fragment
            }
        }
        "fragment" => Mode::Fragment,
        "fragment.jwt" => Mode::FragmentJwt,
        "form_post" => Mode::FormPost,
        "form_post.jwt" => Mode::FormPostJwt,
        other => return Err(ResponseModeError::UnknownResponseMode(other.to_string())),
    };
    Ok(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_defaults_to_query() {
        assert_eq!(
            resolve_response_mode("code", "").unwrap(),
            EffectiveResponseMode::Query
        );
        assert_eq!(
            resolve_response_mode("code", "jwt").unwrap(),
            EffectiveResponseMode::QueryJwt
        );
        assert_eq!(
            resolve_response_mode("none", "").unwrap(),
            EffectiveResponseMode::Query
        );
    }

    #[test]
    fn implicit_and_hybrid_default_to_fragment() {
        for rt in ["token", "id_token", "code id_token", "code id_token token"] {
            assert_eq!(
                resolve_response_mode(rt, "").unwrap(),
                EffectiveResponseMode::Fragment
            );
            // query transport is upgraded, never honored.
            assert_eq!(
                resolve_response_mode(rt, "query").unwrap(),
                EffectiveResponseMode::Fragment
            );
            assert_eq!(
                resolve_response_mode(rt, "query.jwt").unwrap(),
                EffectiveResponseMode::Fragment
            );
        }
    }

    #[test]
    fn form_post_and_jarm_propagate() {
        assert_eq!(
            resolve_response_mode("code", "form_post").unwrap(),
            EffectiveResponseMode::FormPost
        );
        assert_eq!(
            resolve_response_mode("code id_token", "form_post.jwt").unwrap(),
            EffectiveResponseMode::FormPostJwt
        );
        assert_eq!(
            resolve_response_mode("token", "fragment.jwt").unwrap(),
            EffectiveResponseMode::FragmentJwt
        );
    }

    #[test]
    fn unknown_combinations_error() {
        assert!(matches!(
            resolve_response_mode("ticket", ""),
            Err(ResponseModeError::UnknownResponseType(_))
        ));
        assert!(matches!(
            resolve_response_mode("code", "pigeon"),
            Err(ResponseModeError::UnknownResponseMode(_))
        ));
    }
}
