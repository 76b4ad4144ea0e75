//! Typed endpoint inputs.
//!
//! The embedding layer marshals transport requests into these structs; the
//! core never sees HTTP framing.

use std::collections::HashMap;

/// HTTP Basic credentials, already base64-decoded by the embedder.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    /// Username (the client id).
    pub username: String,
    /// Password (the client secret).
    pub password: String,
}

/// Input of the authorization endpoint.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationRequest {
    /// `GET` or `POST`.
    pub method: String,
    /// Full request URL (query parsed from here on GET).
    pub url: String,
    /// `Content-Type` header (POST).
    pub content_type: String,
    /// Raw form body (POST).
    pub form: String,
    /// Session cookies by cookie name (= session group id).
    pub sessions: HashMap<String, String>,
}

/// Input of the token endpoint.
#[derive(Debug, Clone, Default)]
pub struct TokenRequest {
    /// `Content-Type` header.
    pub content_type: String,
    /// Raw form body.
    pub form: String,
    /// Basic credentials, when the header was present.
    pub basic_auth: Option<BasicAuth>,
    /// Hash of the presented TLS client certificate, when any.
    pub tls_client_certificate: String,
}

/// Input of the pushed authorization request endpoint.
#[derive(Debug, Clone, Default)]
pub struct ParRequest {
    /// HTTP method; only `POST` is allowed.
    pub method: String,
    /// `Content-Type` header.
    pub content_type: String,
    /// Raw form body.
    pub form: String,
    /// Basic credentials, when the header was present.
    pub basic_auth: Option<BasicAuth>,
}

/// Input of the userinfo endpoint.
#[derive(Debug, Clone, Default)]
pub struct UserinfoRequest {
    /// HTTP method.
    pub method: String,
    /// `Content-Type` header.
    pub content_type: String,
    /// `Authorization` header value.
    pub authorization: String,
    /// Raw form body (POST).
    pub form: String,
    /// Hash of the presented TLS client certificate, when any.
    pub tls_client_certificate: String,
}

/// Input of the issue operation, produced by the login UI after the
/// embedder authenticated the end-user.
#[derive(Debug, Clone, Default)]
pub struct IssueRequest {
    /// The pending request to complete.
    pub request_id: String,
    /// Authenticated end-user identifier.
    pub subject: String,
    /// Session the authentication rode on; empty for a fresh login.
    pub session_id: String,
}

/// Parses a form/query body into a first-value-wins map.
#[must_use]
pub(crate) fn parse_form(form: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(form.as_bytes()) {
        values.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    values
}

/// Returns a form value or `""`.
#[must_use]
pub(crate) fn form_value<'a>(values: &'a HashMap<String, String>, key: &str) -> &'a str {
    values.get(key).map_or("", String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_parsing_first_value_wins() {
        let values = parse_form("a=1&b=two%20words&a=9");
        assert_eq!(form_value(&values, "a"), "1");
        assert_eq!(form_value(&values, "b"), "two words");
        assert_eq!(form_value(&values, "missing"), "");
    }
}
