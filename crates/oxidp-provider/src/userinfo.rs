//! The userinfo endpoint (OIDC Core §5.3, RFC 6750 error signalling).

use std::collections::HashMap;

use oxidp_model::{TokenIdentifier, TokenKind};
use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::provider::Provider;
use crate::request::{form_value, parse_form, UserinfoRequest};
use crate::types::oauth;

/// Userinfo endpoint outcome, ready for the transport layer.
#[derive(Debug)]
pub struct UserinfoResponse {
    /// HTTP status.
    pub status_code: u16,
    /// Response headers (`Content-Type`, `WWW-Authenticate`).
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: String,
}

impl UserinfoResponse {
    // https://datatracker.ietf.org/doc/html/rfc6750#section-3.1
    // A request without any authentication information gets the bare
    // challenge, no error code.
    fn no_token() -> Self {
        Self {
            status_code: 401,
            headers: HashMap::from([(
                "WWW-Authenticate".to_string(),
                "Bearer realm=\"token_access\"".to_string(),
            )]),
            body: String::new(),
        }
    }

    fn invalid_token() -> Self {
        Self {
            status_code: 401,
            headers: HashMap::from([(
                "WWW-Authenticate".to_string(),
                "Bearer realm=\"token_access\", error=\"invalid_token\", \
                 error_description=\"The access token expired\""
                    .to_string(),
            )]),
            body: String::new(),
        }
    }

    fn invalid_request(description: &str) -> Self {
        Self {
            status_code: 401,
            headers: HashMap::from([(
                "WWW-Authenticate".to_string(),
                format!(
                    "Bearer realm=\"token_access\", error=\"invalid_request\", \
                     error_description=\"{description}\""
                ),
            )]),
            body: String::new(),
        }
    }

    fn json(body: String) -> Self {
        Self {
            status_code: 200,
            headers: HashMap::from([(
                "Content-Type".to_string(),
                "application/json; charset=utf-8".to_string(),
            )]),
            body,
        }
    }

    fn jwt(body: String) -> Self {
        Self {
            status_code: 200,
            headers: HashMap::from([(
                "Content-Type".to_string(),
                "application/jwt".to_string(),
            )]),
            body,
        }
    }
}

impl Provider {
    /// Handles a userinfo request.
    ///
    /// The access token is taken from the `Authorization: Bearer` header
    /// or, for form posts, the `access_token` field. Certificate-bound
    /// tokens require the matching client certificate hash. The payload
    /// is the user claims filtered by the request's userinfo rules with
    /// `sub` always present, returned as JSON or, when the client set
    /// `userinfo_signed_response_alg`, as a signed JWT.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] only for server-internal conditions.
    pub async fn userinfo(
        &self,
        issuer_id: &str,
        request: &UserinfoRequest,
    ) -> Result<UserinfoResponse, ProviderError> {
        let issuer = self.load_issuer(issuer_id).await?;

        // https://www.rfc-editor.org/rfc/rfc9110#name-authentication-scheme
        // Scheme comparison is case-insensitive.
        let mut access_token = String::new();
        let header_parts: Vec<&str> = request.authorization.split(' ').collect();
        if header_parts.len() == 2 && header_parts[0].eq_ignore_ascii_case("bearer") {
            access_token = header_parts[1].to_string();
        } else if request.method == "POST"
            && request
                .content_type
                .starts_with(oauth::MIME_FORM_URLENCODED)
        {
            let values = parse_form(&request.form);
            access_token = form_value(&values, "access_token").to_string();
        }
        if access_token.is_empty() {
            return Ok(UserinfoResponse::no_token());
        }

        let token = match self
            .store
            .get(&TokenIdentifier::probe(issuer_id, &access_token))
            .await
        {
            Ok(token) if token.kind == TokenKind::Access => token,
            _ => return Ok(UserinfoResponse::invalid_token()),
        };

        let client = self
            .load_client(issuer_id, &token.authorized.client_id)
            .await?;
        if client.meta.tls_client_certificate_bound_access_tokens
            && token.tls_client_certificate != request.tls_client_certificate
        {
            return Ok(UserinfoResponse::invalid_request("Client certificate unmatch"));
        }

        let source: Map<String, Value> =
            serde_json::from_str(&token.authorized.claims).unwrap_or_default();
        let mut payload = Map::new();
        payload.insert(
            "sub".to_string(),
            Value::String(token.authorized.subject.clone()),
        );
        token
            .authorized
            .claim_rules()
            .make_userinfo_claims(&source, &mut payload);

        if client.meta.userinfo_signed_response_alg.is_empty() {
            let body = serde_json::to_string_pretty(&payload)
                .map_err(|e| ProviderError::Internal(e.to_string()))?;
            Ok(UserinfoResponse::json(body))
        } else {
            payload.insert("iss".to_string(), Value::String(issuer.meta.issuer.clone()));
            payload.insert(
                "aud".to_string(),
                Value::String(token.authorized.client_id.clone()),
            );
            let jwt = self
                .sign_jwt(&issuer, &payload, &client.meta.userinfo_signed_response_alg)
                .await?;
            Ok(UserinfoResponse::jwt(jwt))
        }
    }
}
