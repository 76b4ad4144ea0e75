//! The pushed authorization request endpoint (RFC 9126).

use chrono::Utc;
use oxidp_crypto::{jwt, random};
use oxidp_model::{AuthorizationParameters, PushedAuthorization};
use oxidp_store::{retry_if_error, StoreError};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::client_auth::ClientAuthentication;
use crate::error::{ProviderError, TokenFail};
use crate::provider::{Provider, RETRY_COUNT};
use crate::request::{parse_form, ParRequest};
use crate::types::oauth;

/// Successful PAR response body (RFC 9126 §2.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParSuccess {
    /// The one-time request URI handle.
    pub request_uri: String,
    /// Handle lifetime in seconds.
    pub expires_in: i64,
}

/// Outcome of the PAR endpoint.
#[derive(Debug)]
pub enum ParResponse {
    /// 201 with the handle body.
    Success(ParSuccess),
    /// Error status and JSON body.
    Fail(TokenFail),
}

impl Provider {
    /// Handles a pushed authorization request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] only for server-internal conditions;
    /// protocol failures come back as [`ParResponse::Fail`].
    pub async fn pushed_authorization(
        &self,
        issuer_id: &str,
        request: &ParRequest,
    ) -> Result<ParResponse, ProviderError> {
        let issuer = self.load_issuer(issuer_id).await?;

        if request.method != "POST" {
            return Ok(ParResponse::Fail(TokenFail::new(
                405,
                oauth::TOKEN_ERROR_INVALID_REQUEST,
                format!("Method not allowed:{}", request.method),
            )));
        }
        if !request
            .content_type
            .starts_with(oauth::MIME_FORM_URLENCODED)
        {
            return Ok(ParResponse::Fail(TokenFail::new(
                415,
                oauth::TOKEN_ERROR_INVALID_REQUEST,
                format!("Unsupported content type:{}", request.content_type),
            )));
        }

        let values = parse_form(&request.form);

        // The client is named by client_id, or by the assertion's iss.
        let mut client_id = values.get("client_id").cloned().unwrap_or_default();
        let client_assertion = values.get("client_assertion").cloned().unwrap_or_default();
        if client_id.is_empty() {
            if client_assertion.is_empty() {
                return Ok(ParResponse::Fail(TokenFail::invalid_client(
                    "client_id not found",
                )));
            }
            match jwt::decode_unverified(&client_assertion) {
                Ok(token) => client_id = token.str_claim("iss").to_string(),
                Err(_) => {
                    return Ok(ParResponse::Fail(TokenFail::invalid_request(format!(
                        "Could not parse client_assertion:{client_assertion}"
                    ))));
                }
            }
        }

        let client = match self.load_client(issuer_id, &client_id).await {
            Ok(client) => client,
            Err(StoreError::NotFound(_)) => {
                return Ok(ParResponse::Fail(TokenFail::invalid_client(format!(
                    "Client not found:{client_id}"
                ))));
            }
            Err(err) => return Err(err.into()),
        };

        let mut params = AuthorizationParameters::parse(&request.form);

        // https://www.rfc-editor.org/rfc/rfc9126.html#section-2.1
        // request_uri must never appear in the pushed body.
        if !params.request_uri.is_empty() {
            return Ok(ParResponse::Fail(TokenFail::invalid_request(format!(
                "Denied request_uri parameter:{}",
                params.request_uri
            ))));
        }

        let auth = ClientAuthentication {
            allow_audience: vec![
                issuer.meta.pushed_authorization_request_endpoint.clone(),
                issuer.meta.token_endpoint.clone(),
                issuer.meta.issuer.clone(),
            ],
            basic_auth: request.basic_auth.as_ref(),
            client: &client,
            values: &values,
        };
        if let Err(fail) = self.check_client_authentication(&auth).await {
            return Ok(ParResponse::Fail(fail));
        }

        if !params.request.is_empty() {
            if !issuer.meta.request_parameter_supported {
                return Ok(ParResponse::Fail(TokenFail::new(
                    400,
                    oauth::AUTHORIZATION_ERROR_REQUEST_NOT_SUPPORTED,
                    "request parameter not supported",
                )));
            }
            let old_response_type = params.response_type.clone();
            let old_client_id = params.client_id.clone();
            let request_object = params.request.clone();
            if let Err(fail) = self
                .analyze_request_object(&issuer, &client, &request_object, &mut params)
                .await
            {
                return Ok(ParResponse::Fail(TokenFail {
                    status_code: 400,
                    error: fail.error,
                }));
            }
            // https://openid.net/specs/openid-connect-core-1_0.html#RequestObject
            if !old_response_type.is_empty() && params.response_type != old_response_type {
                return Ok(ParResponse::Fail(TokenFail::invalid_request(
                    "Parameter response_type not match",
                )));
            }
            if !old_client_id.is_empty() && params.client_id != old_client_id {
                return Ok(ParResponse::Fail(TokenFail::invalid_request(
                    "Parameter client_id not match",
                )));
            }
            if !params.request_uri.is_empty() {
                return Ok(ParResponse::Fail(TokenFail::new(
                    400,
                    oauth::AUTHORIZATION_ERROR_INVALID_REQUEST_OBJECT,
                    format!("Denied request_uri parameter:{}", params.request_uri),
                )));
            }
        }

        // Registered URIs match on scheme+host+path; query and fragment
        // are disregarded here, exact matching happens at authorization.
        if !client.meta.redirect_uris.is_empty() {
            let Ok(uri) = url::Url::parse(&params.redirect_uri) else {
                return Ok(ParResponse::Fail(TokenFail::invalid_request(
                    "redirect_uri parse error",
                )));
            };
            let base = format!(
                "{}://{}{}",
                uri.scheme(),
                uri.host_str().unwrap_or(""),
                uri.path()
            );
            let base = match uri.port() {
                Some(port) => format!(
                    "{}://{}:{}{}",
                    uri.scheme(),
                    uri.host_str().unwrap_or(""),
                    port,
                    uri.path()
                ),
                None => base,
            };
            if !client.meta.redirect_uris.contains(&base) {
                return Ok(ParResponse::Fail(TokenFail::invalid_request(
                    "invalid redirect_uri",
                )));
            }
        }

        params.is_par = true;
        let stored = retry_if_error(RETRY_COUNT, || {
            let par_key = random::unique_id();
            let mut params = params.clone();
            params.par_key = par_key.clone();
            let par = PushedAuthorization::new(
                issuer_id,
                &client.identity.client_id,
                &par_key,
                params,
                Utc::now(),
            );
            let store = self.store.clone();
            async move {
                store.create(&par).await?;
                Ok::<PushedAuthorization, StoreError>(par)
            }
        })
        .await;

        match stored {
            Ok(par) => Ok(ParResponse::Success(ParSuccess {
                request_uri: format!("{}{}", oauth::SCHEME_REQUEST_URI, par.par_key),
                expires_in: 60,
            })),
            Err(err) => {
                error!(error = %err, "pushed authorization create retry exhausted");
                Err(err.into())
            }
        }
    }
}
