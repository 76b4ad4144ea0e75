//! Request-object (JAR) resolution and overlay.

use chrono::Utc;
use oxidp_claims::ClaimRules;
use oxidp_model::{AuthorizationParameters, Client, ClientProfile, Issuer};
use serde::Deserialize;
use serde_json::Value;

use crate::error::AuthorizationFail;
use crate::provider::Provider;

/// Algorithms FAPI forbids in client-originated JWTs.
pub(crate) const FAPI_REJECTION_ALGS: [&str; 4] = ["none", "RS256", "RS384", "RS512"];

/// Maximum age and validity window of a FAPI request object, seconds.
const FAPI_REQUEST_OBJECT_WINDOW_SECONDS: i64 = 60 * 60;

/// The authorization parameters carried inside a request object.
#[derive(Debug, Default, Deserialize)]
struct RequestObjectParams {
    #[serde(default)]
    claims: Option<ClaimRules>,
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    code_challenge: String,
    #[serde(default)]
    code_challenge_method: String,
    #[serde(default)]
    display: String,
    #[serde(default)]
    id_token_hint: String,
    #[serde(default)]
    login_hint: String,
    #[serde(default)]
    max_age: Option<i64>,
    #[serde(default)]
    nonce: String,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    redirect_uri: String,
    #[serde(default)]
    response_mode: String,
    #[serde(default)]
    response_type: String,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    ui_locales: String,
}

impl Provider {
    /// Parses a request object and merges it into `params`.
    ///
    /// Under FAPI 1.0 only the signed object is trusted: the outer
    /// parameters are cleared before the overlay. Otherwise non-empty
    /// object members win over the outer request per OIDC Core §6.1.
    /// `response_type` and `client_id` adopt the object's values
    /// unconditionally so the caller can enforce the match rule.
    pub(crate) async fn analyze_request_object(
        &self,
        issuer: &Issuer,
        client: &Client,
        jwt_string: &str,
        params: &mut AuthorizationParameters,
    ) -> Result<(), AuthorizationFail> {
        let token = self
            .parse_client_jwt(&client.meta, jwt_string)
            .await
            .map_err(|_| AuthorizationFail::invalid_request_object("request object parse error"))?;

        let object: RequestObjectParams =
            serde_json::from_value(Value::Object(token.claims.clone()))
                .map_err(|_| AuthorizationFail::invalid_request_object("request object parse error"))?;

        if client.extensions.profile == ClientProfile::Fapi1 {
            // https://openid.net/specs/openid-financial-api-part-2-1_0-final.html#authorization-server
            // Only the parameters inside the signed object are trusted.
            params.clear_for_request_object();
        }

        if let Some(claims) = &object.claims {
            if !claims.is_empty() {
                if let Ok(text) = serde_json::to_string(claims) {
                    params.claims = text;
                }
            }
        }
        params.client_id = object.client_id.clone();
        overlay(&mut params.code_challenge, &object.code_challenge);
        overlay(&mut params.code_challenge_method, &object.code_challenge_method);
        overlay(&mut params.display, &object.display);
        overlay(&mut params.id_token_hint, &object.id_token_hint);
        overlay(&mut params.login_hint, &object.login_hint);
        if let Some(max_age) = object.max_age {
            if max_age > 0 {
                params.max_age = max_age.to_string();
            }
        }
        overlay(&mut params.nonce, &object.nonce);
        if !object.prompt.is_empty() {
            params.prompts = split_list(&object.prompt);
        }
        overlay(&mut params.redirect_uri, &object.redirect_uri);
        overlay(&mut params.response_mode, &object.response_mode);
        params.response_type = object.response_type.clone();
        if !object.scope.is_empty() {
            params.scopes = split_list(&object.scope);
        }
        overlay(&mut params.state, &object.state);
        if !object.ui_locales.is_empty() {
            params.ui_locales = split_list(&object.ui_locales);
        }

        if client.extensions.profile.is_fapi() {
            // https://openid.net/specs/openid-financial-api-part-2-1_0.html#algorithm-considerations
            if FAPI_REJECTION_ALGS.contains(&token.header.alg.as_str()) {
                return Err(AuthorizationFail::invalid_request_object(
                    "signing alg not allow",
                ));
            }

            // https://www.rfc-editor.org/rfc/rfc9101.html#section-6.2
            let Some(exp) = token.numeric_date("exp") else {
                return Err(AuthorizationFail::invalid_request_object(
                    "jwt not contains exp",
                ));
            };
            let Some(nbf) = token.numeric_date("nbf") else {
                return Err(AuthorizationFail::invalid_request_object(
                    "jwt not contains nbf",
                ));
            };
            let now = Utc::now().timestamp();
            if now > exp {
                return Err(AuthorizationFail::invalid_request_object("jwt was expired"));
            }
            if now - nbf > FAPI_REQUEST_OBJECT_WINDOW_SECONDS {
                return Err(AuthorizationFail::invalid_request_object("nbf too past"));
            }
            if exp - nbf > FAPI_REQUEST_OBJECT_WINDOW_SECONDS {
                return Err(AuthorizationFail::invalid_request_object("exp too long"));
            }

            let audiences = token.audiences();
            if audiences.first().map(String::as_str) != Some(issuer.meta.issuer.as_str()) {
                return Err(AuthorizationFail::invalid_request_object("jwt aud not match"));
            }
            if token.str_claim("iss") != client.identity.client_id {
                return Err(AuthorizationFail::invalid_request_object("jwt iss not match"));
            }
        }

        Ok(())
    }
}

fn overlay(slot: &mut String, value: &str) {
    if !value.is_empty() {
        *slot = value.to_string();
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(' ')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
