//! Authorization request parameters.

use serde::{Deserialize, Serialize};

/// The parameters of an authorization request, after query/form parsing
/// and request-object resolution.
///
/// Values stay string-typed the way they arrived on the wire; the
/// orchestrator interprets them. Space-delimited multi-value parameters
/// (`scope`, `prompt`, `ui_locales`, `acr_values`) are split at parse time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationParameters {
    /// Requested scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// `response_type`, space-joined as requested.
    #[serde(default)]
    pub response_type: String,
    /// `client_id`.
    #[serde(default)]
    pub client_id: String,
    /// `redirect_uri`.
    #[serde(default)]
    pub redirect_uri: String,
    /// Opaque client state echoed back on the redirect.
    #[serde(default)]
    pub state: String,
    /// Requested response mode.
    #[serde(default)]
    pub response_mode: String,
    /// OIDC nonce.
    #[serde(default)]
    pub nonce: String,
    /// Display hint.
    #[serde(default)]
    pub display: String,
    /// Prompt values.
    #[serde(default)]
    pub prompts: Vec<String>,
    /// Maximum authentication age, string-encoded. Empty means not
    /// requested; negative disables the check; zero forces re-auth.
    #[serde(default)]
    pub max_age: String,
    /// Preferred UI locales.
    #[serde(default)]
    pub ui_locales: Vec<String>,
    /// ID Token hint.
    #[serde(default)]
    pub id_token_hint: String,
    /// Login hint.
    #[serde(default)]
    pub login_hint: String,
    /// Requested ACR values.
    #[serde(default)]
    pub acr_values: Vec<String>,
    /// Claims locales.
    #[serde(default)]
    pub claims_locales: String,
    /// Raw `claims` request parameter (JSON).
    #[serde(default)]
    pub claims: String,
    /// Client assertion type, when client auth rides on the request.
    #[serde(default)]
    pub client_assertion_type: String,
    /// Client assertion JWT.
    #[serde(default)]
    pub client_assertion: String,
    /// PKCE code challenge.
    #[serde(default)]
    pub code_challenge: String,
    /// PKCE code challenge method.
    #[serde(default)]
    pub code_challenge_method: String,
    /// Request object by value.
    #[serde(default)]
    pub request: String,
    /// Request object by reference, or a PAR handle.
    #[serde(default)]
    pub request_uri: String,
    /// Whether these parameters were adopted from a pushed authorization
    /// request.
    #[serde(default)]
    pub is_par: bool,
    /// The PAR record key these parameters came from.
    #[serde(default)]
    pub par_key: String,
}

impl AuthorizationParameters {
    /// Parses query-string or form-urlencoded bytes.
    ///
    /// Unknown keys are ignored; repeated keys keep the first value.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(input.as_bytes()) {
            let value = value.into_owned();
            match key.as_ref() {
                "scope" => set_first_list(&mut params.scopes, &value),
                "response_type" => set_first(&mut params.response_type, value),
                "client_id" => set_first(&mut params.client_id, value),
                "redirect_uri" => set_first(&mut params.redirect_uri, value),
                "state" => set_first(&mut params.state, value),
                "response_mode" => set_first(&mut params.response_mode, value),
                "nonce" => set_first(&mut params.nonce, value),
                "display" => set_first(&mut params.display, value),
                "prompt" => set_first_list(&mut params.prompts, &value),
                "max_age" => set_first(&mut params.max_age, value),
                "ui_locales" => set_first_list(&mut params.ui_locales, &value),
                "id_token_hint" => set_first(&mut params.id_token_hint, value),
                "login_hint" => set_first(&mut params.login_hint, value),
                "acr_values" => set_first_list(&mut params.acr_values, &value),
                "claims_locales" => set_first(&mut params.claims_locales, value),
                "claims" => set_first(&mut params.claims, value),
                "client_assertion_type" => set_first(&mut params.client_assertion_type, value),
                "client_assertion" => set_first(&mut params.client_assertion, value),
                "code_challenge" => set_first(&mut params.code_challenge, value),
                "code_challenge_method" => set_first(&mut params.code_challenge_method, value),
                "request" => set_first(&mut params.request, value),
                "request_uri" => set_first(&mut params.request_uri, value),
                _ => {}
            }
        }
        params
    }

    /// Clears every parameter ahead of a FAPI request-object overlay.
    ///
    /// Only the signed object is trusted under FAPI 1.0, so the outer
    /// request contributes nothing. Client defaults are not substituted
    /// here; `default_max_age` applies where session freshness is
    /// enforced.
    pub fn clear_for_request_object(&mut self) {
        *self = Self::default();
    }
}

fn split_list(value: &str) -> Vec<String> {
    value.split(' ').filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn set_first(slot: &mut String, value: String) {
    if slot.is_empty() {
        *slot = value;
    }
}

fn set_first_list(slot: &mut Vec<String>, value: &str) {
    if slot.is_empty() {
        *slot = split_list(value);
    }
}
