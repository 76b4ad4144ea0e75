//! The authorization endpoint state machine.
//!
//! Parses the incoming request, resolves request objects and PAR handles,
//! validates the result, checks the profile gates, records the pending
//! [`Request`] and decides the next action: show the login UI, issue
//! immediately off an existing session or `id_token_hint`, or fail.
//!
//! PAR handles resolve before the required-parameter checks so a pushed
//! request needs nothing but `client_id` and `request_uri` on the front
//! channel (RFC 9126 §4).

use std::collections::BTreeMap;

use chrono::Utc;
use oxidp_crypto::random;
use oxidp_model::{
    AuthorizationParameters, Client, ClientMeta, ClientProfile, Issuer, PushedAuthorization,
    Request, Session, SessionGroup,
};
use oxidp_store::{retry_if_error, StoreError};
use tracing::{error, warn};

use crate::error::{AuthorizationFail, ProviderError};
use crate::provider::{Provider, RETRY_COUNT};
use crate::redirect::RedirectBuilder;
use crate::request::AuthorizationRequest;
use crate::types::{oauth, resolve_response_mode};

/// Decision of the authorization endpoint.
#[derive(Debug)]
pub enum AuthorizationResponse {
    /// Show the login UI for the recorded request.
    Login(LoginAction),
    /// The end-user is already authenticated; proceed to issuance.
    Issue(IssueAction),
    /// Send the user agent to this URL.
    Redirect(String),
    /// Serve this HTML document (form-post response modes).
    Html(String),
    /// The request failed and no validated redirect URI is available to
    /// carry the error; the embedder renders an error page.
    Fail(AuthorizationFail),
}

/// Data the login UI needs.
#[derive(Debug)]
pub struct LoginAction {
    /// Pending request id.
    pub request_id: String,
    /// Metadata of the requesting client.
    pub client: ClientMeta,
    /// Resolved parameters.
    pub params: AuthorizationParameters,
}

/// Data for immediate issuance (valid session or verified hint).
#[derive(Debug)]
pub struct IssueAction {
    /// Pending request id.
    pub request_id: String,
    /// Session the decision rode on; empty for `id_token_hint`.
    pub session_id: String,
    /// Authenticated subject.
    pub subject: String,
    /// Metadata of the requesting client.
    pub client: ClientMeta,
    /// Resolved parameters.
    pub params: AuthorizationParameters,
}

impl Provider {
    /// Handles an authorization request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] only for server-internal conditions;
    /// protocol failures come back inside the response, redirected to the
    /// client whenever a validated `redirect_uri` is available.
    pub async fn authorize(
        &self,
        issuer_id: &str,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationResponse, ProviderError> {
        let issuer = self.load_issuer(issuer_id).await?;

        let parse_target = match request.method.as_str() {
            "GET" => match url::Url::parse(&request.url) {
                Ok(url) => url.query().unwrap_or("").to_string(),
                Err(_) => {
                    return Ok(AuthorizationResponse::Fail(
                        AuthorizationFail::invalid_request("request url is not parseable"),
                    ));
                }
            },
            "POST" => {
                if !request
                    .content_type
                    .starts_with(oauth::MIME_FORM_URLENCODED)
                {
                    return Ok(AuthorizationResponse::Fail(
                        AuthorizationFail::invalid_request(
                            "When using the POST method, Content-Type must be specified as \
                             \"application/x-www-form-urlencoded\"",
                        ),
                    ));
                }
                request.form.clone()
            }
            _ => {
                return Ok(AuthorizationResponse::Fail(
                    AuthorizationFail::invalid_request(
                        "Must use the GET or POST method to call the Authorization Endpoint",
                    ),
                ));
            }
        };

        let params = AuthorizationParameters::parse(&parse_target);

        if params.client_id.is_empty() {
            return Ok(AuthorizationResponse::Fail(
                AuthorizationFail::invalid_request("client_id is required"),
            ));
        }
        let client = match self.load_client(&issuer.id, &params.client_id).await {
            Ok(client) => client,
            Err(StoreError::NotFound(_)) => {
                return Ok(AuthorizationResponse::Fail(
                    AuthorizationFail::unauthorized_client("Unknown client_id"),
                ));
            }
            Err(err) => return Err(err.into()),
        };

        match self
            .authorize_inner(&issuer, &client, params.clone(), &request.sessions)
            .await?
        {
            Ok(response) => Ok(response),
            // A failing resolved request redirects with the outer
            // request's state and transport when that is safe.
            Err(fail) => self.make_fail_response(&issuer, &client, &params, fail).await,
        }
    }

    /// Cancels a pending request (the end-user declined) and builds the
    /// `access_denied` response.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Store`] when the request cannot be
    /// loaded or removed.
    pub async fn cancel(
        &self,
        issuer_id: &str,
        request_id: &str,
    ) -> Result<AuthorizationResponse, ProviderError> {
        let issuer = self.load_issuer(issuer_id).await?;
        let request = self
            .get_with_retry(&Request::probe(issuer_id, request_id))
            .await?;
        self.store.delete(&request).await?;
        let client = self.load_client(issuer_id, &request.client_id).await?;
        self.make_fail_response(
            &issuer,
            &client,
            &request.params,
            AuthorizationFail::access_denied(),
        )
        .await
    }

    async fn authorize_inner(
        &self,
        issuer: &Issuer,
        client: &Client,
        mut params: AuthorizationParameters,
        sessions: &std::collections::HashMap<String, String>,
    ) -> Result<Result<AuthorizationResponse, AuthorizationFail>, ProviderError> {
        let outer_request_uri = params.request_uri.clone();
        let mut is_par = false;

        if !outer_request_uri.is_empty() {
            if !issuer.meta.request_uri_parameter_supported {
                return Ok(Err(AuthorizationFail::request_uri_not_supported()));
            }

            if let Some(par_key) = outer_request_uri.strip_prefix(oauth::SCHEME_REQUEST_URI) {
                is_par = true;
                let probe =
                    PushedAuthorization::probe(&issuer.id, &client.identity.client_id, par_key);
                let par = match self.store.get(&probe).await {
                    Ok(par) => par,
                    Err(StoreError::NotFound(_)) => {
                        return Ok(Err(AuthorizationFail::invalid_request_uri(
                            "PushedAuthorization is expired",
                        )));
                    }
                    Err(err) => return Err(err.into()),
                };
                if Utc::now().timestamp() > par.expire_at.timestamp() {
                    return Ok(Err(AuthorizationFail::invalid_request_uri(
                        "PushedAuthorization is expired",
                    )));
                }
                // Adopt the pushed parameters wholesale.
                params = par.params.clone();
                // https://www.rfc-editor.org/rfc/rfc9126.html#section-7.3
                // Request URIs are one-time use.
                if let Err(err) = self.store.delete(&par).await {
                    warn!(error = %err, "failed to delete used pushed authorization");
                }
            } else {
                let body = match self.fetch_text(&outer_request_uri).await {
                    Ok(body) => body,
                    Err(err) => {
                        return Ok(Err(AuthorizationFail::invalid_request_uri(err)));
                    }
                };
                let old_response_type = params.response_type.clone();
                let old_client_id = params.client_id.clone();
                if let Err(fail) = self
                    .analyze_request_object(issuer, client, &body, &mut params)
                    .await
                {
                    return Ok(Err(fail));
                }
                // https://openid.net/specs/openid-connect-core-1_0.html#RequestObject
                // response_type and client_id must match the outer request.
                if params.response_type != old_response_type {
                    return Ok(Err(AuthorizationFail::invalid_request_uri(
                        "Parameter response_type not match",
                    )));
                }
                if params.client_id != old_client_id {
                    return Ok(Err(AuthorizationFail::invalid_request_uri(
                        "Parameter client_id not match",
                    )));
                }
            }
        }

        let request_object = params.request.clone();
        if !request_object.is_empty() {
            if !issuer.meta.request_parameter_supported {
                return Ok(Err(AuthorizationFail::request_not_supported()));
            }
            let old_response_type = params.response_type.clone();
            let old_client_id = params.client_id.clone();
            if let Err(fail) = self
                .analyze_request_object(issuer, client, &request_object, &mut params)
                .await
            {
                return Ok(Err(fail));
            }
            if params.response_type != old_response_type {
                return Ok(Err(AuthorizationFail::invalid_request(
                    "Parameter response_type not match",
                )));
            }
            if params.client_id != old_client_id {
                return Ok(Err(AuthorizationFail::invalid_request(
                    "Parameter client_id not match",
                )));
            }
        }

        // Required parameters per OIDC Core §3.1.2.1, checked on the
        // resolved parameter set.
        if params.scopes.is_empty() {
            return Ok(Err(AuthorizationFail::invalid_request("scope is required")));
        }
        if params.response_type.is_empty() {
            return Ok(Err(AuthorizationFail::invalid_request(
                "response_type is required",
            )));
        }
        if !oauth::response_types_supported().contains(&params.response_type.as_str()) {
            return Ok(Err(AuthorizationFail::invalid_request(format!(
                "response_type({}) is unsupported",
                params.response_type
            ))));
        }
        if params.redirect_uri.is_empty() {
            return Ok(Err(AuthorizationFail::invalid_request(
                "redirect_uri is required",
            )));
        }
        if !client.meta.redirect_uris.is_empty()
            && !client.meta.redirect_uris.contains(&params.redirect_uri)
        {
            return Ok(Err(AuthorizationFail::invalid_request(
                "redirect_uri not match",
            )));
        }

        if let Err(fail) = profile_gates(
            client,
            &params,
            &request_object,
            &outer_request_uri,
            is_par,
        ) {
            return Ok(Err(fail));
        }

        // OIDC Core §3.2.2.1: nonce is required whenever an ID Token is
        // returned from the authorization endpoint.
        if params
            .response_type
            .split(' ')
            .any(|t| t == oauth::RESPONSE_TYPE_ID_TOKEN)
            && params.nonce.is_empty()
        {
            return Ok(Err(AuthorizationFail::invalid_request(format!(
                "Missing nonce: response_type:{}",
                params.response_type
            ))));
        }

        // The transport must be resolvable before anything is persisted.
        if let Err(err) = resolve_response_mode(&params.response_type, &params.response_mode) {
            return Ok(Err(AuthorizationFail::invalid_request(err.to_string())));
        }

        let issuer_url = issuer.meta.issuer.clone();
        let request = match retry_if_error(RETRY_COUNT, || {
            let request = Request::new(
                &random::unique_id(),
                &issuer_url,
                client,
                params.clone(),
                Utc::now(),
            );
            let store = self.store.clone();
            async move {
                store.create(&request).await?;
                Ok::<Request, StoreError>(request)
            }
        })
        .await
        {
            Ok(request) => request,
            Err(err) => {
                error!(error = %err, "pending request create retry exhausted");
                return Err(err.into());
            }
        };

        // Session lookup via the client's session-group cookie.
        let group = self
            .store
            .get(&SessionGroup::probe(
                &issuer.id,
                &client.attributes.session_group_id,
            ))
            .await?;
        let session = self
            .select_session(issuer, client, &group, &params, sessions)
            .await;

        if params.prompts.iter().any(|p| p == "none") {
            if !params.id_token_hint.is_empty() {
                match self.verify_id_token(issuer, &params.id_token_hint).await {
                    Ok(hint) => {
                        return Ok(Ok(AuthorizationResponse::Issue(IssueAction {
                            request_id: request.id,
                            session_id: String::new(),
                            subject: hint.str_claim("sub").to_string(),
                            client: client.meta.clone(),
                            params,
                        })));
                    }
                    Err(err) => {
                        warn!(error = %err, "id_token_hint verification failed");
                        return Ok(Err(AuthorizationFail::login_required()));
                    }
                }
            }
            match session {
                Some(session) => Ok(Ok(AuthorizationResponse::Issue(IssueAction {
                    request_id: request.id,
                    session_id: session.id,
                    subject: session.subject,
                    client: client.meta.clone(),
                    params,
                }))),
                None => Ok(Err(AuthorizationFail::login_required())),
            }
        } else if params.prompts.is_empty() {
            match session {
                Some(session) => Ok(Ok(AuthorizationResponse::Issue(IssueAction {
                    request_id: request.id,
                    session_id: session.id,
                    subject: session.subject,
                    client: client.meta.clone(),
                    params,
                }))),
                None => Ok(Ok(AuthorizationResponse::Login(LoginAction {
                    request_id: request.id,
                    client: client.meta.clone(),
                    params,
                }))),
            }
        } else {
            // login / consent / select_account all route to the UI.
            Ok(Ok(AuthorizationResponse::Login(LoginAction {
                request_id: request.id,
                client: client.meta.clone(),
                params,
            })))
        }
    }

    /// Returns the live session named by the group cookie, if it is valid
    /// for this request.
    async fn select_session(
        &self,
        issuer: &Issuer,
        client: &Client,
        group: &SessionGroup,
        params: &AuthorizationParameters,
        sessions: &std::collections::HashMap<String, String>,
    ) -> Option<Session> {
        let session_id = sessions.get(&group.id)?;
        if session_id.is_empty() {
            return None;
        }
        let session = self
            .store
            .get(&Session::probe(&issuer.id, session_id))
            .await
            .ok()?;
        if session.session_group_id != group.id {
            return None;
        }
        let age = Utc::now().timestamp() - session.create_at.timestamp();
        if !max_age_satisfied(effective_max_age(params, &client.meta), age) {
            return None;
        }
        Some(session)
    }

    /// Routes a protocol failure back to the client through the
    /// response-mode machinery, or falls back to a bare failure when no
    /// validated redirect URI is available to carry it.
    pub(crate) async fn make_fail_response(
        &self,
        issuer: &Issuer,
        client: &Client,
        params: &AuthorizationParameters,
        fail: AuthorizationFail,
    ) -> Result<AuthorizationResponse, ProviderError> {
        let redirectable = !params.redirect_uri.is_empty()
            && (client.meta.redirect_uris.is_empty()
                || client.meta.redirect_uris.contains(&params.redirect_uri));
        if !redirectable {
            return Ok(AuthorizationResponse::Fail(fail));
        }

        let mut values = BTreeMap::new();
        values.insert("error".to_string(), fail.error.error.clone());
        values.insert(
            "error_description".to_string(),
            fail.error.error_description.clone(),
        );
        values.insert("error_uri".to_string(), fail.error.error_uri.clone());
        values.insert("state".to_string(), params.state.clone());
        if issuer.meta.authorization_response_iss_parameter_supported {
            // RFC 9207
            values.insert("iss".to_string(), issuer.meta.issuer.clone());
        }
        let builder = match RedirectBuilder::new(issuer, client, params, values) {
            Ok(builder) => builder,
            Err(err) => {
                warn!(error = %err, "error response not redirectable");
                return Ok(AuthorizationResponse::Fail(fail));
            }
        };
        let form_post = builder.is_form_post();
        let out = builder.build(self, Utc::now()).await?;
        if form_post {
            Ok(AuthorizationResponse::Html(out))
        } else {
            Ok(AuthorizationResponse::Redirect(out))
        }
    }
}

/// Applies the FAPI 1.0 / 2.0 authorization gates.
fn profile_gates(
    client: &Client,
    params: &AuthorizationParameters,
    request_object: &str,
    request_uri: &str,
    is_par: bool,
) -> Result<(), AuthorizationFail> {
    match client.extensions.profile {
        ClientProfile::Unspecified => Ok(()),
        ClientProfile::Fapi1 => {
            // https://openid.net/specs/openid-financial-api-part-2-1_0.html#authorization-server
            if request_object.is_empty() && request_uri.is_empty() {
                return Err(AuthorizationFail::invalid_request(
                    "FAPI needs request or request_uri",
                ));
            }
            let allowed = params.response_type == "code id_token"
                || (params.response_type == "code" && params.response_mode == "jwt");
            if !allowed {
                return Err(AuthorizationFail::invalid_request(format!(
                    "FAPI does not allow response_type:{} response_mode:{}",
                    params.response_type, params.response_mode
                )));
            }
            if params.scopes.iter().any(|s| s == "openid") {
                if params.nonce.is_empty() {
                    return Err(AuthorizationFail::invalid_request(
                        "FAPI require nonce when requesting openid scope",
                    ));
                }
            } else if params.state.is_empty() {
                return Err(AuthorizationFail::invalid_request(
                    "FAPI require state when not requesting openid scope",
                ));
            }
            if is_par && !pkce_s256(params) {
                // https://openid.net/specs/openid-financial-api-part-2-1_0-final.html#rfc.section.5.2.2
                return Err(AuthorizationFail::invalid_request(format!(
                    "FAPI require code_challenge and code_challenge_method(S256): {}, {}",
                    params.code_challenge, params.code_challenge_method
                )));
            }
            Ok(())
        }
        ClientProfile::Fapi2 => {
            // https://openid.net/specs/fapi-2_0-security-profile.html#section-5.3.1.2
            if request_uri.is_empty() {
                return Err(AuthorizationFail::invalid_request("FAPI needs request_uri"));
            }
            if params.response_type != oauth::RESPONSE_TYPE_CODE {
                return Err(AuthorizationFail::invalid_request(format!(
                    "FAPI does not allow response_type:{} response_mode:{}",
                    params.response_type, params.response_mode
                )));
            }
            if !pkce_s256(params) {
                return Err(AuthorizationFail::invalid_request(format!(
                    "FAPI require code_challenge and code_challenge_method(S256): {}, {}",
                    params.code_challenge, params.code_challenge_method
                )));
            }
            Ok(())
        }
    }
}

fn pkce_s256(params: &AuthorizationParameters) -> bool {
    !params.code_challenge.is_empty() && params.code_challenge_method == oauth::PKCE_METHOD_S256
}

/// The `max_age` to enforce for a request: the request's own value, or
/// the client's registered `default_max_age` when the request omitted it.
fn effective_max_age<'a>(params: &'a AuthorizationParameters, meta: &'a ClientMeta) -> &'a str {
    if params.max_age.is_empty() {
        &meta.default_max_age
    } else {
        &params.max_age
    }
}

/// Applies the `max_age` freshness rule to a session's age.
///
/// Empty or unparseable values mean "not requested"; a negative value
/// disables the check; zero forces re-authentication.
fn max_age_satisfied(max_age: &str, age_seconds: i64) -> bool {
    if max_age.is_empty() {
        return true;
    }
    match max_age.parse::<i64>() {
        Ok(0) => false,
        Ok(limit) if limit > 0 => age_seconds <= limit,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_age_rules() {
        assert!(max_age_satisfied("", 10_000));
        assert!(max_age_satisfied("not-a-number", 10_000));
        assert!(max_age_satisfied("-1", 10_000));
        assert!(!max_age_satisfied("0", 0));
        assert!(max_age_satisfied("600", 600));
        assert!(!max_age_satisfied("600", 601));
    }

    #[test]
    fn max_age_falls_back_to_client_default() {
        let mut meta = ClientMeta::default();
        meta.default_max_age = "600".to_string();

        // Request did not send max_age: the registered default applies.
        let mut params = AuthorizationParameters::default();
        assert_eq!(effective_max_age(&params, &meta), "600");

        // A request value always wins over the default.
        params.max_age = "30".to_string();
        assert_eq!(effective_max_age(&params, &meta), "30");

        // Neither set: no freshness requirement.
        let bare = AuthorizationParameters::default();
        assert_eq!(effective_max_age(&bare, &ClientMeta::default()), "");
    }

    #[test]
    fn fapi1_requires_request_object() {
        let issuer = Issuer::probe("t1");
        let mut client = Client::with_defaults(&issuer, "c1", "sg1", Utc::now());
        client.extensions.profile = ClientProfile::Fapi1;
        let mut params = AuthorizationParameters::default();
        params.response_type = "code id_token".to_string();
        params.scopes = vec!["openid".to_string()];
        params.nonce = "n".to_string();

        let err = profile_gates(&client, &params, "", "", false).unwrap_err();
        assert!(err.error.error_description.contains("request or request_uri"));
        assert!(profile_gates(&client, &params, "jwt-value", "", false).is_ok());
    }

    #[test]
    fn fapi1_state_required_without_openid() {
        let issuer = Issuer::probe("t1");
        let mut client = Client::with_defaults(&issuer, "c1", "sg1", Utc::now());
        client.extensions.profile = ClientProfile::Fapi1;
        let mut params = AuthorizationParameters::default();
        params.response_type = "code id_token".to_string();
        params.scopes = vec!["accounts".to_string()];

        let err = profile_gates(&client, &params, "jwt-value", "", false).unwrap_err();
        assert!(err.error.error_description.contains("require state"));
        params.state = "S".to_string();
        assert!(profile_gates(&client, &params, "jwt-value", "", false).is_ok());
    }

    #[test]
    fn fapi2_requires_par_and_pkce() {
        let issuer = Issuer::probe("t1");
        let mut client = Client::with_defaults(&issuer, "c1", "sg1", Utc::now());
        client.extensions.profile = ClientProfile::Fapi2;
        let mut params = AuthorizationParameters::default();
        params.response_type = "code".to_string();

        assert!(profile_gates(&client, &params, "", "", false).is_err());

        params.code_challenge = "challenge".to_string();
        params.code_challenge_method = "S256".to_string();
        assert!(profile_gates(
            &client,
            &params,
            "",
            "urn:ietf:params:oauth:request_uri:abc",
            true
        )
        .is_ok());

        params.response_type = "code id_token".to_string();
        assert!(profile_gates(
            &client,
            &params,
            "",
            "urn:ietf:params:oauth:request_uri:abc",
            true
        )
        .is_err());
    }
}
