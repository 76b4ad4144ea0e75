//! Issuance of codes and tokens after the end-user authenticated.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use oxidp_crypto::{random, token_hash, SigningAlgorithm};
use oxidp_model::{
    Authorized, AuthorizationCode, Client, Issuer, PushedAuthorization, Request, Session,
    TokenIdentifier,
};
use oxidp_store::{retry_if_error, StoreError};
use serde_json::{Map, Value};
use tracing::error;

use crate::error::ProviderError;
use crate::provider::{Provider, RETRY_COUNT};
use crate::redirect::RedirectBuilder;
use crate::request::IssueRequest;
use crate::session::session_state;
use crate::types::oauth;

/// Result of issue/cancel: a redirect or a form-post document.
#[derive(Debug)]
pub enum IssueResponse {
    /// Send the user agent to this URL.
    Redirect(String),
    /// Serve this HTML document.
    Html(String),
}

impl Provider {
    /// Completes a pending authorization request for an authenticated
    /// subject, minting the artifacts the `response_type` asks for and
    /// encoding the response for the client.
    ///
    /// The raw user claims are obtained from the embedder's
    /// [`crate::SdkCallbacks::get_user_claims`].
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] when the request is gone,
    /// [`ProviderError::PermissionDenied`] on a session subject mismatch,
    /// and store/signing errors otherwise.
    pub async fn issue(
        &self,
        issuer_id: &str,
        issue: &IssueRequest,
    ) -> Result<IssueResponse, ProviderError> {
        let issuer = self.load_issuer(issuer_id).await?;
        let request = match self
            .get_with_retry(&Request::probe(issuer_id, &issue.request_id))
            .await
        {
            Ok(request) => request,
            Err(err) => {
                error!(error = %err, "pending request load retry exhausted");
                return Err(ProviderError::NotFound("request not found".to_string()));
            }
        };
        let client = self.load_client(issuer_id, &request.client_id).await?;

        let mut auth_time = Utc::now();
        if !issue.session_id.is_empty() {
            if let Ok(session) = self
                .store
                .get(&Session::probe(issuer_id, &issue.session_id))
                .await
            {
                if issue.subject != session.subject {
                    error!(
                        subject = %issue.subject,
                        session_subject = %session.subject,
                        "issue subject does not match its session"
                    );
                    return Err(ProviderError::PermissionDenied(
                        "subject mismatch".to_string(),
                    ));
                }
                auth_time = session.create_at;
            }
        }

        let claims = self
            .sdk_callbacks
            .get_user_claims(&issue.subject)
            .await
            .map_err(|e| ProviderError::Callback(e.to_string()))?;
        let authorized = Authorized::new(&request, &issue.subject, &issue.session_id, auth_time, claims);

        let response_types: Vec<&str> = request.params.response_type.split(' ').collect();

        // Code and access token are independent and mint concurrently;
        // the ID token waits for both because c_hash/at_hash cover them.
        let code_fut = async {
            if response_types.contains(&oauth::RESPONSE_TYPE_CODE) {
                let code = self
                    .create_authorization_code(&request, &client, &authorized)
                    .await?;
                Ok(Some(code.code))
            } else {
                Ok::<Option<String>, ProviderError>(None)
            }
        };
        let access_fut = async {
            if response_types.contains(&oauth::RESPONSE_TYPE_TOKEN) {
                let access = self.create_access_token(&client, &authorized, "").await?;
                Ok(Some(access.identifier))
            } else {
                Ok::<Option<String>, ProviderError>(None)
            }
        };
        let (code, access) = tokio::try_join!(code_fut, access_fut)?;
        let code_value = code.unwrap_or_default();
        let access_token = access.unwrap_or_default();
        let expires_in = client.attributes.access_token_lifetime_seconds;

        let mut id_token = String::new();
        if response_types.contains(&oauth::RESPONSE_TYPE_ID_TOKEN) {
            let identifier = self.create_id_token_identifier(&client, &authorized).await?;
            let claims = make_id_token_claims(
                &issuer,
                &client,
                &identifier,
                Utc::now(),
                &code_value,
                &access_token,
                &request.params.state,
            );
            id_token = self
                .sign_jwt(&issuer, &claims, &client.meta.id_token_signed_response_alg)
                .await?;
        }

        // Non-code flows consumed the request too.
        if !response_types.contains(&oauth::RESPONSE_TYPE_CODE) {
            self.store.delete(&request).await?;
        }

        let mut values = BTreeMap::new();
        values.insert("access_token".to_string(), access_token.clone());
        if !access_token.is_empty() {
            values.insert("expires_in".to_string(), expires_in.to_string());
            values.insert("token_type".to_string(), "Bearer".to_string());
        }
        values.insert("code".to_string(), code_value);
        values.insert("id_token".to_string(), id_token);
        if !issue.session_id.is_empty() {
            values.insert(
                "session_state".to_string(),
                session_state(issuer_id, &request.client_id, &issue.session_id),
            );
        }
        values.insert("state".to_string(), request.params.state.clone());

        let builder = RedirectBuilder::new(&issuer, &client, &request.params, values)?;
        let form_post = builder.is_form_post();
        let out = builder.build(self, Utc::now()).await?;
        if form_post {
            Ok(IssueResponse::Html(out))
        } else {
            Ok(IssueResponse::Redirect(out))
        }
    }

    /// Allocates the one-time code, retiring the PAR record and the
    /// pending request with it.
    async fn create_authorization_code(
        &self,
        request: &Request,
        client: &Client,
        authorized: &Authorized,
    ) -> Result<AuthorizationCode, ProviderError> {
        let lifetime = client.attributes.authorization_code_lifetime_seconds;
        let result = retry_if_error(RETRY_COUNT, || {
            let code = AuthorizationCode::new(
                &random::uuid_v4(),
                authorized.clone(),
                lifetime,
                Utc::now(),
            );
            let store = self.store.clone();
            let request = request.clone();
            async move {
                store.create(&code).await?;
                if request.params.is_par {
                    // https://www.rfc-editor.org/rfc/rfc9126.html#section-7.3
                    let par = PushedAuthorization::probe(
                        &request.issuer_id,
                        &request.client_id,
                        &request.params.par_key,
                    );
                    store.delete(&par).await?;
                }
                store.delete(&request).await?;
                Ok::<AuthorizationCode, StoreError>(code)
            }
        })
        .await;
        result.map_err(|err| {
            error!(error = %err, "authorization code write retry exhausted");
            ProviderError::from(err)
        })
    }

    pub(crate) async fn create_access_token(
        &self,
        client: &Client,
        authorized: &Authorized,
        tls_client_certificate: &str,
    ) -> Result<TokenIdentifier, ProviderError> {
        let lifetime = client.attributes.access_token_lifetime_seconds;
        let token = retry_if_error(RETRY_COUNT, || {
            let token = TokenIdentifier::access(
                &random::uuid_v4(),
                authorized.clone(),
                lifetime,
                Utc::now(),
                tls_client_certificate,
            );
            let store = self.store.clone();
            async move {
                store.create(&token).await?;
                Ok::<TokenIdentifier, StoreError>(token)
            }
        })
        .await?;
        Ok(token)
    }

    pub(crate) async fn create_refresh_token(
        &self,
        client: &Client,
        authorized: &Authorized,
    ) -> Result<TokenIdentifier, ProviderError> {
        let lifetime = client.attributes.refresh_token_lifetime_seconds;
        let token = retry_if_error(RETRY_COUNT, || {
            let token = TokenIdentifier::refresh(
                &random::uuid_v4(),
                authorized.clone(),
                lifetime,
                Utc::now(),
            );
            let store = self.store.clone();
            async move {
                store.create(&token).await?;
                Ok::<TokenIdentifier, StoreError>(token)
            }
        })
        .await?;
        Ok(token)
    }

    pub(crate) async fn create_id_token_identifier(
        &self,
        client: &Client,
        authorized: &Authorized,
    ) -> Result<TokenIdentifier, ProviderError> {
        let lifetime = client.attributes.id_token_lifetime_seconds;
        let token = retry_if_error(RETRY_COUNT, || {
            let token = TokenIdentifier::id(
                &random::uuid_v4(),
                authorized.clone(),
                lifetime,
                Utc::now(),
            );
            let store = self.store.clone();
            async move {
                store.create(&token).await?;
                Ok::<TokenIdentifier, StoreError>(token)
            }
        })
        .await?;
        Ok(token)
    }
}

/// Assembles the ID Token claim set for a minted identifier.
///
/// Filtered user claims come first; the protocol claims are written last
/// and win. `c_hash`/`at_hash`/`s_hash` are added for whichever inputs are
/// present, hashed per the ID Token signing algorithm family.
pub(crate) fn make_id_token_claims(
    issuer: &Issuer,
    client: &Client,
    identifier: &TokenIdentifier,
    now: DateTime<Utc>,
    code: &str,
    access_token: &str,
    state: &str,
) -> Map<String, Value> {
    let authorized = &identifier.authorized;
    let source: Map<String, Value> =
        serde_json::from_str(&authorized.claims).unwrap_or_default();
    let rules = authorized.claim_rules();

    let mut claims = Map::new();
    rules.make_id_token_claims(&source, &mut claims);
    // https://openid.net/specs/openid-connect-core-1_0.html#rfc.section.5.4
    // For response_type=id_token the userinfo claims ride in the ID Token.
    if authorized.params.response_type == oauth::RESPONSE_TYPE_ID_TOKEN {
        rules.make_userinfo_claims(&source, &mut claims);
    }

    let hash_alg: SigningAlgorithm = client
        .meta
        .id_token_signed_response_alg
        .parse()
        .unwrap_or(SigningAlgorithm::Rs256);

    // https://openid.net/specs/openid-connect-core-1_0.html#IDToken
    claims.insert("iss".to_string(), Value::String(authorized.issuer.clone()));
    claims.insert("sub".to_string(), Value::String(authorized.subject.clone()));
    claims.insert("aud".to_string(), Value::String(authorized.client_id.clone()));
    claims.insert(
        "exp".to_string(),
        Value::Number(identifier.expire_at.timestamp().into()),
    );
    claims.insert("iat".to_string(), Value::Number(now.timestamp().into()));
    if !authorized.params.max_age.is_empty() || client.meta.require_auth_time {
        claims.insert(
            "auth_time".to_string(),
            Value::Number(authorized.auth_time.into()),
        );
    }
    if !authorized.params.nonce.is_empty() {
        claims.insert(
            "nonce".to_string(),
            Value::String(authorized.params.nonce.clone()),
        );
    }
    claims.insert(
        "jti".to_string(),
        Value::String(identifier.identifier.clone()),
    );
    if !code.is_empty() {
        claims.insert(
            "c_hash".to_string(),
            Value::String(token_hash(hash_alg, code)),
        );
    }
    if !access_token.is_empty() {
        claims.insert(
            "at_hash".to_string(),
            Value::String(token_hash(hash_alg, access_token)),
        );
    }
    if !state.is_empty() {
        claims.insert(
            "s_hash".to_string(),
            Value::String(token_hash(hash_alg, state)),
        );
    }
    if issuer.meta.backchannel_logout_session_supported
        || issuer.meta.frontchannel_logout_session_supported
    {
        claims.insert(
            "sid".to_string(),
            Value::String(authorized.session_id.clone()),
        );
    }
    claims
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxidp_model::AuthorizationParameters;

    fn fixture() -> (Issuer, Client, TokenIdentifier) {
        let mut issuer = Issuer::probe("t1");
        issuer.meta.issuer = "https://op.example.com".to_string();
        let client = Client::with_defaults(&issuer, "c1", "sg1", Utc::now());

        let mut params = AuthorizationParameters::default();
        params.response_type = "code".to_string();
        params.nonce = "N".to_string();
        params.max_age = "300".to_string();
        params.scopes = vec!["openid".to_string(), "email".to_string()];

        let request = Request::new("r1", "https://op.example.com", &client, params, Utc::now());
        let authorized = Authorized::new(
            &request,
            "u1",
            "s1",
            Utc::now(),
            r#"{"email":"a@b","name":"X"}"#.to_string(),
        );
        let identifier = TokenIdentifier::id("jti-1", authorized, 3_600, Utc::now());
        (issuer, client, identifier)
    }

    #[test]
    fn id_token_claims_carry_protocol_fields() {
        let (issuer, client, identifier) = fixture();
        let claims = make_id_token_claims(
            &issuer,
            &client,
            &identifier,
            Utc::now(),
            "code-1",
            "token-1",
            "state-1",
        );
        assert_eq!(claims["iss"], "https://op.example.com");
        assert_eq!(claims["sub"], "u1");
        assert_eq!(claims["aud"], "c1");
        assert_eq!(claims["nonce"], "N");
        assert_eq!(claims["jti"], "jti-1");
        // max_age was requested.
        assert!(claims.contains_key("auth_time"));
        // All three hashes, left 128 bits of SHA-256 → 22 chars b64url.
        for key in ["c_hash", "at_hash", "s_hash"] {
            assert_eq!(claims[key].as_str().unwrap().len(), 22);
        }
        // email scope rules apply to userinfo, not the ID Token.
        assert!(!claims.contains_key("email"));
        // sid only with session-logout support.
        assert!(!claims.contains_key("sid"));
    }

    #[test]
    fn sid_follows_logout_session_support() {
        let (mut issuer, client, identifier) = fixture();
        issuer.meta.backchannel_logout_session_supported = true;
        let claims =
            make_id_token_claims(&issuer, &client, &identifier, Utc::now(), "", "", "");
        assert_eq!(claims["sid"], "s1");
        assert!(!claims.contains_key("c_hash"));
    }
}
