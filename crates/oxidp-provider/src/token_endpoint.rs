//! The token endpoint: authorization-code and refresh-token grants.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use oxidp_crypto::sha256;
use oxidp_model::{AuthorizationCode, Issuer, TokenIdentifier, TokenKind};
use oxidp_store::retry_if_error;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::client_auth::ClientAuthentication;
use crate::error::{ProviderError, TokenFail};
use crate::provider::{Provider, RETRY_COUNT};
use crate::request::{form_value, parse_form, TokenRequest};
use crate::types::oauth;

/// Successful token response body (RFC 6749 §5.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenSuccess {
    /// The access token.
    pub access_token: String,
    /// Always `Bearer`.
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Refresh token, when `offline_access` was granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// ID Token, when `openid` was granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Outcome of the token endpoint.
#[derive(Debug)]
pub enum TokenResponse {
    /// 200 with the token JSON body.
    Success(TokenSuccess),
    /// Error status and JSON body.
    Fail(TokenFail),
}

impl Provider {
    /// Handles a token request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] only for server-internal conditions;
    /// protocol failures come back as [`TokenResponse::Fail`].
    pub async fn token(
        &self,
        issuer_id: &str,
        request: &TokenRequest,
    ) -> Result<TokenResponse, ProviderError> {
        let issuer = self.load_issuer(issuer_id).await?;

        if !request
            .content_type
            .starts_with(oauth::MIME_FORM_URLENCODED)
        {
            return Ok(TokenResponse::Fail(TokenFail::invalid_request(format!(
                "content-type does not has {}:{}",
                oauth::MIME_FORM_URLENCODED,
                request.content_type
            ))));
        }

        let values = parse_form(&request.form);
        match form_value(&values, "grant_type") {
            oauth::GRANT_TYPE_AUTHORIZATION_CODE => {
                self.exchange_authorization_code(&issuer, request, &values)
                    .await
            }
            oauth::GRANT_TYPE_REFRESH_TOKEN => {
                self.exchange_refresh_token(&issuer, request, &values).await
            }
            other => Ok(TokenResponse::Fail(TokenFail::unsupported_grant_type(
                format!("unknown grant_type:{other}"),
            ))),
        }
    }

    async fn exchange_authorization_code(
        &self,
        issuer: &Issuer,
        request: &TokenRequest,
        values: &std::collections::HashMap<String, String>,
    ) -> Result<TokenResponse, ProviderError> {
        let code_value = form_value(values, "code").to_string();
        let auth_code = match self
            .get_with_retry(&AuthorizationCode::probe(&issuer.id, &code_value))
            .await
        {
            Ok(code) => code,
            Err(err) => {
                return Ok(TokenResponse::Fail(TokenFail::invalid_grant(format!(
                    "Auth code not found:{code_value} err:{err}"
                ))));
            }
        };
        let client = match self
            .load_client(&issuer.id, &auth_code.authorized.client_id)
            .await
        {
            Ok(client) => client,
            Err(err) => {
                return Ok(TokenResponse::Fail(TokenFail::invalid_grant(format!(
                    "client not found:{err}"
                ))));
            }
        };

        let auth = ClientAuthentication {
            allow_audience: vec![issuer.meta.token_endpoint.clone(), issuer.meta.issuer.clone()],
            basic_auth: request.basic_auth.as_ref(),
            client: &client,
            values,
        };
        if let Err(fail) = self.check_client_authentication(&auth).await {
            return Ok(TokenResponse::Fail(fail));
        }

        // FAPI pins the presented certificate against the registered set;
        // this stays out of the shared client-auth path because PAR also
        // authenticates but does not pin.
        if client.extensions.profile.is_fapi()
            && !client
                .extensions
                .tls_client_certificates
                .contains(&request.tls_client_certificate)
        {
            return Ok(TokenResponse::Fail(TokenFail::invalid_request(
                "invalid client certificate",
            )));
        }

        if Utc::now() > auth_code.expire_at {
            return Ok(TokenResponse::Fail(TokenFail::invalid_grant(format!(
                "Auth code is expired:{code_value}"
            ))));
        }
        if auth_code.is_used {
            // https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2
            // A replayed code revokes everything issued off its request.
            if let Err(err) = self
                .provider_callbacks
                .delete_tokens_with_request_id(&issuer.id, &auth_code.authorized.request_id)
                .await
            {
                warn!(error = %err, "mass revocation after code replay failed");
            }
            return Ok(TokenResponse::Fail(TokenFail::invalid_grant(format!(
                "Auth code was used:{code_value}"
            ))));
        }

        if let Err(fail) = verify_pkce(&auth_code, form_value(values, "code_verifier")) {
            return Ok(TokenResponse::Fail(fail));
        }

        let exchange = retry_if_error(RETRY_COUNT, || {
            let store = self.store.clone();
            let probe = AuthorizationCode::probe(&issuer.id, &code_value);
            let client = &client;
            async move {
                // Reload inside the attempt: the used flag is a
                // read-modify-write under contention.
                let mut auth_code = store.get(&probe).await.map_err(ProviderError::from)?;
                if auth_code.is_used {
                    return Err(ProviderError::Internal("auth code was used".to_string()));
                }
                let authorized = auth_code.authorized.clone();
                let scopes = &authorized.params.scopes;

                let access_fut = self.create_access_token(
                    &client,
                    &authorized,
                    &request.tls_client_certificate,
                );
                let refresh_fut = async {
                    if scopes.iter().any(|s| s == "offline_access") {
                        Ok(Some(self.create_refresh_token(&client, &authorized).await?))
                    } else {
                        Ok::<Option<TokenIdentifier>, ProviderError>(None)
                    }
                };
                let id_fut = async {
                    if scopes.iter().any(|s| s == "openid") {
                        let identifier =
                            self.create_id_token_identifier(&client, &authorized).await?;
                        let claims = crate::issue::make_id_token_claims(
                            issuer,
                            &client,
                            &identifier,
                            Utc::now(),
                            "",
                            "",
                            "",
                        );
                        let id_token = self
                            .sign_jwt(issuer, &claims, &client.meta.id_token_signed_response_alg)
                            .await?;
                        Ok(Some(id_token))
                    } else {
                        Ok::<Option<String>, ProviderError>(None)
                    }
                };
                let (access, refresh, id_token) =
                    tokio::try_join!(access_fut, refresh_fut, id_fut)?;

                // The used flag flips only after every artifact persisted,
                // so a retried exchange never leaks half a token set.
                auth_code.is_used = true;
                store.set(&auth_code).await.map_err(ProviderError::from)?;

                Ok(TokenSuccess {
                    access_token: access.identifier,
                    token_type: "Bearer".to_string(),
                    expires_in: client.attributes.access_token_lifetime_seconds,
                    refresh_token: refresh.map(|t| t.identifier),
                    id_token,
                })
            }
        })
        .await;

        match exchange {
            Ok(success) => Ok(TokenResponse::Success(success)),
            Err(err) => {
                error!(error = %err, "authorization code exchange failed");
                Ok(TokenResponse::Fail(TokenFail::invalid_grant(format!(
                    "Auth code exchange transaction error:{err}"
                ))))
            }
        }
    }

    async fn exchange_refresh_token(
        &self,
        issuer: &Issuer,
        request: &TokenRequest,
        values: &std::collections::HashMap<String, String>,
    ) -> Result<TokenResponse, ProviderError> {
        let token_value = form_value(values, "refresh_token").to_string();
        let refresh = match self
            .store
            .get(&TokenIdentifier::probe(&issuer.id, &token_value))
            .await
        {
            Ok(token) => token,
            Err(_) => {
                return Ok(TokenResponse::Fail(TokenFail::invalid_grant(format!(
                    "Refresh token not found:{token_value}"
                ))));
            }
        };
        if refresh.kind != TokenKind::Refresh {
            return Ok(TokenResponse::Fail(TokenFail::invalid_grant(
                "presented token is not a refresh token",
            )));
        }
        let client = match self
            .load_client(&issuer.id, &refresh.authorized.client_id)
            .await
        {
            Ok(client) => client,
            Err(err) => {
                return Ok(TokenResponse::Fail(TokenFail::invalid_grant(format!(
                    "client not found:{err}"
                ))));
            }
        };

        let auth = ClientAuthentication {
            allow_audience: vec![issuer.meta.token_endpoint.clone(), issuer.meta.issuer.clone()],
            basic_auth: request.basic_auth.as_ref(),
            client: &client,
            values,
        };
        if let Err(fail) = self.check_client_authentication(&auth).await {
            return Ok(TokenResponse::Fail(fail));
        }

        if client.extensions.profile.is_fapi()
            && !client
                .extensions
                .tls_client_certificates
                .contains(&request.tls_client_certificate)
        {
            return Ok(TokenResponse::Fail(TokenFail::invalid_request(
                "invalid client certificate",
            )));
        }

        if Utc::now() > refresh.expire_at {
            return Ok(TokenResponse::Fail(TokenFail::invalid_grant(format!(
                "Refresh token is expired:{token_value}"
            ))));
        }

        let rotate = issuer.attributes.refresh_token_rotation;
        let exchange = retry_if_error(RETRY_COUNT, || {
            let store = self.store.clone();
            let probe = TokenIdentifier::probe(&issuer.id, &token_value);
            let client = &client;
            async move {
                let presented = store.get(&probe).await.map_err(ProviderError::from)?;
                let authorized = presented.authorized.clone();
                let scopes = authorized.params.scopes.clone();

                let access = self
                    .create_access_token(&client, &authorized, &request.tls_client_certificate)
                    .await?;
                let mut success = TokenSuccess {
                    access_token: access.identifier,
                    token_type: "Bearer".to_string(),
                    expires_in: client.attributes.access_token_lifetime_seconds,
                    refresh_token: None,
                    id_token: None,
                };

                if scopes.iter().any(|s| s == "offline_access") {
                    let new_refresh = self.create_refresh_token(&client, &authorized).await?;
                    success.refresh_token = Some(new_refresh.identifier);
                }

                if scopes.iter().any(|s| s == "openid") {
                    let identifier =
                        self.create_id_token_identifier(&client, &authorized).await?;
                    let claims = crate::issue::make_id_token_claims(
                        issuer,
                        &client,
                        &identifier,
                        Utc::now(),
                        "",
                        "",
                        "",
                    );
                    success.id_token = Some(
                        self.sign_jwt(issuer, &claims, &client.meta.id_token_signed_response_alg)
                            .await?,
                    );
                }

                // One-time refresh tokens are a per-issuer policy; the
                // default keeps the presented token valid.
                if rotate {
                    store.delete(&presented).await.map_err(ProviderError::from)?;
                }
                Ok::<TokenSuccess, ProviderError>(success)
            }
        })
        .await;

        match exchange {
            Ok(success) => Ok(TokenResponse::Success(success)),
            Err(err) => {
                error!(error = %err, "refresh token exchange failed");
                Ok(TokenResponse::Fail(TokenFail::invalid_grant(format!(
                    "Refresh token exchange transaction error:{err}"
                ))))
            }
        }
    }
}

/// Verifies the PKCE binding of a code redemption (RFC 7636 §4.6).
fn verify_pkce(auth_code: &AuthorizationCode, code_verifier: &str) -> Result<(), TokenFail> {
    let challenge = &auth_code.authorized.params.code_challenge;
    if challenge.is_empty() {
        return Ok(());
    }
    match auth_code.authorized.params.code_challenge_method.as_str() {
        oauth::PKCE_METHOD_S256 => {
            let encoded = URL_SAFE_NO_PAD.encode(sha256(code_verifier.as_bytes()));
            if &encoded != challenge {
                return Err(TokenFail::invalid_grant("verfier unmatch(S256)"));
            }
            Ok(())
        }
        oauth::PKCE_METHOD_PLAIN | "" => {
            if code_verifier != challenge {
                return Err(TokenFail::invalid_grant("verfier unmatch(plain)"));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxidp_model::Authorized;

    fn code_with_challenge(method: &str, challenge: &str) -> AuthorizationCode {
        let mut authorized = Authorized::default();
        authorized.issuer_id = "t1".to_string();
        authorized.params.code_challenge = challenge.to_string();
        authorized.params.code_challenge_method = method.to_string();
        AuthorizationCode::new("c", authorized, 60, Utc::now())
    }

    #[test]
    fn pkce_s256_accepts_matching_verifier() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = URL_SAFE_NO_PAD.encode(sha256(verifier.as_bytes()));
        let code = code_with_challenge("S256", &challenge);
        assert!(verify_pkce(&code, verifier).is_ok());

        let err = verify_pkce(&code, "wrong-verifier").unwrap_err();
        assert_eq!(err.error.error_description, "verfier unmatch(S256)");
    }

    #[test]
    fn pkce_plain_and_empty_compare_literally() {
        for method in ["plain", ""] {
            let code = code_with_challenge(method, "the-challenge");
            assert!(verify_pkce(&code, "the-challenge").is_ok());
            let err = verify_pkce(&code, "other").unwrap_err();
            assert_eq!(err.error.error_description, "verfier unmatch(plain)");
        }
    }

    #[test]
    fn pkce_absent_challenge_skips_verification() {
        let code = code_with_challenge("S256", "");
        assert!(verify_pkce(&code, "anything").is_ok());
    }
}
