//! Client authentication at the token and PAR endpoints.
//!
//! Implements every registered `token_endpoint_auth_method`:
//! `none`, `client_secret_basic`, `client_secret_post`,
//! `client_secret_jwt`, `private_key_jwt`, `tls_client_auth` and
//! `self_signed_tls_client_auth`. Secret comparisons run in constant
//! time. Certificate validation itself is the transport's job; the mTLS
//! methods only bind the asserted `client_id`, and FAPI token exchange
//! additionally pins the presented certificate hash.

use std::collections::HashMap;

use chrono::Utc;
use jsonwebtoken::jwk::JwkSet;
use oxidp_crypto::{constant_time_eq, jwt, VerifyingKey};
use oxidp_model::{Client, ClientMeta};
use tracing::debug;

use crate::error::TokenFail;
use crate::keys::JWT_PARSE_LEEWAY_SECONDS;
use crate::provider::Provider;
use crate::request::{form_value, BasicAuth};
use crate::request_object::FAPI_REJECTION_ALGS;
use crate::types::oauth;

/// Inputs of one client-authentication check.
pub(crate) struct ClientAuthentication<'a> {
    /// JWT `aud` values acceptable for assertion-based methods.
    pub allow_audience: Vec<String>,
    /// Basic credentials, when the header was present.
    pub basic_auth: Option<&'a BasicAuth>,
    /// The client being authenticated.
    pub client: &'a Client,
    /// Parsed form values of the request.
    pub values: &'a HashMap<String, String>,
}

impl Provider {
    /// Verifies the client's credentials per its registered method.
    ///
    /// # Errors
    ///
    /// Returns the protocol failure to send back; `Ok(())` means
    /// authenticated.
    pub(crate) async fn check_client_authentication(
        &self,
        params: &ClientAuthentication<'_>,
    ) -> Result<(), TokenFail> {
        let client = params.client;
        let identity = &client.identity;
        match client.meta.token_endpoint_auth_method.as_str() {
            oauth::AUTH_METHOD_NONE => Ok(()),

            oauth::AUTH_METHOD_CLIENT_SECRET_POST => {
                let client_id = form_value(params.values, "client_id");
                let client_secret = form_value(params.values, "client_secret");
                if identity.client_id == client_id
                    && constant_time_eq(&identity.client_secret, client_secret)
                {
                    Ok(())
                } else {
                    Err(TokenFail::invalid_grant(
                        "client_secret_post: client_id or client_secret not match",
                    ))
                }
            }

            oauth::AUTH_METHOD_CLIENT_SECRET_BASIC => match params.basic_auth {
                Some(basic) => {
                    if identity.client_id == basic.username
                        && constant_time_eq(&identity.client_secret, &basic.password)
                    {
                        Ok(())
                    } else {
                        Err(TokenFail::invalid_grant(
                            "client_secret_basic: client_id or client_secret not match",
                        ))
                    }
                }
                None => Err(TokenFail::invalid_grant(
                    "client_secret_basic: missing basic authorization",
                )),
            },

            oauth::AUTH_METHOD_PRIVATE_KEY_JWT | oauth::AUTH_METHOD_CLIENT_SECRET_JWT => {
                self.check_client_assertion(params).await
            }

            oauth::AUTH_METHOD_TLS_CLIENT_AUTH
            | oauth::AUTH_METHOD_SELF_SIGNED_TLS_CLIENT_AUTH => {
                if identity.client_id == form_value(params.values, "client_id") {
                    Ok(())
                } else {
                    Err(TokenFail::invalid_grant("The client is invalid"))
                }
            }

            other => Err(TokenFail::new(
                500,
                oauth::TOKEN_ERROR_UNAUTHORIZED_CLIENT,
                format!("unknown token_endpoint_auth_method:{other}"),
            )),
        }
    }

    async fn check_client_assertion(
        &self,
        params: &ClientAuthentication<'_>,
    ) -> Result<(), TokenFail> {
        let assertion = form_value(params.values, "client_assertion");
        let assertion_type = form_value(params.values, "client_assertion_type");
        if assertion.is_empty() || assertion_type.is_empty() {
            return Err(TokenFail::invalid_request(
                "missing client_assertion or client_assertion_type",
            ));
        }

        let token = self
            .parse_client_jwt(&params.client.meta, assertion)
            .await
            .map_err(|e| TokenFail::invalid_grant(format!("client assertion parse error:{e}")))?;

        let Some(exp) = token.numeric_date("exp") else {
            return Err(TokenFail::invalid_grant("client assertion has no exp"));
        };
        if exp < Utc::now().timestamp() {
            return Err(TokenFail::invalid_grant("client assertion expired"));
        }

        if params.client.extensions.profile.is_fapi()
            && FAPI_REJECTION_ALGS.contains(&token.header.alg.as_str())
        {
            // https://openid.net/specs/openid-financial-api-part-2-1_0.html#algorithm-considerations
            return Err(TokenFail::invalid_client(format!(
                "signing alg not allow:{}",
                token.header.alg
            )));
        }

        let client_id = &params.client.identity.client_id;
        if token.str_claim("iss") != client_id || token.str_claim("sub") != client_id {
            return Err(TokenFail::invalid_client(format!(
                "invalid claims(client):{}",
                token.str_claim("iss")
            )));
        }

        // https://openid.net/specs/openid-connect-core-1_0.html#ClientAuthentication
        let audiences = token.audiences();
        let allowed = params
            .allow_audience
            .iter()
            .any(|aud| audiences.iter().any(|a| a == aud));
        if !allowed {
            return Err(TokenFail::invalid_request(format!(
                "invalid claims(audience):{audiences:?}"
            )));
        }
        Ok(())
    }

    /// Parses and verifies a JWT produced by a client, resolving keys from
    /// the client's JWKS (inline or via `jwks_uri`). `alg=none` is
    /// accepted here; flows that forbid unsigned objects reject on the
    /// returned header. Time claims are validated with a 24-hour leeway;
    /// callers apply their own tighter windows.
    pub(crate) async fn parse_client_jwt(
        &self,
        meta: &ClientMeta,
        token: &str,
    ) -> Result<jwt::Jwt, String> {
        let header = jwt::decode_header(token).map_err(|e| e.to_string())?;
        let decoded = if header.alg == "none" {
            jwt::verify_unsecured(token).map_err(|e| e.to_string())?
        } else {
            let jwks = self.client_jwks(meta).await?;
            verify_with_jwks(token, header.kid.as_deref(), &jwks)?
        };
        jwt::validate_time(
            &decoded.claims,
            Utc::now().timestamp(),
            JWT_PARSE_LEEWAY_SECONDS,
        )
        .map_err(|e| e.to_string())?;
        Ok(decoded)
    }

    async fn client_jwks(&self, meta: &ClientMeta) -> Result<JwkSet, String> {
        if !meta.jwks_uri.is_empty() {
            let body = self.fetch_text(&meta.jwks_uri).await?;
            return serde_json::from_str(&body).map_err(|e| e.to_string());
        }
        match &meta.jwks {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| e.to_string()),
            None => Err("client has no jwks".to_string()),
        }
    }
}

fn verify_with_jwks(token: &str, kid: Option<&str>, jwks: &JwkSet) -> Result<jwt::Jwt, String> {
    if let Some(kid) = kid {
        let key = jwks
            .keys
            .iter()
            .find(|k| k.common.key_id.as_deref() == Some(kid))
            .ok_or_else(|| format!("no jwk with kid {kid}"))?;
        let verify = VerifyingKey::from_jwk(key).map_err(|e| e.to_string())?;
        return jwt::verify(token, &verify).map_err(|e| e.to_string());
    }
    // No kid: a single key is used directly, otherwise each candidate is
    // tried until one verifies.
    for key in &jwks.keys {
        match VerifyingKey::from_jwk(key) {
            Ok(verify) => {
                if let Ok(decoded) = jwt::verify(token, &verify) {
                    return Ok(decoded);
                }
            }
            Err(err) => debug!(error = %err, "skipping unusable client jwk"),
        }
    }
    Err("no client jwk verified the token".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxidp_model::Issuer;

    fn client(method: &str) -> Client {
        let issuer = Issuer::probe("t1");
        let mut client = Client::with_defaults(&issuer, "c1", "sg1", Utc::now());
        client.identity.client_secret = "top-secret".to_string();
        client.meta.token_endpoint_auth_method = method.to_string();
        client
    }

    fn provider() -> Provider {
        crate::interceptor::testing::provider_over_memory()
    }

    #[tokio::test]
    async fn none_always_accepts() {
        let provider = provider();
        let client = client("none");
        let values = HashMap::new();
        let params = ClientAuthentication {
            allow_audience: vec![],
            basic_auth: None,
            client: &client,
            values: &values,
        };
        assert!(provider.check_client_authentication(&params).await.is_ok());
    }

    #[tokio::test]
    async fn client_secret_post_compares_form_values() {
        let provider = provider();
        let client = client("client_secret_post");
        let good = crate::request::parse_form("client_id=c1&client_secret=top-secret");
        let bad = crate::request::parse_form("client_id=c1&client_secret=wrong");
        let ok = ClientAuthentication {
            allow_audience: vec![],
            basic_auth: None,
            client: &client,
            values: &good,
        };
        assert!(provider.check_client_authentication(&ok).await.is_ok());
        let fail = ClientAuthentication {
            allow_audience: vec![],
            basic_auth: None,
            client: &client,
            values: &bad,
        };
        let err = provider.check_client_authentication(&fail).await.unwrap_err();
        assert_eq!(err.error.error, "invalid_grant");
    }

    #[tokio::test]
    async fn client_secret_basic_requires_header() {
        let provider = provider();
        let client = client("client_secret_basic");
        let values = HashMap::new();
        let missing = ClientAuthentication {
            allow_audience: vec![],
            basic_auth: None,
            client: &client,
            values: &values,
        };
        let err = provider.check_client_authentication(&missing).await.unwrap_err();
        assert!(err.error.error_description.contains("missing basic"));

        let basic = BasicAuth {
            username: "c1".to_string(),
            password: "top-secret".to_string(),
        };
        let ok = ClientAuthentication {
            allow_audience: vec![],
            basic_auth: Some(&basic),
            client: &client,
            values: &values,
        };
        assert!(provider.check_client_authentication(&ok).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_method_is_a_server_error() {
        let provider = provider();
        let client = client("carrier-pigeon");
        let values = HashMap::new();
        let params = ClientAuthentication {
            allow_audience: vec![],
            basic_auth: None,
            client: &client,
            values: &values,
        };
        let err = provider.check_client_authentication(&params).await.unwrap_err();
        assert_eq!(err.status_code, 500);
    }
}
