//! End-to-end provider flows against the in-memory store.
//!
//! Covers the authorization-code flow with replay revocation, PKCE, PAR
//! one-shot semantics, session-backed `prompt=none`, the claims filter,
//! FAPI request-object restrictions, JARM, refresh exchange, dynamic
//! registration and discovery/JWKS.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde_json::{json, Value};
use url::Url;

use oxidp_crypto::{jwt, sha256, KeyPair, KeyType, SigningAlgorithm};
use oxidp_model::{Client, ClientProfile, IssuerAttributes, IssuerMeta};
use oxidp_provider::{
    side_indexed_store, AuthorizationRequest, AuthorizationResponse, BasicAuth, CallbackError,
    IssueRequest, IssueResponse, IssuerConfig, ParRequest, ParResponse, Provider,
    RegistrationRequest, RegistrationResponse, RequestInfo, SdkCallbacks, TokenRequest,
    TokenResponse, UserinfoRequest,
};
use oxidp_store::MemoryBackend;

const ISSUER_ID: &str = "tenant1";
const ISSUER_URL: &str = "https://op.example.com";
const REDIRECT_URI: &str = "https://rp.example.com/cb";

struct TestUsers;

#[async_trait]
impl SdkCallbacks for TestUsers {
    async fn get_user_claims(&self, subject: &str) -> Result<String, CallbackError> {
        Ok(json!({
            "email": "a@b",
            "acr": "urn:mace:incommon:iap:silver",
            "name": "X",
            "preferred_username": subject,
        })
        .to_string())
    }

    fn write_login_html(&self, info: &RequestInfo) -> String {
        format!("<html><body>login for {}</body></html>", info.request_id)
    }
}

struct Harness {
    provider: Provider,
}

impl Harness {
    async fn new(signing_algs: &[&str]) -> Self {
        let (store, callbacks) = side_indexed_store(Arc::new(MemoryBackend::new()));
        let provider = Provider::new(store, callbacks, Arc::new(TestUsers));
        let meta = IssuerMeta {
            issuer: ISSUER_URL.to_string(),
            authorization_endpoint: format!("{ISSUER_URL}/authorize"),
            token_endpoint: format!("{ISSUER_URL}/token"),
            userinfo_endpoint: format!("{ISSUER_URL}/userinfo"),
            jwks_uri: format!("{ISSUER_URL}/.well-known/jwks.json"),
            registration_endpoint: format!("{ISSUER_URL}/registration"),
            pushed_authorization_request_endpoint: format!("{ISSUER_URL}/par"),
            scopes_supported: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
                "offline_access".to_string(),
            ],
            response_types_supported: vec!["code".to_string(), "code id_token".to_string()],
            subject_types_supported: vec!["public".to_string()],
            id_token_signing_alg_values_supported:
                signing_algs.iter().map(|s| (*s).to_string()).collect(),
            authorization_signing_alg_values_supported: vec!["ES256".to_string()],
            request_parameter_supported: true,
            request_uri_parameter_supported: true,
            ..IssuerMeta::default()
        };
        provider
            .create_issuer(IssuerConfig {
                id: ISSUER_ID.to_string(),
                password: "issuer-password".to_string(),
                meta,
                attributes: IssuerAttributes::default(),
            })
            .await
            .expect("issuer creation");
        Self { provider }
    }

    async fn register_client(&self, client_id: &str, configure: impl FnOnce(&mut Client)) {
        self.provider
            .create_session_group(ISSUER_ID, client_id, 3_600)
            .await
            .expect("session group");
        let issuer = oxidp_model::Issuer::probe(ISSUER_ID);
        let mut client = Client::with_defaults(&issuer, client_id, client_id, Utc::now());
        client.meta.redirect_uris = vec![REDIRECT_URI.to_string()];
        client.meta.token_endpoint_auth_method = "client_secret_basic".to_string();
        client.meta.id_token_signed_response_alg = "ES256".to_string();
        client.meta.authorization_signed_response_alg = "ES256".to_string();
        client.identity.client_secret = "secret".to_string();
        configure(&mut client);
        self.provider.create_client(client).await.expect("client");
    }

    async fn authorize_get(&self, query: &str) -> AuthorizationResponse {
        self.authorize_with_sessions(query, HashMap::new()).await
    }

    async fn authorize_with_sessions(
        &self,
        query: &str,
        sessions: HashMap<String, String>,
    ) -> AuthorizationResponse {
        self.provider
            .authorize(
                ISSUER_ID,
                &AuthorizationRequest {
                    method: "GET".to_string(),
                    url: format!("{ISSUER_URL}/authorize?{query}"),
                    sessions,
                    ..AuthorizationRequest::default()
                },
            )
            .await
            .expect("authorize")
    }

    async fn issue(&self, request_id: &str, subject: &str, session_id: &str) -> String {
        let response = self
            .provider
            .issue(
                ISSUER_ID,
                &IssueRequest {
                    request_id: request_id.to_string(),
                    subject: subject.to_string(),
                    session_id: session_id.to_string(),
                },
            )
            .await
            .expect("issue");
        match response {
            IssueResponse::Redirect(url) => url,
            IssueResponse::Html(html) => html,
        }
    }

    async fn exchange_code(&self, client: &str, secret: &str, form: &str) -> TokenResponse {
        self.provider
            .token(
                ISSUER_ID,
                &TokenRequest {
                    content_type: "application/x-www-form-urlencoded".to_string(),
                    form: form.to_string(),
                    basic_auth: Some(BasicAuth {
                        username: client.to_string(),
                        password: secret.to_string(),
                    }),
                    tls_client_certificate: String::new(),
                },
            )
            .await
            .expect("token")
    }
}

fn query_params(url: &str) -> HashMap<String, String> {
    let parsed = Url::parse(url).expect("redirect url");
    parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn fragment_params(url: &str) -> HashMap<String, String> {
    let parsed = Url::parse(url).expect("redirect url");
    let fragment = parsed.fragment().unwrap_or("");
    url::form_urlencoded::parse(fragment.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn login_action(response: AuthorizationResponse) -> oxidp_provider::LoginAction {
    match response {
        AuthorizationResponse::Login(login) => login,
        other => panic!("expected login decision, got {other:?}"),
    }
}

#[tokio::test]
async fn authorization_code_happy_path_with_replay_revocation() {
    let h = Harness::new(&["ES256"]).await;
    h.register_client("C", |_| {}).await;

    let login = login_action(
        h.authorize_get(&format!(
            "response_type=code&client_id=C&redirect_uri={REDIRECT_URI}\
             &scope=openid%20email&state=S&nonce=N"
        ))
        .await,
    );

    let redirect = h.issue(&login.request_id, "u1", "").await;
    let params = query_params(&redirect);
    let code = params.get("code").expect("code param").clone();
    assert_eq!(params.get("state").map(String::as_str), Some("S"));
    assert!(!params.contains_key("error"));

    let form = format!("grant_type=authorization_code&code={code}&redirect_uri={REDIRECT_URI}");
    let success = match h.exchange_code("C", "secret", &form).await {
        TokenResponse::Success(success) => success,
        TokenResponse::Fail(fail) => panic!("exchange failed: {:?}", fail.error),
    };
    assert_eq!(success.token_type, "Bearer");
    assert_eq!(success.expires_in, 3_600);
    assert!(success.refresh_token.is_none());

    let id_token = success.id_token.expect("id token");
    let decoded = jwt::decode_unverified(&id_token).unwrap();
    assert_eq!(decoded.str_claim("iss"), ISSUER_URL);
    assert_eq!(decoded.str_claim("aud"), "C");
    assert_eq!(decoded.str_claim("sub"), "u1");
    assert_eq!(decoded.str_claim("nonce"), "N");
    assert_eq!(decoded.header.alg, "ES256");

    // The access token works at userinfo until the replay.
    let userinfo = h
        .provider
        .userinfo(
            ISSUER_ID,
            &UserinfoRequest {
                method: "GET".to_string(),
                authorization: format!("Bearer {}", success.access_token),
                ..UserinfoRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(userinfo.status_code, 200);
    let body: Value = serde_json::from_str(&userinfo.body).unwrap();
    assert_eq!(body["sub"], "u1");
    assert_eq!(body["email"], "a@b");
    assert!(body.get("name").is_none());

    // Second redemption: invalid_grant, and every token minted for the
    // request is revoked.
    match h.exchange_code("C", "secret", &form).await {
        TokenResponse::Fail(fail) => {
            assert_eq!(fail.status_code, 400);
            assert_eq!(fail.error.error, "invalid_grant");
        }
        TokenResponse::Success(_) => panic!("replayed code must not succeed"),
    }
    let revoked = h
        .provider
        .userinfo(
            ISSUER_ID,
            &UserinfoRequest {
                method: "GET".to_string(),
                authorization: format!("Bearer {}", success.access_token),
                ..UserinfoRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(revoked.status_code, 401);
    assert!(revoked.headers["WWW-Authenticate"].contains("invalid_token"));
}

#[tokio::test]
async fn pkce_s256_binds_redemption_to_the_verifier() {
    let h = Harness::new(&["ES256"]).await;
    h.register_client("P", |client| {
        client.meta.token_endpoint_auth_method = "none".to_string();
    })
    .await;

    let verifier = "dBjftJeZ4CVPmB92K27uhbUJU1p1rwW1gFWFOEjXkabcdef";
    let challenge = URL_SAFE_NO_PAD.encode(sha256(verifier.as_bytes()));

    let authorize = || {
        let h = &h;
        let challenge = challenge.clone();
        async move {
            let login = login_action(
                h.authorize_get(&format!(
                    "response_type=code&client_id=P&redirect_uri={REDIRECT_URI}\
                     &scope=openid&state=S&nonce=N&code_challenge={challenge}\
                     &code_challenge_method=S256"
                ))
                .await,
            );
            let redirect = h.issue(&login.request_id, "u1", "").await;
            query_params(&redirect)["code"].clone()
        }
    };

    // Correct verifier: tokens.
    let code = authorize().await;
    let ok = h
        .exchange_code(
            "P",
            "",
            &format!(
                "grant_type=authorization_code&code={code}&client_id=P&code_verifier={verifier}"
            ),
        )
        .await;
    assert!(matches!(ok, TokenResponse::Success(_)));

    // Wrong verifier: invalid_grant with the S256 mismatch description.
    let code = authorize().await;
    match h
        .exchange_code(
            "P",
            "",
            &format!(
                "grant_type=authorization_code&code={code}&client_id=P&code_verifier=wrong"
            ),
        )
        .await
    {
        TokenResponse::Fail(fail) => {
            assert_eq!(fail.error.error, "invalid_grant");
            assert_eq!(fail.error.error_description, "verfier unmatch(S256)");
        }
        TokenResponse::Success(_) => panic!("wrong verifier must not succeed"),
    }
}

#[tokio::test]
async fn pushed_authorization_requests_are_single_use() {
    let h = Harness::new(&["ES256"]).await;
    h.register_client("C", |_| {}).await;

    let response = h
        .provider
        .pushed_authorization(
            ISSUER_ID,
            &ParRequest {
                method: "POST".to_string(),
                content_type: "application/x-www-form-urlencoded".to_string(),
                form: format!(
                    "response_type=code&client_id=C&redirect_uri={REDIRECT_URI}\
                     &scope=openid&state=S&nonce=N"
                ),
                basic_auth: Some(BasicAuth {
                    username: "C".to_string(),
                    password: "secret".to_string(),
                }),
            },
        )
        .await
        .unwrap();
    let success = match response {
        ParResponse::Success(success) => success,
        ParResponse::Fail(fail) => panic!("par failed: {:?}", fail.error),
    };
    assert!(success
        .request_uri
        .starts_with("urn:ietf:params:oauth:request_uri:"));
    assert_eq!(success.expires_in, 60);

    // First resolution: the pushed parameters drive the request.
    let query = format!(
        "client_id=C&request_uri={}",
        urlencode(&success.request_uri)
    );
    let login = login_action(h.authorize_get(&query).await);
    assert_eq!(login.params.scopes, vec!["openid"]);
    assert!(login.params.is_par);

    // Second resolution: the record is gone.
    match h.authorize_get(&query).await {
        AuthorizationResponse::Fail(fail) => {
            assert_eq!(fail.error.error, "invalid_request_uri");
        }
        other => panic!("expected invalid_request_uri, got {other:?}"),
    }
}

#[tokio::test]
async fn prompt_none_with_live_session_issues_directly() {
    let h = Harness::new(&["ES256"]).await;
    h.register_client("C", |_| {}).await;

    // First pass: login, then start the SSO session.
    let login = login_action(
        h.authorize_get(&format!(
            "response_type=code&client_id=C&redirect_uri={REDIRECT_URI}\
             &scope=openid&state=S1&nonce=N1"
        ))
        .await,
    );
    let cookie = h
        .provider
        .start_session(ISSUER_ID, &login.request_id, "u1")
        .await
        .unwrap();
    assert_eq!(cookie.name, "C");
    assert_eq!(cookie.max_age_seconds, 3_600);
    h.issue(&login.request_id, "u1", &cookie.value).await;

    // Second pass with prompt=none and the session cookie: no UI.
    let sessions = HashMap::from([(cookie.name.clone(), cookie.value.clone())]);
    let response = h
        .authorize_with_sessions(
            &format!(
                "response_type=code&client_id=C&redirect_uri={REDIRECT_URI}\
                 &scope=openid&state=S2&nonce=N2&prompt=none"
            ),
            sessions,
        )
        .await;
    let issue = match response {
        AuthorizationResponse::Issue(issue) => issue,
        other => panic!("expected issue decision, got {other:?}"),
    };
    assert_eq!(issue.subject, "u1");
    assert_eq!(issue.session_id, cookie.value);

    let redirect = h.issue(&issue.request_id, "u1", &issue.session_id).await;
    let params = query_params(&redirect);
    assert!(params.contains_key("code"));
    assert!(params.contains_key("session_state"));
    assert!(!params.contains_key("error"));

    // Without a session, prompt=none is login_required on the redirect.
    let response = h
        .authorize_with_sessions(
            &format!(
                "response_type=code&client_id=C&redirect_uri={REDIRECT_URI}\
                 &scope=openid&state=S3&nonce=N3&prompt=none"
            ),
            HashMap::new(),
        )
        .await;
    match response {
        AuthorizationResponse::Redirect(url) => {
            let params = query_params(&url);
            assert_eq!(params.get("error").map(String::as_str), Some("login_required"));
            assert_eq!(params.get("state").map(String::as_str), Some("S3"));
        }
        other => panic!("expected error redirect, got {other:?}"),
    }
}

#[tokio::test]
async fn client_default_max_age_bounds_session_reuse() {
    let h = Harness::new(&["ES256"]).await;
    // A default of zero forces re-authentication on every request that
    // does not carry its own max_age.
    h.register_client("D", |client| {
        client.meta.default_max_age = "0".to_string();
    })
    .await;

    let login = login_action(
        h.authorize_get(&format!(
            "response_type=code&client_id=D&redirect_uri={REDIRECT_URI}\
             &scope=openid&state=S1&nonce=N1"
        ))
        .await,
    );
    let cookie = h
        .provider
        .start_session(ISSUER_ID, &login.request_id, "u1")
        .await
        .unwrap();
    h.issue(&login.request_id, "u1", &cookie.value).await;

    // The session cookie is live, but the client default rules it stale.
    let sessions = HashMap::from([(cookie.name.clone(), cookie.value.clone())]);
    let response = h
        .authorize_with_sessions(
            &format!(
                "response_type=code&client_id=D&redirect_uri={REDIRECT_URI}\
                 &scope=openid&state=S2&nonce=N2&prompt=none"
            ),
            sessions.clone(),
        )
        .await;
    match response {
        AuthorizationResponse::Redirect(url) => {
            let params = query_params(&url);
            assert_eq!(params.get("error").map(String::as_str), Some("login_required"));
        }
        other => panic!("expected login_required redirect, got {other:?}"),
    }

    // A request-supplied max_age overrides the default.
    let response = h
        .authorize_with_sessions(
            &format!(
                "response_type=code&client_id=D&redirect_uri={REDIRECT_URI}\
                 &scope=openid&state=S3&nonce=N3&prompt=none&max_age=600"
            ),
            sessions,
        )
        .await;
    match response {
        AuthorizationResponse::Issue(issue) => assert_eq!(issue.subject, "u1"),
        other => panic!("expected issue decision, got {other:?}"),
    }
}

#[tokio::test]
async fn claims_parameter_filters_userinfo_and_id_token() {
    let h = Harness::new(&["ES256"]).await;
    h.register_client("C", |_| {}).await;

    let claims = json!({
        "userinfo": {"email": {"essential": true}},
        "id_token": {"acr": {"values": ["urn:mace:incommon:iap:silver"]}}
    })
    .to_string();
    let login = login_action(
        h.authorize_get(&format!(
            "response_type=code&client_id=C&redirect_uri={REDIRECT_URI}\
             &scope=openid&state=S&nonce=N&claims={}",
            urlencode(&claims)
        ))
        .await,
    );
    let redirect = h.issue(&login.request_id, "u1", "").await;
    let code = query_params(&redirect)["code"].clone();

    let success = match h
        .exchange_code(
            "C",
            "secret",
            &format!("grant_type=authorization_code&code={code}&redirect_uri={REDIRECT_URI}"),
        )
        .await
    {
        TokenResponse::Success(success) => success,
        TokenResponse::Fail(fail) => panic!("exchange failed: {:?}", fail.error),
    };

    let id_token = jwt::decode_unverified(&success.id_token.expect("id token")).unwrap();
    assert_eq!(id_token.str_claim("acr"), "urn:mace:incommon:iap:silver");
    assert!(!id_token.claims.contains_key("name"));
    assert!(!id_token.claims.contains_key("email"));

    let userinfo = h
        .provider
        .userinfo(
            ISSUER_ID,
            &UserinfoRequest {
                method: "GET".to_string(),
                authorization: format!("Bearer {}", success.access_token),
                ..UserinfoRequest::default()
            },
        )
        .await
        .unwrap();
    let body: Value = serde_json::from_str(&userinfo.body).unwrap();
    assert_eq!(body["email"], "a@b");
    assert_eq!(body["sub"], "u1");
    assert!(body.get("acr").is_none());
    assert!(body.get("name").is_none());
}

#[tokio::test]
async fn fapi1_rejects_rs256_request_objects_but_accepts_ps256() {
    let h = Harness::new(&["ES256", "PS256", "RS256"]).await;

    let client_key = KeyPair::generate(KeyType::Rsa256).unwrap();
    let client_jwk = client_key.public_jwk("ck1").unwrap();
    h.register_client("F", |client| {
        client.extensions.profile = ClientProfile::Fapi1;
        client.meta.jwks = Some(json!({ "keys": [client_jwk] }));
    })
    .await;

    let now = Utc::now().timestamp();
    let mut object = serde_json::Map::new();
    object.insert("client_id".to_string(), json!("F"));
    object.insert("response_type".to_string(), json!("code id_token"));
    object.insert("redirect_uri".to_string(), json!(REDIRECT_URI));
    object.insert("scope".to_string(), json!("openid"));
    object.insert("nonce".to_string(), json!("N"));
    object.insert("state".to_string(), json!("S"));
    object.insert("exp".to_string(), json!(now + 300));
    object.insert("nbf".to_string(), json!(now - 10));
    object.insert("aud".to_string(), json!([ISSUER_URL]));
    object.insert("iss".to_string(), json!("F"));

    let outer = |request: &str| {
        format!(
            "response_type=code%20id_token&client_id=F&scope=openid\
             &redirect_uri={REDIRECT_URI}&nonce=N&state=S&request={request}"
        )
    };

    // RS256 is on the FAPI rejection list.
    let rs256 =
        jwt::sign(&object, SigningAlgorithm::Rs256, Some(&client_key), Some("ck1")).unwrap();
    match h.authorize_get(&outer(&urlencode(&rs256))).await {
        AuthorizationResponse::Redirect(url) => {
            let params = fragment_params(&url);
            assert_eq!(
                params.get("error").map(String::as_str),
                Some("invalid_request_object")
            );
            assert_eq!(
                params.get("error_description").map(String::as_str),
                Some("signing alg not allow")
            );
        }
        other => panic!("expected error redirect, got {other:?}"),
    }

    // The same object signed with PS256 passes the gate.
    let ps256 =
        jwt::sign(&object, SigningAlgorithm::Ps256, Some(&client_key), Some("ck1")).unwrap();
    let login = login_action(h.authorize_get(&outer(&urlencode(&ps256))).await);
    assert_eq!(login.params.response_type, "code id_token");
    assert_eq!(login.params.nonce, "N");
}

#[tokio::test]
async fn jarm_wraps_the_response_in_a_single_jwt() {
    let h = Harness::new(&["ES256"]).await;
    h.register_client("C", |_| {}).await;

    let login = login_action(
        h.authorize_get(&format!(
            "response_type=code&client_id=C&redirect_uri={REDIRECT_URI}\
             &scope=openid&state=S&nonce=N&response_mode=jwt"
        ))
        .await,
    );
    let redirect = h.issue(&login.request_id, "u1", "").await;
    let params = query_params(&redirect);
    assert_eq!(params.len(), 1, "only the response parameter: {params:?}");
    let response_jwt = params.get("response").expect("jarm response param");
    assert!(!params.contains_key("code"));

    let decoded = jwt::decode_unverified(response_jwt).unwrap();
    assert_eq!(decoded.str_claim("iss"), ISSUER_URL);
    assert_eq!(decoded.str_claim("aud"), "C");
    assert!(!decoded.str_claim("code").is_empty());
    assert_eq!(decoded.str_claim("state"), "S");
    assert!(decoded.numeric_date("exp").is_some());
}

#[tokio::test]
async fn refresh_exchange_keeps_the_presented_token_valid() {
    let h = Harness::new(&["ES256"]).await;
    h.register_client("C", |_| {}).await;

    let login = login_action(
        h.authorize_get(&format!(
            "response_type=code&client_id=C&redirect_uri={REDIRECT_URI}\
             &scope=openid%20offline_access&state=S&nonce=N"
        ))
        .await,
    );
    let redirect = h.issue(&login.request_id, "u1", "").await;
    let code = query_params(&redirect)["code"].clone();
    let success = match h
        .exchange_code(
            "C",
            "secret",
            &format!("grant_type=authorization_code&code={code}&redirect_uri={REDIRECT_URI}"),
        )
        .await
    {
        TokenResponse::Success(success) => success,
        TokenResponse::Fail(fail) => panic!("exchange failed: {:?}", fail.error),
    };
    let refresh_token = success.refresh_token.expect("refresh token");

    let first = match h
        .exchange_code(
            "C",
            "secret",
            &format!("grant_type=refresh_token&refresh_token={refresh_token}"),
        )
        .await
    {
        TokenResponse::Success(success) => success,
        TokenResponse::Fail(fail) => panic!("refresh failed: {:?}", fail.error),
    };
    assert!(!first.access_token.is_empty());
    assert!(first.refresh_token.is_some());
    assert!(first.id_token.is_some());

    // No rotation by default: the original refresh token still works.
    match h
        .exchange_code(
            "C",
            "secret",
            &format!("grant_type=refresh_token&refresh_token={refresh_token}"),
        )
        .await
    {
        TokenResponse::Success(_) => {}
        TokenResponse::Fail(fail) => panic!("second refresh failed: {:?}", fail.error),
    }

    // An access token is not a refresh token.
    match h
        .exchange_code(
            "C",
            "secret",
            &format!(
                "grant_type=refresh_token&refresh_token={}",
                first.access_token
            ),
        )
        .await
    {
        TokenResponse::Fail(fail) => assert_eq!(fail.error.error, "invalid_grant"),
        TokenResponse::Success(_) => panic!("access token must not refresh"),
    }
}

#[tokio::test]
async fn dynamic_registration_lifecycle() {
    let h = Harness::new(&["ES256"]).await;

    let created = h
        .provider
        .registration_create(
            ISSUER_ID,
            RegistrationRequest {
                redirect_uris: vec![REDIRECT_URI.to_string()],
                ..RegistrationRequest::default()
            },
        )
        .await
        .unwrap();
    let data = match created {
        RegistrationResponse::Success(data) => data,
        other => panic!("expected created client, got {other:?}"),
    };
    assert!(!data.client_id.is_empty());
    assert!(!data.client_secret.is_empty());
    assert!(!data.registration_access_token.is_empty());
    assert!(data
        .registration_client_uri
        .contains(&format!("client_id={}", data.client_id)));
    // Registration defaults per OIDC Dynamic Registration.
    assert_eq!(data.meta.application_type, "web");
    assert_eq!(data.meta.response_types, vec!["code"]);
    assert_eq!(data.meta.token_endpoint_auth_method, "client_secret_basic");
    assert_eq!(data.meta.id_token_signed_response_alg, "RS256");

    // Fragments in redirect URIs are rejected.
    let rejected = h
        .provider
        .registration_create(
            ISSUER_ID,
            RegistrationRequest {
                redirect_uris: vec!["https://rp/cb#frag".to_string()],
                ..RegistrationRequest::default()
            },
        )
        .await
        .unwrap();
    assert!(matches!(
        rejected,
        RegistrationResponse::Fail { status_code: 400, .. }
    ));

    let bearer = format!("Bearer {}", data.registration_access_token);
    let fetched = h
        .provider
        .registration_get(ISSUER_ID, &data.client_id, &bearer)
        .await
        .unwrap();
    assert!(matches!(fetched, RegistrationResponse::Success(_)));

    let denied = h
        .provider
        .registration_get(ISSUER_ID, &data.client_id, "Bearer wrong-token")
        .await
        .unwrap();
    assert!(matches!(denied, RegistrationResponse::Fail { .. }));

    let deleted = h
        .provider
        .registration_delete(ISSUER_ID, &data.client_id, &bearer)
        .await
        .unwrap();
    assert!(matches!(deleted, RegistrationResponse::Deleted));

    let gone = h
        .provider
        .registration_get(ISSUER_ID, &data.client_id, &bearer)
        .await
        .unwrap();
    assert!(matches!(gone, RegistrationResponse::Fail { .. }));
}

#[tokio::test]
async fn discovery_and_jwks_reflect_issuer_state() {
    let h = Harness::new(&["ES256"]).await;

    let discovery = h.provider.discovery(ISSUER_ID).await.unwrap();
    let doc: Value = serde_json::from_str(&discovery).unwrap();
    assert_eq!(doc["issuer"], ISSUER_URL);
    assert_eq!(doc["authorization_endpoint"], format!("{ISSUER_URL}/authorize"));
    assert_eq!(doc["token_endpoint"], format!("{ISSUER_URL}/token"));
    assert_eq!(doc["jwks_uri"], format!("{ISSUER_URL}/.well-known/jwks.json"));
    assert_eq!(doc["subject_types_supported"], json!(["public"]));
    assert_eq!(doc["id_token_signing_alg_values_supported"], json!(["ES256"]));
    // Dynamic-provider defaults were filled at creation.
    assert_eq!(doc["response_modes_supported"], json!(["query", "fragment"]));
    assert_eq!(
        doc["grant_types_supported"],
        json!(["authorization_code", "implicit"])
    );
    assert_eq!(
        doc["token_endpoint_auth_methods_supported"],
        json!(["client_secret_basic"])
    );

    let jwks = h.provider.jwks(ISSUER_ID).await.unwrap();
    assert_eq!(jwks.keys.len(), 1);
    let original_kid = jwks.keys[0].common.key_id.clone().expect("kid");

    // Rotation keeps the previous key published.
    h.provider
        .rotate_key(ISSUER_ID, KeyType::Ecdsa256)
        .await
        .unwrap();
    let jwks = h.provider.jwks(ISSUER_ID).await.unwrap();
    assert_eq!(jwks.keys.len(), 2);
    let kids: Vec<String> = jwks
        .keys
        .iter()
        .filter_map(|k| k.common.key_id.clone())
        .collect();
    assert!(kids.contains(&original_kid));
}

#[tokio::test]
async fn issuer_creation_requires_complete_metadata() {
    let (store, callbacks) = side_indexed_store(Arc::new(MemoryBackend::new()));
    let provider = Provider::new(store, callbacks, Arc::new(TestUsers));
    let result = provider
        .create_issuer(IssuerConfig {
            id: "incomplete".to_string(),
            password: "pw".to_string(),
            meta: IssuerMeta {
                issuer: ISSUER_URL.to_string(),
                // No endpoints, no response types.
                ..IssuerMeta::default()
            },
            attributes: IssuerAttributes::default(),
        })
        .await;
    assert!(matches!(
        result,
        Err(oxidp_provider::ProviderError::InvalidArgument(_))
    ));
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
