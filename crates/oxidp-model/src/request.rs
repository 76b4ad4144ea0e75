//! Pending authorization requests, the authorized context and codes.

use chrono::{DateTime, Duration, Utc};
use oxidp_claims::{acr_claim_rules, scope_default_rules, ClaimRules};
use oxidp_store::{Expirable, Pathable};
use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::params::AuthorizationParameters;
use crate::STORE_PREFIX;

/// A pending authorization request, created by the authorization endpoint
/// and consumed exactly once by Issue or Cancel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request id handed to the login UI.
    pub id: String,
    /// Owning issuer id.
    pub issuer_id: String,
    /// Issuer identifier URL, the future `iss` claim.
    pub issuer: String,
    /// Requesting client id.
    pub client_id: String,
    /// Fully resolved parameters.
    pub params: AuthorizationParameters,
    /// Pre-computed claim rules, serialized JSON.
    pub request_claims: String,
    /// Creation time.
    pub create_at: DateTime<Utc>,
    /// Hard expiry (client `request_lifetime_seconds`).
    pub expire_at: DateTime<Utc>,
}

impl Request {
    /// Creates a pending request, pre-computing the claim rules from the
    /// scope defaults, `acr_values` and the `claims` parameter.
    ///
    /// An unparseable `claims` parameter contributes nothing.
    #[must_use]
    pub fn new(
        id: &str,
        issuer: &str,
        client: &Client,
        params: AuthorizationParameters,
        now: DateTime<Utc>,
    ) -> Self {
        let mut rules = scope_default_rules(&params.scopes);
        if !params.acr_values.is_empty() {
            rules.append(acr_claim_rules(&params.acr_values));
        }
        if !params.claims.is_empty() {
            if let Ok(requested) = serde_json::from_str::<ClaimRules>(&params.claims) {
                rules.append(requested);
            }
        }
        let request_claims = serde_json::to_string(&rules).unwrap_or_else(|_| "{}".to_string());
        Self {
            id: id.to_string(),
            issuer_id: client.issuer_id.clone(),
            issuer: issuer.to_string(),
            client_id: client.identity.client_id.clone(),
            params,
            request_claims,
            create_at: now,
            expire_at: now + Duration::seconds(client.attributes.request_lifetime_seconds),
        }
    }

    /// Builds a probe carrying only the key fields, for store reads.
    #[must_use]
    pub fn probe(issuer_id: &str, request_id: &str) -> Self {
        Self {
            id: request_id.to_string(),
            issuer_id: issuer_id.to_string(),
            issuer: String::new(),
            client_id: String::new(),
            params: AuthorizationParameters::default(),
            request_claims: String::new(),
            create_at: Utc::now(),
            expire_at: Utc::now(),
        }
    }

    /// Parses the stored claim rules back out.
    #[must_use]
    pub fn claim_rules(&self) -> ClaimRules {
        serde_json::from_str(&self.request_claims).unwrap_or_default()
    }
}

impl Pathable for Request {
    fn path(&self) -> String {
        format!(
            "{STORE_PREFIX}/issuers/{}/requests/{}",
            self.issuer_id, self.id
        )
    }
}

impl Expirable for Request {
    fn expire_at_unix(&self) -> Option<i64> {
        Some(self.expire_at.timestamp())
    }
}

/// The authorization context embedded in codes and token identifiers.
///
/// Carries a flattened snapshot of the request that produced it plus the
/// authenticated subject; parents are referenced by id only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Authorized {
    /// The producing request's id, the revocation key.
    pub request_id: String,
    /// Owning issuer id.
    pub issuer_id: String,
    /// Issuer identifier URL.
    pub issuer: String,
    /// Client the artifacts are issued to.
    pub client_id: String,
    /// Parameters of the producing request.
    pub params: AuthorizationParameters,
    /// Serialized claim rules of the producing request.
    pub request_claims: String,
    /// Authenticated end-user identifier.
    pub subject: String,
    /// Session the authentication rode on, possibly empty.
    pub session_id: String,
    /// Authentication time, Unix seconds.
    pub auth_time: i64,
    /// Raw user claims returned by the embedder, JSON.
    pub claims: String,
}

impl Authorized {
    /// Captures the authorization context from a pending request.
    #[must_use]
    pub fn new(
        request: &Request,
        subject: &str,
        session_id: &str,
        auth_time: DateTime<Utc>,
        claims: String,
    ) -> Self {
        Self {
            request_id: request.id.clone(),
            issuer_id: request.issuer_id.clone(),
            issuer: request.issuer.clone(),
            client_id: request.client_id.clone(),
            params: request.params.clone(),
            request_claims: request.request_claims.clone(),
            subject: subject.to_string(),
            session_id: session_id.to_string(),
            auth_time: auth_time.timestamp(),
            claims,
        }
    }

    /// Parses the stored claim rules back out.
    #[must_use]
    pub fn claim_rules(&self) -> ClaimRules {
        serde_json::from_str(&self.request_claims).unwrap_or_default()
    }
}

/// A one-time authorization code.
///
/// `is_used` flips false→true exactly once; a second redemption is a
/// replay and triggers revocation of everything minted for the same
/// request id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// The opaque code value.
    pub code: String,
    /// Authorization context at issue time.
    pub authorized: Authorized,
    /// Whether the code has been redeemed.
    pub is_used: bool,
    /// Creation time.
    pub create_at: DateTime<Utc>,
    /// Hard expiry (client `authorization_code_lifetime_seconds`).
    pub expire_at: DateTime<Utc>,
}

impl AuthorizationCode {
    /// Creates an unredeemed code for an authorized context.
    #[must_use]
    pub fn new(
        code: &str,
        authorized: Authorized,
        lifetime_seconds: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            code: code.to_string(),
            authorized,
            is_used: false,
            create_at: now,
            expire_at: now + Duration::seconds(lifetime_seconds),
        }
    }

    /// Builds a probe carrying only the key fields, for store reads.
    #[must_use]
    pub fn probe(issuer_id: &str, code: &str) -> Self {
        Self {
            code: code.to_string(),
            authorized: Authorized {
                issuer_id: issuer_id.to_string(),
                ..Authorized::default()
            },
            is_used: false,
            create_at: Utc::now(),
            expire_at: Utc::now(),
        }
    }
}

impl Pathable for AuthorizationCode {
    fn path(&self) -> String {
        format!(
            "{STORE_PREFIX}/issuers/{}/codes/{}",
            self.authorized.issuer_id, self.code
        )
    }
}

impl Expirable for AuthorizationCode {
    fn expire_at_unix(&self) -> Option<i64> {
        Some(self.expire_at.timestamp())
    }
}
