//! Pushed authorization requests (RFC 9126).

use chrono::{DateTime, Duration, Utc};
use oxidp_store::{Expirable, Pathable};
use serde::{Deserialize, Serialize};

use crate::params::AuthorizationParameters;
use crate::STORE_PREFIX;

/// TTL of a pushed authorization request.
pub const PUSHED_AUTHORIZATION_TTL_SECONDS: i64 = 60;

/// A stored pushed authorization request.
///
/// Single use: the first resolver (the authorization endpoint, or code
/// issuance for the same record) deletes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushedAuthorization {
    /// Owning issuer id.
    pub issuer_id: String,
    /// Client that pushed the request.
    pub client_id: String,
    /// Opaque handle suffix of `urn:ietf:params:oauth:request_uri:`.
    pub par_key: String,
    /// Resolved parameters, adopted wholesale at the authorization
    /// endpoint.
    pub params: AuthorizationParameters,
    /// Creation time.
    pub create_at: DateTime<Utc>,
    /// Hard expiry, 60 seconds after creation.
    pub expire_at: DateTime<Utc>,
}

impl PushedAuthorization {
    /// Creates a record with the fixed 60-second TTL.
    #[must_use]
    pub fn new(
        issuer_id: &str,
        client_id: &str,
        par_key: &str,
        params: AuthorizationParameters,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            issuer_id: issuer_id.to_string(),
            client_id: client_id.to_string(),
            par_key: par_key.to_string(),
            params,
            create_at: now,
            expire_at: now + Duration::seconds(PUSHED_AUTHORIZATION_TTL_SECONDS),
        }
    }

    /// Builds a probe carrying only the key fields, for store reads.
    #[must_use]
    pub fn probe(issuer_id: &str, client_id: &str, par_key: &str) -> Self {
        Self::new(
            issuer_id,
            client_id,
            par_key,
            AuthorizationParameters::default(),
            Utc::now(),
        )
    }
}

impl Pathable for PushedAuthorization {
    fn path(&self) -> String {
        format!(
            "{STORE_PREFIX}/issuers/{}/clients/{}/pars/{}",
            self.issuer_id, self.client_id, self.par_key
        )
    }
}

impl Expirable for PushedAuthorization {
    fn expire_at_unix(&self) -> Option<i64> {
        Some(self.expire_at.timestamp())
    }
}
