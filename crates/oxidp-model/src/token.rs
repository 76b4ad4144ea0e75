//! Token identifiers and their revocation side-indexes.

use chrono::{DateTime, Duration, Utc};
use oxidp_store::{Expirable, Pathable};
use serde::{Deserialize, Serialize};

use crate::request::Authorized;
use crate::STORE_PREFIX;

/// TTL of the side-index rows used for mass revocation.
pub const TOKEN_LINK_TTL_SECONDS: i64 = 24 * 60 * 60;

/// The kind of artifact a token identifier stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    /// Bearer access token.
    #[serde(rename = "access")]
    Access,
    /// Refresh token.
    #[serde(rename = "refresh")]
    Refresh,
    /// ID token (tracked for revocation and `jti`).
    #[serde(rename = "id")]
    Id,
}

/// An opaque token identifier bound to an authorization context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenIdentifier {
    /// The opaque identifier presented by the client.
    pub identifier: String,
    /// Artifact kind.
    pub kind: TokenKind,
    /// Authorization context at mint time.
    pub authorized: Authorized,
    /// Bound TLS client certificate hash, when certificate-bound.
    #[serde(default)]
    pub tls_client_certificate: String,
    /// Creation time.
    pub create_at: DateTime<Utc>,
    /// Hard expiry, per the matching client lifetime.
    pub expire_at: DateTime<Utc>,
}

impl TokenIdentifier {
    /// Mints an access-token identifier.
    #[must_use]
    pub fn access(
        identifier: &str,
        authorized: Authorized,
        lifetime_seconds: i64,
        now: DateTime<Utc>,
        tls_client_certificate: &str,
    ) -> Self {
        Self {
            identifier: identifier.to_string(),
            kind: TokenKind::Access,
            authorized,
            tls_client_certificate: tls_client_certificate.to_string(),
            create_at: now,
            expire_at: now + Duration::seconds(lifetime_seconds),
        }
    }

    /// Mints a refresh-token identifier.
    #[must_use]
    pub fn refresh(
        identifier: &str,
        authorized: Authorized,
        lifetime_seconds: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            identifier: identifier.to_string(),
            kind: TokenKind::Refresh,
            authorized,
            tls_client_certificate: String::new(),
            create_at: now,
            expire_at: now + Duration::seconds(lifetime_seconds),
        }
    }

    /// Mints an ID-token identifier; the identifier becomes the `jti`.
    #[must_use]
    pub fn id(
        identifier: &str,
        authorized: Authorized,
        lifetime_seconds: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            identifier: identifier.to_string(),
            kind: TokenKind::Id,
            authorized,
            tls_client_certificate: String::new(),
            create_at: now,
            expire_at: now + Duration::seconds(lifetime_seconds),
        }
    }

    /// Builds a probe carrying only the key fields, for store reads.
    #[must_use]
    pub fn probe(issuer_id: &str, identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            kind: TokenKind::Access,
            authorized: Authorized {
                issuer_id: issuer_id.to_string(),
                ..Authorized::default()
            },
            tls_client_certificate: String::new(),
            create_at: Utc::now(),
            expire_at: Utc::now(),
        }
    }
}

impl Pathable for TokenIdentifier {
    fn path(&self) -> String {
        format!(
            "{STORE_PREFIX}/issuers/{}/tokens/{}",
            self.authorized.issuer_id, self.identifier
        )
    }
}

impl Expirable for TokenIdentifier {
    fn expire_at_unix(&self) -> Option<i64> {
        Some(self.expire_at.timestamp())
    }
}

/// A side-index row listing the token identifiers minted for one request
/// or one session, keyed `(issuer, id, kind)`.
///
/// Mass revocation reads the row and deletes every listed identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenIdentifierLink {
    /// Owning issuer id.
    pub issuer_id: String,
    /// `request` or `session`.
    pub kind: String,
    /// The request or session id.
    pub key_id: String,
    /// Token identifiers minted under that id.
    #[serde(default)]
    pub list: Vec<String>,
    /// Hard expiry, refreshed on every append.
    pub expire_at: DateTime<Utc>,
}

impl TokenIdentifierLink {
    /// Builds a request-scoped link probe.
    #[must_use]
    pub fn for_request(issuer_id: &str, request_id: &str) -> Self {
        Self::probe(issuer_id, "request", request_id)
    }

    /// Builds a session-scoped link probe.
    #[must_use]
    pub fn for_session(issuer_id: &str, session_id: &str) -> Self {
        Self::probe(issuer_id, "session", session_id)
    }

    fn probe(issuer_id: &str, kind: &str, key_id: &str) -> Self {
        Self {
            issuer_id: issuer_id.to_string(),
            kind: kind.to_string(),
            key_id: key_id.to_string(),
            list: Vec::new(),
            expire_at: Utc::now(),
        }
    }

    /// Appends an identifier and refreshes the row TTL.
    pub fn push(&mut self, identifier: &str, now: DateTime<Utc>) {
        self.list.push(identifier.to_string());
        self.expire_at = now + Duration::seconds(TOKEN_LINK_TTL_SECONDS);
    }
}

impl Pathable for TokenIdentifierLink {
    fn path(&self) -> String {
        format!(
            "{STORE_PREFIX}/issuers/{}/links/{}/{}",
            self.issuer_id, self.kind, self.key_id
        )
    }
}

impl Expirable for TokenIdentifierLink {
    fn expire_at_unix(&self) -> Option<i64> {
        Some(self.expire_at.timestamp())
    }
}
