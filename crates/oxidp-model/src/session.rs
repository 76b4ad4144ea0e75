//! Session groups and single-sign-on sessions.

use chrono::{DateTime, Duration, Utc};
use oxidp_store::{Expirable, Pathable};
use serde::{Deserialize, Serialize};

use crate::STORE_PREFIX;

/// A cohort of clients sharing one single-sign-on session cookie.
///
/// The group id doubles as the session cookie name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionGroup {
    /// Owning issuer id.
    pub issuer_id: String,
    /// Group id and cookie name.
    pub id: String,
    /// Group-level settings.
    #[serde(default)]
    pub attributes: SessionGroupAttributes,
}

impl SessionGroup {
    /// Builds a probe carrying only the key fields, for store reads.
    #[must_use]
    pub fn probe(issuer_id: &str, id: &str) -> Self {
        Self {
            issuer_id: issuer_id.to_string(),
            id: id.to_string(),
            attributes: SessionGroupAttributes::default(),
        }
    }
}

impl Pathable for SessionGroup {
    fn path(&self) -> String {
        format!(
            "{STORE_PREFIX}/issuers/{}/session-groups/{}",
            self.issuer_id, self.id
        )
    }
}

impl Expirable for SessionGroup {
    fn expire_at_unix(&self) -> Option<i64> {
        None
    }
}

/// Session group settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionGroupAttributes {
    /// Lifetime of sessions in this group, in seconds; also the cookie
    /// max-age.
    pub authorize_session_lifetime_seconds: i64,
}

impl Default for SessionGroupAttributes {
    fn default() -> Self {
        Self {
            authorize_session_lifetime_seconds: 3_600,
        }
    }
}

/// An authenticated end-user session.
///
/// `create_at` is the authentication time; a session past its group
/// lifetime is treated as absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Owning issuer id.
    pub issuer_id: String,
    /// Session id, carried by the group cookie.
    pub id: String,
    /// Group the session belongs to.
    pub session_group_id: String,
    /// End-user identifier.
    pub subject: String,
    /// Authentication time.
    pub create_at: DateTime<Utc>,
    /// Hard expiry.
    pub expire_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session for a subject in a session group.
    #[must_use]
    pub fn new(
        group: &SessionGroup,
        issuer_id: &str,
        subject: &str,
        session_id: &str,
        auth_time: DateTime<Utc>,
    ) -> Self {
        Self {
            issuer_id: issuer_id.to_string(),
            id: session_id.to_string(),
            session_group_id: group.id.clone(),
            subject: subject.to_string(),
            create_at: auth_time,
            expire_at: auth_time
                + Duration::seconds(group.attributes.authorize_session_lifetime_seconds),
        }
    }

    /// Builds a probe carrying only the key fields, for store reads.
    #[must_use]
    pub fn probe(issuer_id: &str, session_id: &str) -> Self {
        Self {
            issuer_id: issuer_id.to_string(),
            id: session_id.to_string(),
            session_group_id: String::new(),
            subject: String::new(),
            create_at: Utc::now(),
            expire_at: Utc::now(),
        }
    }
}

impl Pathable for Session {
    fn path(&self) -> String {
        format!(
            "{STORE_PREFIX}/issuers/{}/sessions/{}",
            self.issuer_id, self.id
        )
    }
}

impl Expirable for Session {
    fn expire_at_unix(&self) -> Option<i64> {
        Some(self.expire_at.timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_expiry_follows_group_lifetime() {
        let group = SessionGroup {
            issuer_id: "t1".to_string(),
            id: "sg1".to_string(),
            attributes: SessionGroupAttributes {
                authorize_session_lifetime_seconds: 120,
            },
        };
        let now = Utc::now();
        let session = Session::new(&group, "t1", "u1", "s1", now);
        assert_eq!(session.expire_at - session.create_at, Duration::seconds(120));
        assert_eq!(session.path(), "oxidp/v1/issuers/t1/sessions/s1");
        assert_eq!(session.expire_at_unix(), Some(session.expire_at.timestamp()));
    }
}
