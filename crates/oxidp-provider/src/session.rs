//! Session creation and the `session_state` value.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use oxidp_crypto::{random, sha256};
use oxidp_model::{Client, Request, Session, SessionGroup};
use oxidp_store::{retry_if_error, StoreError};
use tracing::error;

use crate::error::ProviderError;
use crate::provider::{Provider, RETRY_COUNT};

/// The single-sign-on cookie the embedder should set after a login.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    /// Cookie name (the session group id).
    pub name: String,
    /// Cookie value (the session id).
    pub value: String,
    /// Cookie max-age, the group's session lifetime.
    pub max_age_seconds: i64,
}

impl Provider {
    /// Starts a single-sign-on session for the subject of a pending
    /// request, in the requesting client's session group.
    ///
    /// Call this after the UI authenticated the user and before (or
    /// alongside) [`Provider::issue`], then set the returned cookie.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Store`] when the request, client or
    /// session group cannot be loaded or the session cannot be created.
    pub async fn start_session(
        &self,
        issuer_id: &str,
        request_id: &str,
        subject: &str,
    ) -> Result<SessionCookie, ProviderError> {
        let request = self
            .store
            .get(&Request::probe(issuer_id, request_id))
            .await?;
        let client = self
            .store
            .get(&Client::probe(issuer_id, &request.client_id))
            .await?;
        let group = self
            .store
            .get(&SessionGroup::probe(
                issuer_id,
                &client.attributes.session_group_id,
            ))
            .await?;

        let session = match retry_if_error(RETRY_COUNT, || {
            let session = Session::new(&group, issuer_id, subject, &random::unique_id(), Utc::now());
            let store = self.store.clone();
            async move {
                store.create(&session).await?;
                Ok::<Session, StoreError>(session)
            }
        })
        .await
        {
            Ok(session) => session,
            Err(err) => {
                error!(error = %err, "session create retry exhausted");
                return Err(err.into());
            }
        };

        Ok(SessionCookie {
            name: group.id.clone(),
            value: session.id,
            max_age_seconds: group.attributes.authorize_session_lifetime_seconds,
        })
    }
}

/// Computes the `session_state` value bound to a session, client and
/// issuer (OIDC Session Management).
#[must_use]
pub(crate) fn session_state(issuer_id: &str, client_id: &str, session_id: &str) -> String {
    let input = format!("{session_id}{client_id}{issuer_id}");
    URL_SAFE_NO_PAD.encode(sha256(input.as_bytes()))
}
