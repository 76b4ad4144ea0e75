//! Collaborator interfaces implemented by the embedding application.

use async_trait::async_trait;
use oxidp_model::{AuthorizationParameters, ClientMeta};
use oxidp_store::StoreResult;
use thiserror::Error;

/// An error raised by an embedder callback.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CallbackError(pub String);

/// Everything the login UI needs to render a page for a pending request.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// The pending request id, to pass back into issue/cancel.
    pub request_id: String,
    /// Metadata of the requesting client.
    pub client: ClientMeta,
    /// The resolved authorization parameters.
    pub params: AuthorizationParameters,
}

/// Provider-side callbacks for bulk token deletion.
///
/// [`crate::SideIndexCallbacks`] implements these atop the token
/// side-indexes; embedders with their own indexes may substitute.
#[async_trait]
pub trait ProviderCallbacks: Send + Sync {
    /// Deletes every token identifier minted for a request id.
    async fn delete_tokens_with_request_id(
        &self,
        issuer_id: &str,
        request_id: &str,
    ) -> StoreResult<()>;

    /// Deletes every token identifier minted for a session id.
    async fn delete_tokens_with_session_id(
        &self,
        issuer_id: &str,
        session_id: &str,
    ) -> StoreResult<()>;
}

/// Embedder callbacks driving authentication.
#[async_trait]
pub trait SdkCallbacks: Send + Sync {
    /// Returns the raw user claims for a subject as a JSON object string.
    ///
    /// # Errors
    ///
    /// Failures surface to the client as a server error, never as an
    /// OAuth protocol error.
    async fn get_user_claims(&self, subject: &str) -> Result<String, CallbackError>;

    /// Renders the login page for a pending authorization request.
    fn write_login_html(&self, info: &RequestInfo) -> String;
}
