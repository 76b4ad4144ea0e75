//! # oxidp-provider
//!
//! The protocol core of the oxidp OpenID Provider: an engine that issues,
//! exchanges and validates authorization codes, access/refresh/ID tokens
//! and JWKS documents on behalf of configured issuers (tenants), for
//! registered clients.
//!
//! The crate deliberately owns no HTTP surface. Endpoints accept typed
//! request structs and return typed responses; the embedding application
//! maps them from/to its transport, supplies the [`oxidp_store::Backend`],
//! and implements [`ProviderCallbacks`]/[`SdkCallbacks`] for mass token
//! revocation, user-claims lookup and login UI rendering.
//!
//! ```text
//! authorize ──▶ Login ──(UI authenticates)──▶ issue ──▶ redirect with code
//!                                 │
//! token (authorization_code) ◀────┘   userinfo / discovery / jwks / par /
//!                                     registration / start_session
//! ```

#![forbid(unsafe_code)]

pub mod admin;
pub mod authorization;
pub mod callbacks;
pub mod client_auth;
pub mod discovery;
pub mod error;
pub mod interceptor;
pub mod issue;
pub mod keys;
pub mod par;
pub mod paths;
pub mod provider;
pub mod redirect;
pub mod registration;
pub mod request;
mod request_object;
pub mod session;
pub mod token_endpoint;
pub mod types;
pub mod userinfo;

pub use admin::IssuerConfig;
pub use authorization::{AuthorizationResponse, IssueAction, LoginAction};
pub use callbacks::{CallbackError, ProviderCallbacks, RequestInfo, SdkCallbacks};
pub use error::{AuthorizationFail, OauthError, ProviderError, TokenFail};
pub use interceptor::{side_indexed_store, SideIndexCallbacks, TokenLinkInterceptor};
pub use issue::IssueResponse;
pub use par::{ParResponse, ParSuccess};
pub use provider::Provider;
pub use registration::{RegistrationData, RegistrationRequest, RegistrationResponse};
pub use request::{
    AuthorizationRequest, BasicAuth, IssueRequest, ParRequest, TokenRequest, UserinfoRequest,
};
pub use session::SessionCookie;
pub use token_endpoint::{TokenResponse, TokenSuccess};
pub use userinfo::UserinfoResponse;
