//! # oxidp-model
//!
//! Domain entities of the oxidp OpenID Provider: issuers (tenants), their
//! clients, keys and session groups, plus the short-lived protocol
//! artifacts (pending requests, pushed authorization requests,
//! authorization codes, token identifiers).
//!
//! Object graphs are flattened for storage: every row carries the *ids* of
//! its parents and is resolved on read. All short-lived artifacts carry a
//! hard TTL and implement [`oxidp_store::Expirable`].

#![forbid(unsafe_code)]

pub mod client;
pub mod issuer;
pub mod key;
pub mod params;
pub mod par;
pub mod request;
pub mod session;
pub mod token;

/// Store path prefix shared by every row the provider owns.
pub const STORE_PREFIX: &str = "oxidp/v1";

pub use client::{Client, ClientAttributes, ClientExtensions, ClientIdentity, ClientMeta, ClientProfile};
pub use issuer::{Issuer, IssuerAttributes, IssuerMeta, IssuerSecret, IssuerValidationError, KeyRing};
pub use key::Key;
pub use params::AuthorizationParameters;
pub use par::PushedAuthorization;
pub use request::{Authorized, AuthorizationCode, Request};
pub use session::{Session, SessionGroup, SessionGroupAttributes};
pub use token::{TokenIdentifier, TokenIdentifierLink, TokenKind};
