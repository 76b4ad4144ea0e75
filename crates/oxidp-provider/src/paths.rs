//! Default endpoint paths.
//!
//! Embedders mount the endpoints wherever they like; these are the
//! defaults used when composing issuer metadata.

/// Authorization endpoint.
pub const DEFAULT_AUTHORIZATION_PATH: &str = "/authorize";
/// Discovery document.
pub const DEFAULT_DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
/// JWKS document.
pub const DEFAULT_JWKS_PATH: &str = "/.well-known/jwks.json";
/// Token endpoint.
pub const DEFAULT_TOKEN_PATH: &str = "/token";
/// Userinfo endpoint.
pub const DEFAULT_USERINFO_PATH: &str = "/userinfo";
/// Dynamic registration endpoint.
pub const DEFAULT_REGISTRATION_PATH: &str = "/registration";
/// Pushed authorization request endpoint.
pub const DEFAULT_PUSHED_AUTHORIZATION_PATH: &str = "/par";
