//! # oxidp-claims
//!
//! The claim-rules engine behind the OIDC `claims` request parameter,
//! including the Identity Assurance `verified_claims` extension.
//!
//! Rules are parsed from the request, composed with the defaults implied by
//! the requested scopes and `acr_values`, persisted alongside the pending
//! authorization request, and later used to *filter* the embedder's raw
//! user claims down to the sets emitted in the ID Token and at the
//! userinfo endpoint.

#![forbid(unsafe_code)]

pub mod leaf;
pub mod root;
pub mod rules;
pub mod tree;
pub mod verified;

pub use leaf::ClaimsLeaf;
pub use root::ClaimObjectRoot;
pub use rules::{acr_claim_rules, scope_default_rules, ClaimRules};
pub use tree::{ClaimsTree, ClaimsTreeError};
pub use verified::VerifiedClaims;
