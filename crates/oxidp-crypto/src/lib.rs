//! # oxidp-crypto
//!
//! Cryptographic building blocks for the oxidp OpenID Provider:
//!
//! - Random token/id generation (authorization codes, `jti`, nano ids)
//! - RSA/ECDSA key-pair generation with PKCS#8 serialization
//! - JWK export and JWKS-based verification-key resolution
//! - A compact JWT engine covering RS/PS/ES 256/384/512 and `alg=none`
//! - OIDC token hashes (`c_hash`/`at_hash`/`s_hash`)
//!
//! The JWT engine is assembled by hand on top of the RustCrypto signature
//! crates because the provider must sign and verify with every JWA family
//! of three sizes, including ES512 and unsigned tokens.

#![forbid(unsafe_code)]

pub mod algorithm;
pub mod hash;
pub mod jwt;
pub mod keys;
pub mod random;

pub use algorithm::{KeyType, SigningAlgorithm};
pub use hash::{constant_time_eq, sha256, sha384, sha512, token_hash};
pub use jwt::{Jwt, JwtError, JwtHeader};
pub use keys::{KeyError, KeyPair, VerifyingKey};
