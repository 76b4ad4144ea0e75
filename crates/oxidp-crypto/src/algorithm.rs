//! JWA signing algorithms and issuer key types.
//!
//! An issuer provisions one key ring per [`KeyType`]; every JWA algorithm
//! maps onto the key type able to produce it. `RS*` and `PS*` share the RSA
//! key of the matching size, per RFC 7518.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for algorithm mapping.
#[derive(Debug, Error)]
pub enum AlgorithmError {
    /// Algorithm name not defined by RFC 7518 / not supported here.
    #[error("unknown algorithm: {0}")]
    Unknown(String),
}

/// Hash function used for signatures and OIDC token hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

/// JWS signing algorithms accepted by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// Unsecured JWS (`<header>.<payload>.`). Only accepted where a flow
    /// explicitly allows it.
    #[serde(rename = "none")]
    None,

    /// RSA PKCS#1 v1.5 with SHA-256.
    #[serde(rename = "RS256")]
    Rs256,
    /// RSA PKCS#1 v1.5 with SHA-384.
    #[serde(rename = "RS384")]
    Rs384,
    /// RSA PKCS#1 v1.5 with SHA-512.
    #[serde(rename = "RS512")]
    Rs512,

    /// RSA-PSS with SHA-256.
    #[serde(rename = "PS256")]
    Ps256,
    /// RSA-PSS with SHA-384.
    #[serde(rename = "PS384")]
    Ps384,
    /// RSA-PSS with SHA-512.
    #[serde(rename = "PS512")]
    Ps512,

    /// ECDSA using P-256 and SHA-256.
    #[serde(rename = "ES256")]
    Es256,
    /// ECDSA using P-384 and SHA-384.
    #[serde(rename = "ES384")]
    Es384,
    /// ECDSA using P-521 and SHA-512.
    #[serde(rename = "ES512")]
    Es512,
}

impl SigningAlgorithm {
    /// Returns the JWA algorithm name.
    #[must_use]
    pub const fn jwa_name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Rs256 => "RS256",
            Self::Rs384 => "RS384",
            Self::Rs512 => "RS512",
            Self::Ps256 => "PS256",
            Self::Ps384 => "PS384",
            Self::Ps512 => "PS512",
            Self::Es256 => "ES256",
            Self::Es384 => "ES384",
            Self::Es512 => "ES512",
        }
    }

    /// Returns the hash function of this algorithm family.
    ///
    /// `none` hashes nothing; OIDC token hashes fall back to SHA-256 there.
    #[must_use]
    pub const fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            Self::None | Self::Rs256 | Self::Ps256 | Self::Es256 => HashAlgorithm::Sha256,
            Self::Rs384 | Self::Ps384 | Self::Es384 => HashAlgorithm::Sha384,
            Self::Rs512 | Self::Ps512 | Self::Es512 => HashAlgorithm::Sha512,
        }
    }

    /// Returns the issuer key type able to produce this signature, or `None`
    /// for the unsecured algorithm.
    #[must_use]
    pub const fn key_type(self) -> Option<KeyType> {
        match self {
            Self::None => None,
            Self::Rs256 | Self::Ps256 => Some(KeyType::Rsa256),
            Self::Rs384 | Self::Ps384 => Some(KeyType::Rsa384),
            Self::Rs512 | Self::Ps512 => Some(KeyType::Rsa512),
            Self::Es256 => Some(KeyType::Ecdsa256),
            Self::Es384 => Some(KeyType::Ecdsa384),
            Self::Es512 => Some(KeyType::Ecdsa512),
        }
    }

    /// All algorithm names the provider can sign with.
    #[must_use]
    pub fn supported_values() -> Vec<&'static str> {
        vec![
            "none", "RS256", "RS384", "RS512", "PS256", "PS384", "PS512", "ES256", "ES384",
            "ES512",
        ]
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.jwa_name())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = AlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "RS256" => Ok(Self::Rs256),
            "RS384" => Ok(Self::Rs384),
            "RS512" => Ok(Self::Rs512),
            "PS256" => Ok(Self::Ps256),
            "PS384" => Ok(Self::Ps384),
            "PS512" => Ok(Self::Ps512),
            "ES256" => Ok(Self::Es256),
            "ES384" => Ok(Self::Es384),
            "ES512" => Ok(Self::Es512),
            _ => Err(AlgorithmError::Unknown(s.to_string())),
        }
    }
}

/// Key material classes an issuer can hold, one key ring each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyType {
    /// RSA 2048 bit (RS256/PS256).
    #[serde(rename = "rsa256")]
    Rsa256,
    /// RSA 3072 bit (RS384/PS384).
    #[serde(rename = "rsa384")]
    Rsa384,
    /// RSA 4096 bit (RS512/PS512).
    #[serde(rename = "rsa512")]
    Rsa512,
    /// ECDSA P-256 (ES256).
    #[serde(rename = "ecdsa256")]
    Ecdsa256,
    /// ECDSA P-384 (ES384).
    #[serde(rename = "ecdsa384")]
    Ecdsa384,
    /// ECDSA P-521 (ES512).
    #[serde(rename = "ecdsa512")]
    Ecdsa512,
}

impl KeyType {
    /// Returns the tag used in store paths and key-ring maps.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Rsa256 => "rsa256",
            Self::Rsa384 => "rsa384",
            Self::Rsa512 => "rsa512",
            Self::Ecdsa256 => "ecdsa256",
            Self::Ecdsa384 => "ecdsa384",
            Self::Ecdsa512 => "ecdsa512",
        }
    }

    /// RSA modulus size in bits, if this is an RSA key type.
    #[must_use]
    pub const fn rsa_bits(self) -> Option<usize> {
        match self {
            Self::Rsa256 => Some(2048),
            Self::Rsa384 => Some(3072),
            Self::Rsa512 => Some(4096),
            _ => None,
        }
    }

    /// Returns whether this is an RSA key type.
    #[must_use]
    pub const fn is_rsa(self) -> bool {
        matches!(self, Self::Rsa256 | Self::Rsa384 | Self::Rsa512)
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for KeyType {
    type Err = AlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rsa256" => Ok(Self::Rsa256),
            "rsa384" => Ok(Self::Rsa384),
            "rsa512" => Ok(Self::Rsa512),
            "ecdsa256" => Ok(Self::Ecdsa256),
            "ecdsa384" => Ok(Self::Ecdsa384),
            "ecdsa512" => Ok(Self::Ecdsa512),
            _ => Err(AlgorithmError::Unknown(s.to_string())),
        }
    }
}
