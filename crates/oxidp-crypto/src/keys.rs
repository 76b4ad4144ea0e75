//! Key-pair generation, PKCS#8 serialization and JWK conversion.
//!
//! Issuer signing keys are generated here and stored as PKCS#8 DER blobs;
//! the public half is exported as a JWK for the JWKS endpoint. Client keys
//! arrive from the other direction, as JWKs inside a client's `jwks` /
//! `jwks_uri` document, and are turned into [`VerifyingKey`]s.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::jwk::{
    AlgorithmParameters, CommonParameters, EllipticCurve as JwkCurve, EllipticCurveKeyParameters,
    EllipticCurveKeyType, Jwk, PublicKeyUse, RSAKeyParameters, RSAKeyType,
};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use thiserror::Error;

use crate::algorithm::{KeyType, SigningAlgorithm};

/// Errors raised by key handling.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Key generation failed.
    #[error("key generation failed: {0}")]
    Generation(String),

    /// Serialized key material could not be parsed.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// A JWK uses parameters this provider cannot verify with.
    #[error("unsupported jwk: {0}")]
    UnsupportedJwk(String),

    /// The requested algorithm does not match the key material.
    #[error("algorithm {alg} does not match key type {key_type}")]
    AlgorithmMismatch {
        /// Requested JWA algorithm.
        alg: SigningAlgorithm,
        /// Key type of the material at hand.
        key_type: KeyType,
    },
}

/// Private-key material of one issuer key.
#[derive(Clone)]
pub enum KeyPair {
    /// RSA private key (rsa256/rsa384/rsa512 key types).
    Rsa(Box<RsaPrivateKey>),
    /// P-256 private key.
    P256(p256::SecretKey),
    /// P-384 private key.
    P384(p384::SecretKey),
    /// P-521 private key.
    P521(p521::SecretKey),
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Rsa(_) => "Rsa",
            Self::P256(_) => "P256",
            Self::P384(_) => "P384",
            Self::P521(_) => "P521",
        };
        f.debug_struct("KeyPair").field("kind", &kind).finish()
    }
}

impl KeyPair {
    /// Generates a fresh key pair of the given type.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Generation`] when the underlying RNG or RSA
    /// prime search fails.
    pub fn generate(key_type: KeyType) -> Result<Self, KeyError> {
        let mut rng = rand::thread_rng();
        match key_type {
            KeyType::Rsa256 | KeyType::Rsa384 | KeyType::Rsa512 => {
                let bits = key_type.rsa_bits().unwrap_or(2048);
                let key = RsaPrivateKey::new(&mut rng, bits)
                    .map_err(|e| KeyError::Generation(e.to_string()))?;
                Ok(Self::Rsa(Box::new(key)))
            }
            KeyType::Ecdsa256 => Ok(Self::P256(p256::SecretKey::random(&mut rng))),
            KeyType::Ecdsa384 => Ok(Self::P384(p384::SecretKey::random(&mut rng))),
            KeyType::Ecdsa512 => Ok(Self::P521(p521::SecretKey::random(&mut rng))),
        }
    }

    /// Parses PKCS#8 DER private-key bytes for the given key type.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKey`] when the bytes do not decode as a
    /// key of that type.
    pub fn from_pkcs8_der(key_type: KeyType, der: &[u8]) -> Result<Self, KeyError> {
        let invalid = |e: &dyn std::fmt::Display| KeyError::InvalidKey(e.to_string());
        match key_type {
            KeyType::Rsa256 | KeyType::Rsa384 | KeyType::Rsa512 => {
                RsaPrivateKey::from_pkcs8_der(der)
                    .map(|k| Self::Rsa(Box::new(k)))
                    .map_err(|e| invalid(&e))
            }
            KeyType::Ecdsa256 => p256::SecretKey::from_pkcs8_der(der)
                .map(Self::P256)
                .map_err(|e| invalid(&e)),
            KeyType::Ecdsa384 => p384::SecretKey::from_pkcs8_der(der)
                .map(Self::P384)
                .map_err(|e| invalid(&e)),
            KeyType::Ecdsa512 => p521::SecretKey::from_pkcs8_der(der)
                .map(Self::P521)
                .map_err(|e| invalid(&e)),
        }
    }

    /// Serializes the private key as PKCS#8 DER.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKey`] when encoding fails.
    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>, KeyError> {
        let doc = match self {
            Self::Rsa(k) => k.to_pkcs8_der(),
            Self::P256(k) => k.to_pkcs8_der(),
            Self::P384(k) => k.to_pkcs8_der(),
            Self::P521(k) => k.to_pkcs8_der(),
        }
        .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        Ok(doc.as_bytes().to_vec())
    }

    /// Returns the key type of this material.
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Rsa(k) => match k.size() * 8 {
                3072 => KeyType::Rsa384,
                4096 => KeyType::Rsa512,
                _ => KeyType::Rsa256,
            },
            Self::P256(_) => KeyType::Ecdsa256,
            Self::P384(_) => KeyType::Ecdsa384,
            Self::P521(_) => KeyType::Ecdsa512,
        }
    }

    /// Returns the public half as a verification key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        match self {
            Self::Rsa(k) => VerifyingKey::Rsa(Box::new(k.to_public_key())),
            Self::P256(k) => VerifyingKey::P256(p256::ecdsa::VerifyingKey::from(
                k.public_key(),
            )),
            Self::P384(k) => VerifyingKey::P384(p384::ecdsa::VerifyingKey::from(
                k.public_key(),
            )),
            Self::P521(k) => VerifyingKey::P521(p521::ecdsa::VerifyingKey::from(
                ecdsa::VerifyingKey::<p521::NistP521>::from(k.public_key()),
            )),
        }
    }

    /// Exports the public half as a JWK with the given key id.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKey`] when point encoding fails.
    pub fn public_jwk(&self, kid: &str) -> Result<Jwk, KeyError> {
        let common = CommonParameters {
            key_id: Some(kid.to_string()),
            public_key_use: Some(PublicKeyUse::Signature),
            ..CommonParameters::default()
        };
        let algorithm = match self {
            Self::Rsa(k) => AlgorithmParameters::RSA(RSAKeyParameters {
                key_type: RSAKeyType::RSA,
                n: URL_SAFE_NO_PAD.encode(k.n().to_bytes_be()),
                e: URL_SAFE_NO_PAD.encode(k.e().to_bytes_be()),
            }),
            Self::P256(k) => {
                let point = p256::ecdsa::SigningKey::from(k)
                    .verifying_key()
                    .to_encoded_point(false);
                ec_jwk_params(JwkCurve::P256, point.x(), point.y())?
            }
            Self::P384(k) => {
                let point = p384::ecdsa::SigningKey::from(k)
                    .verifying_key()
                    .to_encoded_point(false);
                ec_jwk_params(JwkCurve::P384, point.x(), point.y())?
            }
            Self::P521(k) => {
                let signer = p521::ecdsa::SigningKey::from(
                    ecdsa::SigningKey::<p521::NistP521>::from(k.clone()),
                );
                let point = p521::ecdsa::VerifyingKey::from(&signer).to_encoded_point(false);
                ec_jwk_params(JwkCurve::P521, point.x(), point.y())?
            }
        };
        Ok(Jwk { common, algorithm })
    }
}

fn ec_jwk_params<T: AsRef<[u8]>>(
    curve: JwkCurve,
    x: Option<&T>,
    y: Option<&T>,
) -> Result<AlgorithmParameters, KeyError> {
    let (x, y) = x
        .zip(y)
        .ok_or_else(|| KeyError::InvalidKey("identity point".to_string()))?;
    Ok(AlgorithmParameters::EllipticCurve(
        EllipticCurveKeyParameters {
            key_type: EllipticCurveKeyType::EC,
            curve,
            x: URL_SAFE_NO_PAD.encode(x.as_ref()),
            y: URL_SAFE_NO_PAD.encode(y.as_ref()),
        },
    ))
}

/// Public-key material used to verify JWS signatures.
#[derive(Clone)]
pub enum VerifyingKey {
    /// RSA public key.
    Rsa(Box<RsaPublicKey>),
    /// P-256 public key.
    P256(p256::ecdsa::VerifyingKey),
    /// P-384 public key.
    P384(p384::ecdsa::VerifyingKey),
    /// P-521 public key.
    P521(p521::ecdsa::VerifyingKey),
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Rsa(_) => "Rsa",
            Self::P256(_) => "P256",
            Self::P384(_) => "P384",
            Self::P521(_) => "P521",
        };
        f.debug_struct("VerifyingKey").field("kind", &kind).finish()
    }
}

impl VerifyingKey {
    /// Builds a verification key from a public JWK.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::UnsupportedJwk`] for key types other than RSA
    /// and the three NIST curves, and [`KeyError::InvalidKey`] for
    /// malformed parameters.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, KeyError> {
        match &jwk.algorithm {
            AlgorithmParameters::RSA(params) => {
                let n = BigUint::from_bytes_be(&b64_field(&params.n)?);
                let e = BigUint::from_bytes_be(&b64_field(&params.e)?);
                let key =
                    RsaPublicKey::new(n, e).map_err(|e| KeyError::InvalidKey(e.to_string()))?;
                Ok(Self::Rsa(Box::new(key)))
            }
            AlgorithmParameters::EllipticCurve(params) => match params.curve {
                JwkCurve::P256 => {
                    let sec1 = sec1_point(&params.x, &params.y, 32)?;
                    p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                        .map(Self::P256)
                        .map_err(|e| KeyError::InvalidKey(e.to_string()))
                }
                JwkCurve::P384 => {
                    let sec1 = sec1_point(&params.x, &params.y, 48)?;
                    p384::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                        .map(Self::P384)
                        .map_err(|e| KeyError::InvalidKey(e.to_string()))
                }
                JwkCurve::P521 => {
                    let sec1 = sec1_point(&params.x, &params.y, 66)?;
                    p521::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                        .map(Self::P521)
                        .map_err(|e| KeyError::InvalidKey(e.to_string()))
                }
                _ => Err(KeyError::UnsupportedJwk(format!(
                    "curve {:?}",
                    params.curve
                ))),
            },
            other => Err(KeyError::UnsupportedJwk(format!("{other:?}"))),
        }
    }
}

fn b64_field(value: &str) -> Result<Vec<u8>, KeyError> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| KeyError::InvalidKey(e.to_string()))
}

/// Decodes a JWK coordinate pair into uncompressed SEC1 bytes,
/// left-padding each coordinate to the curve's field size.
fn sec1_point(x: &str, y: &str, field_len: usize) -> Result<Vec<u8>, KeyError> {
    let pad = |raw: Vec<u8>| -> Result<Vec<u8>, KeyError> {
        if raw.len() > field_len {
            return Err(KeyError::InvalidKey("coordinate too long".to_string()));
        }
        let mut out = vec![0u8; field_len - raw.len()];
        out.extend_from_slice(&raw);
        Ok(out)
    };
    let x = pad(b64_field(x)?)?;
    let y = pad(b64_field(y)?)?;
    let mut sec1 = Vec::with_capacity(1 + 2 * field_len);
    sec1.push(0x04);
    sec1.extend_from_slice(&x);
    sec1.extend_from_slice(&y);
    Ok(sec1)
}
