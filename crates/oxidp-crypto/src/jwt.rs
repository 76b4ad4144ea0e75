//! Compact JWT signing and verification.
//!
//! Covers every JWA algorithm the provider advertises, including ES512 and
//! the unsecured form (`<header>.<payload>.`). Signature verification is
//! split from claim validation: `exp`/`nbf` are checked through
//! [`validate_time`] so callers can apply the leeway their flow requires
//! (request objects and `id_token_hint` use a 24-hour leeway with manual
//! window checks on top).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rsa::sha2::{Sha256, Sha384, Sha512};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Signer, Verifier};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::algorithm::SigningAlgorithm;
use crate::keys::{KeyPair, VerifyingKey};

/// Errors raised by JWT processing.
#[derive(Debug, Error)]
pub enum JwtError {
    /// The token is not three dot-separated base64url segments.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The header `alg` is unknown or not permitted here.
    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    /// The algorithm does not match the key material.
    #[error("algorithm {0} does not match verification key")]
    KeyMismatch(SigningAlgorithm),

    /// Producing the signature failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The signature did not verify.
    #[error("signature verification failed")]
    InvalidSignature,

    /// The token is expired (`exp` in the past beyond leeway).
    #[error("token expired")]
    Expired,

    /// The token is not yet valid (`nbf` in the future beyond leeway).
    #[error("token not yet valid")]
    NotYetValid,
}

/// Decoded JOSE header fields the provider cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtHeader {
    /// Signature algorithm name.
    pub alg: String,

    /// Token type, `JWT` when emitted by this provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,

    /// Signing key id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// A decoded (and, unless stated otherwise, verified) token.
#[derive(Debug, Clone)]
pub struct Jwt {
    /// The JOSE header.
    pub header: JwtHeader,
    /// The claim set.
    pub claims: Map<String, Value>,
}

impl Jwt {
    /// Returns a string claim, or `""` when absent or not a string.
    #[must_use]
    pub fn str_claim(&self, name: &str) -> &str {
        self.claims.get(name).and_then(Value::as_str).unwrap_or("")
    }

    /// Returns a numeric date claim as Unix seconds.
    #[must_use]
    pub fn numeric_date(&self, name: &str) -> Option<i64> {
        numeric_date(&self.claims, name)
    }

    /// Returns the `aud` claim normalized to a list.
    #[must_use]
    pub fn audiences(&self) -> Vec<String> {
        match self.claims.get("aud") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Signs a claim set, producing a compact JWT.
///
/// With [`SigningAlgorithm::None`] the key is ignored and the unsecured
/// form `<header>.<payload>.` is produced; otherwise `key` must match the
/// algorithm family and `kid` is placed in the header.
///
/// # Errors
///
/// Returns [`JwtError::KeyMismatch`] when key material and algorithm
/// disagree and [`JwtError::Signing`] when the signature operation fails.
pub fn sign(
    claims: &Map<String, Value>,
    alg: SigningAlgorithm,
    key: Option<&KeyPair>,
    kid: Option<&str>,
) -> Result<String, JwtError> {
    let header = JwtHeader {
        alg: alg.jwa_name().to_string(),
        typ: Some("JWT".to_string()),
        kid: if alg == SigningAlgorithm::None {
            None
        } else {
            kid.map(str::to_string)
        },
    };
    let header_b64 = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&header).map_err(|e| JwtError::Signing(e.to_string()))?,
    );
    let payload_b64 = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(claims).map_err(|e| JwtError::Signing(e.to_string()))?,
    );
    let signing_input = format!("{header_b64}.{payload_b64}");

    if alg == SigningAlgorithm::None {
        return Ok(format!("{signing_input}."));
    }

    let key = key.ok_or(JwtError::KeyMismatch(alg))?;
    let signature = sign_bytes(alg, key, signing_input.as_bytes())?;
    Ok(format!(
        "{signing_input}.{}",
        URL_SAFE_NO_PAD.encode(signature)
    ))
}

fn sign_bytes(alg: SigningAlgorithm, key: &KeyPair, msg: &[u8]) -> Result<Vec<u8>, JwtError> {
    let mut rng = rand::thread_rng();
    match (alg, key) {
        (SigningAlgorithm::Rs256, KeyPair::Rsa(k)) => {
            let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new((**k).clone());
            Ok(signer.sign(msg).to_vec())
        }
        (SigningAlgorithm::Rs384, KeyPair::Rsa(k)) => {
            let signer = rsa::pkcs1v15::SigningKey::<Sha384>::new((**k).clone());
            Ok(signer.sign(msg).to_vec())
        }
        (SigningAlgorithm::Rs512, KeyPair::Rsa(k)) => {
            let signer = rsa::pkcs1v15::SigningKey::<Sha512>::new((**k).clone());
            Ok(signer.sign(msg).to_vec())
        }
        (SigningAlgorithm::Ps256, KeyPair::Rsa(k)) => {
            let signer = rsa::pss::BlindedSigningKey::<Sha256>::new((**k).clone());
            Ok(signer.sign_with_rng(&mut rng, msg).to_vec())
        }
        (SigningAlgorithm::Ps384, KeyPair::Rsa(k)) => {
            let signer = rsa::pss::BlindedSigningKey::<Sha384>::new((**k).clone());
            Ok(signer.sign_with_rng(&mut rng, msg).to_vec())
        }
        (SigningAlgorithm::Ps512, KeyPair::Rsa(k)) => {
            let signer = rsa::pss::BlindedSigningKey::<Sha512>::new((**k).clone());
            Ok(signer.sign_with_rng(&mut rng, msg).to_vec())
        }
        (SigningAlgorithm::Es256, KeyPair::P256(k)) => {
            let signer = p256::ecdsa::SigningKey::from(k.clone());
            let signature: p256::ecdsa::Signature = signer.sign(msg);
            Ok(signature.to_bytes().to_vec())
        }
        (SigningAlgorithm::Es384, KeyPair::P384(k)) => {
            let signer = p384::ecdsa::SigningKey::from(k.clone());
            let signature: p384::ecdsa::Signature = signer.sign(msg);
            Ok(signature.to_bytes().to_vec())
        }
        (SigningAlgorithm::Es512, KeyPair::P521(k)) => {
            let signer = p521::ecdsa::SigningKey::from(ecdsa::SigningKey::<p521::NistP521>::from(
                k.clone(),
            ));
            let signature: p521::ecdsa::Signature = signer.sign(msg);
            Ok(signature.to_bytes().to_vec())
        }
        (alg, _) => Err(JwtError::KeyMismatch(alg)),
    }
}

/// Decodes the header segment without verifying anything.
///
/// # Errors
///
/// Returns [`JwtError::Malformed`] for anything that is not a compact JWS.
pub fn decode_header(token: &str) -> Result<JwtHeader, JwtError> {
    let (header_b64, _, _) = split(token)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|e| JwtError::Malformed(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| JwtError::Malformed(e.to_string()))
}

/// Decodes header and claims without verifying the signature.
///
/// Used only where the protocol allows it, such as extracting the `iss` of
/// a `client_assertion` to identify the client before authenticating it.
///
/// # Errors
///
/// Returns [`JwtError::Malformed`] for anything that is not a compact JWS.
pub fn decode_unverified(token: &str) -> Result<Jwt, JwtError> {
    let (header_b64, payload_b64, _) = split(token)?;
    Ok(Jwt {
        header: decode_json(header_b64)?,
        claims: decode_json(payload_b64)?,
    })
}

/// Verifies a token's signature against the given key.
///
/// The header `alg` picks the verification procedure; it must match the key
/// material. `alg=none` is rejected here, use [`verify_unsecured`] where a
/// flow explicitly allows unsigned tokens.
///
/// # Errors
///
/// Returns [`JwtError::InvalidSignature`] when verification fails, plus the
/// malformed/mismatch variants from decoding.
pub fn verify(token: &str, key: &VerifyingKey) -> Result<Jwt, JwtError> {
    let (header_b64, payload_b64, signature_b64) = split(token)?;
    let header: JwtHeader = decode_json(header_b64)?;
    let alg: SigningAlgorithm = header
        .alg
        .parse()
        .map_err(|_| JwtError::UnknownAlgorithm(header.alg.clone()))?;
    if alg == SigningAlgorithm::None {
        return Err(JwtError::UnknownAlgorithm("none".to_string()));
    }
    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|e| JwtError::Malformed(e.to_string()))?;
    let signing_input = format!("{header_b64}.{payload_b64}");
    verify_bytes(alg, key, signing_input.as_bytes(), &signature)?;
    Ok(Jwt {
        header,
        claims: decode_json(payload_b64)?,
    })
}

/// Accepts an unsecured (`alg=none`) token and returns its claims.
///
/// # Errors
///
/// Returns [`JwtError::UnknownAlgorithm`] when the token is not actually
/// unsecured, and the malformed variants from decoding.
pub fn verify_unsecured(token: &str) -> Result<Jwt, JwtError> {
    let (header_b64, payload_b64, signature_b64) = split(token)?;
    let header: JwtHeader = decode_json(header_b64)?;
    if header.alg != "none" || !signature_b64.is_empty() {
        return Err(JwtError::UnknownAlgorithm(header.alg));
    }
    Ok(Jwt {
        header,
        claims: decode_json(payload_b64)?,
    })
}

fn verify_bytes(
    alg: SigningAlgorithm,
    key: &VerifyingKey,
    msg: &[u8],
    signature: &[u8],
) -> Result<(), JwtError> {
    let bad_sig = |_| JwtError::InvalidSignature;
    match (alg, key) {
        (SigningAlgorithm::Rs256, VerifyingKey::Rsa(k)) => {
            let sig = rsa::pkcs1v15::Signature::try_from(signature).map_err(bad_sig)?;
            rsa::pkcs1v15::VerifyingKey::<Sha256>::new((**k).clone())
                .verify(msg, &sig)
                .map_err(bad_sig)
        }
        (SigningAlgorithm::Rs384, VerifyingKey::Rsa(k)) => {
            let sig = rsa::pkcs1v15::Signature::try_from(signature).map_err(bad_sig)?;
            rsa::pkcs1v15::VerifyingKey::<Sha384>::new((**k).clone())
                .verify(msg, &sig)
                .map_err(bad_sig)
        }
        (SigningAlgorithm::Rs512, VerifyingKey::Rsa(k)) => {
            let sig = rsa::pkcs1v15::Signature::try_from(signature).map_err(bad_sig)?;
            rsa::pkcs1v15::VerifyingKey::<Sha512>::new((**k).clone())
                .verify(msg, &sig)
                .map_err(bad_sig)
        }
        (SigningAlgorithm::Ps256, VerifyingKey::Rsa(k)) => {
            let sig = rsa::pss::Signature::try_from(signature).map_err(bad_sig)?;
            rsa::pss::VerifyingKey::<Sha256>::new((**k).clone())
                .verify(msg, &sig)
                .map_err(bad_sig)
        }
        (SigningAlgorithm::Ps384, VerifyingKey::Rsa(k)) => {
            let sig = rsa::pss::Signature::try_from(signature).map_err(bad_sig)?;
            rsa::pss::VerifyingKey::<Sha384>::new((**k).clone())
                .verify(msg, &sig)
                .map_err(bad_sig)
        }
        (SigningAlgorithm::Ps512, VerifyingKey::Rsa(k)) => {
            let sig = rsa::pss::Signature::try_from(signature).map_err(bad_sig)?;
            rsa::pss::VerifyingKey::<Sha512>::new((**k).clone())
                .verify(msg, &sig)
                .map_err(bad_sig)
        }
        (SigningAlgorithm::Es256, VerifyingKey::P256(k)) => {
            let sig = p256::ecdsa::Signature::from_slice(signature).map_err(bad_sig)?;
            k.verify(msg, &sig).map_err(bad_sig)
        }
        (SigningAlgorithm::Es384, VerifyingKey::P384(k)) => {
            let sig = p384::ecdsa::Signature::from_slice(signature).map_err(bad_sig)?;
            k.verify(msg, &sig).map_err(bad_sig)
        }
        (SigningAlgorithm::Es512, VerifyingKey::P521(k)) => {
            let sig = p521::ecdsa::Signature::from_slice(signature).map_err(bad_sig)?;
            k.verify(msg, &sig).map_err(bad_sig)
        }
        (alg, _) => Err(JwtError::KeyMismatch(alg)),
    }
}

/// Validates `exp` and `nbf` against `now` with the given leeway seconds.
///
/// Absent claims pass; this mirrors RFC 7519, where both are optional.
///
/// # Errors
///
/// Returns [`JwtError::Expired`] or [`JwtError::NotYetValid`].
pub fn validate_time(
    claims: &Map<String, Value>,
    now: i64,
    leeway: i64,
) -> Result<(), JwtError> {
    if let Some(exp) = numeric_date(claims, "exp") {
        if now > exp + leeway {
            return Err(JwtError::Expired);
        }
    }
    if let Some(nbf) = numeric_date(claims, "nbf") {
        if now + leeway < nbf {
            return Err(JwtError::NotYetValid);
        }
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn numeric_date(claims: &Map<String, Value>, name: &str) -> Option<i64> {
    let value = claims.get(name)?;
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

fn split(token: &str) -> Result<(&str, &str, &str), JwtError> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) => Ok((h, p, s)),
        _ => Err(JwtError::Malformed(
            "expected three dot-separated segments".to_string(),
        )),
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, JwtError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| JwtError::Malformed(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| JwtError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::KeyType;
    use serde_json::json;

    fn claims() -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("iss".to_string(), json!("https://op.example.com"));
        m.insert("sub".to_string(), json!("user-1"));
        m.insert("exp".to_string(), json!(4_102_444_800_i64));
        m
    }

    #[test]
    fn es256_sign_verify_round_trip() {
        let key = KeyPair::generate(KeyType::Ecdsa256).unwrap();
        let token = sign(&claims(), SigningAlgorithm::Es256, Some(&key), Some("k1")).unwrap();
        let verified = verify(&token, &key.verifying_key()).unwrap();
        assert_eq!(verified.header.kid.as_deref(), Some("k1"));
        assert_eq!(verified.str_claim("sub"), "user-1");
    }

    #[test]
    fn es512_sign_verify_round_trip() {
        let key = KeyPair::generate(KeyType::Ecdsa512).unwrap();
        let token = sign(&claims(), SigningAlgorithm::Es512, Some(&key), Some("k5")).unwrap();
        assert!(verify(&token, &key.verifying_key()).is_ok());
    }

    #[test]
    fn rs256_and_ps256_share_a_key() {
        let key = KeyPair::generate(KeyType::Rsa256).unwrap();
        for alg in [SigningAlgorithm::Rs256, SigningAlgorithm::Ps256] {
            let token = sign(&claims(), alg, Some(&key), Some("r1")).unwrap();
            assert!(verify(&token, &key.verifying_key()).is_ok());
        }
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let key = KeyPair::generate(KeyType::Ecdsa256).unwrap();
        let token = sign(&claims(), SigningAlgorithm::Es256, Some(&key), None).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(br#"{"sub":"attacker"}"#);
        parts[1] = &forged;
        let forged_token = parts.join(".");
        assert!(matches!(
            verify(&forged_token, &key.verifying_key()),
            Err(JwtError::InvalidSignature)
        ));
    }

    #[test]
    fn unsecured_form_has_trailing_dot() {
        let token = sign(&claims(), SigningAlgorithm::None, None, None).unwrap();
        assert!(token.ends_with('.'));
        assert_eq!(token.split('.').count(), 3);
        let decoded = verify_unsecured(&token).unwrap();
        assert_eq!(decoded.str_claim("iss"), "https://op.example.com");
    }

    #[test]
    fn signed_token_rejected_by_unsecured_path() {
        let key = KeyPair::generate(KeyType::Ecdsa256).unwrap();
        let token = sign(&claims(), SigningAlgorithm::Es256, Some(&key), None).unwrap();
        assert!(verify_unsecured(&token).is_err());
    }

    #[test]
    fn time_validation_with_leeway() {
        let mut c = Map::new();
        c.insert("exp".to_string(), json!(1_000));
        c.insert("nbf".to_string(), json!(900));
        assert!(validate_time(&c, 950, 0).is_ok());
        assert!(matches!(validate_time(&c, 1_100, 0), Err(JwtError::Expired)));
        assert!(validate_time(&c, 1_100, 200).is_ok());
        assert!(matches!(
            validate_time(&c, 800, 0),
            Err(JwtError::NotYetValid)
        ));
        assert!(validate_time(&c, 800, 200).is_ok());
    }

    #[test]
    fn audiences_normalize() {
        let mut c = claims();
        c.insert("aud".to_string(), json!(["a", "b"]));
        let token = sign(&c, SigningAlgorithm::None, None, None).unwrap();
        let decoded = verify_unsecured(&token).unwrap();
        assert_eq!(decoded.audiences(), vec!["a", "b"]);
    }
}
