//! Issuer key-ring operations and issuer-signed JWT helpers.

use chrono::Utc;
use oxidp_crypto::{jwt, random, KeyPair, KeyType, SigningAlgorithm};
use oxidp_model::{Issuer, Key};
use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::provider::Provider;

/// Leeway used when parsing JWTs whose time claims are checked by hand
/// (request objects, `id_token_hint`).
pub(crate) const JWT_PARSE_LEEWAY_SECONDS: i64 = 24 * 60 * 60;

impl Provider {
    /// Generates a fresh key of the given type and persists it under the
    /// issuer.
    pub(crate) async fn generate_issuer_key(
        &self,
        issuer_id: &str,
        key_type: KeyType,
    ) -> Result<Key, ProviderError> {
        let pair = KeyPair::generate(key_type)?;
        let key = Key {
            issuer_id: issuer_id.to_string(),
            key_id: random::unique_id(),
            key_type,
            serialized_key: pair.to_pkcs8_der()?,
            create_at: Utc::now(),
        };
        self.store.create(&key).await?;
        Ok(key)
    }

    /// Loads the private key behind an issuer's ring.
    ///
    /// With `key_id=None` the ring's current key is returned.
    pub(crate) async fn issuer_key_pair(
        &self,
        issuer: &Issuer,
        key_type: KeyType,
        key_id: Option<&str>,
    ) -> Result<(KeyPair, String), ProviderError> {
        let ring = issuer
            .key_rings
            .get(&key_type)
            .ok_or(ProviderError::KeyNotFound)?;
        let key_id = match key_id {
            Some(id) => id.to_string(),
            None => ring.current_key_id.clone(),
        };
        if key_id.is_empty() {
            return Err(ProviderError::KeyNotFound);
        }
        let key = self
            .store
            .get(&Key::probe(&issuer.id, key_type, &key_id))
            .await?;
        let pair = KeyPair::from_pkcs8_der(key.key_type, &key.serialized_key)?;
        Ok((pair, key_id))
    }

    /// Signs a claim set with the issuer's key for the given algorithm
    /// name. `none` yields the unsecured `<header>.<payload>.` form.
    pub(crate) async fn sign_jwt(
        &self,
        issuer: &Issuer,
        claims: &Map<String, Value>,
        algorithm: &str,
    ) -> Result<String, ProviderError> {
        let alg: SigningAlgorithm = algorithm
            .parse()
            .map_err(|_| ProviderError::UnknownAlgorithm(algorithm.to_string()))?;
        let Some(key_type) = alg.key_type() else {
            return Ok(jwt::sign(claims, SigningAlgorithm::None, None, None)?);
        };
        let (pair, kid) = self.issuer_key_pair(issuer, key_type, None).await?;
        Ok(jwt::sign(claims, alg, Some(&pair), Some(&kid))?)
    }

    /// Verifies a token signed by this issuer, resolving the key from the
    /// header's `alg`/`kid`. Unsigned tokens are accepted the way the
    /// issuer key resolver always has; callers gate on `alg` when a flow
    /// forbids them.
    pub(crate) async fn verify_issuer_jwt(
        &self,
        issuer: &Issuer,
        token: &str,
    ) -> Result<jwt::Jwt, ProviderError> {
        let header = jwt::decode_header(token)?;
        if header.alg == "none" {
            return Ok(jwt::verify_unsecured(token)?);
        }
        let alg: SigningAlgorithm = header
            .alg
            .parse()
            .map_err(|_| ProviderError::UnknownAlgorithm(header.alg.clone()))?;
        let key_type = alg.key_type().ok_or(ProviderError::KeyNotFound)?;
        let kid = header.kid.as_deref().unwrap_or("");
        let key = self
            .store
            .get(&Key::probe(&issuer.id, key_type, kid))
            .await?;
        let pair = KeyPair::from_pkcs8_der(key.key_type, &key.serialized_key)?;
        Ok(jwt::verify(token, &pair.verifying_key())?)
    }

    /// Verifies an ID token issued by this issuer (`id_token_hint`).
    ///
    /// Signature and issuer must check out; `exp`/`nbf` are validated with
    /// a 24-hour leeway, tolerating hints that expired recently.
    pub(crate) async fn verify_id_token(
        &self,
        issuer: &Issuer,
        token: &str,
    ) -> Result<jwt::Jwt, ProviderError> {
        let decoded = self.verify_issuer_jwt(issuer, token).await?;
        jwt::validate_time(
            &decoded.claims,
            Utc::now().timestamp(),
            JWT_PARSE_LEEWAY_SECONDS,
        )?;
        if decoded.str_claim("iss") != issuer.meta.issuer {
            return Err(ProviderError::Signing("unknown issuer".to_string()));
        }
        Ok(decoded)
    }
}
