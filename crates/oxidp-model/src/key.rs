//! Stored issuer signing keys.

use chrono::{DateTime, Utc};
use oxidp_crypto::KeyType;
use oxidp_store::{Expirable, Pathable};
use serde::{Deserialize, Serialize};

use crate::STORE_PREFIX;

/// One private key owned by an issuer, identified by
/// `(issuer_id, key_type, key_id)` and referenced from the issuer's key
/// rings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    /// Owning issuer id.
    pub issuer_id: String,
    /// Key id, as published in JWKS `kid` and JWT headers.
    pub key_id: String,
    /// Key material class.
    pub key_type: KeyType,
    /// PKCS#8 DER private-key bytes. The public half is derivable.
    #[serde(default)]
    pub serialized_key: Vec<u8>,
    /// Creation time.
    pub create_at: DateTime<Utc>,
}

impl Key {
    /// Builds a probe carrying only the key fields, for store reads.
    #[must_use]
    pub fn probe(issuer_id: &str, key_type: KeyType, key_id: &str) -> Self {
        Self {
            issuer_id: issuer_id.to_string(),
            key_id: key_id.to_string(),
            key_type,
            serialized_key: Vec::new(),
            create_at: Utc::now(),
        }
    }
}

impl Pathable for Key {
    fn path(&self) -> String {
        format!(
            "{STORE_PREFIX}/issuers/{}/keys/{}/{}",
            self.issuer_id,
            self.key_type.tag(),
            self.key_id
        )
    }
}

impl Expirable for Key {
    fn expire_at_unix(&self) -> Option<i64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_path_includes_type_and_id() {
        let key = Key::probe("t1", KeyType::Ecdsa384, "k-9");
        assert_eq!(key.path(), "oxidp/v1/issuers/t1/keys/ecdsa384/k-9");
    }
}
