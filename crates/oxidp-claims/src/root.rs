//! The per-target rule root (`userinfo` or `id_token`).

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::tree::ClaimsTree;
use crate::verified::VerifiedClaims;

/// Rules for one emission target of the claims parameter.
///
/// The `verified_claims` member is split off at parse time; everything else
/// forms the plain claims tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClaimObjectRoot {
    /// Rules for `verified_claims`.
    pub verified_claims: Option<VerifiedClaims>,
    /// Rules for all remaining claims.
    pub claims: Option<ClaimsTree>,
}

impl ClaimObjectRoot {
    /// Applies the rules to the raw user claims, merging the output into
    /// `out`.
    pub fn make_claims(&self, source: &Map<String, Value>, out: &mut Map<String, Value>) {
        if let Some(verified) = &self.verified_claims {
            if let Some(v) = verified.apply(source) {
                out.insert("verified_claims".to_string(), v);
            }
        }
        if let Some(claims) = &self.claims {
            let source_value = Value::Object(source.clone());
            if let Some(Value::Object(filtered)) =
                ClaimsTree::filter(Some(claims), Some(&source_value))
            {
                for (k, v) in filtered {
                    out.insert(k, v);
                }
            }
        }
    }

    /// Returns whether a top-level claim name is requested.
    #[must_use]
    pub fn requests(&self, name: &str) -> bool {
        match &self.claims {
            Some(ClaimsTree::Branch(branch)) => branch.contains_key(name),
            _ => false,
        }
    }
}

impl Serialize for ClaimObjectRoot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = match &self.claims {
            Some(tree) => match tree.to_value() {
                Value::Object(m) => m,
                _ => Map::new(),
            },
            None => Map::new(),
        };
        if let Some(verified) = &self.verified_claims {
            map.insert(
                "verified_claims".to_string(),
                serde_json::to_value(verified).map_err(serde::ser::Error::custom)?,
            );
        }
        Value::Object(map).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ClaimObjectRoot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let tree = ClaimsTree::from_value(&value).map_err(DeError::custom)?;
        let ClaimsTree::Branch(mut branch) = tree else {
            return Err(DeError::custom("claims rules root must be an object"));
        };
        let verified_claims = branch
            .remove("verified_claims")
            .flatten()
            .map(VerifiedClaims::new);
        Ok(Self {
            verified_claims,
            claims: Some(ClaimsTree::Branch(branch)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn splits_verified_claims_from_plain_claims() {
        let root: ClaimObjectRoot = serde_json::from_value(json!({
            "email": {"essential": true},
            "verified_claims": {
                "verification": {"trust_framework": null},
                "claims": {"given_name": null}
            }
        }))
        .unwrap();
        assert!(root.verified_claims.is_some());
        assert!(root.requests("email"));
        assert!(!root.requests("verified_claims"));
    }

    #[test]
    fn make_claims_merges_both_outputs() {
        let root: ClaimObjectRoot = serde_json::from_value(json!({
            "email": null,
            "verified_claims": {
                "verification": {"trust_framework": null},
                "claims": {"given_name": null}
            }
        }))
        .unwrap();
        let source = json!({
            "email": "a@b",
            "name": "dropped",
            "verified_claims": {
                "verification": {"trust_framework": "de_aml"},
                "claims": {"given_name": "Max"}
            }
        })
        .as_object()
        .cloned()
        .unwrap();
        let mut out = Map::new();
        root.make_claims(&source, &mut out);
        assert_eq!(out.get("email"), Some(&json!("a@b")));
        assert!(out.contains_key("verified_claims"));
        assert!(!out.contains_key("name"));
    }
}
