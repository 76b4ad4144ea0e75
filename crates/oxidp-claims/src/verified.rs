//! Verified-claims rules (OpenID Connect for Identity Assurance).
//!
//! A `verified_claims` rule only matches sources that carry both a
//! `verification` object and a `claims` object; the `verification` subtree
//! must *validate* and the `claims` subtree must filter to something
//! non-empty. Array-form rules produce a list of such pairs.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::tree::ClaimsTree;

/// Rules applied to the `verified_claims` member of a claims request.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims(ClaimsTree);

impl VerifiedClaims {
    /// Wraps a tree parsed out of the `verified_claims` member.
    #[must_use]
    pub fn new(tree: ClaimsTree) -> Self {
        Self(tree)
    }

    /// Applies the rules to a full user-claims object.
    ///
    /// Returns the `{verification, claims}` output pair (or a list of such
    /// pairs for array-form rules), or `None` when the source has no
    /// matching verified claims.
    #[must_use]
    pub fn apply(&self, source: &Map<String, Value>) -> Option<Value> {
        let verified = source.get("verified_claims")?.as_object()?;
        let vsource = verified.get("verification")?;
        let csource = verified.get("claims")?;

        match &self.0 {
            ClaimsTree::Array(items) => {
                let mut out = Vec::new();
                for item in items {
                    if let Some(pair) = apply_pair(item, vsource, csource) {
                        out.push(pair);
                    }
                }
                if out.is_empty() {
                    None
                } else {
                    Some(Value::Array(out))
                }
            }
            branch @ ClaimsTree::Branch(_) => apply_pair(branch, vsource, csource),
            ClaimsTree::Leaf(_) => None,
        }
    }
}

fn apply_pair(rule: &ClaimsTree, vsource: &Value, csource: &Value) -> Option<Value> {
    let ClaimsTree::Branch(branch) = rule else {
        return None;
    };
    let verification_rule = branch.get("verification").and_then(Option::as_ref);
    let claims_rule = branch.get("claims").and_then(Option::as_ref);
    let (vout, ok) = ClaimsTree::verify(verification_rule, Some(vsource));
    let cout = ClaimsTree::filter(claims_rule, Some(csource));
    match (vout, ok, cout) {
        (Some(v), true, Some(c)) => Some(json!({"verification": v, "claims": c})),
        _ => None,
    }
}

impl Serialize for VerifiedClaims {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerifiedClaims {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ClaimsTree::deserialize(deserializer).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(v: Value) -> VerifiedClaims {
        VerifiedClaims::new(ClaimsTree::from_value(&v).unwrap())
    }

    fn source() -> Map<String, Value> {
        json!({
            "verified_claims": {
                "verification": {"trust_framework": "de_aml", "time": "2024-04-01T10:00:00Z"},
                "claims": {"given_name": "Max", "family_name": "Meier", "birthdate": "1956-01-28"}
            },
            "email": "max@example.com"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn both_parts_must_match() {
        let ok = rules(json!({
            "verification": {"trust_framework": {"value": "de_aml"}},
            "claims": {"given_name": null}
        }));
        let out = ok.apply(&source()).unwrap();
        assert_eq!(
            out,
            json!({
                "verification": {"trust_framework": "de_aml"},
                "claims": {"given_name": "Max"}
            })
        );

        let wrong_framework = rules(json!({
            "verification": {"trust_framework": {"value": "eidas"}},
            "claims": {"given_name": null}
        }));
        assert!(wrong_framework.apply(&source()).is_none());

        let no_claims_match = rules(json!({
            "verification": {"trust_framework": {"value": "de_aml"}},
            "claims": {"salary": {"essential": true}}
        }));
        assert!(no_claims_match.apply(&source()).is_none());
    }

    #[test]
    fn source_without_verified_claims_yields_none() {
        let r = rules(json!({
            "verification": {"trust_framework": null},
            "claims": {"given_name": null}
        }));
        let plain = json!({"email": "a@b"}).as_object().cloned().unwrap();
        assert!(r.apply(&plain).is_none());
    }

    #[test]
    fn array_form_emits_pair_list() {
        let r = rules(json!([
            {
                "verification": {"trust_framework": {"value": "de_aml"}},
                "claims": {"given_name": null}
            },
            {
                "verification": {"trust_framework": {"value": "eidas"}},
                "claims": {"family_name": null}
            }
        ]));
        let out = r.apply(&source()).unwrap();
        let list = out.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["claims"], json!({"given_name": "Max"}));
    }
}
