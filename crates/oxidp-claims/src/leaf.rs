//! Leaf rules of a claims tree.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A leaf rule from the `claims` parameter (OIDC Core §5.5.1 plus the
/// Identity Assurance `purpose` and `max_age` members).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClaimsLeaf {
    /// Whether the claim is essential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub essential: Option<bool>,

    /// Maximum age in seconds accepted for the claim's verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i64>,

    /// Why the claim is requested (Identity Assurance §11).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    /// Required exact value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Set of acceptable values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
}

impl ClaimsLeaf {
    /// Applies the leaf to a source value.
    ///
    /// Returns the value to emit (if any) and whether the rule is
    /// satisfied. The members are checked in fixed priority:
    /// `essential`, then `value`, then `values`, then `max_age`; a leaf
    /// with none of those passes the source through.
    #[must_use]
    pub fn verify(&self, source: Option<&Value>) -> (Option<Value>, bool) {
        if let Some(essential) = self.essential {
            return if essential {
                match source {
                    Some(v) => (Some(v.clone()), true),
                    None => (None, false),
                }
            } else {
                (source.cloned(), true)
            };
        }
        if let Some(expected) = &self.value {
            return match source {
                Some(v) if v == expected => (Some(v.clone()), true),
                _ => (None, false),
            };
        }
        if let Some(accepted) = &self.values {
            return match source {
                Some(v) if accepted.contains(v) => (Some(v.clone()), true),
                _ => (None, false),
            };
        }
        if self.max_age.is_some() {
            // max_age on a claim constrains the verification process, not
            // the value itself; the value passes through.
            return (source.cloned(), true);
        }
        (source.cloned(), true)
    }

    /// Returns whether any of the leaf-discriminating members is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.essential.is_none()
            && self.max_age.is_none()
            && self.purpose.is_none()
            && self.value.is_none()
            && self.values.is_none()
    }
}
