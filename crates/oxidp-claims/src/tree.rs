//! The recursive claims-tree structure.
//!
//! A node of the `claims` parameter is one of:
//!
//! - a *leaf*: an object carrying any of `value`, `values`, `essential`,
//!   `purpose`, `max_age`;
//! - a *branch*: an object mapping claim names to subtrees, where a JSON
//!   `null` subtree means "include the claim as-is";
//! - an *array* of subtrees (used by verified-claims `evidence`).
//!
//! Leaf detection happens at parse time on the presence of the leaf
//! members, matching OIDC Core §5.5.1.

use std::collections::BTreeMap;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::leaf::ClaimsLeaf;

/// Errors raised when parsing a claims tree.
#[derive(Debug, Error)]
pub enum ClaimsTreeError {
    /// `purpose` must be between 4 and 300 characters
    /// (Identity Assurance §11).
    #[error("purpose length out of range (4..=300)")]
    PurposeLength,

    /// The node is neither an object nor an array.
    #[error("claims rule node must be an object or array")]
    UnexpectedNode,

    /// A leaf object did not deserialize.
    #[error("invalid claims leaf: {0}")]
    InvalidLeaf(String),
}

/// One node of a claims rule tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimsTree {
    /// Leaf rule.
    Leaf(ClaimsLeaf),
    /// Named subtrees; `None` means "include".
    Branch(BTreeMap<String, Option<ClaimsTree>>),
    /// List of alternative subtrees.
    Array(Vec<ClaimsTree>),
}

impl ClaimsTree {
    /// Parses a tree from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns a [`ClaimsTreeError`] for scalar nodes and out-of-range
    /// `purpose` strings.
    pub fn from_value(value: &Value) -> Result<Self, ClaimsTreeError> {
        match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if item.is_null() {
                        out.push(Self::Leaf(ClaimsLeaf::default()));
                    } else {
                        out.push(Self::from_value(item)?);
                    }
                }
                Ok(Self::Array(out))
            }
            Value::Object(map) => {
                let is_leaf = ["value", "values", "essential", "purpose", "max_age"]
                    .iter()
                    .any(|k| map.contains_key(*k));
                if is_leaf {
                    let leaf: ClaimsLeaf = serde_json::from_value(value.clone())
                        .map_err(|e| ClaimsTreeError::InvalidLeaf(e.to_string()))?;
                    if let Some(purpose) = &leaf.purpose {
                        if purpose.len() > 300 || purpose.len() <= 3 {
                            return Err(ClaimsTreeError::PurposeLength);
                        }
                    }
                    Ok(Self::Leaf(leaf))
                } else {
                    let mut branch = BTreeMap::new();
                    for (k, v) in map {
                        let subtree = if v.is_null() {
                            None
                        } else {
                            Some(Self::from_value(v)?)
                        };
                        branch.insert(k.clone(), subtree);
                    }
                    Ok(Self::Branch(branch))
                }
            }
            _ => Err(ClaimsTreeError::UnexpectedNode),
        }
    }

    /// Serializes the tree back to a JSON value.
    ///
    /// Empty branches and arrays serialize to `null`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Leaf(leaf) => serde_json::to_value(leaf).unwrap_or(Value::Null),
            Self::Branch(branch) => {
                if branch.is_empty() {
                    return Value::Null;
                }
                let mut map = Map::new();
                for (k, v) in branch {
                    map.insert(
                        k.clone(),
                        v.as_ref().map_or(Value::Null, ClaimsTree::to_value),
                    );
                }
                Value::Object(map)
            }
            Self::Array(items) => {
                if items.is_empty() {
                    return Value::Null;
                }
                Value::Array(items.iter().map(ClaimsTree::to_value).collect())
            }
        }
    }

    /// Filters a source value through a rule.
    ///
    /// An absent rule passes the source through unchanged; an absent
    /// source yields nothing. Branch output contains only the keys that
    /// filtered to a non-null value; array rules match each element rule
    /// against each source element and keep the non-empty results.
    #[must_use]
    pub fn filter(rule: Option<&Self>, source: Option<&Value>) -> Option<Value> {
        let Some(rule) = rule else {
            return source.cloned();
        };
        let source = source?;
        match rule {
            Self::Array(items) => {
                let mut out = Vec::new();
                if let Value::Array(elements) = source {
                    for item in items {
                        for element in elements {
                            if let Some(v) = Self::filter(Some(item), Some(element)) {
                                out.push(v);
                            }
                        }
                    }
                } else {
                    for item in items {
                        if let Some(v) = Self::filter(Some(item), Some(source)) {
                            out.push(v);
                        }
                    }
                }
                if out.is_empty() {
                    None
                } else {
                    Some(Value::Array(out))
                }
            }
            Self::Branch(branch) => {
                let Value::Object(src) = source else {
                    return None;
                };
                let mut out = Map::new();
                for (k, sub) in branch {
                    if let Some(v) = Self::filter(sub.as_ref(), src.get(k)) {
                        out.insert(k.clone(), v);
                    }
                }
                if out.is_empty() {
                    None
                } else {
                    Some(Value::Object(out))
                }
            }
            Self::Leaf(leaf) => leaf.verify(Some(source)).0,
        }
    }

    /// Verifies a source value against a rule.
    ///
    /// Same traversal as [`ClaimsTree::filter`], but a failing subtree in a
    /// branch fails the whole branch; used for the `verification` part of
    /// verified claims, which must *validate*, not merely filter.
    #[must_use]
    pub fn verify(rule: Option<&Self>, source: Option<&Value>) -> (Option<Value>, bool) {
        let Some(rule) = rule else {
            return (source.cloned(), true);
        };
        let Some(source) = source else {
            return (None, false);
        };
        match rule {
            Self::Array(items) => {
                let mut out = Vec::new();
                if let Value::Array(elements) = source {
                    for item in items {
                        for element in elements {
                            let (v, ok) = Self::verify(Some(item), Some(element));
                            if ok {
                                if let Some(v) = v {
                                    out.push(v);
                                }
                            }
                        }
                    }
                } else {
                    for item in items {
                        let (v, ok) = Self::verify(Some(item), Some(source));
                        if ok {
                            if let Some(v) = v {
                                out.push(v);
                            }
                        }
                    }
                }
                if out.is_empty() {
                    (None, false)
                } else {
                    (Some(Value::Array(out)), true)
                }
            }
            Self::Branch(branch) => {
                let Value::Object(src) = source else {
                    return (None, false);
                };
                let mut out = Map::new();
                for (k, sub) in branch {
                    let (v, ok) = Self::verify(sub.as_ref(), src.get(k));
                    if !ok {
                        return (None, false);
                    }
                    if let Some(v) = v {
                        out.insert(k.clone(), v);
                    }
                }
                if out.is_empty() {
                    (None, false)
                } else {
                    (Some(Value::Object(out)), true)
                }
            }
            Self::Leaf(leaf) => leaf.verify(Some(source)),
        }
    }

    /// Unions another tree into this one.
    ///
    /// Arrays concatenate; branches union shallowly with the other side
    /// winning on key collision. Mixed shapes are left untouched.
    pub fn append(&mut self, other: Self) {
        match (self, other) {
            (Self::Array(items), Self::Array(other_items)) => items.extend(other_items),
            (Self::Branch(branch), Self::Branch(other_branch)) => {
                for (k, v) in other_branch {
                    branch.insert(k, v);
                }
            }
            _ => {}
        }
    }
}

impl Serialize for ClaimsTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ClaimsTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(DeError::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: Value) -> ClaimsTree {
        ClaimsTree::from_value(&v).unwrap()
    }

    #[test]
    fn leaf_detection() {
        assert!(matches!(
            parse(json!({"essential": true})),
            ClaimsTree::Leaf(_)
        ));
        assert!(matches!(
            parse(json!({"values": ["a"]})),
            ClaimsTree::Leaf(_)
        ));
        assert!(matches!(
            parse(json!({"email": null})),
            ClaimsTree::Branch(_)
        ));
        assert!(matches!(parse(json!([{ "essential": true }])), ClaimsTree::Array(_)));
    }

    #[test]
    fn purpose_length_is_validated() {
        assert!(ClaimsTree::from_value(&json!({"purpose": "abc"})).is_err());
        assert!(ClaimsTree::from_value(&json!({"purpose": "abcd"})).is_ok());
        let long = "x".repeat(301);
        assert!(ClaimsTree::from_value(&json!({ "purpose": long })).is_err());
    }

    #[test]
    fn filter_branch_keeps_matching_keys() {
        let tree = parse(json!({"email": {"essential": true}, "name": null}));
        let source = json!({"email": "a@b", "name": "X", "phone": "1"});
        let out = ClaimsTree::filter(Some(&tree), Some(&source)).unwrap();
        assert_eq!(out, json!({"email": "a@b", "name": "X"}));
    }

    #[test]
    fn filter_absent_rule_passes_through() {
        let source = json!({"anything": 1});
        assert_eq!(ClaimsTree::filter(None, Some(&source)), Some(source.clone()));
        assert_eq!(ClaimsTree::filter(Some(&parse(json!({"a": null}))), None), None);
    }

    #[test]
    fn verify_branch_fails_whole_branch() {
        let tree = parse(json!({"trust_framework": {"value": "de_aml"}}));
        let good = json!({"trust_framework": "de_aml"});
        let bad = json!({"trust_framework": "other"});
        assert!(ClaimsTree::verify(Some(&tree), Some(&good)).1);
        assert!(!ClaimsTree::verify(Some(&tree), Some(&bad)).1);
    }

    #[test]
    fn array_rules_match_cartesian() {
        let tree = parse(json!([{"type": {"value": "document"}}]));
        let source = json!([
            {"type": "document", "number": "123"},
            {"type": "utility_bill"}
        ]);
        let out = ClaimsTree::filter(Some(&tree), Some(&source)).unwrap();
        assert_eq!(out, json!([{"type": "document"}]));
    }

    #[test]
    fn append_branch_later_wins() {
        let mut a = parse(json!({"email": null, "name": null}));
        let b = parse(json!({"email": {"essential": true}, "acr": null}));
        a.append(b);
        if let ClaimsTree::Branch(branch) = &a {
            assert!(matches!(
                branch.get("email"),
                Some(Some(ClaimsTree::Leaf(_)))
            ));
            assert!(branch.contains_key("acr"));
            assert!(branch.contains_key("name"));
        } else {
            panic!("expected branch");
        }
    }

    #[test]
    fn filter_is_idempotent() {
        let tree = parse(json!({
            "email": {"essential": true},
            "acr": {"values": ["urn:mace:incommon:iap:silver"]},
            "name": null
        }));
        let source = json!({
            "email": "a@b",
            "acr": "urn:mace:incommon:iap:silver",
            "name": "X",
            "dropped": true
        });
        let once = ClaimsTree::filter(Some(&tree), Some(&source)).unwrap();
        let twice = ClaimsTree::filter(Some(&tree), Some(&once)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn serde_round_trip_is_semantically_stable() {
        let value = json!({
            "userinfo_like": {
                "email": null,
                "acr": {"essential": true, "values": ["silver", "gold"]}
            }
        });
        let tree = parse(value);
        let serialized = serde_json::to_string(&tree).unwrap();
        let reparsed: ClaimsTree = serde_json::from_str(&serialized).unwrap();
        assert_eq!(tree, reparsed);
    }
}
