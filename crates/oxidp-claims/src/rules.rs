//! Composition of claim rules from scopes, `acr_values` and the `claims`
//! request parameter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::leaf::ClaimsLeaf;
use crate::root::ClaimObjectRoot;
use crate::tree::ClaimsTree;

/// The complete claim rules of one authorization request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClaimRules {
    /// Rules applied at the userinfo endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo: Option<ClaimObjectRoot>,

    /// Rules applied when assembling the ID Token.
    #[serde(rename = "id_token", skip_serializing_if = "Option::is_none")]
    pub id_token: Option<ClaimObjectRoot>,
}

impl ClaimRules {
    /// Creates empty rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether neither target has any rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.userinfo.is_none() && self.id_token.is_none()
    }

    /// Unions another rule set into this one.
    ///
    /// The plain claims branches union shallowly at the top level with the
    /// appended side winning on key collision; for `verified_claims` the
    /// first rule set wins. Deep merging of nested objects is deliberately
    /// not performed.
    pub fn append(&mut self, other: Self) {
        append_root(&mut self.userinfo, other.userinfo);
        append_root(&mut self.id_token, other.id_token);
    }

    /// Applies the ID Token rules to the raw user claims.
    pub fn make_id_token_claims(&self, source: &Map<String, Value>, out: &mut Map<String, Value>) {
        if let Some(root) = &self.id_token {
            root.make_claims(source, out);
        }
    }

    /// Applies the userinfo rules to the raw user claims.
    pub fn make_userinfo_claims(&self, source: &Map<String, Value>, out: &mut Map<String, Value>) {
        if let Some(root) = &self.userinfo {
            root.make_claims(source, out);
        }
    }
}

fn append_root(target: &mut Option<ClaimObjectRoot>, other: Option<ClaimObjectRoot>) {
    let Some(other) = other else { return };
    let target = target.get_or_insert_with(ClaimObjectRoot::default);
    if target.verified_claims.is_none() {
        target.verified_claims = other.verified_claims;
    }
    if let Some(other_claims) = other.claims {
        match &mut target.claims {
            Some(claims) => claims.append(other_claims),
            None => target.claims = Some(other_claims),
        }
    }
}

/// Builds the default userinfo rules implied by the requested scopes
/// (OIDC Core §5.4).
#[must_use]
pub fn scope_default_rules(scopes: &[String]) -> ClaimRules {
    let mut rules = ClaimRules::new();
    for scope in scopes {
        let names: &[&str] = match scope.as_str() {
            "profile" => &[
                "name",
                "family_name",
                "given_name",
                "middle_name",
                "nickname",
                "preferred_username",
                "profile",
                "picture",
                "website",
                "gender",
                "birthdate",
                "zoneinfo",
                "locale",
                "updated_at",
            ],
            "email" => &["email", "email_verified"],
            "address" => &["address"],
            "phone" => &["phone_number", "phone_number_verified"],
            _ => continue,
        };
        let mut branch = BTreeMap::new();
        for name in names {
            branch.insert((*name).to_string(), None);
        }
        rules.append(ClaimRules {
            userinfo: Some(ClaimObjectRoot {
                verified_claims: None,
                claims: Some(ClaimsTree::Branch(branch)),
            }),
            id_token: None,
        });
    }
    rules
}

/// Builds the essential `acr` ID Token rule for the requested
/// `acr_values`.
#[must_use]
pub fn acr_claim_rules(acr_values: &[String]) -> ClaimRules {
    let values = acr_values
        .iter()
        .map(|v| Value::String(v.clone()))
        .collect();
    let mut branch = BTreeMap::new();
    branch.insert(
        "acr".to_string(),
        Some(ClaimsTree::Leaf(ClaimsLeaf {
            essential: Some(true),
            values: Some(values),
            ..ClaimsLeaf::default()
        })),
    );
    ClaimRules {
        userinfo: None,
        id_token: Some(ClaimObjectRoot {
            verified_claims: None,
            claims: Some(ClaimsTree::Branch(branch)),
        }),
    }
}
