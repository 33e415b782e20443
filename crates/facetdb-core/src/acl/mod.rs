//! Path-based authorization.
//!
//! A record's resource path is derived from its position in the
//! relationship graph (`/<parent>/<parent-id>/<entity>/<id>`) and checked
//! against the caller's rules before any read, write or delete proceeds.

mod matcher;

pub use matcher::{path_matches, segments, specificity};

use crate::error::PermissionError;
use derive_more::Display;
use facetdb_schema::{naming, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

///
/// Action
///

#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum Action {
    #[display("C")]
    #[serde(rename = "C")]
    Create,
    #[display("R")]
    #[serde(rename = "R")]
    Read,
    #[display("U")]
    #[serde(rename = "U")]
    Update,
    #[display("D")]
    #[serde(rename = "D")]
    Delete,
}

///
/// AclRule
///
/// Grants `actions` on every path matched by `path`. `role` labels the
/// grant for diagnostics.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AclRule {
    pub role: String,
    pub path: String,
    #[serde(default)]
    pub actions: BTreeSet<Action>,
}

impl AclRule {
    pub fn new<I>(role: impl Into<String>, path: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = Action>,
    {
        Self {
            role: role.into(),
            path: path.into(),
            actions: actions.into_iter().collect(),
        }
    }
}

///
/// AclContext
///
/// The caller's rules plus the entities exempt from enforcement. Fixed
/// for the lifetime of one registry.
///
/// When several rules match a path the most specific one decides; ties go
/// to the rule declared first. A rule with no actions therefore carves a
/// denial out of a broader grant.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AclContext {
    #[serde(default)]
    pub rules: Vec<AclRule>,
    #[serde(default)]
    pub excluded_entities: BTreeSet<String>,
    #[serde(default = "enforce_default")]
    pub enforce: bool,
}

const fn enforce_default() -> bool {
    true
}

impl AclContext {
    #[must_use]
    pub fn new(rules: Vec<AclRule>) -> Self {
        Self {
            rules,
            excluded_entities: BTreeSet::new(),
            enforce: true,
        }
    }

    /// Unrestricted context for trusted system callers.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            rules: Vec::new(),
            excluded_entities: BTreeSet::new(),
            enforce: false,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn with_excluded_entity(mut self, entity: impl Into<String>) -> Self {
        self.excluded_entities.insert(entity.into());
        self
    }

    #[must_use]
    pub fn is_enforced_for(&self, entity: &str) -> bool {
        self.enforce && !self.excluded_entities.contains(entity)
    }

    /// The rule that decides `path`, if any matches.
    #[must_use]
    pub fn deciding_rule(&self, path: &str) -> Option<&AclRule> {
        let mut best: Option<(&AclRule, (usize, usize))> = None;

        for rule in self.rules.iter().filter(|r| path_matches(&r.path, path)) {
            let rank = specificity(&rule.path);
            if best.is_none_or(|(_, current)| rank > current) {
                best = Some((rule, rank));
            }
        }

        best.map(|(rule, _)| rule)
    }

    #[must_use]
    pub fn allows(&self, path: &str, action: Action) -> bool {
        self.deciding_rule(path)
            .is_some_and(|rule| rule.actions.contains(&action))
    }

    /// Enforce `action` on `path` for records of `entity`.
    pub fn check(&self, entity: &str, path: &str, action: Action) -> Result<(), PermissionError> {
        if !self.is_enforced_for(entity) || self.allows(path, action) {
            return Ok(());
        }

        tracing::warn!(
            target: "facetdb::acl",
            entity,
            path,
            action = %action,
            role = self.deciding_rule(path).map(|r| r.role.as_str()),
            "permission denied"
        );

        Err(PermissionError {
            action,
            path: path.to_string(),
        })
    }
}

impl Default for AclContext {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

///
/// Resource paths
///

/// Resource path of a record: nested under the first `belongs_to` parent
/// whose foreign key is set, otherwise rooted at the entity.
#[must_use]
pub fn resource_path(schema: &Schema, attributes: &Map<String, Value>) -> String {
    let entity = naming::path_segment(schema.entity_name());
    let id = attributes
        .get(schema.id_attribute())
        .and_then(path_value);

    let parent = schema
        .references()
        .iter()
        .filter(|r| r.kind() == ReferenceKind::BelongsTo)
        .find_map(|r| {
            attributes
                .get(&naming::foreign_key(r.target()))
                .and_then(path_value)
                .map(|fk| (naming::path_segment(r.target()), fk))
        });

    let mut path = String::new();
    if let Some((segment, fk)) = parent {
        path.push_str(&format!("/{segment}/{fk}"));
    }
    path.push('/');
    path.push_str(&entity);
    if let Some(id) = id {
        path.push('/');
        path.push_str(&id);
    }

    path
}

fn path_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
