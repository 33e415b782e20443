use crate::{error::ReferenceError, naming, schema::SchemaResolver};
use derive_more::Display;
use serde::Serialize;
use std::str::FromStr;

///
/// ReferenceKind
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    #[display("belongs_to")]
    BelongsTo,
    #[display("has_one")]
    HasOne,
    #[display("has_many")]
    HasMany,
}

impl ReferenceKind {
    /// Whether `other`, declared on the target entity, is the inverse of
    /// this kind.
    #[must_use]
    pub const fn is_reciprocal_of(self, other: Self) -> bool {
        match self {
            Self::BelongsTo => matches!(other, Self::HasOne | Self::HasMany),
            Self::HasOne | Self::HasMany => matches!(other, Self::BelongsTo),
        }
    }
}

impl FromStr for ReferenceKind {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "belongs_to" => Ok(Self::BelongsTo),
            "has_one" => Ok(Self::HasOne),
            "has_many" => Ok(Self::HasMany),
            other => Err(ReferenceError::InvalidType(other.to_string())),
        }
    }
}

///
/// ReferenceOptions
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReferenceOptions {
    /// For `belongs_to`: whether the foreign key attribute is required.
    pub required: bool,
    /// For `has_one` / `has_many`: remove children when the owner is removed.
    pub remove_dependents: bool,
}

impl Default for ReferenceOptions {
    fn default() -> Self {
        Self {
            required: true,
            remove_dependents: false,
        }
    }
}

///
/// Reference
/// One relationship edge declared on an entity schema.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reference {
    kind: ReferenceKind,
    target: String,
    sort_keys: Vec<String>,
    options: ReferenceOptions,
}

impl Reference {
    pub fn new(
        kind: ReferenceKind,
        target: impl Into<String>,
        sort_keys: Vec<String>,
        options: ReferenceOptions,
    ) -> Result<Self, ReferenceError> {
        let target = target.into();

        if target.trim().is_empty() {
            return Err(ReferenceError::EmptyTarget);
        }
        if sort_keys.iter().any(|k| k.trim().is_empty()) {
            return Err(ReferenceError::BlankSortKey { target });
        }

        Ok(Self {
            kind,
            target,
            sort_keys,
            options,
        })
    }

    /// Construct from a textual kind (`belongs_to`, `has_one`, `has_many`).
    pub fn parse(
        kind: &str,
        target: impl Into<String>,
        sort_keys: Vec<String>,
        options: ReferenceOptions,
    ) -> Result<Self, ReferenceError> {
        Self::new(kind.parse()?, target, sort_keys, options)
    }

    #[must_use]
    pub const fn kind(&self) -> ReferenceKind {
        self.kind
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn sort_keys(&self) -> &[String] {
        &self.sort_keys
    }

    #[must_use]
    pub const fn options(&self) -> ReferenceOptions {
        self.options
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.options.required
    }

    #[must_use]
    pub const fn removes_dependents(&self) -> bool {
        self.options.remove_dependents
    }

    /// Record-side accessor name: `getOrganization`, `getSites`.
    #[must_use]
    pub fn accessor_name(&self) -> String {
        let target = naming::pascal(&self.target);

        match self.kind {
            ReferenceKind::HasMany => format!("get{}", naming::pluralize(&target)),
            ReferenceKind::BelongsTo | ReferenceKind::HasOne => format!("get{target}"),
        }
    }

    /// Derive the navigation accessors this reference contributes to
    /// records of `owner`.
    ///
    /// A missing reciprocal reference is logged and tolerated; the edge is
    /// then navigable in this direction only.
    pub fn to_accessor_configs(
        &self,
        resolver: &dyn SchemaResolver,
        owner: &str,
    ) -> Result<Vec<AccessorConfig>, ReferenceError> {
        let owner_schema = resolver
            .resolve_schema(owner)
            .ok_or_else(|| ReferenceError::UnknownOwner {
                owner: owner.to_string(),
                target: self.target.clone(),
            })?;

        if owner_schema
            .get_reciprocal_reference(resolver, self)
            .is_none()
        {
            tracing::warn!(
                target: "facetdb::reference",
                owner,
                reference_target = %self.target,
                kind = %self.kind,
                "reciprocal reference not found; relationship is one-directional"
            );
        }

        if self.sort_keys.is_empty() {
            tracing::debug!(
                target: "facetdb::reference",
                owner,
                reference_target = %self.target,
                "no sort keys defined for relationship"
            );
        }

        let config = match self.kind {
            ReferenceKind::BelongsTo => AccessorConfig {
                name: self.accessor_name(),
                kind: AccessorKind::ById,
                target: self.target.clone(),
                foreign_key: naming::foreign_key(&self.target),
                value_from: ForeignKeySource::Attribute(naming::foreign_key(&self.target)),
            },
            ReferenceKind::HasOne => AccessorConfig {
                name: self.accessor_name(),
                kind: AccessorKind::FindOne,
                target: self.target.clone(),
                foreign_key: naming::foreign_key(owner),
                value_from: ForeignKeySource::OwnId,
            },
            ReferenceKind::HasMany => AccessorConfig {
                name: self.accessor_name(),
                kind: AccessorKind::ListAll,
                target: self.target.clone(),
                foreign_key: naming::foreign_key(owner),
                value_from: ForeignKeySource::OwnId,
            },
        };

        Ok(vec![config])
    }
}

///
/// AccessorKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessorKind {
    /// Point lookup of the target by identifier.
    ById,
    /// First target row whose foreign key matches.
    FindOne,
    /// Every target row whose foreign key matches.
    ListAll,
}

///
/// ForeignKeySource
/// Where the runtime reads the lookup value from on the owning record.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ForeignKeySource {
    Attribute(String),
    OwnId,
}

///
/// AccessorConfig
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccessorConfig {
    pub name: String,
    pub kind: AccessorKind,
    pub target: String,
    /// Attribute filtered on: the target's id for `ById`, the child's
    /// foreign key otherwise.
    pub foreign_key: String,
    pub value_from: ForeignKeySource,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{catalog, reference_to};

    #[test]
    fn parse_rejects_unknown_kinds() {
        let err = Reference::parse("many_to_many", "Site", vec![], ReferenceOptions::default())
            .expect_err("unknown kind should fail");

        assert_eq!(err, ReferenceError::InvalidType("many_to_many".into()));
    }

    #[test]
    fn empty_target_is_rejected() {
        let err = Reference::new(
            ReferenceKind::HasMany,
            "  ",
            vec![],
            ReferenceOptions::default(),
        )
        .expect_err("blank target should fail");

        assert_eq!(err, ReferenceError::EmptyTarget);
    }

    #[test]
    fn accessor_names_follow_cardinality() {
        let many = Reference::parse("has_many", "Opportunity", vec![], ReferenceOptions::default())
            .expect("has_many should parse");
        let parent = Reference::parse(
            "belongs_to",
            "Organization",
            vec![],
            ReferenceOptions::default(),
        )
        .expect("belongs_to should parse");

        assert_eq!(many.accessor_name(), "getOpportunities");
        assert_eq!(parent.accessor_name(), "getOrganization");
    }

    #[test]
    fn reciprocity_pairs_parent_and_child_kinds() {
        assert!(ReferenceKind::BelongsTo.is_reciprocal_of(ReferenceKind::HasMany));
        assert!(ReferenceKind::HasOne.is_reciprocal_of(ReferenceKind::BelongsTo));
        assert!(!ReferenceKind::HasMany.is_reciprocal_of(ReferenceKind::HasOne));
    }

    #[test]
    fn accessor_configs_follow_reference_kind() {
        let catalog = catalog();
        let organization = catalog
            .resolve_schema("Organization")
            .expect("organization should resolve");
        let site = catalog.resolve_schema("Site").expect("site should resolve");

        let parent = reference_to(site, "Organization")
            .to_accessor_configs(&catalog, "Site")
            .expect("belongs_to should derive");
        assert_eq!(
            parent,
            vec![AccessorConfig {
                name: "getOrganization".into(),
                kind: AccessorKind::ById,
                target: "Organization".into(),
                foreign_key: "organizationId".into(),
                value_from: ForeignKeySource::Attribute("organizationId".into()),
            }]
        );

        let children = reference_to(organization, "Site")
            .to_accessor_configs(&catalog, "Organization")
            .expect("has_many should derive");
        assert_eq!(
            children,
            vec![AccessorConfig {
                name: "getSites".into(),
                kind: AccessorKind::ListAll,
                target: "Site".into(),
                foreign_key: "organizationId".into(),
                value_from: ForeignKeySource::OwnId,
            }]
        );

        // the profile never points back; the accessor is still derived
        let profile = reference_to(organization, "Profile")
            .to_accessor_configs(&catalog, "Organization")
            .expect("has_one should derive without a reciprocal");
        assert_eq!(
            profile,
            vec![AccessorConfig {
                name: "getProfile".into(),
                kind: AccessorKind::FindOne,
                target: "Profile".into(),
                foreign_key: "organizationId".into(),
                value_from: ForeignKeySource::OwnId,
            }]
        );
    }

    #[test]
    fn accessor_configs_need_a_registered_owner() {
        let catalog = catalog();
        let site = catalog.resolve_schema("Site").expect("site should resolve");

        let err = reference_to(site, "Organization")
            .to_accessor_configs(&catalog, "Audit")
            .expect_err("unregistered owner should fail");
        assert_eq!(
            err,
            ReferenceError::UnknownOwner {
                owner: "Audit".into(),
                target: "Organization".into(),
            }
        );
    }
}
