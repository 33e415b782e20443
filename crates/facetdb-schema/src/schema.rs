use crate::{
    MAX_ENTITY_NAME_LEN, MAX_INDEXES,
    attribute::Attribute,
    error::SchemaValidationError,
    index::{Index, IndexType, PRIMARY_INDEX},
    naming,
    reference::{Reference, ReferenceKind},
    storage::StorageSchema,
};
use std::collections::{BTreeMap, BTreeSet};

///
/// SchemaResolver
///
/// Lookup of sibling schemas by entity name, used for reciprocal
/// relationship resolution. Implemented by the runtime's entity catalog.
///

pub trait SchemaResolver {
    fn resolve_schema(&self, entity: &str) -> Option<&Schema>;
}

///
/// SchemaOptions
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SchemaOptions {
    pub allow_remove: bool,
    pub allow_updates: bool,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            allow_remove: true,
            allow_updates: true,
        }
    }
}

///
/// SchemaParts
/// Unvalidated input to `Schema::new`.
///

#[derive(Clone, Debug, Default)]
pub struct SchemaParts {
    pub entity_name: String,
    pub service_name: String,
    pub schema_version: u32,
    pub attributes: BTreeMap<String, Attribute>,
    pub indexes: Vec<Index>,
    pub references: Vec<Reference>,
    pub options: SchemaOptions,
}

///
/// AttributeAccess
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttributeAccess {
    Get,
    Set,
}

///
/// AttributeAccessor
/// Entry of the per-schema `getX` / `setX` dispatch table.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttributeAccessor {
    pub attribute: String,
    pub access: AttributeAccess,
}

///
/// IndexAccessor
/// One key subset able to select rows through a secondary index.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexAccessor {
    pub index: String,
    pub keys: Vec<String>,
}

impl IndexAccessor {
    #[must_use]
    pub fn all_name(&self) -> String {
        naming::facet_accessor("allBy", &self.keys)
    }

    #[must_use]
    pub fn find_name(&self) -> String {
        naming::facet_accessor("findBy", &self.keys)
    }
}

///
/// Schema
///
/// Immutable, validated description of one entity type.
///

#[derive(Clone, Debug)]
pub struct Schema {
    entity_name: String,
    service_name: String,
    schema_version: u32,
    attributes: BTreeMap<String, Attribute>,
    indexes: Vec<Index>,
    references: Vec<Reference>,
    options: SchemaOptions,
    id_attribute: String,
    accessors: BTreeMap<String, AttributeAccessor>,
}

impl Schema {
    pub fn new(parts: SchemaParts) -> Result<Self, SchemaValidationError> {
        validate_parts(&parts)?;

        let SchemaParts {
            entity_name,
            service_name,
            schema_version,
            attributes,
            indexes,
            references,
            options,
        } = parts;

        let accessors = attribute_accessor_table(&attributes);
        let id_attribute = naming::id_attribute(&entity_name);

        Ok(Self {
            entity_name,
            service_name,
            schema_version,
            attributes,
            indexes,
            references,
            options,
            id_attribute,
            accessors,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[must_use]
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    #[must_use]
    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }

    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, Attribute> {
        &self.attributes
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    #[must_use]
    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    #[must_use]
    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name() == name)
    }

    #[must_use]
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    #[must_use]
    pub const fn options(&self) -> SchemaOptions {
        self.options
    }

    /// Name of the identifier attribute, e.g. `siteId`.
    #[must_use]
    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    #[must_use]
    pub fn primary_index(&self) -> &Index {
        // presence is checked in `Schema::new`
        self.indexes
            .iter()
            .find(|i| i.is_primary())
            .unwrap_or(&self.indexes[0])
    }

    /// Physical fields that hold composed keys rather than attributes.
    #[must_use]
    pub fn key_fields(&self) -> BTreeSet<&str> {
        self.indexes
            .iter()
            .flat_map(|i| [i.pk().field.as_str(), i.sk().field.as_str()])
            .collect()
    }

    /// The `belongs_to` reference pointing at `target`, if declared.
    #[must_use]
    pub fn belongs_to(&self, target: &str) -> Option<&Reference> {
        self.references
            .iter()
            .find(|r| r.kind() == ReferenceKind::BelongsTo && r.target() == target)
    }

    // ------------------------------------------------------------------
    // Accessor tables
    // ------------------------------------------------------------------

    /// Resolve a `getX` / `setX` accessor name to its attribute.
    #[must_use]
    pub fn attribute_accessor(&self, accessor: &str) -> Option<&AttributeAccessor> {
        self.accessors.get(accessor)
    }

    pub fn attribute_accessors(&self) -> impl Iterator<Item = (&str, &AttributeAccessor)> {
        self.accessors.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// For every non-primary index, the minimal key subsets that can
    /// select it. Duplicate key lists keep the first declaring index.
    #[must_use]
    pub fn index_accessors(&self) -> Vec<IndexAccessor> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();

        for index in self.indexes.iter().filter(|i| !i.is_primary()) {
            for keys in index.selectable_key_sets() {
                if seen.insert(keys.clone()) {
                    out.push(IndexAccessor {
                        index: index.name().to_string(),
                        keys,
                    });
                }
            }
        }

        out
    }

    // ------------------------------------------------------------------
    // Index routing
    // ------------------------------------------------------------------

    #[must_use]
    pub fn find_index_by_type(&self, index_type: IndexType) -> Option<&Index> {
        self.indexes.iter().find(|i| i.index_type() == index_type)
    }

    /// Query router. Picks, in order:
    /// 1. an index whose sort-key facet set equals `keys` and whose
    ///    partition key `keys` can compose,
    /// 2. an index with a selectable key subset equal to `keys`,
    /// 3. the `all` index when `keys` is empty,
    /// 4. `primary`.
    #[must_use]
    pub fn find_index_name_by_keys(&self, keys: &[&str]) -> &str {
        let key_set: BTreeSet<&str> = keys.iter().copied().collect();

        if key_set.is_empty() {
            return self
                .find_index_by_type(IndexType::All)
                .map_or(PRIMARY_INDEX, Index::name);
        }

        let by_sort_facets = self
            .indexes
            .iter()
            .find(|i| i.sort_facets_equal(&key_set) && i.partition_supplied(&key_set));
        if let Some(index) = by_sort_facets {
            return index.name();
        }

        let selects = |index: &&Index| {
            index.selectable_key_sets().iter().any(|set| {
                set.len() == key_set.len() && set.iter().all(|k| key_set.contains(k.as_str()))
            })
        };
        if let Some(index) = self.indexes.iter().find(selects) {
            return index.name();
        }

        PRIMARY_INDEX
    }

    // ------------------------------------------------------------------
    // Relationships
    // ------------------------------------------------------------------

    /// The inverse of `reference` declared on its target schema, if any.
    #[must_use]
    pub fn get_reciprocal_reference<'r>(
        &self,
        resolver: &'r dyn SchemaResolver,
        reference: &Reference,
    ) -> Option<&'r Reference> {
        let target = resolver.resolve_schema(reference.target())?;

        target.references().iter().find(|candidate| {
            candidate.target() == self.entity_name
                && reference.kind().is_reciprocal_of(candidate.kind())
        })
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    #[must_use]
    pub fn to_storage_schema(&self) -> StorageSchema {
        StorageSchema::from_schema(self)
    }
}

// attribute_accessor_table
// getX for every attribute, setX for every writable one
fn attribute_accessor_table(
    attributes: &BTreeMap<String, Attribute>,
) -> BTreeMap<String, AttributeAccessor> {
    let mut table = BTreeMap::new();

    for (name, attr) in attributes {
        table.insert(
            naming::attribute_accessor("get", name),
            AttributeAccessor {
                attribute: name.clone(),
                access: AttributeAccess::Get,
            },
        );

        if !attr.is_read_only() {
            table.insert(
                naming::attribute_accessor("set", name),
                AttributeAccessor {
                    attribute: name.clone(),
                    access: AttributeAccess::Set,
                },
            );
        }
    }

    table
}

fn validate_entity_name(name: &str) -> Result<(), SchemaValidationError> {
    let reason = if name.is_empty() {
        Some("entity name is empty".to_string())
    } else if name.len() > MAX_ENTITY_NAME_LEN {
        Some(format!("exceeds max length {MAX_ENTITY_NAME_LEN}"))
    } else if !name.is_ascii() {
        Some("must be ASCII".to_string())
    } else {
        None
    };

    match reason {
        Some(reason) => Err(SchemaValidationError::InvalidEntityName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

#[allow(clippy::too_many_lines)]
fn validate_parts(parts: &SchemaParts) -> Result<(), SchemaValidationError> {
    let entity = parts.entity_name.as_str();
    validate_entity_name(entity)?;

    if parts.service_name.trim().is_empty() {
        return Err(SchemaValidationError::MissingServiceName {
            entity: entity.to_string(),
        });
    }
    if parts.schema_version == 0 {
        return Err(SchemaValidationError::InvalidSchemaVersion {
            entity: entity.to_string(),
            version: parts.schema_version,
        });
    }
    if parts.attributes.is_empty() {
        return Err(SchemaValidationError::MissingAttributes {
            entity: entity.to_string(),
        });
    }
    if parts.indexes.is_empty() {
        return Err(SchemaValidationError::MissingIndexes {
            entity: entity.to_string(),
        });
    }

    let id_attribute = naming::id_attribute(entity);
    if !parts.attributes.contains_key(&id_attribute) {
        return Err(SchemaValidationError::MissingIdAttribute {
            entity: entity.to_string(),
            attribute: id_attribute,
        });
    }

    // indexes
    let primaries = parts.indexes.iter().filter(|i| i.is_primary()).count();
    match primaries {
        0 => {
            return Err(SchemaValidationError::MissingPrimaryIndex {
                entity: entity.to_string(),
            });
        }
        1 => {}
        count => {
            return Err(SchemaValidationError::MultiplePrimaryIndexes {
                entity: entity.to_string(),
                count,
            });
        }
    }
    if parts.indexes.len() > MAX_INDEXES {
        return Err(SchemaValidationError::TooManyIndexes {
            entity: entity.to_string(),
            count: parts.indexes.len(),
            max: MAX_INDEXES,
        });
    }

    let mut names = BTreeSet::new();
    for index in &parts.indexes {
        if !names.insert(index.name()) {
            return Err(SchemaValidationError::DuplicateIndex {
                entity: entity.to_string(),
                index: index.name().to_string(),
            });
        }
        for facet in index.facets() {
            if !parts.attributes.contains_key(facet) {
                return Err(SchemaValidationError::MissingAttributeForFacet {
                    entity: entity.to_string(),
                    index: index.name().to_string(),
                    attribute: facet.to_string(),
                });
            }
        }
    }

    // attribute defaults must satisfy their own attribute
    for (name, attr) in &parts.attributes {
        if let Some(crate::attribute::AttributeDefault::Value(value)) = attr.default_rule()
            && attr.check(value).is_err()
        {
            return Err(SchemaValidationError::InvalidAttributeDefault {
                entity: entity.to_string(),
                attribute: name.clone(),
                reason: format!("default does not satisfy attribute of type {}", attr.kind()),
            });
        }
    }

    // belongs_to references imply a foreign key attribute and index
    for reference in &parts.references {
        if reference.kind() != ReferenceKind::BelongsTo {
            continue;
        }

        let fk = naming::foreign_key(reference.target());
        if !parts.attributes.contains_key(&fk) {
            return Err(SchemaValidationError::MissingForeignKeyAttribute {
                entity: entity.to_string(),
                target: reference.target().to_string(),
                attribute: fk,
            });
        }

        let indexed = parts
            .indexes
            .iter()
            .any(|i| !i.is_primary() && i.pk().facets.first() == Some(&fk));
        if !indexed {
            return Err(SchemaValidationError::MissingForeignKeyIndex {
                entity: entity.to_string(),
                target: reference.target().to_string(),
                attribute: fk,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::{ALL_INDEX, IndexKey},
        reference::ReferenceOptions,
        test_support,
    };

    fn base_parts() -> SchemaParts {
        let attributes = BTreeMap::from([
            ("widgetId".to_string(), Attribute::uuid().read_only()),
            ("name".to_string(), Attribute::string().required()),
            ("ownerId".to_string(), Attribute::uuid()),
            ("status".to_string(), Attribute::string()),
        ]);

        SchemaParts {
            entity_name: "Widget".into(),
            service_name: "Catalog".into(),
            schema_version: 1,
            attributes,
            indexes: vec![Index::primary(vec!["widgetId".into()], vec![])],
            references: vec![],
            options: SchemaOptions::default(),
        }
    }

    fn with_index(mut parts: SchemaParts, index: Index) -> SchemaParts {
        parts.indexes.push(index);
        parts
    }

    #[test]
    fn valid_parts_round_trip_through_accessors() {
        let schema = Schema::new(base_parts()).expect("valid schema should build");

        assert_eq!(schema.entity_name(), "Widget");
        assert_eq!(schema.service_name(), "Catalog");
        assert_eq!(schema.schema_version(), 1);
        assert_eq!(schema.attributes().len(), 4);
        assert_eq!(schema.indexes().len(), 1);
        assert!(schema.references().is_empty());
        assert_eq!(schema.options(), SchemaOptions::default());
        assert_eq!(schema.id_attribute(), "widgetId");
    }

    #[test]
    fn missing_fields_fail_with_specific_errors() {
        let mut parts = base_parts();
        parts.service_name = String::new();
        assert!(matches!(
            Schema::new(parts),
            Err(SchemaValidationError::MissingServiceName { .. })
        ));

        let mut parts = base_parts();
        parts.schema_version = 0;
        assert!(matches!(
            Schema::new(parts),
            Err(SchemaValidationError::InvalidSchemaVersion { version: 0, .. })
        ));

        let mut parts = base_parts();
        parts.attributes.clear();
        assert!(matches!(
            Schema::new(parts),
            Err(SchemaValidationError::MissingAttributes { .. })
        ));

        let mut parts = base_parts();
        parts.indexes.clear();
        assert!(matches!(
            Schema::new(parts),
            Err(SchemaValidationError::MissingIndexes { .. })
        ));

        let mut parts = base_parts();
        parts.entity_name = String::new();
        assert!(matches!(
            Schema::new(parts),
            Err(SchemaValidationError::InvalidEntityName { .. })
        ));
    }

    #[test]
    fn index_facets_must_name_attributes() {
        let parts = with_index(
            base_parts(),
            Index::secondary(
                "gsi1",
                IndexType::Other,
                IndexKey::new("gsi1pk", ["color"]),
                IndexKey::new("gsi1sk", Vec::<String>::new()),
                "catalog-gsi1pk-gsi1sk",
            ),
        );

        let err = Schema::new(parts).expect_err("unknown facet should fail");
        assert_eq!(
            err,
            SchemaValidationError::MissingAttributeForFacet {
                entity: "Widget".into(),
                index: "gsi1".into(),
                attribute: "color".into(),
            }
        );
    }

    #[test]
    fn belongs_to_requires_foreign_key_index() {
        let mut parts = base_parts();
        parts.references.push(
            Reference::parse("belongs_to", "Owner", vec![], Default::default())
                .expect("reference should parse"),
        );

        let err = Schema::new(parts).expect_err("missing fk index should fail");
        assert!(matches!(
            err,
            SchemaValidationError::MissingForeignKeyIndex { ref attribute, .. }
                if attribute == "ownerId"
        ));
    }

    #[test]
    fn router_picks_servable_indexes_then_falls_back_to_primary() {
        let parts = with_index(
            base_parts(),
            Index::secondary(
                "byOwner",
                IndexType::Other,
                IndexKey::new("gsi1pk", ["status"]),
                IndexKey::new("gsi1sk", ["ownerId"]),
                "catalog-gsi1pk-gsi1sk",
            ),
        );
        let schema = Schema::new(parts).expect("schema should build");

        assert_eq!(schema.find_index_name_by_keys(&["status"]), "byOwner");
        assert_eq!(schema.find_index_name_by_keys(&["ownerId", "status"]), "byOwner");
        assert_eq!(
            schema.find_index_name_by_keys(&["ownerId"]),
            PRIMARY_INDEX,
            "sort facets alone cannot compose the partition key"
        );
        assert_eq!(schema.find_index_name_by_keys(&["name"]), PRIMARY_INDEX);

        let plain = Schema::new(base_parts()).expect("schema should build");
        assert_eq!(plain.find_index_name_by_keys(&["ownerId"]), PRIMARY_INDEX);
        assert_eq!(plain.find_index_name_by_keys(&[]), PRIMARY_INDEX);
    }

    #[test]
    fn router_uses_all_index_for_empty_keys() {
        let parts = with_index(
            base_parts(),
            Index::secondary(
                ALL_INDEX,
                IndexType::All,
                IndexKey::new("gsi1pk", Vec::<String>::new()).with_template("ALL_WIDGET"),
                IndexKey::new("gsi1sk", ["name"]),
                "catalog-gsi1pk-gsi1sk",
            ),
        );
        let schema = Schema::new(parts).expect("schema should build");

        assert_eq!(schema.find_index_name_by_keys(&[]), ALL_INDEX);
        assert_eq!(
            schema
                .find_index_by_type(IndexType::All)
                .map(Index::name),
            Some(ALL_INDEX)
        );
        assert!(schema.find_index_by_type(IndexType::BelongsTo).is_none());
    }

    #[test]
    fn router_skips_sort_facet_matches_missing_their_partition() {
        let parts = with_index(
            base_parts(),
            Index::secondary(
                "belongsToOwner",
                IndexType::BelongsTo,
                IndexKey::new("gsi1pk", ["ownerId"]),
                IndexKey::new("gsi1sk", ["name"]),
                "catalog-gsi1pk-gsi1sk",
            ),
        );
        let parts = with_index(
            parts,
            Index::secondary(
                ALL_INDEX,
                IndexType::All,
                IndexKey::new("gsi2pk", Vec::<String>::new()).with_template("ALL_WIDGET"),
                IndexKey::new("gsi2sk", ["name"]),
                "catalog-gsi2pk-gsi2sk",
            ),
        );
        let schema = Schema::new(parts).expect("schema should build");

        assert_eq!(schema.find_index_name_by_keys(&["name"]), ALL_INDEX);
        assert_eq!(schema.find_index_name_by_keys(&["ownerId"]), "belongsToOwner");
        assert_eq!(schema.find_index_name_by_keys(&["ownerId", "name"]), "belongsToOwner");
    }

    #[test]
    fn reciprocal_reference_needs_the_inverse_kind_on_the_target() {
        let catalog = test_support::catalog();
        let organization = catalog
            .resolve_schema("Organization")
            .expect("organization should resolve");
        let site = catalog.resolve_schema("Site").expect("site should resolve");

        let sites = test_support::reference_to(organization, "Site");
        let inverse = organization
            .get_reciprocal_reference(&catalog, sites)
            .expect("site declares belongs_to Organization");
        assert_eq!(inverse.kind(), ReferenceKind::BelongsTo);
        assert_eq!(inverse.target(), "Organization");

        let parent = test_support::reference_to(site, "Organization");
        let inverse = site
            .get_reciprocal_reference(&catalog, parent)
            .expect("organization declares has_many Site");
        assert_eq!(inverse.kind(), ReferenceKind::HasMany);

        let profile = test_support::reference_to(organization, "Profile");
        assert!(
            organization
                .get_reciprocal_reference(&catalog, profile)
                .is_none(),
            "profile declares no reference back"
        );

        let ghost = Reference::new(
            ReferenceKind::HasMany,
            "Ghost",
            vec![],
            ReferenceOptions::default(),
        )
        .expect("reference should build");
        assert!(organization.get_reciprocal_reference(&catalog, &ghost).is_none());
    }

    #[test]
    fn accessor_table_skips_setters_for_read_only_attributes() {
        let schema = Schema::new(base_parts()).expect("schema should build");

        assert_eq!(
            schema.attribute_accessor("getName").map(|a| a.access),
            Some(AttributeAccess::Get)
        );
        assert!(schema.attribute_accessor("setName").is_some());
        assert!(schema.attribute_accessor("getWidgetId").is_some());
        assert!(
            schema.attribute_accessor("setWidgetId").is_none(),
            "read-only identifier must not get a setter"
        );
    }
}
