use crate::{
    MAX_SECONDARY_INDEXES,
    attribute::Attribute,
    error::{Error, SchemaBuilderError},
    index::{ALL_INDEX, Index, IndexKey, IndexType},
    naming,
    reference::{Reference, ReferenceKind, ReferenceOptions},
    schema::{Schema, SchemaOptions, SchemaParts},
};
use std::collections::BTreeMap;

/// Creation timestamp attribute seeded on every entity.
pub const CREATED_AT: &str = "createdAt";

/// Update timestamp attribute seeded on every entity.
pub const UPDATED_AT: &str = "updatedAt";

///
/// SchemaBuilder
///
/// Fluent construction of a `Schema`. Every entity starts with an
/// identifier (`<entity>Id`), `createdAt` and `updatedAt`; the primary
/// index is keyed by the identifier until overridden.
///
/// Secondary indexes are numbered in declaration order, so identical call
/// sequences always produce identical store index names.
///

#[derive(Debug)]
pub struct SchemaBuilder {
    entity_name: String,
    service_name: String,
    schema_version: u32,
    attributes: BTreeMap<String, Attribute>,
    primary_pk: Vec<String>,
    primary_sk: Vec<String>,
    secondary: Vec<Index>,
    references: Vec<Reference>,
    options: SchemaOptions,
}

impl SchemaBuilder {
    pub fn new(
        entity_name: impl Into<String>,
        service_name: impl Into<String>,
        schema_version: u32,
    ) -> Result<Self, Error> {
        let entity_name = entity_name.into();
        let service_name = service_name.into();

        if entity_name.trim().is_empty() {
            return Err(SchemaBuilderError::EmptyEntityName.into());
        }
        if service_name.trim().is_empty() {
            return Err(SchemaBuilderError::EmptyServiceName {
                entity: entity_name,
            }
            .into());
        }
        if schema_version == 0 {
            return Err(SchemaBuilderError::InvalidSchemaVersion {
                entity: entity_name,
            }
            .into());
        }

        let id = naming::id_attribute(&entity_name);
        let attributes = BTreeMap::from([
            (
                id.clone(),
                Attribute::uuid().required().read_only().default_uuid(),
            ),
            (
                CREATED_AT.to_string(),
                Attribute::string().read_only().default_timestamp(),
            ),
            (
                UPDATED_AT.to_string(),
                Attribute::string()
                    .read_only()
                    .default_timestamp()
                    .watch_all(),
            ),
        ]);

        Ok(Self {
            entity_name,
            service_name,
            schema_version,
            attributes,
            primary_pk: vec![id],
            primary_sk: Vec::new(),
            secondary: Vec::new(),
            references: Vec::new(),
            options: SchemaOptions::default(),
        })
    }

    // ------------------------------------------------------------------
    // Primary index
    // ------------------------------------------------------------------

    pub fn with_primary_partition_keys<I, S>(mut self, keys: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_pk = self.key_list(keys, "primary partition keys")?;

        Ok(self)
    }

    pub fn with_primary_sort_keys<I, S>(mut self, keys: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_sk = self.key_list(keys, "primary sort keys")?;

        Ok(self)
    }

    // ------------------------------------------------------------------
    // Options
    // ------------------------------------------------------------------

    #[must_use]
    pub fn with_options(mut self, options: SchemaOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn allow_remove(mut self, allow: bool) -> Self {
        self.options.allow_remove = allow;
        self
    }

    #[must_use]
    pub fn allow_updates(mut self, allow: bool) -> Self {
        self.options.allow_updates = allow;
        self
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    pub fn add_attribute(
        mut self,
        name: impl Into<String>,
        attribute: Attribute,
    ) -> Result<Self, Error> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(SchemaBuilderError::EmptyAttributeName {
                entity: self.entity_name,
            }
            .into());
        }
        if self.attributes.contains_key(&name) {
            return Err(SchemaBuilderError::DuplicateAttribute {
                entity: self.entity_name,
                attribute: name,
            }
            .into());
        }

        self.attributes.insert(name, attribute);

        Ok(self)
    }

    // ------------------------------------------------------------------
    // Secondary indexes
    // ------------------------------------------------------------------

    /// Full-listing index partitioned by the constant `ALL_<ENTITY>`.
    pub fn add_all_index<I, S>(mut self, sort_keys: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sort_keys = self.key_list(sort_keys, "all index sort keys")?;
        let template = format!("ALL_{}", naming::upper_snake(&self.entity_name));

        self.push_secondary(
            ALL_INDEX.to_string(),
            IndexType::All,
            Vec::new(),
            Some(template),
            sort_keys,
        );

        Ok(self)
    }

    pub fn add_index<I, S, J, T>(mut self, partition_keys: I, sort_keys: J) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let pk = self.key_list(partition_keys, "index partition keys")?;
        let sk: Vec<String> = sort_keys.into_iter().map(Into::into).collect();
        let name = format!("gsi{}", self.secondary.len() + 1);

        self.push_secondary(name, IndexType::Other, pk, None, sk);

        Ok(self)
    }

    // ------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------

    /// Declare a relationship. `belongs_to` also adds the `<target>Id`
    /// foreign key attribute and a secondary index keyed by it; `has_one`
    /// and `has_many` live on the child's `belongs_to` side.
    pub fn add_reference<I, S>(
        mut self,
        kind: ReferenceKind,
        target: impl Into<String>,
        sort_keys: I,
        options: ReferenceOptions,
    ) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sort_keys: Vec<String> = sort_keys.into_iter().map(Into::into).collect();
        let reference = Reference::new(kind, target, sort_keys, options)?;

        if kind == ReferenceKind::BelongsTo {
            let fk = naming::foreign_key(reference.target());
            let attribute = if options.required {
                Attribute::uuid().required()
            } else {
                Attribute::uuid()
            };
            self.attributes.entry(fk.clone()).or_insert(attribute);

            let name = format!("belongsTo{}", naming::pascal(reference.target()));
            self.push_secondary(
                name,
                IndexType::BelongsTo,
                vec![fk],
                None,
                reference.sort_keys().to_vec(),
            );
        }

        self.references.push(reference);

        Ok(self)
    }

    // ------------------------------------------------------------------
    // Build
    // ------------------------------------------------------------------

    pub fn build(self) -> Result<Schema, Error> {
        if self.secondary.len() > MAX_SECONDARY_INDEXES {
            return Err(SchemaBuilderError::TooManySecondaryIndexes {
                entity: self.entity_name,
                count: self.secondary.len(),
                max: MAX_SECONDARY_INDEXES,
            }
            .into());
        }

        let mut indexes = Vec::with_capacity(self.secondary.len() + 1);
        indexes.push(Index::primary(self.primary_pk, self.primary_sk));
        indexes.extend(self.secondary);

        let schema = Schema::new(SchemaParts {
            entity_name: self.entity_name,
            service_name: self.service_name,
            schema_version: self.schema_version,
            attributes: self.attributes,
            indexes,
            references: self.references,
            options: self.options,
        })?;

        Ok(schema)
    }

    // key_list
    // collect a non-empty list of non-blank attribute names
    fn key_list<I, S>(&self, keys: I, what: &'static str) -> Result<Vec<String>, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();

        if keys.is_empty() || keys.iter().any(|k| k.trim().is_empty()) {
            return Err(SchemaBuilderError::EmptyKeys {
                entity: self.entity_name.clone(),
                what,
            }
            .into());
        }

        Ok(keys)
    }

    // push_secondary
    // numbering is positional; the cap is enforced in `build`
    fn push_secondary(
        &mut self,
        name: String,
        index_type: IndexType,
        pk_facets: Vec<String>,
        template: Option<String>,
        sk_facets: Vec<String>,
    ) {
        let n = self.secondary.len() + 1;
        let store_name = format!(
            "{}-gsi{n}pk-gsi{n}sk",
            self.service_name.to_lowercase()
        );

        let mut pk = IndexKey::new(format!("gsi{n}pk"), pk_facets);
        if let Some(template) = template {
            pk = pk.with_template(template);
        }
        let sk = IndexKey::new(format!("gsi{n}sk"), sk_facets);

        self.secondary
            .push(Index::secondary(name, index_type, pk, sk, store_name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        attribute::AttributeKind,
        error::SchemaValidationError,
        index::PRIMARY_INDEX,
    };

    fn builder() -> SchemaBuilder {
        SchemaBuilder::new("Site", "SpaceCat", 1)
            .expect("builder should start")
            .add_attribute("baseURL", Attribute::string().required())
            .expect("attribute should add")
            .add_attribute("status", Attribute::string())
            .expect("attribute should add")
    }

    #[test]
    fn seeds_identifier_and_timestamps() {
        let schema = builder().build().expect("schema should build");

        let id = schema.attribute("siteId").expect("id attribute should exist");
        assert!(id.is_read_only());
        assert!(id.is_required());

        let updated = schema
            .attribute(UPDATED_AT)
            .expect("updatedAt should exist");
        assert!(updated.watch_rule().is_some_and(|w| w.triggers_on("status")));
        assert!(schema.attribute(CREATED_AT).is_some_and(Attribute::is_read_only));

        assert_eq!(schema.primary_index().pk().facets, vec!["siteId".to_string()]);
        assert_eq!(schema.primary_index().name(), PRIMARY_INDEX);
    }

    #[test]
    fn empty_key_lists_are_rejected() {
        let err = builder()
            .with_primary_partition_keys(Vec::<String>::new())
            .expect_err("empty partition keys should fail");
        assert!(matches!(
            err,
            Error::Builder(SchemaBuilderError::EmptyKeys { what: "primary partition keys", .. })
        ));

        let err = builder()
            .with_primary_sort_keys([""])
            .expect_err("blank sort key should fail");
        assert!(matches!(err, Error::Builder(SchemaBuilderError::EmptyKeys { .. })));
    }

    #[test]
    fn blank_and_duplicate_attributes_are_rejected() {
        let err = builder()
            .add_attribute("", Attribute::string())
            .expect_err("blank name should fail");
        assert!(matches!(
            err,
            Error::Builder(SchemaBuilderError::EmptyAttributeName { .. })
        ));

        let err = builder()
            .add_attribute("status", Attribute::number())
            .expect_err("duplicate should fail");
        assert!(matches!(
            err,
            Error::Builder(SchemaBuilderError::DuplicateAttribute { .. })
        ));
    }

    #[test]
    fn four_secondary_indexes_build_with_sequential_names() {
        let schema = builder()
            .add_all_index(["baseURL"])
            .and_then(|b| b.add_index(["status"], ["baseURL"]))
            .and_then(|b| b.add_index(["baseURL"], Vec::<String>::new()))
            .and_then(|b| b.add_index(["status"], ["updatedAt"]))
            .expect("indexes should add")
            .build()
            .expect("four secondaries should build");

        let store_names: Vec<_> = schema
            .indexes()
            .iter()
            .filter_map(|i| i.store_name())
            .collect();
        assert_eq!(
            store_names,
            vec![
                "spacecat-gsi1pk-gsi1sk",
                "spacecat-gsi2pk-gsi2sk",
                "spacecat-gsi3pk-gsi3sk",
                "spacecat-gsi4pk-gsi4sk",
            ]
        );

        let all = schema.index(ALL_INDEX).expect("all index should exist");
        assert_eq!(all.pk().template.as_deref(), Some("ALL_SITE"));
        assert_eq!(all.pk().field, "gsi1pk");
    }

    #[test]
    fn fifth_secondary_index_fails_at_build() {
        let err = builder()
            .add_all_index(["baseURL"])
            .and_then(|b| b.add_index(["status"], ["baseURL"]))
            .and_then(|b| b.add_index(["baseURL"], ["status"]))
            .and_then(|b| b.add_index(["status"], ["updatedAt"]))
            .and_then(|b| b.add_index(["status"], ["createdAt"]))
            .expect("adding does not enforce the cap")
            .build()
            .expect_err("fifth secondary should fail");

        assert!(matches!(
            err,
            Error::Builder(SchemaBuilderError::TooManySecondaryIndexes { count: 5, max: 4, .. })
        ));
    }

    #[test]
    fn belongs_to_adds_foreign_key_and_index() {
        let schema = builder()
            .add_reference(
                ReferenceKind::BelongsTo,
                "Organization",
                ["updatedAt"],
                ReferenceOptions::default(),
            )
            .expect("reference should add")
            .build()
            .expect("schema should build");

        let fk = schema
            .attribute("organizationId")
            .expect("foreign key should be added");
        assert!(fk.is_required());
        assert_eq!(fk.kind(), &AttributeKind::String);
        assert!(fk.check(&serde_json::json!("nope")).is_err(), "fk must be uuid validated");

        let index = schema
            .index("belongsToOrganization")
            .expect("foreign key index should be added");
        assert_eq!(index.index_type(), IndexType::BelongsTo);
        assert_eq!(index.pk().facets, vec!["organizationId".to_string()]);
        assert_eq!(index.sk().facets, vec!["updatedAt".to_string()]);
        assert_eq!(
            schema.find_index_name_by_keys(&["organizationId"]),
            "belongsToOrganization"
        );
    }

    #[test]
    fn optional_belongs_to_leaves_foreign_key_optional() {
        let schema = builder()
            .add_reference(
                ReferenceKind::BelongsTo,
                "Organization",
                Vec::<String>::new(),
                ReferenceOptions {
                    required: false,
                    ..ReferenceOptions::default()
                },
            )
            .expect("reference should add")
            .build()
            .expect("schema should build");

        assert!(
            schema
                .attribute("organizationId")
                .is_some_and(|a| !a.is_required())
        );
    }

    #[test]
    fn has_many_adds_no_attribute_or_index() {
        let before = builder().build().expect("schema should build");
        let after = builder()
            .add_reference(
                ReferenceKind::HasMany,
                "Audit",
                Vec::<String>::new(),
                ReferenceOptions::default(),
            )
            .expect("reference should add")
            .build()
            .expect("schema should build");

        assert_eq!(before.attributes().len(), after.attributes().len());
        assert_eq!(before.indexes().len(), after.indexes().len());
        assert_eq!(after.references().len(), 1);
    }

    #[test]
    fn unknown_facets_surface_as_validation_errors() {
        let err = builder()
            .add_index(["color"], Vec::<String>::new())
            .expect("adding is unchecked")
            .build()
            .expect_err("unknown facet should fail");

        assert!(matches!(
            err,
            Error::Validation(SchemaValidationError::MissingAttributeForFacet { .. })
        ));
    }

    #[test]
    fn constructor_rejects_blank_identity() {
        assert!(matches!(
            SchemaBuilder::new("", "svc", 1),
            Err(Error::Builder(SchemaBuilderError::EmptyEntityName))
        ));
        assert!(matches!(
            SchemaBuilder::new("Site", " ", 1),
            Err(Error::Builder(SchemaBuilderError::EmptyServiceName { .. }))
        ));
        assert!(matches!(
            SchemaBuilder::new("Site", "svc", 0),
            Err(Error::Builder(SchemaBuilderError::InvalidSchemaVersion { .. }))
        ));
    }
}
