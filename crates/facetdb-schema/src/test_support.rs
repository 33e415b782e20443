use crate::prelude::*;
use std::collections::BTreeMap;

///
/// TestCatalog
/// Resolver over a fixed set of schemas.
///

pub(crate) struct TestCatalog(BTreeMap<String, Schema>);

impl SchemaResolver for TestCatalog {
    fn resolve_schema(&self, entity: &str) -> Option<&Schema> {
        self.0.get(entity)
    }
}

fn build(entity: &str, references: &[(ReferenceKind, &str)]) -> Schema {
    let mut builder = SchemaBuilder::new(entity, "SpaceCat", 1)
        .and_then(|b| b.add_attribute("name", Attribute::string()))
        .expect("builder should start");

    for (kind, target) in references {
        builder = builder
            .add_reference(*kind, *target, Vec::<String>::new(), ReferenceOptions::default())
            .expect("reference should add");
    }

    builder.build().expect("schema should build")
}

/// Organization has many sites and one profile; sites point back, the
/// profile does not.
pub(crate) fn catalog() -> TestCatalog {
    let schemas = [
        build(
            "Organization",
            &[
                (ReferenceKind::HasMany, "Site"),
                (ReferenceKind::HasOne, "Profile"),
            ],
        ),
        build("Site", &[(ReferenceKind::BelongsTo, "Organization")]),
        build("Profile", &[]),
    ];

    TestCatalog(
        schemas
            .into_iter()
            .map(|schema| (schema.entity_name().to_string(), schema))
            .collect(),
    )
}

/// Reference on `schema` pointing at `target`.
pub(crate) fn reference_to<'s>(schema: &'s Schema, target: &str) -> &'s Reference {
    schema
        .references()
        .iter()
        .find(|r| r.target() == target)
        .expect("reference should be declared")
}
