use crate::{
    acl::{AclContext, AclRule, Action},
    hooks::CollectionHooks,
    registry::{EntityCatalog, EntityRegistry},
    store::MemoryStore,
};
use facetdb_schema::prelude::*;
use serde_json::{Map, Value};
use std::sync::Arc;

pub(crate) const ORG_A: &str = "0b7c6f1e-2d3a-4c5b-8e9f-1a2b3c4d5e6f";
pub(crate) const ORG_B: &str = "9a8b7c6d-5e4f-4a3b-9c2d-1e0f2a3b4c5d";

pub(crate) fn obj(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("object literal")
}

pub(crate) fn organization_schema() -> Schema {
    SchemaBuilder::new("Organization", "SpaceCat", 1)
        .and_then(|b| b.add_attribute("name", Attribute::string().required()))
        .and_then(|b| {
            b.add_reference(
                ReferenceKind::HasMany,
                "Site",
                Vec::<String>::new(),
                ReferenceOptions {
                    remove_dependents: true,
                    ..ReferenceOptions::default()
                },
            )
        })
        .and_then(SchemaBuilder::build)
        .expect("organization schema should build")
}

pub(crate) fn site_schema() -> Schema {
    SchemaBuilder::new("Site", "SpaceCat", 1)
        .and_then(|b| b.add_attribute("baseURL", Attribute::string().required()))
        .and_then(|b| b.add_attribute("name", Attribute::string()))
        .and_then(|b| b.add_attribute("apiKey", Attribute::string().hidden()))
        .and_then(|b| b.add_all_index(["baseURL"]))
        .and_then(|b| {
            b.add_reference(
                ReferenceKind::BelongsTo,
                "Organization",
                ["baseURL"],
                ReferenceOptions::default(),
            )
        })
        .and_then(SchemaBuilder::build)
        .expect("site schema should build")
}

pub(crate) fn catalog_with_site_hooks(hooks: Arc<dyn CollectionHooks>) -> Arc<EntityCatalog> {
    let mut catalog = EntityCatalog::new();
    catalog
        .register(organization_schema())
        .register_entity(site_schema(), hooks);

    Arc::new(catalog)
}

pub(crate) fn catalog() -> Arc<EntityCatalog> {
    catalog_with_site_hooks(Arc::new(crate::hooks::NoHooks))
}

/// Unrestricted registry over `store`.
pub(crate) fn system_registry(
    store: &Arc<MemoryStore>,
    catalog: &Arc<EntityCatalog>,
) -> EntityRegistry {
    EntityRegistry::new(
        Arc::clone(store) as _,
        AclContext::allow_all(),
        Arc::clone(catalog),
    )
}

/// Registry for a caller with full access below `ORG_A` only.
pub(crate) fn org_a_registry(
    store: &Arc<MemoryStore>,
    catalog: &Arc<EntityCatalog>,
) -> EntityRegistry {
    let acl = AclContext::new(vec![AclRule::new(
        "member",
        format!("/organization/{ORG_A}/**"),
        [Action::Create, Action::Read, Action::Update, Action::Delete],
    )]);

    EntityRegistry::new(Arc::clone(store) as _, acl, Arc::clone(catalog))
}
