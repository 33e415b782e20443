use crate::{
    acl::AclContext,
    collection::{AccessorMode, Collection},
    error::{DataAccessError, Error},
    hooks::{CollectionHooks, NoHooks},
    store::DataStore,
};
use facetdb_schema::{naming, prelude::*};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

/// Suffix accepted, and ignored, on collection names.
const COLLECTION_SUFFIX: &str = "Collection";

///
/// CatalogEntry
///

#[derive(Clone)]
pub struct CatalogEntry {
    schema: Arc<Schema>,
    hooks: Arc<dyn CollectionHooks>,
}

impl CatalogEntry {
    #[must_use]
    pub const fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[must_use]
    pub const fn hooks(&self) -> &Arc<dyn CollectionHooks> {
        &self.hooks
    }
}

///
/// EntityCatalog
///
/// Every entity known to the process, keyed by entity name. Populated once
/// at the composition root, then shared read-only behind an `Arc`.
///

#[derive(Clone, Default)]
pub struct EntityCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl EntityCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `schema` with its hooks. Re-registering a name replaces the
    /// earlier entry.
    pub fn register_entity(
        &mut self,
        schema: Schema,
        hooks: Arc<dyn CollectionHooks>,
    ) -> &mut Self {
        let name = schema.entity_name().to_string();

        if self.entries.contains_key(&name) {
            tracing::debug!(
                target: "facetdb::registry",
                entity = %name,
                "replacing registered entity"
            );
        }

        self.entries.insert(
            name,
            CatalogEntry {
                schema: Arc::new(schema),
                hooks,
            },
        );

        self
    }

    pub fn register(&mut self, schema: Schema) -> &mut Self {
        self.register_entity(schema, Arc::new(NoHooks))
    }

    #[must_use]
    pub fn entry(&self, entity: &str) -> Option<&CatalogEntry> {
        self.entries.get(entity)
    }

    #[must_use]
    pub fn schema(&self, entity: &str) -> Option<&Arc<Schema>> {
        self.entries.get(entity).map(CatalogEntry::schema)
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Store-facing descriptor of every registered entity.
    #[must_use]
    pub fn entities(&self) -> BTreeMap<String, StorageSchema> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.schema.to_storage_schema()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // resolve_name
    // `SiteCollection`, `Site` and `site` all name the `Site` entity
    fn resolve_name(&self, name: &str) -> Option<&str> {
        let base = name.strip_suffix(COLLECTION_SUFFIX).unwrap_or(name);

        [base.to_string(), naming::pascal(base)]
            .into_iter()
            .find_map(|candidate| {
                self.entries
                    .get_key_value(&candidate)
                    .map(|(k, _)| k.as_str())
            })
    }
}

impl SchemaResolver for EntityCatalog {
    fn resolve_schema(&self, entity: &str) -> Option<&Schema> {
        self.entries.get(entity).map(|e| e.schema.as_ref())
    }
}

impl fmt::Debug for EntityCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

///
/// IndexAccessorBinding
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexAccessorBinding {
    pub index: String,
    pub keys: Vec<String>,
    pub mode: AccessorMode,
}

///
/// CollectionBindings
///
/// Everything a collection derives from its schema once: the named index
/// accessors and the relationship accessors. Holds no registry handle.
///

pub struct CollectionBindings {
    pub(crate) schema: Arc<Schema>,
    pub(crate) hooks: Arc<dyn CollectionHooks>,
    pub(crate) index_accessors: BTreeMap<String, IndexAccessorBinding>,
    pub(crate) reference_accessors: BTreeMap<String, AccessorConfig>,
}

impl CollectionBindings {
    fn compile(catalog: &EntityCatalog, entry: &CatalogEntry) -> Result<Self, Error> {
        let schema = &entry.schema;

        let mut index_accessors = BTreeMap::new();
        for accessor in schema.index_accessors() {
            for (name, mode) in [
                (accessor.all_name(), AccessorMode::All),
                (accessor.find_name(), AccessorMode::Find),
            ] {
                index_accessors.insert(
                    name,
                    IndexAccessorBinding {
                        index: accessor.index.clone(),
                        keys: accessor.keys.clone(),
                        mode,
                    },
                );
            }
        }

        let mut reference_accessors = BTreeMap::new();
        for reference in schema.references() {
            for config in reference.to_accessor_configs(catalog, schema.entity_name())? {
                reference_accessors.insert(config.name.clone(), config);
            }
        }

        Ok(Self {
            schema: Arc::clone(schema),
            hooks: Arc::clone(&entry.hooks),
            index_accessors,
            reference_accessors,
        })
    }
}

///
/// EntityRegistry
///
/// One caller's view of the catalog: a store handle, the caller's
/// authorization context and the collections instantiated so far.
/// Cloning is cheap and shares the collection cache.
///

#[derive(Clone)]
pub struct EntityRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    catalog: Arc<EntityCatalog>,
    store: Arc<dyn DataStore>,
    acl: AclContext,
    bindings: RwLock<BTreeMap<String, Arc<CollectionBindings>>>,
}

impl EntityRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn DataStore>, acl: AclContext, catalog: Arc<EntityCatalog>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                catalog,
                store,
                acl,
                bindings: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &EntityCatalog {
        &self.inner.catalog
    }

    #[must_use]
    pub fn acl(&self) -> &AclContext {
        &self.inner.acl
    }

    pub(crate) fn store(&self) -> &dyn DataStore {
        self.inner.store.as_ref()
    }

    /// Collection for `name` (`Site` or `SiteCollection`), compiled on
    /// first use and cached for the life of this registry.
    pub fn get_collection(&self, name: &str) -> Result<Collection, Error> {
        let catalog = self.catalog();
        let Some(entity) = catalog.resolve_name(name) else {
            tracing::warn!(
                target: "facetdb::registry",
                collection = name,
                "unknown collection requested"
            );

            return Err(DataAccessError::new(
                name,
                "get_collection",
                format!("collection '{name}' is not registered"),
            )
            .into());
        };

        let cached = self
            .inner
            .bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity)
            .cloned();
        if let Some(bindings) = cached {
            return Ok(Collection::new(self.clone(), bindings));
        }

        let entry = catalog.entry(entity).ok_or_else(|| {
            DataAccessError::new(entity, "get_collection", "catalog entry disappeared")
        })?;
        let compiled = Arc::new(CollectionBindings::compile(catalog, entry)?);

        let bindings = Arc::clone(
            self.inner
                .bindings
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(entity.to_string())
                .or_insert(compiled),
        );

        Ok(Collection::new(self.clone(), bindings))
    }

    /// Every collection instantiated so far, keyed by entity name.
    #[must_use]
    pub fn get_collections(&self) -> BTreeMap<String, Collection> {
        self.inner
            .bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, bindings)| {
                (
                    name.clone(),
                    Collection::new(self.clone(), Arc::clone(bindings)),
                )
            })
            .collect()
    }

    #[must_use]
    pub fn get_entities(&self) -> BTreeMap<String, StorageSchema> {
        self.catalog().entities()
    }
}

impl fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("catalog", &self.inner.catalog)
            .field("acl", &self.inner.acl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn catalog() -> EntityCatalog {
        let organization = SchemaBuilder::new("Organization", "SpaceCat", 1)
            .and_then(|b| b.add_attribute("name", Attribute::string()))
            .and_then(|b| {
                b.add_reference(
                    ReferenceKind::HasMany,
                    "Site",
                    Vec::<String>::new(),
                    ReferenceOptions::default(),
                )
            })
            .and_then(SchemaBuilder::build)
            .expect("organization should build");
        let site = SchemaBuilder::new("Site", "SpaceCat", 1)
            .and_then(|b| b.add_attribute("baseURL", Attribute::string()))
            .and_then(|b| {
                b.add_reference(
                    ReferenceKind::BelongsTo,
                    "Organization",
                    ["baseURL"],
                    ReferenceOptions::default(),
                )
            })
            .and_then(SchemaBuilder::build)
            .expect("site should build");

        let mut catalog = EntityCatalog::new();
        catalog.register(organization).register(site);
        catalog
    }

    fn registry() -> EntityRegistry {
        EntityRegistry::new(
            Arc::new(MemoryStore::new()),
            AclContext::allow_all(),
            Arc::new(catalog()),
        )
    }

    #[test]
    fn collection_names_resolve_with_or_without_suffix() {
        let registry = registry();

        let a = registry
            .get_collection("SiteCollection")
            .expect("suffixed name should resolve");
        let b = registry.get_collection("Site").expect("bare name should resolve");
        assert_eq!(a.entity_name(), "Site");
        assert_eq!(b.entity_name(), "Site");
        assert_eq!(registry.get_collections().len(), 1, "bindings are cached per entity");
    }

    #[test]
    fn unknown_collection_is_a_data_access_error() {
        let err = registry()
            .get_collection("Opportunity")
            .expect_err("unknown collection should fail");

        assert!(matches!(err, Error::DataAccess(ref e) if e.operation == "get_collection"));
    }

    #[test]
    fn bindings_expose_index_and_reference_accessors() {
        let registry = registry();
        let sites = registry.get_collection("Site").expect("site should resolve");

        let names = sites.accessor_names();
        assert!(names.contains(&"allByOrganizationId".to_string()));
        assert!(names.iter().any(|n| n.starts_with("findByOrganizationIdAnd")));

        let orgs = registry
            .get_collection("Organization")
            .expect("organization should resolve");
        assert!(orgs.relationship_names().contains(&"getSites".to_string()));
        assert!(sites.relationship_names().contains(&"getOrganization".to_string()));
    }

    #[test]
    fn re_registration_overwrites_and_entities_export_descriptors() {
        let mut catalog = catalog();
        let replacement = SchemaBuilder::new("Organization", "SpaceCat", 2)
            .and_then(SchemaBuilder::build)
            .expect("replacement should build");
        catalog.register(replacement);

        let entities = catalog.entities();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities["Organization"].model.version, "2");
        assert_eq!(entities["Site"].model.service, "SpaceCat");
    }
}
