use crate::{
    acl::{Action, resource_path},
    collection::{Collection, QueryOptions},
    error::{Error, IssueKind, ValidationError},
    key,
    store::PutCondition,
    validate,
};
use facetdb_schema::prelude::*;
use serde_json::{Map, Value};
use std::{collections::BTreeSet, fmt};

///
/// Related
///

#[derive(Debug)]
pub enum Related {
    One(Option<Record>),
    Many(Vec<Record>),
}

impl Related {
    #[must_use]
    pub fn into_one(self) -> Option<Record> {
        match self {
            Self::One(record) => record,
            Self::Many(records) => records.into_iter().next(),
        }
    }

    #[must_use]
    pub fn into_many(self) -> Vec<Record> {
        match self {
            Self::One(record) => record.into_iter().collect(),
            Self::Many(records) => records,
        }
    }
}

///
/// Record
///
/// One entity instance. Attribute reads need `R` on the record's resource
/// path and writes need `U`; a denial is an error, never a silent default.
/// Changes are local until `save`.
///
/// A record loaded through a projection is partial. Saving it writes its
/// changes over the stored item, leaving unloaded attributes untouched.
///

#[derive(Clone)]
pub struct Record {
    collection: Collection,
    attributes: Map<String, Value>,
    dirty: BTreeSet<String>,
    partial: bool,
}

impl Record {
    pub(crate) const fn new(collection: Collection, attributes: Map<String, Value>) -> Self {
        Self {
            collection,
            attributes,
            dirty: BTreeSet::new(),
            partial: false,
        }
    }

    pub(crate) const fn into_partial(mut self) -> Self {
        self.partial = true;
        self
    }

    #[must_use]
    pub const fn collection(&self) -> &Collection {
        &self.collection
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        self.collection.schema()
    }

    #[must_use]
    pub fn entity_name(&self) -> &str {
        self.collection.entity_name()
    }

    /// Identifier. Not gated: it is part of the resource path itself.
    #[must_use]
    pub fn id(&self) -> &str {
        self.attributes
            .get(self.schema().id_attribute())
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn resource_path(&self) -> String {
        resource_path(self.schema(), &self.attributes)
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Whether only a projection of the stored attributes was loaded.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.partial
    }

    pub(crate) const fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    fn authorize(&self, action: Action) -> Result<(), Error> {
        self.collection.authorize(&self.attributes, action)
    }

    // ------------------------------------------------------------------
    // Attribute access
    // ------------------------------------------------------------------

    pub fn get(&self, name: &str) -> Result<Option<&Value>, Error> {
        if self.schema().attribute(name).is_none() {
            let issue = ValidationError::single(self.entity_name(), name, IssueKind::Unknown);
            return Err(issue.into());
        }
        self.authorize(Action::Read)?;

        Ok(self.attributes.get(name))
    }

    /// Stage a change. `null` clears an optional attribute.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self, Error> {
        let value = value.into();
        validate::check_update(self.schema(), name, &value)?;
        self.authorize(Action::Update)?;

        if value.is_null() {
            self.attributes.remove(name);
        } else {
            self.attributes.insert(name.to_string(), value);
        }
        self.dirty.insert(name.to_string());

        Ok(self)
    }

    /// Read through a generated accessor name such as `getBaseUrl`.
    pub fn get_by_accessor(&self, accessor: &str) -> Result<Option<&Value>, Error> {
        let attribute = self.accessor_attribute("get_by_accessor", accessor, AttributeAccess::Get)?;

        self.get(&attribute)
    }

    /// Write through a generated accessor name such as `setBaseUrl`.
    pub fn set_by_accessor(
        &mut self,
        accessor: &str,
        value: impl Into<Value>,
    ) -> Result<&mut Self, Error> {
        let attribute = self.accessor_attribute("set_by_accessor", accessor, AttributeAccess::Set)?;

        self.set(&attribute, value)
    }

    fn accessor_attribute(
        &self,
        operation: &'static str,
        accessor: &str,
        access: AttributeAccess,
    ) -> Result<String, Error> {
        match self.schema().attribute_accessor(accessor) {
            Some(entry) if entry.access == access => Ok(entry.attribute.clone()),
            _ => Err(self
                .collection
                .contract_error(operation, format!("unknown accessor '{accessor}'"))),
        }
    }

    pub fn created_at(&self) -> Result<Option<&str>, Error> {
        Ok(self.get(CREATED_AT)?.and_then(Value::as_str))
    }

    pub fn updated_at(&self) -> Result<Option<&str>, Error> {
        Ok(self.get(UPDATED_AT)?.and_then(Value::as_str))
    }

    /// Visible attributes as a JSON object; hidden attributes are omitted.
    pub fn to_json(&self) -> Result<Value, Error> {
        self.authorize(Action::Read)?;

        let schema = self.schema();
        let visible = self
            .attributes
            .iter()
            .filter(|(name, _)| schema.attribute(name).is_some_and(|a| !a.is_hidden()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Ok(Value::Object(visible))
    }

    // ------------------------------------------------------------------
    // Relationships
    // ------------------------------------------------------------------

    /// Follow a relationship accessor (`getOrganization`, `getSites`).
    pub async fn related(&self, accessor: &str) -> Result<Related, Error> {
        const OP: &str = "related";

        let Some(config) = self
            .collection
            .bindings()
            .reference_accessors
            .get(accessor)
            .cloned()
        else {
            return Err(self
                .collection
                .contract_error(OP, format!("unknown relationship accessor '{accessor}'")));
        };

        let value = match &config.value_from {
            ForeignKeySource::Attribute(attribute) => {
                self.get(attribute)?.and_then(key::facet_value)
            }
            ForeignKeySource::OwnId => Some(self.id().to_string()).filter(|id| !id.is_empty()),
        };

        let target = self.collection.registry().get_collection(&config.target)?;
        let Some(value) = value else {
            return Ok(match config.kind {
                AccessorKind::ListAll => Related::Many(Vec::new()),
                AccessorKind::ById | AccessorKind::FindOne => Related::One(None),
            });
        };

        let mut keys = Map::new();
        keys.insert(config.foreign_key.clone(), Value::String(value.clone()));
        let options = QueryOptions::new().fetch_all_pages();

        match config.kind {
            AccessorKind::ById => Ok(Related::One(target.find_by_id(&value).await?)),
            AccessorKind::FindOne => {
                let found = target.find_by_index_keys(keys, &options).await?;
                Ok(Related::One(found))
            }
            AccessorKind::ListAll => {
                let listed = target.all_by_index_keys(keys, &options).await?;
                Ok(Related::Many(listed))
            }
        }
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Persist staged changes, regenerating watching attributes such as
    /// `updatedAt`.
    pub async fn save(&mut self) -> Result<(), Error> {
        const OP: &str = "save";

        if !self.schema().options().allow_updates {
            let message = format!("updates to '{}' are not allowed", self.entity_name());
            return Err(self.collection.contract_error(OP, message));
        }
        if self.dirty.is_empty() {
            return Ok(());
        }
        self.authorize(Action::Update)?;

        let now = validate::now_timestamp();
        let refreshed: Vec<(String, Value)> = self
            .schema()
            .attributes()
            .iter()
            .filter(|(name, _)| !self.dirty.contains(*name))
            .filter_map(|(name, attr)| {
                let watch = attr.watch_rule()?;
                let rule = attr.default_rule()?;
                self.dirty
                    .iter()
                    .any(|changed| watch.triggers_on(changed))
                    .then(|| (name.clone(), validate::resolve_default(rule, &now)))
            })
            .collect();
        let mut changed = self.dirty.clone();
        changed.extend(refreshed.iter().map(|(name, _)| name.clone()));
        self.attributes.extend(refreshed);

        let item = if self.partial {
            let merged = self.merge_with_stored(OP, &changed).await?;
            key::to_item(self.schema(), &merged)
        } else {
            key::to_item(self.schema(), &self.attributes)
        }
        .map_err(|err| self.collection.key_error(OP, &err))?;
        self.collection
            .registry()
            .store()
            .put(item, PutCondition::Always)
            .await
            .map_err(|err| self.collection.store_error(OP, err))?;

        tracing::debug!(
            target: "facetdb::record",
            entity = self.entity_name(),
            id = self.id(),
            changed = ?self.dirty,
            partial = self.partial,
            "record saved"
        );
        self.dirty.clear();

        Ok(())
    }

    // merge_with_stored
    // the stored item with `changed` taken from this record; absent means cleared
    async fn merge_with_stored(
        &self,
        operation: &'static str,
        changed: &BTreeSet<String>,
    ) -> Result<Map<String, Value>, Error> {
        let store_key = key::primary_key(self.schema(), &self.attributes)
            .map_err(|err| self.collection.key_error(operation, &err))?;
        let Some(stored) = self
            .collection
            .registry()
            .store()
            .get(&store_key)
            .await
            .map_err(|err| self.collection.store_error(operation, err))?
        else {
            let message = format!("'{}' '{}' no longer exists", self.entity_name(), self.id());
            return Err(self.collection.contract_error(operation, message));
        };

        let mut merged = key::strip_key_fields(self.schema(), stored);
        for name in changed {
            match self.attributes.get(name) {
                Some(value) => {
                    merged.insert(name.clone(), value.clone());
                }
                None => {
                    merged.remove(name);
                }
            }
        }

        Ok(merged)
    }

    /// Delete this record, first removing dependents of relationships
    /// declared with `remove_dependents`.
    pub async fn remove(&self) -> Result<(), Error> {
        const OP: &str = "remove";

        if !self.schema().options().allow_remove {
            return Err(self
                .collection
                .contract_error(OP, format!("removal of '{}' is not allowed", self.entity_name())));
        }
        self.authorize(Action::Delete)?;

        let dependents: Vec<&Reference> = self
            .schema()
            .references()
            .iter()
            .filter(|r| r.kind() != ReferenceKind::BelongsTo && r.removes_dependents())
            .collect();

        for reference in dependents {
            let children = self.related(&reference.accessor_name()).await?.into_many();
            if children.is_empty() {
                continue;
            }

            let ids: Vec<&str> = children.iter().map(Self::id).collect();
            self.collection
                .registry()
                .get_collection(reference.target())?
                .remove_by_ids(&ids)
                .await?;

            tracing::debug!(
                target: "facetdb::record",
                entity = self.entity_name(),
                id = self.id(),
                dependent = reference.target(),
                count = ids.len(),
                "removed dependents"
            );
        }

        let store_key = key::primary_key(self.schema(), &self.attributes)
            .map_err(|err| self.collection.key_error(OP, &err))?;
        self.collection
            .registry()
            .store()
            .delete(&store_key)
            .await
            .map_err(|err| self.collection.store_error(OP, err))?;

        Ok(())
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("entity", &self.entity_name())
            .field("attributes", &self.attributes)
            .field("dirty", &self.dirty)
            .field("partial", &self.partial)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collection::CreateOptions,
        registry::EntityRegistry,
        store::MemoryStore,
        test_support::{ORG_A, ORG_B, catalog, obj, org_a_registry, system_registry},
    };
    use serde_json::json;
    use std::sync::Arc;

    async fn seed(registry: &EntityRegistry) -> (Record, Vec<Record>) {
        let org = registry
            .get_collection("Organization")
            .expect("organization collection should resolve")
            .create(
                obj(json!({ "organizationId": ORG_A, "name": "Adobe" })),
                CreateOptions::default(),
            )
            .await
            .expect("organization should be created");

        let sites = registry
            .get_collection("Site")
            .expect("site collection should resolve")
            .create_many(
                vec![
                    obj(json!({ "baseURL": "https://a.com", "apiKey": "secret" })),
                    obj(json!({ "baseURL": "https://b.com" })),
                ],
                Some(&org),
            )
            .await
            .expect("sites should be created")
            .created_items;

        (org, sites)
    }

    #[tokio::test]
    async fn set_validates_and_save_persists_with_refreshed_timestamp() {
        let store = Arc::new(MemoryStore::new());
        let registry = system_registry(&store, &catalog());
        let (_, mut sites) = seed(&registry).await;
        let site = &mut sites[0];
        let created_at = site.created_at().expect("readable").map(str::to_string);

        let err = site.set("siteId", json!(ORG_B)).expect_err("identifier is read-only");
        assert!(matches!(err, Error::Validation(ref e) if e.issues[0].kind == IssueKind::ReadOnly));
        let err = site.set("colour", "red").expect_err("unknown attribute");
        assert!(matches!(err, Error::Validation(ref e) if e.issues[0].kind == IssueKind::Unknown));
        let err = site.set("name", 7).expect_err("wrong type");
        assert!(err.is_validation());
        assert!(!site.is_dirty());

        site.set("name", "Main site").expect("valid set should stage");
        assert!(site.is_dirty());
        let puts = store.stats().puts;
        site.save().await.expect("save should succeed");
        assert!(!site.is_dirty());
        assert_eq!(store.stats().puts, puts + 1);

        let reloaded = registry
            .get_collection("Site")
            .expect("site collection should resolve")
            .find_by_id(site.id())
            .await
            .expect("find should succeed")
            .expect("site should exist");
        assert_eq!(reloaded.get("name").expect("readable"), Some(&json!("Main site")));
        assert_eq!(reloaded.created_at().expect("readable").map(str::to_string), created_at);
        let updated_at = reloaded.updated_at().expect("readable").expect("set");
        assert!(Some(updated_at) >= created_at.as_deref());

        site.save().await.expect("clean save is a no-op");
        assert_eq!(store.stats().puts, puts + 1);
    }

    #[tokio::test]
    async fn saving_a_projected_record_keeps_unloaded_attributes() {
        let store = Arc::new(MemoryStore::new());
        let registry = system_registry(&store, &catalog());
        let (_, sites) = seed(&registry).await;
        let created_at = sites[0].created_at().expect("readable").map(str::to_string);
        let collection = registry
            .get_collection("Site")
            .expect("site collection should resolve");

        let mut projected = collection
            .all_by_index_keys(
                obj(json!({ "organizationId": ORG_A })),
                &QueryOptions::new().attributes(["name"]),
            )
            .await
            .expect("projected query should succeed");
        let site = &mut projected[0];
        assert!(site.is_partial());
        assert_eq!(site.id(), sites[0].id());
        assert_eq!(site.get("baseURL").expect("readable"), None);

        site.set("name", "Renamed").expect("valid set should stage");
        site.set("apiKey", Value::Null).expect("optional attribute clears");
        site.save().await.expect("save should succeed");

        let reloaded = collection
            .find_by_id(site.id())
            .await
            .expect("find should succeed")
            .expect("site should exist");
        assert!(!reloaded.is_partial());
        assert_eq!(reloaded.get("name").expect("readable"), Some(&json!("Renamed")));
        assert_eq!(reloaded.get("baseURL").expect("readable"), Some(&json!("https://a.com")));
        assert_eq!(reloaded.get("apiKey").expect("readable"), None);
        assert_eq!(reloaded.created_at().expect("readable").map(str::to_string), created_at);
        assert!(reloaded.updated_at().expect("readable").is_some());
    }

    #[tokio::test]
    async fn saving_a_projected_record_that_was_removed_fails() {
        let store = Arc::new(MemoryStore::new());
        let registry = system_registry(&store, &catalog());
        let (_, sites) = seed(&registry).await;

        let mut projected = registry
            .get_collection("Site")
            .expect("site collection should resolve")
            .all_by_index_keys(
                obj(json!({ "organizationId": ORG_A })),
                &QueryOptions::new().attributes(["name"]),
            )
            .await
            .expect("projected query should succeed");
        sites[0].remove().await.expect("remove should succeed");
        let puts = store.stats().puts;

        projected[0].set("name", "Ghost").expect("valid set should stage");
        let err = projected[0].save().await.expect_err("missing record cannot be merged");

        assert!(matches!(err, Error::DataAccess(_)));
        assert_eq!(store.stats().puts, puts, "nothing is written");
        assert!(projected[0].is_dirty());
    }

    #[tokio::test]
    async fn accessors_and_json_respect_visibility() {
        let store = Arc::new(MemoryStore::new());
        let registry = system_registry(&store, &catalog());
        let (_, mut sites) = seed(&registry).await;
        let site = &mut sites[0];

        site.set_by_accessor("setName", "Docs").expect("setter should stage");
        assert_eq!(site.get_by_accessor("getName").expect("getter"), Some(&json!("Docs")));
        assert!(site.get_by_accessor("setName").is_err(), "setters are not getters");
        assert!(site.set_by_accessor("setSiteId", ORG_B).is_err(), "no setter for read-only");

        let value = site.to_json().expect("readable");
        assert_eq!(value["baseURL"], json!("https://a.com"));
        assert!(value.get("apiKey").is_none(), "hidden attributes are omitted");
        assert_eq!(site.get("apiKey").expect("readable"), Some(&json!("secret")));
    }

    #[tokio::test]
    async fn relationships_navigate_both_directions() {
        let store = Arc::new(MemoryStore::new());
        let registry = system_registry(&store, &catalog());
        let (org, sites) = seed(&registry).await;

        let parent = sites[0]
            .related("getOrganization")
            .await
            .expect("parent lookup should succeed")
            .into_one()
            .expect("parent should exist");
        assert_eq!(parent.id(), ORG_A);

        let children = org
            .related("getSites")
            .await
            .expect("children lookup should succeed")
            .into_many();
        assert_eq!(children.len(), 2);

        let err = org.related("getPages").await.expect_err("unknown accessor");
        assert!(matches!(err, Error::DataAccess(_)));
    }

    #[tokio::test]
    async fn remove_takes_dependents_with_it() {
        let store = Arc::new(MemoryStore::new());
        let registry = system_registry(&store, &catalog());
        let (org, _) = seed(&registry).await;
        assert_eq!(store.len(), 3);

        org.remove().await.expect("remove should succeed");

        assert!(store.is_empty());
        assert_eq!(store.stats().deletes, 3);
    }

    #[tokio::test]
    async fn reads_and_writes_are_gated_by_the_resource_path() {
        let store = Arc::new(MemoryStore::new());
        let catalog = catalog();
        let system = system_registry(&store, &catalog);
        let foreign = system
            .get_collection("Site")
            .expect("site collection should resolve")
            .create(
                obj(json!({ "organizationId": ORG_B, "baseURL": "https://x.com" })),
                CreateOptions::default(),
            )
            .await
            .expect("site should be created");
        assert_eq!(foreign.resource_path(), format!("/organization/{ORG_B}/site/{}", foreign.id()));

        let member = org_a_registry(&store, &catalog);
        let err = member
            .get_collection("Site")
            .expect("site collection should resolve")
            .find_by_id(foreign.id())
            .await
            .expect_err("foreign site should not be readable");
        assert!(err.is_permission());

        let (_, mut own) = seed(&member).await;
        own[0].set("name", "Mine").expect("own site is writable");
        own[0].save().await.expect("own site saves");
        assert!(own[0].remove().await.is_ok());
    }
}
