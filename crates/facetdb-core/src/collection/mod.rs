//! Per-entity repository: CRUD, batch writes and index-routed queries.
//!
//! A `Collection` is stateless apart from the bindings compiled from its
//! schema; every call reads fresh items from the store.

mod accessor;
mod batch;
mod query;

pub use accessor::{AccessorMode, AccessorResult};
pub use batch::{CreateManyResult, ErrorItem};
pub use query::{Between, Page, QueryOptions};

use crate::{
    acl::{Action, resource_path},
    error::{DataAccessError, Error},
    key::{self, KeyError},
    record::Record,
    registry::{CollectionBindings, EntityRegistry},
    store::{Item, PutCondition, StoreError, StoreKey},
    validate,
};
use facetdb_schema::prelude::*;
use serde_json::{Map, Value};
use std::{fmt, sync::Arc};

///
/// CreateOptions
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CreateOptions {
    /// Overwrite an existing record with the same key instead of failing.
    pub upsert: bool,
}

impl CreateOptions {
    #[must_use]
    pub const fn upsert() -> Self {
        Self { upsert: true }
    }
}

///
/// Collection
///

#[derive(Clone)]
pub struct Collection {
    registry: EntityRegistry,
    bindings: Arc<CollectionBindings>,
}

impl Collection {
    pub(crate) const fn new(registry: EntityRegistry, bindings: Arc<CollectionBindings>) -> Self {
        Self { registry, bindings }
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.bindings.schema
    }

    #[must_use]
    pub fn entity_name(&self) -> &str {
        self.schema().entity_name()
    }

    #[must_use]
    pub const fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub(crate) fn bindings(&self) -> &CollectionBindings {
        &self.bindings
    }

    // ------------------------------------------------------------------
    // Failures
    // ------------------------------------------------------------------

    /// Violated input contract; logged once here.
    pub(crate) fn contract_error(
        &self,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Error {
        let message = message.into();
        tracing::warn!(
            target: "facetdb::collection",
            entity = self.entity_name(),
            operation,
            %message,
            "rejected request"
        );

        DataAccessError::new(self.entity_name(), operation, message).into()
    }

    /// Store failure; logged once here.
    pub(crate) fn store_error(&self, operation: &'static str, err: StoreError) -> Error {
        tracing::error!(
            target: "facetdb::collection",
            entity = self.entity_name(),
            operation,
            error = %err,
            "store operation failed"
        );

        DataAccessError::store(self.entity_name(), operation, err).into()
    }

    pub(crate) fn key_error(&self, operation: &'static str, err: &KeyError) -> Error {
        self.contract_error(operation, err.to_string())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    // hydrate
    // partial records came from a projection and hold only some attributes
    pub(crate) fn hydrate(&self, item: Item, partial: bool) -> Record {
        let record = Record::new(self.clone(), key::strip_key_fields(self.schema(), item));

        if partial {
            record.into_partial()
        } else {
            record
        }
    }

    pub(crate) fn authorize(
        &self,
        attributes: &Map<String, Value>,
        action: Action,
    ) -> Result<(), Error> {
        let path = resource_path(self.schema(), attributes);
        self.registry
            .acl()
            .check(self.entity_name(), &path, action)?;

        Ok(())
    }

    /// Table key of the record identified by `id`.
    pub(crate) fn id_key(&self, operation: &'static str, id: &str) -> Result<StoreKey, Error> {
        if id.trim().is_empty() {
            return Err(self.contract_error(operation, "an identifier is required"));
        }

        let mut attributes = Map::new();
        attributes.insert(
            self.schema().id_attribute().to_string(),
            Value::String(id.to_string()),
        );

        key::primary_key(self.schema(), &attributes).map_err(|err| self.key_error(operation, &err))
    }

    // ------------------------------------------------------------------
    // Single-record operations
    // ------------------------------------------------------------------

    /// Point lookup. A missing record is `Ok(None)`; a record the caller may
    /// not read is a `PermissionError`.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Record>, Error> {
        const OP: &str = "find_by_id";

        let key = self.id_key(OP, id)?;
        let Some(item) = self
            .registry
            .store()
            .get(&key)
            .await
            .map_err(|err| self.store_error(OP, err))?
        else {
            return Ok(None);
        };

        let record = self.hydrate(item, false);
        self.authorize(record.attributes(), Action::Read)?;

        Ok(Some(record))
    }

    pub async fn exists_by_id(&self, id: &str) -> Result<bool, Error> {
        Ok(self.find_by_id(id).await?.is_some())
    }

    /// Validate, default and write one record. Without `upsert` an
    /// existing record with the same key fails the call.
    pub async fn create(
        &self,
        data: Map<String, Value>,
        options: CreateOptions,
    ) -> Result<Record, Error> {
        const OP: &str = "create";

        if data.is_empty() {
            return Err(self.contract_error(OP, "no data provided"));
        }

        let now = validate::now_timestamp();
        let attributes = validate::prepare_new(self.schema(), data, &now)?;
        self.authorize(&attributes, Action::Create)?;

        let item = key::to_item(self.schema(), &attributes)
            .map_err(|err| self.key_error(OP, &err))?;
        let condition = if options.upsert {
            PutCondition::Always
        } else {
            PutCondition::IfAbsent
        };

        self.registry
            .store()
            .put(item, condition)
            .await
            .map_err(|err| self.store_error(OP, err))?;

        let record = Record::new(self.clone(), attributes);
        tracing::debug!(
            target: "facetdb::collection",
            entity = self.entity_name(),
            id = record.id(),
            "record created"
        );

        if let Err(err) = self.bindings.hooks.on_create(&record).await {
            tracing::warn!(
                target: "facetdb::collection",
                entity = self.entity_name(),
                id = record.id(),
                error = %err,
                "on_create hook failed"
            );
        }

        Ok(record)
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("entity", &self.entity_name())
            .finish_non_exhaustive()
    }
}
