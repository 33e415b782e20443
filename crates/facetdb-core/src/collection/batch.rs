use crate::{
    acl::{Action, resource_path},
    collection::{Collection, QueryOptions},
    error::{DataAccessError, Error},
    key,
    record::Record,
    store::{BatchWriteOutput, StoreError, StoreErrorKind, StoreKey, WriteRequest},
    validate,
};
use facetdb_schema::naming;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

///
/// ErrorItem
///

#[derive(Debug)]
pub struct ErrorItem {
    pub item: Map<String, Value>,
    pub error: Error,
}

///
/// CreateManyResult
///
/// Per-item outcome of a batch create. Every input item ends up in exactly
/// one of the two lists.
///

#[derive(Debug, Default)]
pub struct CreateManyResult {
    pub created_items: Vec<Record>,
    pub error_items: Vec<ErrorItem>,
}

impl Collection {
    /// Batch create. Items that fail validation, or whose key is already
    /// taken, are reported individually instead of failing the call; the
    /// store is given one corrective pass for anything it leaves
    /// unprocessed.
    ///
    /// When `parent` is an entity this one belongs to, its identifier is
    /// stamped on every item as the foreign key.
    pub async fn create_many(
        &self,
        items: Vec<Map<String, Value>>,
        parent: Option<&Record>,
    ) -> Result<CreateManyResult, Error> {
        const OP: &str = "create_many";

        if items.is_empty() {
            return Err(self.contract_error(OP, "items must be a non-empty list"));
        }

        let schema = self.schema();
        let stamp = parent.and_then(|p| {
            if schema.belongs_to(p.entity_name()).is_some() {
                Some((naming::foreign_key(p.entity_name()), p.id().to_string()))
            } else {
                tracing::warn!(
                    target: "facetdb::collection",
                    entity = self.entity_name(),
                    parent = p.entity_name(),
                    "parent is not a belongs_to target; items are not stamped"
                );
                None
            }
        });

        let now = validate::now_timestamp();
        let mut result = CreateManyResult::default();
        let mut prepared = Vec::with_capacity(items.len());

        for mut item in items {
            if let Some((fk, id)) = &stamp {
                item.insert(fk.clone(), Value::String(id.clone()));
            }

            match validate::prepare_new(schema, item.clone(), &now) {
                Ok(attributes) => {
                    self.authorize(&attributes, Action::Create)?;
                    prepared.push(attributes);
                }
                Err(err) => result.error_items.push(ErrorItem {
                    item,
                    error: err.into(),
                }),
            }
        }

        if prepared.is_empty() {
            return Ok(result);
        }

        let mut requests = Vec::with_capacity(prepared.len());
        for attributes in &prepared {
            let item = key::to_item(schema, attributes).map_err(|err| self.key_error(OP, &err))?;
            requests.push(WriteRequest::put_if_absent(item));
        }

        let output = self.write_with_retry(OP, requests).await?;
        let unprocessed: BTreeSet<StoreKey> =
            output.unprocessed.iter().filter_map(WriteRequest::key).collect();
        let mut conflicts: BTreeMap<StoreKey, usize> = BTreeMap::new();
        for store_key in output.conflicts.iter().filter_map(WriteRequest::key) {
            *conflicts.entry(store_key).or_default() += 1;
        }

        // the first write of a key wins; later duplicates are the conflicts
        let keys: Vec<Option<StoreKey>> = prepared
            .iter()
            .map(|attributes| key::primary_key(schema, attributes).ok())
            .collect();
        let mut conflicted = vec![false; keys.len()];
        for (slot, store_key) in keys.iter().enumerate().rev() {
            if let Some(store_key) = store_key
                && let Some(remaining) = conflicts.get_mut(store_key)
                && *remaining > 0
            {
                *remaining -= 1;
                conflicted[slot] = true;
            }
        }

        let outcomes = prepared.into_iter().zip(keys).zip(conflicted);
        for ((attributes, store_key), conflicted) in outcomes {
            let error = match store_key {
                Some(store_key) if conflicted => Some(DataAccessError::store(
                    self.entity_name(),
                    OP,
                    StoreError::new(
                        StoreErrorKind::ConditionFailed,
                        format!("item '{store_key}' already exists"),
                    ),
                )),
                Some(store_key) if unprocessed.contains(&store_key) => Some(DataAccessError::new(
                    self.entity_name(),
                    OP,
                    "item was not processed by the store",
                )),
                _ => None,
            };

            match error {
                Some(error) => result.error_items.push(ErrorItem {
                    error: error.into(),
                    item: attributes,
                }),
                None => result.created_items.push(Record::new(self.clone(), attributes)),
            }
        }

        tracing::info!(
            target: "facetdb::collection",
            entity = self.entity_name(),
            created = result.created_items.len(),
            failed = result.error_items.len(),
            "batch create completed"
        );

        if !result.created_items.is_empty()
            && let Err(err) = self
                .bindings()
                .hooks
                .on_create_many(&result.created_items)
                .await
        {
            tracing::warn!(
                target: "facetdb::collection",
                entity = self.entity_name(),
                error = %err,
                "on_create_many hook failed"
            );
        }

        Ok(result)
    }

    /// Batch delete. Under enforcement every id must be deletable or the
    /// whole call is denied before anything is removed.
    pub async fn remove_by_ids(&self, ids: &[&str]) -> Result<(), Error> {
        const OP: &str = "remove_by_ids";

        if ids.is_empty() {
            return Err(self.contract_error(OP, "ids must be a non-empty list"));
        }
        if !self.schema().options().allow_remove {
            return Err(self.contract_error(
                OP,
                format!("removal of '{}' is not allowed", self.entity_name()),
            ));
        }

        let enforced = self.registry().acl().is_enforced_for(self.entity_name());
        let mut keys = Vec::with_capacity(ids.len());

        for id in ids {
            let store_key = self.id_key(OP, id)?;

            if enforced {
                let attributes = match self
                    .registry()
                    .store()
                    .get(&store_key)
                    .await
                    .map_err(|err| self.store_error(OP, err))?
                {
                    Some(item) => key::strip_key_fields(self.schema(), item),
                    None => {
                        let mut attributes = Map::new();
                        attributes.insert(
                            self.schema().id_attribute().to_string(),
                            Value::String((*id).to_string()),
                        );
                        attributes
                    }
                };
                let path = resource_path(self.schema(), &attributes);
                self.registry()
                    .acl()
                    .check(self.entity_name(), &path, Action::Delete)?;
            }

            keys.push(store_key);
        }

        let requested = keys.len();
        let requests = keys.into_iter().map(WriteRequest::Delete).collect();
        let leftover = self.write_with_retry(OP, requests).await?.unprocessed;

        if !leftover.is_empty() {
            return Err(DataAccessError::new(
                self.entity_name(),
                OP,
                format!("{} of {requested} deletes were not processed", leftover.len()),
            )
            .into());
        }

        tracing::info!(
            target: "facetdb::collection",
            entity = self.entity_name(),
            removed = requested,
            "batch remove completed"
        );

        Ok(())
    }

    /// Remove every record selected by `keys`.
    pub async fn remove_by_index_keys(&self, keys: Map<String, Value>) -> Result<(), Error> {
        let records = self
            .all_by_index_keys(keys, &QueryOptions::new().fetch_all_pages())
            .await?;
        if records.is_empty() {
            return Ok(());
        }

        let ids: Vec<&str> = records.iter().map(Record::id).collect();
        self.remove_by_ids(&ids).await
    }

    // write_with_retry
    // one batch call plus one corrective pass; returns what is still unprocessed
    // together with every conflict either pass reported
    pub(crate) async fn write_with_retry(
        &self,
        operation: &'static str,
        requests: Vec<WriteRequest>,
    ) -> Result<BatchWriteOutput, Error> {
        let store = self.registry().store();
        let mut first = store
            .batch_write(requests)
            .await
            .map_err(|err| self.store_error(operation, err))?;

        if first.unprocessed.is_empty() {
            return Ok(first);
        }

        tracing::info!(
            target: "facetdb::collection",
            entity = self.entity_name(),
            operation,
            unprocessed = first.unprocessed.len(),
            "retrying unprocessed batch items"
        );

        let retry = std::mem::take(&mut first.unprocessed);
        match store.batch_write(retry.clone()).await {
            Ok(second) => {
                first.unprocessed = second.unprocessed;
                first.conflicts.extend(second.conflicts);
            }
            Err(err) => {
                tracing::error!(
                    target: "facetdb::collection",
                    entity = self.entity_name(),
                    operation,
                    error = %err,
                    "corrective batch write failed"
                );
                first.unprocessed = retry;
            }
        }

        if !first.unprocessed.is_empty() {
            tracing::error!(
                target: "facetdb::collection",
                entity = self.entity_name(),
                operation,
                unprocessed = first.unprocessed.len(),
                "batch items still unprocessed after corrective pass"
            );
        }

        Ok(first)
    }
}
