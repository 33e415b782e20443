//! Backing store port.
//!
//! The runtime speaks to a single partitioned table through `DataStore`.
//! Items are flat JSON maps carrying both the entity attributes and the
//! composed key fields (`pk`, `sk`, `gsi<N>pk`, `gsi<N>sk`).

mod memory;

pub use memory::{MemoryStore, StoreStats};

use async_trait::async_trait;
use derive_more::Display;
use serde_json::{Map, Value};
use thiserror::Error as ThisError;

/// One stored row.
pub type Item = Map<String, Value>;

/// Physical partition key field of the table.
pub const TABLE_PK: &str = "pk";

/// Physical sort key field of the table.
pub const TABLE_SK: &str = "sk";

///
/// DataStore
///
/// Point reads see the latest acknowledged write; nothing here is atomic
/// across items.
///

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn get(&self, key: &StoreKey) -> Result<Option<Item>, StoreError>;

    async fn put(&self, item: Item, condition: PutCondition) -> Result<(), StoreError>;

    async fn delete(&self, key: &StoreKey) -> Result<(), StoreError>;

    /// Apply writes in any order. Requests the store did not apply are
    /// handed back in `unprocessed`; conditional puts whose key already
    /// exists are handed back in `conflicts`. An `Err` means nothing was
    /// applied.
    async fn batch_write(
        &self,
        requests: Vec<WriteRequest>,
    ) -> Result<BatchWriteOutput, StoreError>;

    async fn query(&self, query: IndexQuery) -> Result<QueryPage, StoreError>;
}

///
/// StoreKey
///

#[derive(Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("{pk}|{sk}")]
pub struct StoreKey {
    pub pk: String,
    pub sk: String,
}

impl StoreKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }

    /// Table key of a stored item, if both key fields are present.
    #[must_use]
    pub fn of_item(item: &Item) -> Option<Self> {
        let pk = item.get(TABLE_PK)?.as_str()?;
        let sk = item.get(TABLE_SK)?.as_str()?;

        Some(Self::new(pk, sk))
    }
}

///
/// PutCondition
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PutCondition {
    Always,
    #[default]
    IfAbsent,
}

///
/// WriteRequest
///

#[derive(Clone, Debug, PartialEq)]
pub enum WriteRequest {
    Delete(StoreKey),
    Put { item: Item, condition: PutCondition },
}

impl WriteRequest {
    /// Unconditional put.
    #[must_use]
    pub const fn put(item: Item) -> Self {
        Self::Put {
            item,
            condition: PutCondition::Always,
        }
    }

    /// Put that only applies when no item has the same table key.
    #[must_use]
    pub const fn put_if_absent(item: Item) -> Self {
        Self::Put {
            item,
            condition: PutCondition::IfAbsent,
        }
    }

    #[must_use]
    pub fn key(&self) -> Option<StoreKey> {
        match self {
            Self::Delete(key) => Some(key.clone()),
            Self::Put { item, .. } => StoreKey::of_item(item),
        }
    }
}

///
/// BatchWriteOutput
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchWriteOutput {
    pub unprocessed: Vec<WriteRequest>,
    /// Conditional puts rejected because the key already exists.
    pub conflicts: Vec<WriteRequest>,
}

///
/// SortOrder
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

///
/// SortCondition
/// Constraint on the composed sort key of an index.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SortCondition {
    BeginsWith(String),
    /// Inclusive on both ends.
    Between { start: String, end: String },
    Equals(String),
}

impl SortCondition {
    #[must_use]
    pub fn matches(&self, sort_key: &str) -> bool {
        match self {
            Self::BeginsWith(prefix) => sort_key.starts_with(prefix.as_str()),
            Self::Between { start, end } => sort_key >= start.as_str() && sort_key <= end.as_str(),
            Self::Equals(value) => sort_key == value,
        }
    }
}

///
/// IndexQuery
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexQuery {
    /// Store-level index name; `None` queries the table itself.
    pub index: Option<String>,
    pub pk_field: String,
    pub sk_field: String,
    pub pk: String,
    pub sk: Option<SortCondition>,
    pub order: SortOrder,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    /// Attribute projection; `None` returns whole items.
    pub attributes: Option<Vec<String>>,
}

///
/// QueryPage
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryPage {
    pub items: Vec<Item>,
    /// Continuation cursor; `None` once the result set is exhausted.
    pub cursor: Option<String>,
}

///
/// StoreError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("{kind}: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_condition_failed(&self) -> bool {
        matches!(self.kind, StoreErrorKind::ConditionFailed)
    }
}

///
/// StoreErrorKind
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum StoreErrorKind {
    #[display("condition_failed")]
    ConditionFailed,
    #[display("invalid_request")]
    InvalidRequest,
    #[display("unavailable")]
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sort_conditions_compare_composed_keys() {
        assert!(SortCondition::BeginsWith("$site_1#".into()).matches("$site_1#name_a"));
        assert!(!SortCondition::Equals("$site_1".into()).matches("$site_1#name_a"));

        let between = SortCondition::Between {
            start: "$site_1#name_b".into(),
            end: "$site_1#name_d".into(),
        };
        assert!(between.matches("$site_1#name_b"));
        assert!(between.matches("$site_1#name_c"));
        assert!(between.matches("$site_1#name_d"));
        assert!(!between.matches("$site_1#name_e"));
    }

    #[test]
    fn store_key_reads_table_fields() {
        let item = json!({ "pk": "a", "sk": "b", "name": "x" });
        let item = item.as_object().expect("object literal");

        assert_eq!(StoreKey::of_item(item), Some(StoreKey::new("a", "b")));
        assert_eq!(StoreKey::new("a", "b").to_string(), "a|b");
        assert_eq!(
            WriteRequest::Delete(StoreKey::new("a", "b")).key(),
            Some(StoreKey::new("a", "b"))
        );
        assert_eq!(
            WriteRequest::put_if_absent(item.clone()).key(),
            Some(StoreKey::new("a", "b"))
        );
    }
}
