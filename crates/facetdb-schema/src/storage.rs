//! Store-facing schema descriptor.
//!
//! This is the only exported wire shape of the schema layer: the store
//! client consumes it at bootstrap to learn entity identity, attribute
//! metadata and index key layout.

use crate::{
    attribute::{AttributeKind, Watch},
    index::{IndexKey, IndexType},
    schema::Schema,
};
use serde::Serialize;
use std::collections::BTreeMap;

///
/// StorageSchema
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StorageSchema {
    pub model: StorageModel,
    pub attributes: BTreeMap<String, StorageAttribute>,
    pub indexes: BTreeMap<String, StorageIndex>,
}

///
/// StorageModel
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StorageModel {
    pub entity: String,
    pub version: String,
    pub service: String,
}

///
/// StorageAttribute
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageAttribute {
    #[serde(rename = "type")]
    pub kind: AttributeKind,
    pub required: bool,
    pub read_only: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch: Option<Vec<String>>,
}

///
/// StorageIndex
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageIndex {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    pub index_type: IndexType,
    pub pk: IndexKey,
    pub sk: IndexKey,
}

impl StorageSchema {
    #[must_use]
    pub fn from_schema(schema: &Schema) -> Self {
        let attributes = schema
            .attributes()
            .iter()
            .map(|(name, attr)| {
                let watch = attr.watch_rule().map(|w| match w {
                    Watch::All => vec!["*".to_string()],
                    Watch::Attributes(names) => names.clone(),
                });

                (
                    name.clone(),
                    StorageAttribute {
                        kind: attr.kind().clone(),
                        required: attr.is_required(),
                        read_only: attr.is_read_only(),
                        hidden: attr.is_hidden(),
                        watch,
                    },
                )
            })
            .collect();

        let indexes = schema
            .indexes()
            .iter()
            .map(|index| {
                (
                    index.name().to_string(),
                    StorageIndex {
                        index: index.store_name().map(str::to_string),
                        index_type: index.index_type(),
                        pk: index.pk().clone(),
                        sk: index.sk().clone(),
                    },
                )
            })
            .collect();

        Self {
            model: StorageModel {
                entity: schema.entity_name().to_string(),
                version: schema.schema_version().to_string(),
                service: schema.service_name().to_string(),
            },
            attributes,
            indexes,
        }
    }

    /// JSON rendering for store clients that take untyped descriptors.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
