//! Key composition.
//!
//! Every index key is a composed string:
//!
//! - partition: `$<service>#<entity>#<facet>_<value>...`, or the index's
//!   constant template (`ALL_<ENTITY>`) when it has one,
//! - sort: `$<entity>_<version>#<facet>_<value>...`.
//!
//! Service, entity and facet names are lowercased; string values are kept
//! as is and numbers are written in a fixed-width form that sorts in
//! numeric order, so sort key ranges over numeric facets behave.
//! Secondary index fields are written only when every facet of that index
//! has a value, so rows missing a facet stay out of the index.

use crate::store::{IndexQuery, Item, SortCondition, SortOrder, StoreKey};
use facetdb_schema::prelude::*;
use serde_json::{Map, Value};
use thiserror::Error as ThisError;

/// Upper bound appended to a range end so rows with further sort facets
/// still fall inside it.
const RANGE_CEILING: char = '\u{10FFFF}';

///
/// KeyError
///

#[derive(Debug, Eq, PartialEq, ThisError)]
pub enum KeyError {
    #[error("between attribute '{attribute}' is not the next sort key facet of index '{index}'")]
    BetweenFacet { index: String, attribute: String },

    #[error("index '{index}' requires a value for facet '{facet}'")]
    MissingFacet { index: String, facet: String },
}

///
/// KeyedQuery
/// A query resolved against one index plus the supplied keys it did not
/// consume, which the caller applies as an equality filter.
///

#[derive(Clone, Debug)]
pub struct KeyedQuery {
    pub query: IndexQuery,
    pub residual: Map<String, Value>,
}

/// String form of a facet value; `None` for absent values.
#[must_use]
pub fn facet_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.as_f64().map_or_else(|| n.to_string(), ordered_number)),
        other => Some(other.to_string()),
    }
}

/// Sixteen hex digits whose lexicographic order is the numeric order of
/// `value`. Integers beyond 2^53 share the precision limits of `f64`.
#[must_use]
pub fn ordered_number(value: f64) -> String {
    // adding zero folds -0.0 into 0.0
    let bits = (value + 0.0).to_bits();
    let ordered = if bits >> 63 == 1 { !bits } else { bits | (1 << 63) };

    format!("{ordered:016x}")
}

fn facet_segment(facet: &str, value: &str) -> String {
    format!("#{}_{value}", facet.to_lowercase())
}

fn partition_prefix(schema: &Schema) -> String {
    format!(
        "${}#{}",
        schema.service_name().to_lowercase(),
        schema.entity_name().to_lowercase()
    )
}

fn sort_prefix(schema: &Schema) -> String {
    format!(
        "${}_{}",
        schema.entity_name().to_lowercase(),
        schema.schema_version()
    )
}

/// Composed partition key, or `None` if a facet has no value.
#[must_use]
pub fn partition_key(
    schema: &Schema,
    index: &Index,
    attributes: &Map<String, Value>,
) -> Option<String> {
    if let Some(template) = &index.pk().template {
        return Some(template.clone());
    }

    let mut key = partition_prefix(schema);
    for facet in &index.pk().facets {
        let value = attributes.get(facet).and_then(facet_value)?;
        key.push_str(&facet_segment(facet, &value));
    }

    Some(key)
}

/// Composed sort key, or `None` if a facet has no value.
#[must_use]
pub fn sort_key(
    schema: &Schema,
    index: &Index,
    attributes: &Map<String, Value>,
) -> Option<String> {
    let mut key = sort_prefix(schema);
    for facet in &index.sk().facets {
        let value = attributes.get(facet).and_then(facet_value)?;
        key.push_str(&facet_segment(facet, &value));
    }

    Some(key)
}

/// Table key of a record.
pub fn primary_key(
    schema: &Schema,
    attributes: &Map<String, Value>,
) -> Result<StoreKey, KeyError> {
    let index = schema.primary_index();

    let missing = || {
        let facet = index
            .facets()
            .find(|f| attributes.get(*f).and_then(facet_value).is_none())
            .unwrap_or_default();

        KeyError::MissingFacet {
            index: index.name().to_string(),
            facet: facet.to_string(),
        }
    };

    let pk = partition_key(schema, index, attributes).ok_or_else(missing)?;
    let sk = sort_key(schema, index, attributes).ok_or_else(missing)?;

    Ok(StoreKey::new(pk, sk))
}

/// Attributes plus every composable index key field.
pub fn to_item(schema: &Schema, attributes: &Map<String, Value>) -> Result<Item, KeyError> {
    let mut item = attributes.clone();
    let table = primary_key(schema, attributes)?;
    let primary = schema.primary_index();

    item.insert(primary.pk().field.clone(), Value::String(table.pk));
    item.insert(primary.sk().field.clone(), Value::String(table.sk));

    for index in schema.indexes().iter().filter(|i| !i.is_primary()) {
        let pk = partition_key(schema, index, attributes);
        let sk = sort_key(schema, index, attributes);

        if let (Some(pk), Some(sk)) = (pk, sk) {
            item.insert(index.pk().field.clone(), Value::String(pk));
            item.insert(index.sk().field.clone(), Value::String(sk));
        }
    }

    Ok(item)
}

/// Drop the composed key fields from a stored item.
#[must_use]
pub fn strip_key_fields(schema: &Schema, mut item: Item) -> Map<String, Value> {
    for field in schema.key_fields() {
        item.remove(field);
    }

    item
}

/// Resolve `keys` against `index`. Partition facets must all be supplied;
/// sort facets are consumed as a leading prefix, and `between` ranges over
/// the first sort facet not supplied.
pub fn keyed_query(
    schema: &Schema,
    index: &Index,
    keys: &Map<String, Value>,
    between: Option<(&str, &Value, &Value)>,
) -> Result<KeyedQuery, KeyError> {
    let mut residual = keys.clone();

    let pk = match &index.pk().template {
        Some(template) => template.clone(),
        None => {
            let mut key = partition_prefix(schema);
            for facet in &index.pk().facets {
                let value = residual
                    .remove(facet)
                    .as_ref()
                    .and_then(facet_value)
                    .ok_or_else(|| KeyError::MissingFacet {
                        index: index.name().to_string(),
                        facet: facet.clone(),
                    })?;
                key.push_str(&facet_segment(facet, &value));
            }
            key
        }
    };

    let sk_facets = &index.sk().facets;
    let mut prefix = sort_prefix(schema);
    let mut supplied = 0;
    for facet in sk_facets {
        let Some(value) = residual.get(facet).and_then(facet_value) else {
            break;
        };
        residual.remove(facet);
        prefix.push_str(&facet_segment(facet, &value));
        supplied += 1;
    }

    let condition = match between {
        Some((attribute, start, end)) => {
            let next = sk_facets
                .get(supplied)
                .filter(|f| f.as_str() == attribute)
                .ok_or_else(|| KeyError::BetweenFacet {
                    index: index.name().to_string(),
                    attribute: attribute.to_string(),
                })?;

            let bound = |value: &Value| {
                let value = facet_value(value).unwrap_or_default();
                format!("{prefix}{}", facet_segment(next, &value))
            };
            let mut upper = bound(end);
            if supplied + 1 < sk_facets.len() {
                upper.push('#');
                upper.push(RANGE_CEILING);
            }

            SortCondition::Between {
                start: bound(start),
                end: upper,
            }
        }
        None if supplied == sk_facets.len() => SortCondition::Equals(prefix),
        None => SortCondition::BeginsWith(format!("{prefix}#")),
    };

    Ok(KeyedQuery {
        query: IndexQuery {
            index: index.store_name().map(str::to_string),
            pk_field: index.pk().field.clone(),
            sk_field: index.sk().field.clone(),
            pk,
            sk: Some(condition),
            order: SortOrder::Asc,
            limit: None,
            cursor: None,
            attributes: None,
        },
        residual,
    })
}
