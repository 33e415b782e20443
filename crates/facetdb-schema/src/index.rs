use derive_more::Display;
use serde::Serialize;
use std::collections::BTreeSet;

/// Logical name of the primary index.
pub const PRIMARY_INDEX: &str = "primary";

/// Logical name of the full-listing index created by `add_all_index`.
pub const ALL_INDEX: &str = "all";

///
/// IndexType
/// Routing tag used by the query router and relationship accessors.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    #[display("primary")]
    Primary,
    #[display("all")]
    All,
    #[display("belongs_to")]
    BelongsTo,
    #[display("other")]
    Other,
}

///
/// IndexKey
///
/// One side (partition or sort) of an index. `field` is the physical
/// attribute the composed key is written to; `template` replaces facet
/// composition with a constant partition value.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct IndexKey {
    pub field: String,
    #[serde(rename = "composite")]
    pub facets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl IndexKey {
    #[must_use]
    pub fn new<I, S>(field: impl Into<String>, facets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field: field.into(),
            facets: facets.into_iter().map(Into::into).collect(),
            template: None,
        }
    }

    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }
}

///
/// Index
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Index {
    name: String,
    index_type: IndexType,
    pk: IndexKey,
    sk: IndexKey,
    store_name: Option<String>,
}

impl Index {
    /// Primary index keyed on the physical `pk`/`sk` fields.
    #[must_use]
    pub fn primary(pk_facets: Vec<String>, sk_facets: Vec<String>) -> Self {
        Self {
            name: PRIMARY_INDEX.to_string(),
            index_type: IndexType::Primary,
            pk: IndexKey::new("pk", pk_facets),
            sk: IndexKey::new("sk", sk_facets),
            store_name: None,
        }
    }

    #[must_use]
    pub fn secondary(
        name: impl Into<String>,
        index_type: IndexType,
        pk: IndexKey,
        sk: IndexKey,
        store_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            index_type,
            pk,
            sk,
            store_name: Some(store_name.into()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn index_type(&self) -> IndexType {
        self.index_type
    }

    #[must_use]
    pub const fn pk(&self) -> &IndexKey {
        &self.pk
    }

    #[must_use]
    pub const fn sk(&self) -> &IndexKey {
        &self.sk
    }

    /// Store-level index name; `None` for the table's own key.
    #[must_use]
    pub fn store_name(&self) -> Option<&str> {
        self.store_name.as_deref()
    }

    #[must_use]
    pub const fn is_primary(&self) -> bool {
        matches!(self.index_type, IndexType::Primary)
    }

    /// Every facet named by this index, partition first.
    pub fn facets(&self) -> impl Iterator<Item = &str> {
        self.pk
            .facets
            .iter()
            .chain(self.sk.facets.iter())
            .map(String::as_str)
    }

    /// Whether the sort-key facet set equals `keys` (order-insensitive).
    #[must_use]
    pub fn sort_facets_equal(&self, keys: &BTreeSet<&str>) -> bool {
        !self.sk.facets.is_empty()
            && self.sk.facets.len() == keys.len()
            && self.sk.facets.iter().all(|f| keys.contains(f.as_str()))
    }

    /// Whether `keys` can compose this index's partition key: it is a
    /// constant template or every partition facet is supplied.
    #[must_use]
    pub fn partition_supplied(&self, keys: &BTreeSet<&str>) -> bool {
        self.pk.template.is_some() || self.pk.facets.iter().all(|f| keys.contains(f.as_str()))
    }

    /// Minimal ordered key lists that can select rows through this index:
    /// all partition facets plus each sort-key prefix. An empty list is
    /// never returned.
    #[must_use]
    pub fn selectable_key_sets(&self) -> Vec<Vec<String>> {
        let base = self.pk.facets.clone();
        let mut sets = Vec::new();

        if !base.is_empty() {
            sets.push(base.clone());
        }

        for len in 1..=self.sk.facets.len() {
            let mut keys = base.clone();
            keys.extend(self.sk.facets[..len].iter().cloned());
            sets.push(keys);
        }

        sets
    }
}
