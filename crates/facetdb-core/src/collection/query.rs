use crate::{
    collection::Collection,
    error::Error,
    key::{self, KeyedQuery},
    record::Record,
    store::{Item, SortOrder},
};
use facetdb_schema::{naming, prelude::*};
use serde_json::{Map, Value};

///
/// Between
/// Inclusive range over one sort key facet.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Between {
    pub attribute: String,
    pub start: Value,
    pub end: Value,
}

///
/// QueryOptions
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOptions {
    pub limit: Option<usize>,
    pub order: SortOrder,
    /// Attribute projection. The identifier, primary key facets and parent
    /// foreign keys are always included so results stay addressable.
    /// Projected records are partial: saving one only writes its changes.
    pub attributes: Option<Vec<String>>,
    pub between: Option<Between>,
    pub cursor: Option<String>,
    /// Follow continuation cursors until the result set is exhausted.
    pub fetch_all_pages: bool,
}

impl QueryOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn between(
        mut self,
        attribute: impl Into<String>,
        start: impl Into<Value>,
        end: impl Into<Value>,
    ) -> Self {
        self.between = Some(Between {
            attribute: attribute.into(),
            start: start.into(),
            end: end.into(),
        });
        self
    }

    #[must_use]
    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    #[must_use]
    pub const fn fetch_all_pages(mut self) -> Self {
        self.fetch_all_pages = true;
        self
    }
}

///
/// Page
///

#[derive(Debug)]
pub struct Page {
    pub records: Vec<Record>,
    pub cursor: Option<String>,
}

impl Collection {
    /// Every record selected by `keys` through the routed index.
    pub async fn all_by_index_keys(
        &self,
        keys: Map<String, Value>,
        options: &QueryOptions,
    ) -> Result<Vec<Record>, Error> {
        const OP: &str = "all_by_index_keys";

        let index = self.route(OP, &keys)?;
        let page = self.query_index(OP, &index, keys, options).await?;

        Ok(page.records)
    }

    /// First record selected by `keys` through the routed index. Later store
    /// pages are read until a match turns up or the index is exhausted.
    pub async fn find_by_index_keys(
        &self,
        keys: Map<String, Value>,
        options: &QueryOptions,
    ) -> Result<Option<Record>, Error> {
        const OP: &str = "find_by_index_keys";

        let index = self.route(OP, &keys)?;
        let options = QueryOptions {
            limit: Some(1),
            fetch_all_pages: false,
            ..options.clone()
        };
        let page = self.query_index(OP, &index, keys, &options).await?;

        Ok(page.records.into_iter().next())
    }

    /// Full listing through the `all` index, or a keyed query when `filter`
    /// names any attributes.
    pub async fn all(
        &self,
        filter: Map<String, Value>,
        options: &QueryOptions,
    ) -> Result<Vec<Record>, Error> {
        const OP: &str = "all";

        if !filter.is_empty() {
            return self.all_by_index_keys(filter, options).await;
        }

        let Some(index) = self.schema().find_index_by_type(IndexType::All) else {
            return Err(self.contract_error(
                OP,
                format!("'{}' has no all index", self.entity_name()),
            ));
        };
        let index = index.name().to_string();

        Ok(self.query_index(OP, &index, filter, options).await?.records)
    }

    /// One page of a keyed query plus its continuation cursor. Empty `keys`
    /// list through the `all` index when there is one.
    ///
    /// With a limit, store pages are read until the limit is reached, and
    /// the cursor resumes right after the last row this page consumed.
    pub async fn page(
        &self,
        keys: Map<String, Value>,
        options: &QueryOptions,
    ) -> Result<Page, Error> {
        const OP: &str = "page";

        let names: Vec<&str> = keys.keys().map(String::as_str).collect();
        let index = self.schema().find_index_name_by_keys(&names).to_string();

        self.query_index(OP, &index, keys, options).await
    }

    // route
    // keyed queries need at least one key
    fn route(&self, operation: &'static str, keys: &Map<String, Value>) -> Result<String, Error> {
        if keys.is_empty() {
            return Err(self.contract_error(operation, "at least one index key is required"));
        }

        let names: Vec<&str> = keys.keys().map(String::as_str).collect();

        Ok(self.schema().find_index_name_by_keys(&names).to_string())
    }

    /// Run `keys` against the named index. Keys the index does not consume
    /// are applied as an equality filter on the returned items.
    pub(crate) async fn query_index(
        &self,
        operation: &'static str,
        index_name: &str,
        keys: Map<String, Value>,
        options: &QueryOptions,
    ) -> Result<Page, Error> {
        let schema = self.schema();
        let Some(index) = schema.index(index_name) else {
            return Err(self.contract_error(
                operation,
                format!("no query is available for index '{index_name}'"),
            ));
        };

        let between = options
            .between
            .as_ref()
            .map(|b| (b.attribute.as_str(), &b.start, &b.end));
        let KeyedQuery { mut query, residual } = key::keyed_query(schema, index, &keys, between)
            .map_err(|err| self.key_error(operation, &err))?;

        query.order = options.order;
        query.cursor.clone_from(&options.cursor);
        query.attributes = options
            .attributes
            .as_ref()
            .map(|requested| self.projection(requested, &residual));

        let partial = query.attributes.is_some();
        let mut items: Vec<Item> = Vec::new();
        let cursor = loop {
            // never read past what the page can still hold, so the store
            // cursor always resumes after the last consumed row
            query.limit = options.limit.map(|limit| limit.saturating_sub(items.len()));

            let page = self
                .registry()
                .store()
                .query(query.clone())
                .await
                .map_err(|err| self.store_error(operation, err))?;

            items.extend(
                page.items
                    .into_iter()
                    .filter(|item| residual.iter().all(|(k, v)| item.get(k) == Some(v))),
            );

            let full = options.limit.is_some_and(|limit| items.len() >= limit);
            let more = options.fetch_all_pages || options.limit.is_some();
            match page.cursor {
                Some(next) if more && !full => query.cursor = Some(next),
                next => break next,
            }
        };

        tracing::debug!(
            target: "facetdb::collection",
            entity = self.entity_name(),
            operation,
            index = index_name,
            count = items.len(),
            "query completed"
        );

        Ok(Page {
            records: items
                .into_iter()
                .map(|item| self.hydrate(item, partial))
                .collect(),
            cursor,
        })
    }

    fn projection(&self, requested: &[String], residual: &Map<String, Value>) -> Vec<String> {
        let schema = self.schema();
        let mut attributes = requested.to_vec();

        let required = std::iter::once(schema.id_attribute().to_string())
            .chain(schema.primary_index().facets().map(ToString::to_string))
            .chain(
                schema
                    .references()
                    .iter()
                    .filter(|r| r.kind() == ReferenceKind::BelongsTo)
                    .map(|r| naming::foreign_key(r.target())),
            )
            .chain(residual.keys().cloned());

        for name in required {
            if !attributes.contains(&name) {
                attributes.push(name);
            }
        }

        attributes
    }
}
