use crate::store::{
    BatchWriteOutput, DataStore, IndexQuery, Item, PutCondition, QueryPage, SortOrder, StoreError,
    StoreErrorKind, StoreKey, WriteRequest,
};
use async_trait::async_trait;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

type BatchFilter = Arc<dyn Fn(&WriteRequest) -> bool + Send + Sync>;

///
/// MemoryStore
///
/// In-process single-table store. Secondary indexes are evaluated by
/// scanning for items that carry the index's key fields, so rows missing
/// a field are absent from that index (sparse indexes).
///
/// Cursors are opaque offsets into the ordered result set. A batch write
/// is validated as a whole before any request in it is applied.
///

#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<StoreKey, Item>>,
    page_size: Option<usize>,
    unprocessed: Mutex<Option<(BatchFilter, usize)>>,
    unavailable: AtomicBool,
    stats: Stats,
}

#[derive(Default)]
struct Stats {
    gets: AtomicUsize,
    puts: AtomicUsize,
    deletes: AtomicUsize,
    batch_writes: AtomicUsize,
    queries: AtomicUsize,
}

///
/// StoreStats
/// Call counters; `deletes` counts every key deleted, batched or not.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StoreStats {
    pub gets: usize,
    pub puts: usize,
    pub deletes: usize,
    pub batch_writes: usize,
    pub queries: usize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that returns at most `page_size` items per query call, the way
    /// a remote table caps response sizes.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size: Some(page_size.max(1)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_items().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_items().is_empty()
    }

    /// Raw item by table key, bypassing stats.
    #[must_use]
    pub fn item(&self, key: &StoreKey) -> Option<Item> {
        self.lock_items().get(key).cloned()
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            gets: self.stats.gets.load(Ordering::Relaxed),
            puts: self.stats.puts.load(Ordering::Relaxed),
            deletes: self.stats.deletes.load(Ordering::Relaxed),
            batch_writes: self.stats.batch_writes.load(Ordering::Relaxed),
            queries: self.stats.queries.load(Ordering::Relaxed),
        }
    }

    /// For the next `passes` batch writes, hand back every request matching
    /// `filter` as unprocessed instead of applying it.
    pub fn leave_unprocessed(
        &self,
        filter: impl Fn(&WriteRequest) -> bool + Send + Sync + 'static,
        passes: usize,
    ) {
        let fault = (passes > 0).then(|| (Arc::new(filter) as BatchFilter, passes));

        *self
            .unprocessed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = fault;
    }

    /// Fail every call with `StoreErrorKind::Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn lock_items(&self) -> std::sync::MutexGuard<'_, BTreeMap<StoreKey, Item>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(StoreError::new(
                StoreErrorKind::Unavailable,
                "memory store is marked unavailable",
            ));
        }

        Ok(())
    }

    // take_batch_filter
    // consumes one pass of the injected fault, if any
    fn take_batch_filter(&self) -> Option<BatchFilter> {
        let mut slot = self
            .unprocessed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let (filter, passes) = slot.as_mut()?;
        let filter = filter.clone();
        *passes -= 1;
        if *passes == 0 {
            *slot = None;
        }

        Some(filter)
    }

    fn key_of(item: &Item) -> Result<StoreKey, StoreError> {
        StoreKey::of_item(item).ok_or_else(|| {
            StoreError::new(
                StoreErrorKind::InvalidRequest,
                "item is missing its table key fields",
            )
        })
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn get(&self, key: &StoreKey) -> Result<Option<Item>, StoreError> {
        self.ensure_available()?;
        self.stats.gets.fetch_add(1, Ordering::Relaxed);

        Ok(self.lock_items().get(key).cloned())
    }

    async fn put(&self, item: Item, condition: PutCondition) -> Result<(), StoreError> {
        self.ensure_available()?;
        let key = Self::key_of(&item)?;
        let mut items = self.lock_items();

        if condition == PutCondition::IfAbsent && items.contains_key(&key) {
            return Err(StoreError::new(
                StoreErrorKind::ConditionFailed,
                format!("item '{key}' already exists"),
            ));
        }

        self.stats.puts.fetch_add(1, Ordering::Relaxed);
        items.insert(key, item);

        Ok(())
    }

    async fn delete(&self, key: &StoreKey) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        self.lock_items().remove(key);

        Ok(())
    }

    async fn batch_write(
        &self,
        requests: Vec<WriteRequest>,
    ) -> Result<BatchWriteOutput, StoreError> {
        self.ensure_available()?;

        // reject malformed batches before touching anything
        let keyed = requests
            .into_iter()
            .map(|request| {
                let key = match &request {
                    WriteRequest::Delete(key) => key.clone(),
                    WriteRequest::Put { item, .. } => Self::key_of(item)?,
                };
                Ok((key, request))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        self.stats.batch_writes.fetch_add(1, Ordering::Relaxed);
        let filter = self.take_batch_filter();
        let mut output = BatchWriteOutput::default();
        let mut items = self.lock_items();

        for (key, request) in keyed {
            if filter.as_ref().is_some_and(|f| f(&request)) {
                output.unprocessed.push(request);
                continue;
            }

            match request {
                WriteRequest::Delete(_) => {
                    self.stats.deletes.fetch_add(1, Ordering::Relaxed);
                    items.remove(&key);
                }
                WriteRequest::Put { condition, .. }
                    if condition == PutCondition::IfAbsent && items.contains_key(&key) =>
                {
                    output.conflicts.push(request);
                }
                WriteRequest::Put { item, .. } => {
                    self.stats.puts.fetch_add(1, Ordering::Relaxed);
                    items.insert(key, item);
                }
            }
        }

        Ok(output)
    }

    async fn query(&self, query: IndexQuery) -> Result<QueryPage, StoreError> {
        self.ensure_available()?;
        self.stats.queries.fetch_add(1, Ordering::Relaxed);

        let offset = match &query.cursor {
            Some(cursor) => cursor.parse::<usize>().map_err(|_| {
                StoreError::new(
                    StoreErrorKind::InvalidRequest,
                    format!("malformed cursor '{cursor}'"),
                )
            })?,
            None => 0,
        };

        let mut matched: Vec<(String, StoreKey, Item)> = self
            .lock_items()
            .iter()
            .filter_map(|(key, item)| {
                let pk = item.get(&query.pk_field).and_then(Value::as_str)?;
                let sk = item.get(&query.sk_field).and_then(Value::as_str)?;
                if pk != query.pk {
                    return None;
                }
                if let Some(condition) = &query.sk
                    && !condition.matches(sk)
                {
                    return None;
                }

                Some((sk.to_string(), key.clone(), item.clone()))
            })
            .collect();

        matched.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        if query.order == SortOrder::Desc {
            matched.reverse();
        }

        let total = matched.len();
        let take = match (query.limit, self.page_size) {
            (Some(limit), Some(size)) => limit.min(size),
            (limit, size) => limit.or(size).unwrap_or(usize::MAX),
        };
        let items: Vec<Item> = matched
            .into_iter()
            .skip(offset)
            .take(take)
            .map(|(_, _, item)| match &query.attributes {
                Some(attributes) => item
                    .into_iter()
                    .filter(|(name, _)| attributes.contains(name))
                    .collect(),
                None => item,
            })
            .collect();

        let next = offset + items.len();
        let cursor = (next < total).then(|| next.to_string());

        Ok(QueryPage { items, cursor })
    }
}
