//! In-memory remote journal with failure injection.
//!
//! Behaves like the HTTP journal from the engine's point of view: records
//! live in collections, titles are not unique, and every call is counted so
//! tests can assert on network traffic.

use super::client::{Filter, JournalClient, RelationIds, RemoteError, RemoteRecord};
use crate::domain::{CollectionId, RemoteId};
use crate::fields::{Field, FieldMap, FieldValue};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

/// Number of calls made per client operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub queries: usize,
    pub creates: usize,
    pub retrieves: usize,
    pub updates: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.queries + self.creates + self.retrieves + self.updates
    }
}

/// How many create attempts for a title should fail before succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailurePlan {
    Times(u32),
    Always,
}

#[derive(Debug, Default)]
struct JournalState {
    records: BTreeMap<RemoteId, RemoteRecord>,
    next_id: u64,
    create_failures: HashMap<String, FailurePlan>,
    rejected_titles: HashSet<String>,
    failing_collections: HashSet<CollectionId>,
    failing_point_queries: HashSet<String>,
    frozen_fields: HashSet<Field>,
    calls: CallCounts,
}

impl JournalState {
    fn allocate_id(&mut self) -> RemoteId {
        self.next_id += 1;
        RemoteId(format!("page-{:04}", self.next_id))
    }

    fn insert(
        &mut self,
        collection: &CollectionId,
        title: String,
        fields: FieldMap,
        relations: Option<RelationIds>,
    ) -> RemoteRecord {
        let id = self.allocate_id();
        let record = RemoteRecord {
            id: id.clone(),
            collection: collection.clone(),
            title,
            fields,
            relations,
        };
        self.records.insert(id, record.clone());
        record
    }
}

/// Thread-safe in-memory `JournalClient`.
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    state: Mutex<JournalState>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JournalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a dimension page (ticker or day) and return its id.
    pub fn add_dimension(&self, collection: &CollectionId, key: &str) -> RemoteId {
        self.lock().insert(collection, key.to_string(), FieldMap::new(), None).id
    }

    /// Insert a trade page directly, bypassing failure injection.
    pub fn seed(&self, collection: &CollectionId, title: &str, mut fields: FieldMap) -> RemoteId {
        fields.insert(Field::Title, FieldValue::Text(title.to_string()));
        self.lock().insert(collection, title.to_string(), fields, None).id
    }

    /// Overwrite one field of a stored record, simulating a remote edit.
    pub fn set_field(&self, id: &RemoteId, field: Field, value: FieldValue) {
        if let Some(rec) = self.lock().records.get_mut(id) {
            rec.fields.insert(field, value);
        }
    }

    /// Remove one field of a stored record.
    pub fn clear_field(&self, id: &RemoteId, field: Field) {
        if let Some(rec) = self.lock().records.get_mut(id) {
            rec.fields.remove(&field);
        }
    }

    /// Delete a record, simulating removal on the remote side.
    pub fn delete(&self, id: &RemoteId) {
        self.lock().records.remove(id);
    }

    /// The next `times` creates of `title` fail with a transport error.
    pub fn fail_creates(&self, title: &str, times: u32) {
        self.lock()
            .create_failures
            .insert(title.to_string(), FailurePlan::Times(times));
    }

    /// Every create of `title` fails with a transport error.
    pub fn always_fail_creates(&self, title: &str) {
        self.lock()
            .create_failures
            .insert(title.to_string(), FailurePlan::Always);
    }

    /// Creates of `title` are rejected as invalid (not retryable).
    pub fn reject_creates(&self, title: &str) {
        self.lock().rejected_titles.insert(title.to_string());
    }

    /// Bulk and point queries against `collection` fail with a transport error.
    pub fn fail_queries(&self, collection: &CollectionId) {
        self.lock().failing_collections.insert(collection.clone());
    }

    /// Point lookups for `title` fail with a transport error.
    pub fn fail_point_queries(&self, title: &str) {
        self.lock().failing_point_queries.insert(title.to_string());
    }

    /// Updates leave `field` untouched, simulating a remote that drops it.
    pub fn freeze_field(&self, field: Field) {
        self.lock().frozen_fields.insert(field);
    }

    pub fn record(&self, id: &RemoteId) -> Option<RemoteRecord> {
        self.lock().records.get(id).cloned()
    }

    pub fn records_in(&self, collection: &CollectionId) -> Vec<RemoteRecord> {
        self.lock()
            .records
            .values()
            .filter(|r| &r.collection == collection)
            .cloned()
            .collect()
    }

    pub fn find_by_title(&self, collection: &CollectionId, title: &str) -> Option<RemoteRecord> {
        self.lock()
            .records
            .values()
            .find(|r| &r.collection == collection && r.title == title)
            .cloned()
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }
}

impl JournalClient for InMemoryJournal {
    fn name(&self) -> &str {
        "in_memory"
    }

    fn query_by_filter(
        &self,
        collection: &CollectionId,
        filter: &Filter,
    ) -> Result<Vec<RemoteRecord>, RemoteError> {
        let mut state = self.lock();
        state.calls.queries += 1;

        if state.failing_collections.contains(collection) {
            return Err(RemoteError::Transport(format!(
                "injected query failure for collection {collection}"
            )));
        }
        if let Filter::TitleEquals(title) = filter {
            if state.failing_point_queries.contains(title) {
                return Err(RemoteError::Transport(format!(
                    "injected lookup failure for {title}"
                )));
            }
        }

        Ok(state
            .records
            .values()
            .filter(|r| &r.collection == collection && filter.accepts(&r.title))
            .cloned()
            .collect())
    }

    fn create_record(
        &self,
        collection: &CollectionId,
        relations: &RelationIds,
        fields: &FieldMap,
    ) -> Result<RemoteRecord, RemoteError> {
        let mut state = self.lock();
        state.calls.creates += 1;

        let title = fields
            .get(&Field::Title)
            .and_then(FieldValue::as_str)
            .ok_or_else(|| RemoteError::Rejected {
                status: 400,
                message: "title property is required".into(),
            })?
            .to_string();

        if state.rejected_titles.contains(&title) {
            return Err(RemoteError::Rejected {
                status: 400,
                message: format!("validation failed for {title}"),
            });
        }

        match state.create_failures.get(&title).copied() {
            Some(FailurePlan::Always) => {
                return Err(RemoteError::Transport(format!(
                    "injected create failure for {title}"
                )));
            }
            Some(FailurePlan::Times(n)) if n > 0 => {
                state
                    .create_failures
                    .insert(title.clone(), FailurePlan::Times(n - 1));
                return Err(RemoteError::Transport(format!(
                    "injected create failure for {title}"
                )));
            }
            _ => {}
        }

        Ok(state.insert(collection, title, fields.clone(), Some(relations.clone())))
    }

    fn retrieve_record(&self, id: &RemoteId) -> Result<RemoteRecord, RemoteError> {
        let mut state = self.lock();
        state.calls.retrieves += 1;
        state
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    fn update_record(&self, id: &RemoteId, fields: &FieldMap) -> Result<RemoteRecord, RemoteError> {
        let mut state = self.lock();
        state.calls.updates += 1;
        let frozen = state.frozen_fields.clone();
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        for (field, value) in fields {
            if !frozen.contains(field) {
                record.fields.insert(*field, value.clone());
            }
        }
        Ok(record.clone())
    }
}
