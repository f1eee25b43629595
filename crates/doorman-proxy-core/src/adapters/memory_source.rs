//! # In-Memory Configuration Source
//!
//! Thread-safe in-memory [`SourceStore`] for development and testing.
//!
//! Items are kept per record type in insertion order. A single mutex guards
//! all state, so `pop_oldest` is atomic across concurrent callers.

use crate::auth::WebhookPolicy;
use crate::store::{Record, RecordType, SourceStore, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

struct StoredItem {
    key: String,
    record: Record,
}

#[derive(Default)]
struct SourceState {
    /// Registered types and their prototypes
    types: HashMap<RecordType, Value>,
    items: HashMap<RecordType, VecDeque<StoredItem>>,
}

impl SourceState {
    fn ensure_registered(&self, record_type: RecordType) -> Result<(), StoreError> {
        if self.types.contains_key(&record_type) {
            Ok(())
        } else {
            Err(StoreError::TypeNotRegistered { record_type })
        }
    }

    fn register(&mut self, record_type: RecordType) {
        self.types
            .entry(record_type)
            .or_insert_with(|| record_type.prototype());
    }

    fn upsert(&mut self, key: &str, record: Record) {
        let queue = self.items.entry(record.record_type()).or_default();
        match queue.iter_mut().find(|item| item.key == key) {
            Some(existing) => existing.record = record,
            None => queue.push_back(StoredItem {
                key: key.to_string(),
                record,
            }),
        }
    }
}

/// In-memory configuration source
#[derive(Clone, Default)]
pub struct InMemorySource {
    state: Arc<Mutex<SourceState>>,
}

impl InMemorySource {
    /// Create an empty source with no registered types
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source with every record type registered and the given policies loaded
    pub fn with_policies(policies: Vec<WebhookPolicy>) -> Self {
        let source = Self::new();
        {
            let mut state = source.lock_state();
            for record_type in RecordType::ALL {
                state.register(record_type);
            }
            for (index, policy) in policies.into_iter().enumerate() {
                state.upsert(&format!("webhook-{}", index), Record::WebhookPolicy(policy));
            }
        }
        source
    }

    /// Whether a record type has been registered
    pub fn is_registered(&self, record_type: RecordType) -> bool {
        self.lock_state().types.contains_key(&record_type)
    }

    /// Number of stored records of a type
    pub fn len(&self, record_type: RecordType) -> usize {
        self.lock_state()
            .items
            .get(&record_type)
            .map_or(0, VecDeque::len)
    }

    /// Whether no records of a type are stored
    pub fn is_empty(&self, record_type: RecordType) -> bool {
        self.len(record_type) == 0
    }

    fn lock_state(&self) -> MutexGuard<'_, SourceState> {
        // The state stays consistent even if a holder panicked mid-call.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SourceStore for InMemorySource {
    async fn register_type(&self, record_type: RecordType) -> Result<(), StoreError> {
        self.lock_state().register(record_type);
        Ok(())
    }

    async fn load_items(&self, record_type: RecordType) -> Result<Vec<Record>, StoreError> {
        let state = self.lock_state();
        state.ensure_registered(record_type)?;

        Ok(state
            .items
            .get(&record_type)
            .map(|items| items.iter().map(|item| item.record.clone()).collect())
            .unwrap_or_default())
    }

    async fn save(&self, key: &str, record: Record) -> Result<(), StoreError> {
        let mut state = self.lock_state();
        state.ensure_registered(record.record_type())?;
        state.upsert(key, record);
        Ok(())
    }

    async fn pop_oldest(&self, record_type: RecordType) -> Result<Option<Record>, StoreError> {
        let mut state = self.lock_state();
        state.ensure_registered(record_type)?;

        Ok(state
            .items
            .get_mut(&record_type)
            .and_then(VecDeque::pop_front)
            .map(|item| item.record))
    }
}

#[cfg(test)]
#[path = "memory_source_tests.rs"]
mod tests;
