//! Captured message history

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::StoreError;
use crate::http::{HistoryId, HistoryType, HttpMessage};

/// Persistence-facing projection of a stored message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Store identifier
    pub id: HistoryId,

    /// Origin of the message
    pub history_type: HistoryType,

    /// Owning session
    pub session_id: Uuid,

    /// HTTP method
    pub method: String,

    /// Request URL
    pub url: String,

    /// When the message was first stored
    pub created_at: DateTime<Utc>,

    /// Notes added after capture
    pub note: Option<String>,
}

/// Store-by-id service for captured messages.
///
/// A record is created exactly once per `store` call; afterwards only its
/// note changes.
pub trait MessageStore: Send + Sync {
    /// Persist a message and return its new identifier
    fn store(&self, message: &HttpMessage, history_type: HistoryType)
        -> Result<HistoryId, StoreError>;

    /// Load a stored message
    fn load(&self, id: HistoryId) -> Result<HttpMessage, StoreError>;

    /// Attach a note to a stored message
    fn attach_note(&self, id: HistoryId, text: &str) -> Result<(), StoreError>;

    /// Projection of a stored message
    fn record(&self, id: HistoryId) -> Result<HistoryRecord, StoreError>;
}

struct StoredEntry {
    record: HistoryRecord,
    message: HttpMessage,
}

/// In-memory message store owned by one scan session
pub struct InMemoryStore {
    /// Session that owns every record
    session_id: Uuid,

    /// Entries by id
    entries: RwLock<HashMap<u64, StoredEntry>>,

    /// Next ID counter
    next_id: RwLock<u64>,

    /// Maximum number of entries to keep
    max_entries: usize,
}

impl InMemoryStore {
    pub fn new(session_id: Uuid, max_entries: usize) -> Self {
        Self {
            session_id,
            entries: RwLock::new(HashMap::new()),
            next_id: RwLock::new(1),
            max_entries,
        }
    }

    /// Session this store belongs to
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// All records, oldest first
    pub fn records(&self) -> Vec<HistoryRecord> {
        let mut records: Vec<_> = self
            .entries
            .read()
            .values()
            .map(|e| e.record.clone())
            .collect();
        records.sort_by_key(|r| r.id);
        records
    }

    /// Records of one history type, oldest first
    pub fn records_of_type(&self, history_type: HistoryType) -> Vec<HistoryRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.history_type == history_type)
            .collect()
    }

    /// Get entry count
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if history is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Uuid::new_v4(), 100_000)
    }
}

impl MessageStore for InMemoryStore {
    fn store(
        &self,
        message: &HttpMessage,
        history_type: HistoryType,
    ) -> Result<HistoryId, StoreError> {
        let mut entries = self.entries.write();
        if entries.len() >= self.max_entries {
            return Err(StoreError::Full(self.max_entries));
        }

        let id = {
            let mut next_id = self.next_id.write();
            let id = HistoryId(*next_id);
            *next_id += 1;
            id
        };

        let mut stored = message.clone();
        stored.id = Some(id);
        stored.history_type = history_type;

        let record = HistoryRecord {
            id,
            history_type,
            session_id: self.session_id,
            method: stored.request.method.clone(),
            url: stored.url_string(),
            created_at: Utc::now(),
            note: stored.note.clone(),
        };

        tracing::trace!(id = %id, history_type = history_type.as_str(), url = %record.url, "Stored message");
        entries.insert(
            id.0,
            StoredEntry {
                record,
                message: stored,
            },
        );

        Ok(id)
    }

    fn load(&self, id: HistoryId) -> Result<HttpMessage, StoreError> {
        self.entries
            .read()
            .get(&id.0)
            .map(|e| e.message.clone())
            .ok_or(StoreError::NotFound(id.0))
    }

    fn attach_note(&self, id: HistoryId, text: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(&id.0).ok_or(StoreError::NotFound(id.0))?;
        entry.record.note = Some(text.to_string());
        entry.message.note = Some(text.to_string());
        Ok(())
    }

    fn record(&self, id: HistoryId) -> Result<HistoryRecord, StoreError> {
        self.entries
            .read()
            .get(&id.0)
            .map(|e| e.record.clone())
            .ok_or(StoreError::NotFound(id.0))
    }
}
