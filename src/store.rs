//! Persistence for progress records and the completion log.
//!
//! The store is the transaction unit of the whole subsystem: a commit
//! couples the record write with the completion-log insert and is guarded
//! by an optimistic version check, so one event can never leave partial
//! credit behind and concurrent duplicates surface as conflicts the engine
//! retries.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{CompletionKey, ProgressRecord};
use crate::error::ProgressError;

/// Version 0 means "not persisted yet"; a commit with `expected_version: 0`
/// only succeeds if no record exists for the user.
pub type Version = u64;

#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Load a user's record together with its current version.
    async fn load(&self, user_id: &str) -> Result<Option<(ProgressRecord, Version)>, ProgressError>;

    /// Write `record` if the stored version still equals `expected_version`,
    /// atomically inserting `completion` into the log when present.
    /// Returns the new version, or `PersistenceConflict` on a stale read.
    async fn commit(
        &self,
        record: ProgressRecord,
        expected_version: Version,
        completion: Option<CompletionKey>,
    ) -> Result<Version, ProgressError>;

    /// Has this discrete event already been credited?
    async fn has_completion(&self, key: &CompletionKey) -> Result<bool, ProgressError>;

    /// Soft-disable (or re-enable) a record. Records are never hard-deleted.
    async fn set_disabled(&self, user_id: &str, disabled: bool) -> Result<(), ProgressError>;
}

struct Versioned {
    record: ProgressRecord,
    version: Version,
}

/// In-process store. One write lock covers both maps so the record write
/// and the log insert land together.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Versioned>>,
    completions: RwLock<HashSet<CompletionKey>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn load(&self, user_id: &str) -> Result<Option<(ProgressRecord, Version)>, ProgressError> {
        let records = self.records.read().await;
        Ok(records.get(user_id).map(|v| (v.record.clone(), v.version)))
    }

    async fn commit(
        &self,
        record: ProgressRecord,
        expected_version: Version,
        completion: Option<CompletionKey>,
    ) -> Result<Version, ProgressError> {
        let mut records = self.records.write().await;
        let mut completions = self.completions.write().await;

        let current = records.get(&record.user_id).map(|v| v.version).unwrap_or(0);
        if current != expected_version {
            debug!(target: "progress", user_id = %record.user_id, expected = expected_version, current, "Version conflict on commit");
            return Err(ProgressError::PersistenceConflict(record.user_id.clone()));
        }

        if let Some(key) = completion {
            completions.insert(key);
        }
        let next = current + 1;
        let user_id = record.user_id.clone();
        records.insert(user_id, Versioned { record, version: next });
        Ok(next)
    }

    async fn has_completion(&self, key: &CompletionKey) -> Result<bool, ProgressError> {
        Ok(self.completions.read().await.contains(key))
    }

    async fn set_disabled(&self, user_id: &str, disabled: bool) -> Result<(), ProgressError> {
        let mut records = self.records.write().await;
        match records.get_mut(user_id) {
            Some(v) => {
                v.record.disabled = disabled;
                v.version += 1;
                Ok(())
            }
            None => Err(ProgressError::not_found("user", user_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CompletionKind;

    #[tokio::test]
    async fn commit_rejects_stale_version() {
        let store = MemoryStore::new();
        let r = ProgressRecord::new("u1");
        let v1 = store.commit(r.clone(), 0, None).await.unwrap();
        assert_eq!(v1, 1);

        // A second writer that read version 0 must lose.
        let res = store.commit(r.clone(), 0, None).await;
        assert!(matches!(res, Err(ProgressError::PersistenceConflict(_))));

        // The winner's successor commit goes through.
        let v2 = store.commit(r, v1, None).await.unwrap();
        assert_eq!(v2, 2);
    }

    #[tokio::test]
    async fn commit_with_log_entry_is_atomic() {
        let store = MemoryStore::new();
        let key = CompletionKey::new("u1", CompletionKind::Lesson, "l1");
        assert!(!store.has_completion(&key).await.unwrap());

        let r = ProgressRecord::new("u1");
        store.commit(r, 0, Some(key.clone())).await.unwrap();
        assert!(store.has_completion(&key).await.unwrap());

        let (loaded, version) = store.load("u1").await.unwrap().unwrap();
        assert_eq!(loaded.user_id, "u1");
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn set_disabled_is_soft() {
        let store = MemoryStore::new();
        store.commit(ProgressRecord::new("u1"), 0, None).await.unwrap();
        store.set_disabled("u1", true).await.unwrap();
        let (r, _) = store.load("u1").await.unwrap().unwrap();
        assert!(r.disabled);
        // Still present, never deleted.
        store.set_disabled("u1", false).await.unwrap();
        let (r, _) = store.load("u1").await.unwrap().unwrap();
        assert!(!r.disabled);
    }

    #[tokio::test]
    async fn set_disabled_unknown_user_is_not_found() {
        let store = MemoryStore::new();
        let res = store.set_disabled("ghost", true).await;
        assert!(matches!(res, Err(ProgressError::NotFound { .. })));
    }
}
