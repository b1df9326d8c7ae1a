//! Snapshot persistence seam.
//!
//! The core only fixes the key (`Fingerprint`) and the snapshot shape; where
//! snapshots live is up to the implementation.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::fingerprint::Fingerprint;
use crate::models::coverage::CoverageRow;
use crate::models::facts::ExtractedFacts;
use crate::models::line_item::NormalizedLineItem;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Snapshot store unavailable: {0}")]
    Unavailable(String),

    #[error("Snapshot store lock poisoned")]
    LockPoisoned,
}

/// Everything persisted for one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSnapshot {
    pub fingerprint: Fingerprint,
    pub canonical: String,
    pub facts: ExtractedFacts,
    pub line_items: Vec<NormalizedLineItem>,
    /// Coverage rows that include at least one of this document's items.
    pub coverage_rows: Vec<CoverageRow>,
    pub saved_at: DateTime<Utc>,
}

pub trait SnapshotStore: Send + Sync {
    /// Insert or replace the snapshot stored under `fingerprint`.
    fn put(&self, fingerprint: &Fingerprint, snapshot: DocumentSnapshot) -> Result<(), StoreError>;

    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<DocumentSnapshot>, StoreError>;

    /// Stored fingerprints in key order.
    fn list(&self) -> Result<Vec<Fingerprint>, StoreError>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<BTreeMap<Fingerprint, DocumentSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn put(&self, fingerprint: &Fingerprint, snapshot: DocumentSnapshot) -> Result<(), StoreError> {
        let mut guard = self.snapshots.write().map_err(|_| StoreError::LockPoisoned)?;
        guard.insert(fingerprint.clone(), snapshot);
        Ok(())
    }

    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<DocumentSnapshot>, StoreError> {
        let guard = self.snapshots.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(guard.get(fingerprint).cloned())
    }

    fn list(&self) -> Result<Vec<Fingerprint>, StoreError> {
        let guard = self.snapshots.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(guard.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::facts::FactKey;
    use crate::pipeline::fingerprint::{canonicalize, fingerprint};

    fn snapshot(patient: &str) -> DocumentSnapshot {
        let facts = ExtractedFacts::new().with(FactKey::PatientName, patient);
        let canonical = canonicalize(&facts);
        DocumentSnapshot {
            fingerprint: fingerprint(&canonical),
            canonical,
            facts,
            line_items: vec![],
            coverage_rows: vec![],
            saved_at: Utc::now(),
        }
    }

    #[test]
    fn put_get_list() {
        let store = MemorySnapshotStore::new();
        let a = snapshot("Jane Roe");
        let b = snapshot("John Roe");

        store.put(&a.fingerprint, a.clone()).unwrap();
        store.put(&b.fingerprint, b.clone()).unwrap();

        assert_eq!(store.get(&a.fingerprint).unwrap(), Some(a.clone()));
        let mut expected = vec![a.fingerprint.clone(), b.fingerprint.clone()];
        expected.sort();
        assert_eq!(store.list().unwrap(), expected);
    }

    #[test]
    fn put_replaces_existing() {
        let store = MemorySnapshotStore::new();
        let first = snapshot("Jane Roe");
        let mut second = first.clone();
        second.canonical = "replaced".into();

        store.put(&first.fingerprint, first.clone()).unwrap();
        store.put(&first.fingerprint, second).unwrap();

        assert_eq!(store.list().unwrap().len(), 1);
        let stored = store.get(&first.fingerprint).unwrap().unwrap();
        assert_eq!(stored.canonical, "replaced");
    }

    #[test]
    fn missing_key_is_none() {
        let store = MemorySnapshotStore::new();
        assert_eq!(store.get(&fingerprint("nothing")).unwrap(), None);
    }

    #[test]
    fn store_is_shareable_across_threads() {
        let store = MemorySnapshotStore::new();
        std::thread::scope(|s| {
            for name in ["a", "b", "c", "d"] {
                let store = &store;
                s.spawn(move || {
                    let snap = snapshot(name);
                    store.put(&snap.fingerprint, snap.clone()).unwrap();
                });
            }
        });
        assert_eq!(store.list().unwrap().len(), 4);
    }
}
