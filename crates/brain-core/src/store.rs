//! Snapshot store
//!
//! Persists the brain snapshot as JSON under a single slot key. The durable
//! slot is pluggable through [`SnapshotSlot`]; when it is missing or fails,
//! the store degrades to a process-wide in-memory map keyed by slot key.
//!
//! Every read goes through [`StoredSnapshot::resolve`], so callers only ever
//! see compatible snapshots. A legacy value that migrates successfully is
//! written back in its current shape.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::Result;
use crate::model::{BrainSnapshot, StoredSnapshot};

/// Durable key/value storage for serialized snapshots
pub trait SnapshotSlot: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, payload: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Slot backed by the `brain_slots` table
#[derive(Clone)]
pub struct DatabaseSlot {
    db: Database,
}

impl DatabaseSlot {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl SnapshotSlot for DatabaseSlot {
    fn read(&self, key: &str) -> Result<Option<String>> {
        self.db.read_slot(key)
    }

    fn write(&self, key: &str, payload: &str) -> Result<()> {
        self.db.write_slot(key, payload)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db.remove_slot(key).map(|_| ())
    }
}

/// Where a save ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageTier {
    Durable,
    /// Held only for the lifetime of the process
    Memory,
}

static MEMORY_FALLBACK: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();

fn memory() -> MutexGuard<'static, HashMap<String, String>> {
    MEMORY_FALLBACK
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct SnapshotStore {
    slot: Option<Arc<dyn SnapshotSlot>>,
    key: String,
}

impl SnapshotStore {
    pub fn new(slot: Arc<dyn SnapshotSlot>, key: impl Into<String>) -> Self {
        Self {
            slot: Some(slot),
            key: key.into(),
        }
    }

    /// Store with no durable slot; everything lives in the in-memory fallback
    pub fn memory_only(key: impl Into<String>) -> Self {
        Self {
            slot: None,
            key: key.into(),
        }
    }

    pub fn with_database(db: Database, key: impl Into<String>) -> Self {
        Self::new(Arc::new(DatabaseSlot::new(db)), key)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the stored snapshot, migrating legacy shapes
    ///
    /// Corrupt or unrecoverable payloads are reported as absent.
    pub fn load(&self) -> Option<BrainSnapshot> {
        let text = self.read_raw()?;

        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Stored brain snapshot is not valid JSON, ignoring");
                return None;
            }
        };

        let stored = StoredSnapshot::classify(Some(value));
        let migrated = stored.is_legacy();

        match stored.resolve(Utc::now()) {
            Some(snapshot) => {
                if migrated {
                    info!(key = %self.key, "Migrated legacy brain snapshot");
                    self.save(&snapshot);
                }
                Some(snapshot)
            }
            None => {
                warn!(key = %self.key, "Stored brain snapshot could not be migrated, ignoring");
                None
            }
        }
    }

    /// Persist a snapshot; falls back to memory when the durable slot fails
    pub fn save(&self, snapshot: &BrainSnapshot) -> StorageTier {
        let payload = match serde_json::to_string(snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                // Keep whatever was stored before
                warn!(error = %e, "Failed to serialize brain snapshot");
                return StorageTier::Memory;
            }
        };

        if let Some(slot) = &self.slot {
            match slot.write(&self.key, &payload) {
                Ok(()) => {
                    memory().remove(&self.key);
                    debug!(key = %self.key, "Persisted brain snapshot");
                    return StorageTier::Durable;
                }
                Err(e) => {
                    warn!(key = %self.key, error = %e, "Snapshot storage unavailable, keeping it in memory");
                }
            }
        }

        memory().insert(self.key.clone(), payload);
        StorageTier::Memory
    }

    /// Remove the durable slot and the in-memory fallback
    pub fn remove(&self) {
        if let Some(slot) = &self.slot {
            if let Err(e) = slot.remove(&self.key) {
                warn!(key = %self.key, error = %e, "Failed to remove stored brain snapshot");
            }
        }
        memory().remove(&self.key);
    }

    /// The fallback entry exists only while the durable slot is behind it,
    /// so it wins over whatever the slot still holds.
    fn read_raw(&self) -> Option<String> {
        if let Some(text) = memory().get(&self.key).cloned() {
            debug!(key = %self.key, "Reading brain snapshot from in-memory fallback");
            return Some(text);
        }

        let slot = self.slot.as_ref()?;
        match slot.read(&self.key) {
            Ok(text) => text,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Snapshot storage unavailable");
                None
            }
        }
    }
}
