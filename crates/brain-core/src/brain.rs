//! Core façade
//!
//! `Brain` is what hosts hold on to. Nothing here returns an error: storage
//! problems degrade to the in-memory fallback inside the store, and
//! "can't train" outcomes are reported through [`EvolutionReason`].
//!
//! [`EvolutionReason`]: crate::evolution::EvolutionReason

use chrono::Utc;
use tracing::info;

use crate::config::BrainConfig;
use crate::db::Database;
use crate::evolution::{evolve, EvolutionResult, EvolveOptions};
use crate::model::{newborn_snapshot, BrainSnapshot};
use crate::models::{Category, Transaction};
use crate::store::SnapshotStore;

#[derive(Clone)]
pub struct Brain {
    store: SnapshotStore,
    config: BrainConfig,
}

impl Brain {
    pub fn new(store: SnapshotStore, config: BrainConfig) -> Self {
        Self { store, config }
    }

    /// Brain persisted in the database under the configured slot key
    pub fn with_database(db: Database, config: BrainConfig) -> Self {
        let store = SnapshotStore::with_database(db, config.slot_key.clone());
        Self::new(store, config)
    }

    /// Brain with no durable storage
    pub fn memory_only(config: BrainConfig) -> Self {
        let store = SnapshotStore::memory_only(config.slot_key.clone());
        Self::new(store, config)
    }

    pub fn config(&self) -> &BrainConfig {
        &self.config
    }

    /// Return the stored snapshot, or create and persist a newborn one
    pub fn initialize_brain(&self) -> BrainSnapshot {
        if let Some(existing) = self.store.load() {
            return existing;
        }

        let snapshot = newborn_snapshot(
            Utc::now(),
            self.config.next_month_learning_rate,
            self.config.current_month_learning_rate,
        );
        let tier = self.store.save(&snapshot);
        info!(key = %self.store.key(), storage = ?tier, "Initialized new brain");
        snapshot
    }

    pub fn get_brain_snapshot(&self) -> Option<BrainSnapshot> {
        self.store.load()
    }

    /// Forget everything: the stored snapshot and any in-memory fallback
    pub fn reset_brain(&self) {
        self.store.remove();
        info!(key = %self.store.key(), "Brain reset");
    }

    pub async fn evolve_brain_from_history(
        &self,
        transactions: &[Transaction],
        categories: &[Category],
        options: &EvolveOptions,
    ) -> EvolutionResult {
        evolve(&self.store, &self.config, transactions, categories, options).await
    }
}
