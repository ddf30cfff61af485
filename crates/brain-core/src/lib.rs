//! Brain Core Library
//!
//! On-device neural core that learns from transaction history:
//! - Feature engineering over monthly financial signals
//! - Two single-unit sigmoid heads (next-month ratio, current-month nowcast)
//! - Content-fingerprinted retraining avoidance
//! - Versioned snapshot persistence with forward migration
//! - SQLite storage (SQLCipher encrypted) and history import

pub mod brain;
pub mod config;
pub mod db;
pub mod error;
pub mod evolution;
pub mod features;
pub mod import;
pub mod model;
pub mod models;
pub mod store;

/// History builders for tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use brain::Brain;
pub use config::{BrainConfig, NowcastGate};
pub use db::Database;
pub use error::{Error, Result};
pub use evolution::{
    EpochProgress, EpochScheduler, EvolutionReason, EvolutionResult, EvolveOptions, TokioYield,
};
pub use features::{build_dataset, Dataset, MonthlySignal, FEATURE_NAMES, FEATURE_VECTOR_SIZE};
pub use model::{BrainSnapshot, FeatureContribution, HeadKind, NeuralHead, Prediction};
pub use models::{Category, EvolutionRun, SpendingNature, Transaction, TransactionType};
pub use store::{DatabaseSlot, SnapshotSlot, SnapshotStore, StorageTier};
