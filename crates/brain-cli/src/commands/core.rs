//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `open_brain` - Database plus a `Brain` bound to it
//! - `load_config` - Brain configuration resolution
//! - `cmd_init` - Initialize the brain snapshot

use std::path::Path;

use anyhow::{Context, Result};
use brain_core::{Brain, BrainConfig, Database};
use tracing::debug;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

pub fn open_brain(db_path: &Path, no_encrypt: bool, config: &BrainConfig) -> Result<(Database, Brain)> {
    let db = open_db(db_path, no_encrypt)?;
    let brain = Brain::with_database(db.clone(), config.clone());
    debug!(db = %db_path.display(), slot = %config.slot_key, "Opened brain");
    Ok((db, brain))
}

/// Explicit path first, then the data dir override, then built-in defaults
pub fn load_config(path: Option<&Path>) -> Result<BrainConfig> {
    match path {
        Some(path) => BrainConfig::from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => BrainConfig::load().context("Failed to load config"),
    }
}

pub fn cmd_init(brain: &Brain, db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing brain at {}...", db_path.display());

    let existed = brain.get_brain_snapshot().is_some();
    let snapshot = brain.initialize_brain();

    if existed {
        println!("   Existing snapshot kept (updated {})", snapshot.updated_at.format("%Y-%m-%d %H:%M"));
    } else {
        println!("   Created newborn snapshot (v{})", snapshot.version);
    }

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Brain ready!");
    println!();
    println!("Next steps:");
    println!("  1. Train: brain evolve --transactions history.csv --categories categories.csv");
    println!("  2. Inspect: brain status");

    Ok(())
}
