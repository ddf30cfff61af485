//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::path::PathBuf;

use brain_core::{Brain, BrainConfig, Database, EvolutionReason};
use clap::Parser;
use tempfile::TempDir;

use crate::cli::{Cli, Commands};
use crate::commands::{self, format_cents};

/// Database plus a brain bound to a test-specific slot
fn setup(slot_key: &str) -> (Database, Brain) {
    let db = Database::in_memory().unwrap();
    let config = BrainConfig {
        slot_key: slot_key.to_string(),
        ..BrainConfig::default()
    };
    let brain = Brain::with_database(db.clone(), config);
    (db, brain)
}

/// Write four months of history and its categories, returning their paths
fn write_history(dir: &TempDir) -> (PathBuf, PathBuf) {
    let transactions = dir.path().join("transactions.csv");
    let categories = dir.path().join("categories.csv");

    let mut csv = String::from("date,type,amount,category_id\n");
    for (month, dining) in [(1, 180), (2, 240), (3, 150), (4, 310)] {
        csv.push_str(&format!("2025-{:02}-01,income,3500.00,salary\n", month));
        csv.push_str(&format!("2025-{:02}-04,expense,1200.00,rent\n", month));
        csv.push_str(&format!("2025-{:02}-18,expense,{}.00,dining\n", month, dining));
    }
    std::fs::write(&transactions, csv).unwrap();
    std::fs::write(
        &categories,
        "id,spending_nature\nsalary,essential\nrent,essential\ndining,comfort\n",
    )
    .unwrap();

    (transactions, categories)
}

// ========== Argument Parsing Tests ==========

#[test]
fn test_cli_parses_evolve() {
    let cli = Cli::try_parse_from([
        "brain",
        "--no-encrypt",
        "evolve",
        "--transactions",
        "tx.csv",
        "--categories",
        "cats.csv",
        "--period",
        "2025-03",
        "--json",
    ])
    .unwrap();

    assert!(cli.no_encrypt);
    assert_eq!(cli.db, PathBuf::from("brain.db"));
    match cli.command {
        Commands::Evolve {
            transactions,
            period,
            json,
            ..
        } => {
            assert_eq!(transactions, PathBuf::from("tx.csv"));
            assert_eq!(period.as_deref(), Some("2025-03"));
            assert!(json);
        }
        _ => panic!("expected evolve"),
    }
}

#[test]
fn test_cli_history_default_limit() {
    let cli = Cli::try_parse_from(["brain", "history"]).unwrap();
    assert!(matches!(cli.command, Commands::History { limit: 10 }));
}

#[test]
fn test_cli_requires_inputs_for_evolve() {
    assert!(Cli::try_parse_from(["brain", "evolve", "--transactions", "tx.csv"]).is_err());
}

// ========== Command Tests ==========

#[test]
fn test_cmd_init_is_idempotent() {
    let (db, brain) = setup("cli_test_init");
    let path = PathBuf::from(db.path());

    commands::cmd_init(&brain, &path, true).unwrap();
    let first = brain.get_brain_snapshot().unwrap();

    commands::cmd_init(&brain, &path, true).unwrap();
    assert_eq!(brain.get_brain_snapshot(), Some(first));
}

#[tokio::test]
async fn test_cmd_evolve_records_runs() {
    let dir = TempDir::new().unwrap();
    let (transactions, categories) = write_history(&dir);
    let (db, brain) = setup("cli_test_evolve");
    brain.initialize_brain();

    let first = commands::cmd_evolve(&brain, &db, &transactions, &categories, None, false)
        .await
        .unwrap();
    assert_eq!(first.reason, EvolutionReason::Trained);

    let second = commands::cmd_evolve(&brain, &db, &transactions, &categories, None, true)
        .await
        .unwrap();
    assert_eq!(second.reason, EvolutionReason::NoNewData);

    let runs = db.list_evolution_runs(10).unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].reason, EvolutionReason::NoNewData);
    assert_eq!(runs[1].reason, EvolutionReason::Trained);

    assert!(commands::cmd_history(&db, 5).is_ok());
}

#[tokio::test]
async fn test_cmd_evolve_uninitialized() {
    let dir = TempDir::new().unwrap();
    let (transactions, categories) = write_history(&dir);
    let (db, brain) = setup("cli_test_uninitialized");

    let result = commands::cmd_evolve(&brain, &db, &transactions, &categories, None, false)
        .await
        .unwrap();
    assert_eq!(result.reason, EvolutionReason::Uninitialized);
    assert!(brain.get_brain_snapshot().is_none());
}

#[tokio::test]
async fn test_cmd_evolve_missing_file() {
    let dir = TempDir::new().unwrap();
    let (_, categories) = write_history(&dir);
    let (db, brain) = setup("cli_test_missing_file");
    brain.initialize_brain();

    let missing = dir.path().join("nope.csv");
    let result = commands::cmd_evolve(&brain, &db, &missing, &categories, None, false).await;
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("nope.csv"));
}

#[test]
fn test_cmd_months() {
    let dir = TempDir::new().unwrap();
    let (transactions, categories) = write_history(&dir);
    assert!(commands::cmd_months(&transactions, &categories).is_ok());
}

#[test]
fn test_cmd_export() {
    let dir = TempDir::new().unwrap();
    let (_, brain) = setup("cli_test_export");

    let output = dir.path().join("snapshot.json");
    assert!(commands::cmd_export(&brain, Some(&output)).is_err());

    brain.initialize_brain();
    commands::cmd_export(&brain, Some(&output)).unwrap();

    let exported: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(exported["version"], 2);
    assert!(exported["currentMonthHead"].is_object());
}

#[test]
fn test_cmd_reset() {
    let (db, brain) = setup("cli_test_reset");
    brain.initialize_brain();
    assert!(db.read_slot("cli_test_reset").unwrap().is_some());

    commands::cmd_reset(&brain, true).unwrap();
    assert!(brain.get_brain_snapshot().is_none());
    assert!(db.read_slot("cli_test_reset").unwrap().is_none());
}

#[test]
fn test_cmd_status_without_database() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.db");
    assert!(commands::cmd_status(&path, true, &BrainConfig::default()).is_ok());
    assert!(!path.exists());
}

#[test]
fn test_cmd_status_with_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("brain.db");
    let config = BrainConfig {
        slot_key: "cli_test_status".to_string(),
        ..BrainConfig::default()
    };

    let (_, brain) = commands::open_brain(&path, true, &config).unwrap();
    brain.initialize_brain();
    assert!(commands::cmd_status(&path, true, &config).is_ok());
}

#[test]
fn test_load_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("brain.toml");
    std::fs::write(&path, "[nowcast]\nmin_months = 3\n").unwrap();

    let config = commands::load_config(Some(&path)).unwrap();
    assert_eq!(config.nowcast.min_months, 3);

    std::fs::write(&path, "[nowcast]\nmin_confidence = 7\n").unwrap();
    assert!(commands::load_config(Some(&path)).is_err());
}

// ========== Formatting Tests ==========

#[test]
fn test_format_cents() {
    assert_eq!(format_cents(0), "0.00");
    assert_eq!(format_cents(5), "0.05");
    assert_eq!(format_cents(123_456), "1,234.56");
    assert_eq!(format_cents(-100_000_000), "-1,000,000.00");
    assert_eq!(format_cents(99_999), "999.99");
}
