//! Database tests

use chrono::Utc;

use super::*;
use crate::evolution::{EvolutionReason, EvolutionResult};
use crate::model::create_new_snapshot;

#[test]
fn test_schema_exists() {
    let db = Database::in_memory().unwrap();
    let conn = db.conn().unwrap();

    let slots: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('brain_slots') WHERE name IN ('slot_key', 'payload', 'updated_at')",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(slots, 3, "brain_slots should have 3 expected columns");

    let runs: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('evolution_runs')",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(runs, 9);
}

#[test]
fn test_migrations_are_idempotent() {
    let db = Database::in_memory().unwrap();
    db.write_slot("brain", "{}").unwrap();

    let reopened = Database::new_unencrypted(db.path()).unwrap();
    assert_eq!(reopened.read_slot("brain").unwrap().as_deref(), Some("{}"));
}

#[test]
fn test_slot_crud() {
    let db = Database::in_memory().unwrap();
    assert_eq!(db.read_slot("brain").unwrap(), None);

    db.write_slot("brain", r#"{"a":1}"#).unwrap();
    db.write_slot("brain", r#"{"a":2}"#).unwrap();
    db.write_slot("other", "[]").unwrap();
    assert_eq!(db.read_slot("brain").unwrap().as_deref(), Some(r#"{"a":2}"#));

    assert!(db.remove_slot("brain").unwrap());
    assert!(!db.remove_slot("brain").unwrap());
    assert_eq!(db.read_slot("brain").unwrap(), None);
    assert_eq!(db.read_slot("other").unwrap().as_deref(), Some("[]"));
}

#[test]
fn test_evolution_run_history() {
    let db = Database::in_memory().unwrap();

    let mut snapshot = create_new_snapshot(Utc::now());
    snapshot.data_fingerprint = "0badc0de".to_string();

    let trained = EvolutionResult {
        reason: EvolutionReason::Trained,
        trained: true,
        epochs_run: 17,
        sample_count: 12,
        months_analyzed: 4,
        average_loss: Some(0.125),
        snapshot: Some(snapshot),
        ..EvolutionResult::empty(EvolutionReason::Trained)
    };
    let first = db.record_evolution_run(&trained).unwrap();
    let second = db
        .record_evolution_run(&EvolutionResult::empty(EvolutionReason::Uninitialized))
        .unwrap();
    assert!(second > first);

    let runs = db.list_evolution_runs(10).unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].reason, EvolutionReason::Uninitialized);
    assert_eq!(runs[0].fingerprint, None);
    assert_eq!(runs[0].average_loss, None);

    assert_eq!(runs[1].reason, EvolutionReason::Trained);
    assert!(runs[1].trained);
    assert_eq!(runs[1].epochs_run, 17);
    assert_eq!(runs[1].sample_count, 12);
    assert_eq!(runs[1].months_analyzed, 4);
    assert_eq!(runs[1].average_loss, Some(0.125));
    assert_eq!(runs[1].fingerprint.as_deref(), Some("0badc0de"));

    assert_eq!(db.list_evolution_runs(1).unwrap().len(), 1);
}

#[test]
fn test_encrypted_database_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("brain.db");
    let path = path.to_str().unwrap();

    let db = Database::new_with_key(path, Some("correct horse")).unwrap();
    db.write_slot("brain", "{}").unwrap();
    drop(db);

    let reopened = Database::new_with_key(path, Some("correct horse")).unwrap();
    assert_eq!(reopened.read_slot("brain").unwrap().as_deref(), Some("{}"));

    assert!(Database::new_with_key(path, Some("wrong passphrase")).is_err());
}

#[test]
fn test_key_pragma_depends_only_on_passphrase() {
    let first = key_pragma("correct horse").unwrap();
    assert_eq!(first, key_pragma("correct horse").unwrap());
    assert_ne!(first, key_pragma("battery staple").unwrap());
    assert!(first.starts_with("PRAGMA key = 'x\""));
    assert!(first.ends_with("\"';"));
}
