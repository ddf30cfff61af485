//! Status command implementations (status, history)

use std::path::Path;

use anyhow::Result;
use brain_core::db::DB_KEY_ENV;
use brain_core::model::compute_confidence;
use brain_core::{Brain, BrainConfig, Database, NeuralHead};

use super::{open_db, percent};

pub fn cmd_status(db_path: &Path, no_encrypt: bool, config: &BrainConfig) -> Result<()> {
    println!();
    println!("🧠 Brain Status");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Database: {}", db_path.display());
    println!("   Slot: {}", config.slot_key);

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    if !db_path.exists() {
        println!();
        println!("   (database not initialized, run 'brain init')");
        println!();
        return Ok(());
    }

    match open_db(db_path, no_encrypt) {
        Ok(db) => {
            let brain = Brain::with_database(db.clone(), config.clone());
            print_snapshot_status(&brain);
            if let Ok(runs) = db.list_evolution_runs(1) {
                if let Some(last) = runs.first() {
                    println!();
                    println!(
                        "   Last run: {} ({})",
                        last.reason,
                        last.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
        Err(e) => {
            println!();
            println!("   ❌ Error opening database: {}", e);
            if !no_encrypt && !has_key {
                println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
            } else if has_key {
                println!("      (Check if {} is correct)", DB_KEY_ENV);
            }
        }
    }

    println!();
    Ok(())
}

fn print_snapshot_status(brain: &Brain) {
    let Some(snapshot) = brain.get_brain_snapshot() else {
        println!();
        println!("   No brain snapshot yet. Run 'brain init'.");
        return;
    };

    println!();
    println!("   Snapshot v{} (features v{})", snapshot.version, snapshot.feature_schema_version);
    println!("   Updated: {}", snapshot.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if snapshot.data_fingerprint.is_empty() {
        println!("   Fingerprint: (never trained)");
    } else {
        println!("   Fingerprint: {}", snapshot.data_fingerprint);
    }

    print_head("Next month", &snapshot.next_month);
    print_head("Nowcast", &snapshot.current_month_head);
}

fn print_head(label: &str, head: &NeuralHead) {
    println!();
    println!("   {}", label);
    println!("      Trained samples: {}", head.trained_samples);
    println!("      Loss (EMA): {:.5}", head.loss_ema);
    println!("      Learning rate: {:.5}", head.learning_rate);
    println!("      Confidence: {}", percent(compute_confidence(head)));
}

pub fn cmd_history(db: &Database, limit: usize) -> Result<()> {
    let runs = db.list_evolution_runs(limit)?;

    if runs.is_empty() {
        println!("No evolution runs recorded.");
        return Ok(());
    }

    println!();
    println!(
        "   {:>4}  {:<17} {:<18} {:>6} {:>7} {:>6} {:>9}",
        "ID", "When", "Reason", "Epochs", "Samples", "Months", "Loss"
    );
    println!("   {}", "─".repeat(76));
    for run in runs {
        let loss = run
            .average_loss
            .map(|l| format!("{:.5}", l))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "   {:>4}  {:<17} {:<18} {:>6} {:>7} {:>6} {:>9}",
            run.id,
            run.created_at.format("%Y-%m-%d %H:%M"),
            run.reason.as_str(),
            run.epochs_run,
            run.sample_count,
            run.months_analyzed,
            loss
        );
    }
    println!();

    Ok(())
}
