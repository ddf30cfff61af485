//! Training commands (evolve, months)

use std::path::Path;

use anyhow::{Context, Result};
use brain_core::import::{load_categories, load_transactions};
use brain_core::{
    build_dataset, Brain, Category, Database, EvolutionReason, EvolutionResult, EvolveOptions,
    HeadKind, Prediction, Transaction,
};

use super::{format_cents, percent};

fn load_history(transactions: &Path, categories: &Path) -> Result<(Vec<Transaction>, Vec<Category>)> {
    let txs = load_transactions(transactions)
        .with_context(|| format!("Failed to read transactions from {}", transactions.display()))?;
    let cats = load_categories(categories)
        .with_context(|| format!("Failed to read categories from {}", categories.display()))?;
    Ok((txs, cats))
}

pub async fn cmd_evolve(
    brain: &Brain,
    db: &Database,
    transactions: &Path,
    categories: &Path,
    period: Option<&str>,
    json: bool,
) -> Result<EvolutionResult> {
    let (txs, cats) = load_history(transactions, categories)?;

    let mut options = EvolveOptions::new();
    if let Some(period) = period {
        options = options.with_period(period);
    }
    if !json {
        println!("🧠 Evolving from {} transactions...", txs.len());
        options = options.with_progress(|p| {
            let label = match p.head {
                HeadKind::NextMonth => "next month",
                HeadKind::CurrentMonth => "nowcast",
            };
            println!(
                "   [{}] epoch {}/{}  loss {:.5}  ({} samples)",
                label, p.epoch, p.total_epochs, p.average_loss, p.sample_count
            );
        });
    }

    let result = brain.evolve_brain_from_history(&txs, &cats, &options).await;
    db.record_evolution_run(&result)
        .context("Failed to record evolution run")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    Ok(result)
}

fn print_result(result: &EvolutionResult) {
    println!();
    match result.reason {
        EvolutionReason::Uninitialized => {
            println!("⚠️  Brain not initialized. Run 'brain init' first.");
            return;
        }
        EvolutionReason::InsufficientData => {
            println!("💤 Not enough history to train ({} months)", result.months_analyzed);
        }
        EvolutionReason::NoNewData => {
            println!("💤 History unchanged since last training");
        }
        EvolutionReason::Trained => {
            println!(
                "✅ Trained {} epochs on {} samples across {} months",
                result.epochs_run, result.sample_count, result.months_analyzed
            );
            if let Some(loss) = result.average_loss {
                println!("   Average loss: {:.5}", loss);
            }
        }
    }

    println!();
    println!("📈 Next month");
    println!("   ─────────────────────────────");
    match (&result.prediction, result.predicted_next_month_expense_cents) {
        (Some(prediction), Some(cents)) => {
            print_prediction(prediction);
            println!("   Expected expenses: {}", format_cents(cents));
        }
        _ => println!("   (no prediction yet)"),
    }

    println!();
    println!("📅 Rest of this month");
    println!("   ─────────────────────────────");
    match (&result.nowcast, result.predicted_current_month_remaining_cents) {
        (Some(nowcast), Some(cents)) => {
            print_prediction(nowcast);
            println!("   Remaining expenses: {}", format_cents(cents));
            if !result.nowcast_ready {
                println!("   ⏳ Still warming up; treat as a rough estimate");
            }
        }
        _ => println!("   (no nowcast yet)"),
    }
}

fn print_prediction(prediction: &Prediction) {
    println!("   Expense ratio: {:.3}", prediction.predicted_ratio);
    println!("   Risk: {}", percent(prediction.risk_score));
    println!("   Confidence: {}", percent(prediction.confidence));
    let top: Vec<String> = prediction
        .contributors
        .iter()
        .take(3)
        .map(|c| format!("{} ({:+.3})", c.feature, c.contribution))
        .collect();
    if !top.is_empty() {
        println!("   Top drivers: {}", top.join(", "));
    }
}

pub fn cmd_months(transactions: &Path, categories: &Path) -> Result<()> {
    let (txs, cats) = load_history(transactions, categories)?;
    let dataset = build_dataset(&txs, &cats, None);

    if dataset.signals.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    println!();
    println!(
        "   {:<8} {:>12} {:>12} {:>12} {:>12} {:>5}",
        "Month", "Income", "Expenses", "Superfluous", "Comfort", "Txns"
    );
    println!("   {}", "─".repeat(68));
    for signal in &dataset.signals {
        println!(
            "   {:<8} {:>12} {:>12} {:>12} {:>12} {:>5}",
            signal.period,
            format_cents(signal.income_cents),
            format_cents(signal.expense_cents),
            format_cents(signal.superfluous_cents),
            format_cents(signal.comfort_cents),
            signal.transaction_count
        );
    }

    println!();
    println!("   Months: {}", dataset.months);
    println!("   Next-month samples: {}", dataset.samples.len());
    println!("   Nowcast samples: {}", dataset.nowcast_samples.len());
    println!("   Fingerprint: {}", dataset.fingerprint);

    Ok(())
}
