//! Evolution Engine
//!
//! Decides whether a call trains, trains the eligible heads and persists the
//! result once. The decision ladder:
//!
//! 1. No stored snapshot: `Uninitialized`, nothing is trained or predicted.
//! 2. Neither head has enough samples: `InsufficientData`, read-only inference.
//! 3. Dataset fingerprint matches the snapshot: `NoNewData`, read-only inference.
//! 4. Otherwise each eligible head trains independently, then the snapshot is
//!    saved with the new fingerprint: `Trained`.
//!
//! The engine suspends only between epochs, through an [`EpochScheduler`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::BrainConfig;
use crate::features::{build_dataset, Dataset, InferenceInput, TrainingSample, FEATURE_NAMES};
use crate::model::{
    finalize_head, predict, train_epoch, BrainSnapshot, HeadKind, NeuralHead, Prediction,
};
use crate::models::{Category, Transaction};
use crate::store::SnapshotStore;

/// Hands control back to the host between epochs
#[async_trait]
pub trait EpochScheduler: Send + Sync {
    async fn pause(&self);
}

/// Default scheduler: yield to the tokio runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioYield;

#[async_trait]
impl EpochScheduler for TokioYield {
    async fn pause(&self) {
        tokio::task::yield_now().await;
    }
}

/// Reported after every epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochProgress {
    pub head: HeadKind,
    /// 1-based
    pub epoch: u32,
    pub total_epochs: u32,
    pub average_loss: f64,
    pub sample_count: usize,
}

pub type ProgressCallback = Arc<dyn Fn(&EpochProgress) + Send + Sync>;

#[derive(Clone, Default)]
pub struct EvolveOptions {
    /// `YYYY-MM` month to run inference for; ignored when outside the data
    pub preferred_period: Option<String>,
    pub on_progress: Option<ProgressCallback>,
    /// Defaults to [`TokioYield`]
    pub scheduler: Option<Arc<dyn EpochScheduler>>,
}

impl EvolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_period(mut self, period: impl Into<String>) -> Self {
        self.preferred_period = Some(period.into());
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&EpochProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn EpochScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }
}

/// Why an evolve call did (or did not) train
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvolutionReason {
    Uninitialized,
    InsufficientData,
    NoNewData,
    Trained,
}

impl EvolutionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::InsufficientData => "insufficient-data",
            Self::NoNewData => "no-new-data",
            Self::Trained => "trained",
        }
    }
}

impl std::str::FromStr for EvolutionReason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "uninitialized" => Ok(Self::Uninitialized),
            "insufficient-data" => Ok(Self::InsufficientData),
            "no-new-data" => Ok(Self::NoNewData),
            "trained" => Ok(Self::Trained),
            _ => Err(format!("Unknown evolution reason: {}", s)),
        }
    }
}

impl std::fmt::Display for EvolutionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionResult {
    pub reason: EvolutionReason,
    pub trained: bool,
    /// Summed over the heads trained by this call
    pub epochs_run: u32,
    /// Summed over the heads trained by this call
    pub sample_count: usize,
    pub months_analyzed: usize,
    /// Mean of the trained heads' final-epoch loss
    pub average_loss: Option<f64>,
    pub prediction: Option<Prediction>,
    pub predicted_next_month_expense_cents: Option<i64>,
    pub nowcast: Option<Prediction>,
    pub predicted_current_month_remaining_cents: Option<i64>,
    pub nowcast_confidence: f64,
    pub nowcast_ready: bool,
    pub snapshot: Option<BrainSnapshot>,
}

impl EvolutionResult {
    /// A result with nothing trained and nothing predicted
    pub fn empty(reason: EvolutionReason) -> Self {
        Self {
            reason,
            trained: false,
            epochs_run: 0,
            sample_count: 0,
            months_analyzed: 0,
            average_loss: None,
            prediction: None,
            predicted_next_month_expense_cents: None,
            nowcast: None,
            predicted_current_month_remaining_cents: None,
            nowcast_confidence: 0.0,
            nowcast_ready: false,
            snapshot: None,
        }
    }
}

/// Epoch count for a sample set of the given size
pub fn epochs_for(sample_count: usize) -> u32 {
    match sample_count {
        0..=2 => 10,
        3..=6 => 7,
        7..=12 => 5,
        _ => 4,
    }
}

/// One head's finished training run
struct HeadRun {
    kind: HeadKind,
    head: NeuralHead,
    epochs: u32,
    samples: usize,
    final_loss: f64,
}

/// Run one evolution pass over the supplied history
pub async fn evolve(
    store: &SnapshotStore,
    config: &BrainConfig,
    transactions: &[Transaction],
    categories: &[Category],
    options: &EvolveOptions,
) -> EvolutionResult {
    let dataset = build_dataset(
        transactions,
        categories,
        options.preferred_period.as_deref(),
    );

    let Some(snapshot) = store.load() else {
        debug!("No brain snapshot stored, skipping evolution");
        return EvolutionResult {
            months_analyzed: dataset.months,
            ..EvolutionResult::empty(EvolutionReason::Uninitialized)
        };
    };

    let min_samples = config.min_samples_for_training.max(1);
    let next_month_eligible = dataset.samples.len() >= min_samples;
    let nowcast_eligible = dataset.nowcast_samples.len() >= min_samples;

    if !next_month_eligible && !nowcast_eligible {
        debug!(
            samples = dataset.samples.len(),
            nowcast_samples = dataset.nowcast_samples.len(),
            min_samples,
            "Not enough samples to train"
        );
        return infer(EvolutionReason::InsufficientData, snapshot, &dataset, config, &[]);
    }

    if snapshot.data_fingerprint == dataset.fingerprint {
        debug!(fingerprint = %dataset.fingerprint, "History unchanged since last training");
        return infer(EvolutionReason::NoNewData, snapshot, &dataset, config, &[]);
    }

    let scheduler: Arc<dyn EpochScheduler> = options
        .scheduler
        .clone()
        .unwrap_or_else(|| Arc::new(TokioYield));

    let plan: [(HeadKind, &[TrainingSample], bool); 2] = [
        (HeadKind::NextMonth, &dataset.samples, next_month_eligible),
        (HeadKind::CurrentMonth, &dataset.nowcast_samples, nowcast_eligible),
    ];

    let mut next = snapshot;
    let mut runs = Vec::with_capacity(plan.len());
    for (kind, samples, eligible) in plan {
        if !eligible {
            continue;
        }
        let run = train_head(
            kind,
            next.head(kind),
            samples,
            options.on_progress.as_ref(),
            scheduler.as_ref(),
        )
        .await;
        info!(
            head = %kind,
            epochs = run.epochs,
            samples = run.samples,
            loss = run.final_loss,
            trained_samples = run.head.trained_samples,
            "Trained head"
        );
        next = next.with_head(kind, run.head.clone());
        runs.push(run);
    }

    next.data_fingerprint = dataset.fingerprint.clone();
    next.updated_at = Utc::now();

    let tier = store.save(&next);
    info!(fingerprint = %next.data_fingerprint, storage = ?tier, "Saved evolved brain snapshot");

    infer(EvolutionReason::Trained, next, &dataset, config, &runs)
}

async fn train_head(
    kind: HeadKind,
    head: &NeuralHead,
    samples: &[TrainingSample],
    on_progress: Option<&ProgressCallback>,
    scheduler: &dyn EpochScheduler,
) -> HeadRun {
    let total_epochs = epochs_for(samples.len());
    let mut current = head.clone();
    let mut final_loss = 0.0;

    for epoch in 1..=total_epochs {
        let outcome = train_epoch(&current, samples);
        current = outcome.head;
        final_loss = outcome.average_loss;

        debug!(head = %kind, epoch, total_epochs, loss = final_loss, "Epoch complete");
        if let Some(callback) = on_progress {
            callback(&EpochProgress {
                head: kind,
                epoch,
                total_epochs,
                average_loss: final_loss,
                sample_count: samples.len(),
            });
        }
        scheduler.pause().await;
    }

    HeadRun {
        kind,
        head: finalize_head(&current, samples.len(), final_loss),
        epochs: total_epochs,
        samples: samples.len(),
        final_loss,
    }
}

/// Predict with whatever the snapshot holds and assemble the result
fn infer(
    reason: EvolutionReason,
    snapshot: BrainSnapshot,
    dataset: &Dataset,
    config: &BrainConfig,
    runs: &[HeadRun],
) -> EvolutionResult {
    let prediction = head_prediction(&snapshot.next_month, dataset.inference_input.as_ref());
    let nowcast = head_prediction(
        &snapshot.current_month_head,
        dataset.current_month_inference_input.as_ref(),
    );

    let nowcast_confidence = nowcast
        .as_ref()
        .map(|(p, _)| p.confidence)
        .unwrap_or(0.0);
    let nowcast_ready = nowcast.is_some()
        && config.nowcast.is_ready(
            dataset.months,
            snapshot.current_month_head.trained_samples,
            nowcast_confidence,
        );

    let average_loss = if runs.is_empty() {
        None
    } else {
        Some(runs.iter().map(|r| r.final_loss).sum::<f64>() / runs.len() as f64)
    };

    if !runs.is_empty() {
        let heads: Vec<&str> = runs.iter().map(|r| r.kind.as_str()).collect();
        debug!(?heads, "Heads trained this call");
    }

    EvolutionResult {
        reason,
        trained: !runs.is_empty(),
        epochs_run: runs.iter().map(|r| r.epochs).sum(),
        sample_count: runs.iter().map(|r| r.samples).sum(),
        months_analyzed: dataset.months,
        average_loss,
        predicted_next_month_expense_cents: prediction
            .as_ref()
            .map(|(p, input)| input.to_cents(p.predicted_ratio)),
        prediction: prediction.map(|(p, _)| p),
        predicted_current_month_remaining_cents: nowcast
            .as_ref()
            .map(|(p, input)| input.to_cents(p.predicted_ratio)),
        nowcast: nowcast.map(|(p, _)| p),
        nowcast_confidence,
        nowcast_ready,
        snapshot: Some(snapshot),
    }
}

/// Heads that have never trained do not predict
fn head_prediction<'a>(
    head: &NeuralHead,
    input: Option<&'a InferenceInput>,
) -> Option<(Prediction, &'a InferenceInput)> {
    if head.trained_samples == 0 {
        return None;
    }
    input.map(|input| (predict(head, &input.x, &FEATURE_NAMES), input))
}
