//! Feature Builder
//!
//! Turns raw transaction/category lists into per-month aggregate signals and
//! fixed-length feature vectors, and produces the two training sample sets:
//!
//! - **Next month** samples: features of month `i` (against month `i-1`),
//!   labelled with the expense ratio of month `i+1`. The label always comes
//!   from a month strictly after the feature window.
//! - **Nowcast** samples: partial observations of a closed month at several
//!   transaction-count checkpoints, labelled with the expenses that were still
//!   to come in that month.
//!
//! The dataset fingerprint is a content hash over the monthly aggregates, so
//! two calls with the same aggregates (in any transaction order) produce the
//! same fingerprint.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{Category, SpendingNature, Transaction, TransactionType};

/// Number of values in every feature vector
pub const FEATURE_VECTOR_SIZE: usize = 8;

/// Feature names, in vector order
pub const FEATURE_NAMES: [&str; FEATURE_VECTOR_SIZE] = [
    "expense_ratio",
    "superfluous_share",
    "comfort_share",
    "savings_rate",
    "income_momentum",
    "expense_momentum",
    "activity_pace",
    "previous_expense_ratio",
];

/// Schema tag mixed into every fingerprint
pub const FINGERPRINT_TAG: &str = "brain-v2-";

/// Upper bound for expense-ratio style targets
pub const MAX_TARGET: f64 = 2.0;

/// Transaction-count fractions at which a closed month is "observed"
/// to build nowcast samples. The last transaction is always added.
const NOWCAST_CHECKPOINTS: [f64; 8] = [0.0, 0.16, 0.28, 0.40, 0.52, 0.64, 0.76, 0.88];

/// Months looked back when computing the reference income for cents output
const REFERENCE_WINDOW: usize = 3;

/// Longest gap-filled range, counted back from the latest observed month
pub const MAX_MONTH_SPAN: i64 = 1200;

/// Fixed-length model input, every value in [0, 1]
pub type FeatureVector = [f64; FEATURE_VECTOR_SIZE];

/// A calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Month containing an epoch-millisecond timestamp (UTC)
    pub fn from_timestamp_ms(timestamp_ms: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_millis(timestamp_ms).map(|dt| Self {
            year: dt.year(),
            month: dt.month(),
        })
    }

    /// Parse a `YYYY-MM` key
    pub fn parse(key: &str) -> Option<Self> {
        let (year, month) = key.trim().split_once('-')?;
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Months since year 0
    fn ordinal(self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    fn from_ordinal(ordinal: i64) -> Option<Self> {
        let year = i32::try_from(ordinal.div_euclid(12)).ok()?;
        Self::new(year, ordinal.rem_euclid(12) as u32 + 1)
    }

    pub fn key(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// One calendar month's aggregate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySignal {
    /// `YYYY-MM`
    pub period: String,
    pub income_cents: i64,
    pub expense_cents: i64,
    pub superfluous_cents: i64,
    pub comfort_cents: i64,
    pub transaction_count: u32,
}

impl MonthlySignal {
    pub fn empty(period: Period) -> Self {
        Self {
            period: period.key(),
            ..Default::default()
        }
    }

    fn record(&mut self, tx: &Transaction, nature: Option<SpendingNature>) {
        let amount = tx.magnitude();
        match tx.kind {
            TransactionType::Income => {
                self.income_cents = self.income_cents.saturating_add(amount);
            }
            TransactionType::Expense => {
                self.expense_cents = self.expense_cents.saturating_add(amount);
                match nature {
                    Some(SpendingNature::Superfluous) => {
                        self.superfluous_cents = self.superfluous_cents.saturating_add(amount);
                    }
                    Some(SpendingNature::Comfort) => {
                        self.comfort_cents = self.comfort_cents.saturating_add(amount);
                    }
                    Some(SpendingNature::Essential) | None => {}
                }
            }
        }
        self.transaction_count = self.transaction_count.saturating_add(1);
    }

    /// Expenses over income, clamped to [0, 2]
    pub fn expense_ratio(&self) -> f64 {
        clamp(
            ratio(self.expense_cents as f64, self.income_cents as f64),
            0.0,
            MAX_TARGET,
        )
    }

    /// Normalizer for remaining-expense targets: the larger of income and expenses
    pub fn nowcast_baseline(&self) -> i64 {
        self.income_cents.max(self.expense_cents).max(1)
    }
}

/// A labelled training example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSample {
    pub period: String,
    pub x: FeatureVector,
    /// Target in [0, 2]
    pub y: f64,
}

/// Features for live inference plus the scale to convert a ratio into cents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceInput {
    pub period: String,
    pub x: FeatureVector,
    pub signal: MonthlySignal,
    /// Reference income for next-month inputs, nowcast baseline for
    /// current-month inputs
    pub baseline_cents: i64,
}

impl InferenceInput {
    /// Convert a predicted ratio into cents against this input's baseline
    pub fn to_cents(&self, ratio: f64) -> i64 {
        if !ratio.is_finite() {
            return 0;
        }
        (ratio * self.baseline_cents as f64).round() as i64
    }
}

/// Everything derived from one call's transaction history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub samples: Vec<TrainingSample>,
    pub nowcast_samples: Vec<TrainingSample>,
    pub inference_input: Option<InferenceInput>,
    pub current_month_inference_input: Option<InferenceInput>,
    pub fingerprint: String,
    /// Number of months in the (gap-filled) range
    pub months: usize,
    pub signals: Vec<MonthlySignal>,
}

/// Build the full dataset from raw records
///
/// `preferred_period` (`YYYY-MM`) picks the month used for inference when it
/// lies inside the observed range; otherwise the latest month is used.
pub fn build_dataset(
    transactions: &[Transaction],
    categories: &[Category],
    preferred_period: Option<&str>,
) -> Dataset {
    let natures = category_natures(categories);
    let buckets = bucket_by_month(transactions);
    let signals = fill_months(&buckets, &natures);
    let fingerprint = fingerprint(&signals);

    if signals.is_empty() {
        return Dataset {
            fingerprint,
            ..Default::default()
        };
    }

    let samples = next_month_samples(&signals);

    let month_transactions: Vec<Vec<&Transaction>> = signals
        .iter()
        .map(|s| {
            Period::parse(&s.period)
                .and_then(|p| buckets.get(&p).cloned())
                .unwrap_or_default()
        })
        .collect();
    let nowcast_samples = nowcast_samples(&signals, &month_transactions, &natures);

    let index = preferred_period
        .and_then(Period::parse)
        .and_then(|p| signals.iter().position(|s| s.period == p.key()))
        .unwrap_or(signals.len() - 1);

    let current = &signals[index];
    let previous = if index > 0 {
        &signals[index - 1]
    } else {
        current
    };
    let x = build_feature_values(current, previous);

    let inference_input = InferenceInput {
        period: current.period.clone(),
        x,
        signal: current.clone(),
        baseline_cents: reference_income(&signals[..=index]),
    };
    let current_month_inference_input = InferenceInput {
        period: current.period.clone(),
        x,
        signal: current.clone(),
        baseline_cents: current.nowcast_baseline(),
    };

    debug!(
        months = signals.len(),
        samples = samples.len(),
        nowcast_samples = nowcast_samples.len(),
        fingerprint = %fingerprint,
        "Built dataset"
    );

    Dataset {
        months: signals.len(),
        samples,
        nowcast_samples,
        inference_input: Some(inference_input),
        current_month_inference_input: Some(current_month_inference_input),
        fingerprint,
        signals,
    }
}

/// Aggregate transactions into a contiguous, zero-filled run of months
pub fn aggregate_months(
    transactions: &[Transaction],
    categories: &[Category],
) -> Vec<MonthlySignal> {
    let natures = category_natures(categories);
    fill_months(&bucket_by_month(transactions), &natures)
}

/// Build the feature vector for `current` given the month before it
pub fn build_feature_values(current: &MonthlySignal, previous: &MonthlySignal) -> FeatureVector {
    let income = current.income_cents as f64;
    let expenses = current.expense_cents as f64;
    let prev_income = previous.income_cents as f64;
    let prev_expenses = previous.expense_cents as f64;
    let count = current.transaction_count as f64;
    let prev_count = previous.transaction_count as f64;

    [
        clamp(ratio(expenses, income), 0.0, 2.0) / 2.0,
        clamp(ratio(current.superfluous_cents as f64, expenses), 0.0, 1.0),
        clamp(ratio(current.comfort_cents as f64, expenses), 0.0, 1.0),
        clamp(ratio(income - expenses, income), 0.0, 1.0),
        momentum(ratio(income - prev_income, prev_income)),
        momentum(ratio(expenses - prev_expenses, prev_expenses)),
        clamp(ratio(count, prev_count), 0.0, 2.0) / 2.0,
        clamp(ratio(prev_expenses, prev_income), 0.0, 2.0) / 2.0,
    ]
}

/// Content fingerprint over monthly aggregates
pub fn fingerprint(signals: &[MonthlySignal]) -> String {
    let mut content = String::from(FINGERPRINT_TAG);
    for s in signals {
        content.push_str(&format!(
            "{}|{}|{}|{}|{}|{};",
            s.period,
            s.income_cents,
            s.expense_cents,
            s.superfluous_cents,
            s.comfort_cents,
            s.transaction_count
        ));
    }
    format!("{:08x}", fnv1a32(content.as_bytes()))
}

fn fnv1a32(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    bytes.iter().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(PRIME)
    })
}

fn next_month_samples(signals: &[MonthlySignal]) -> Vec<TrainingSample> {
    match signals.len() {
        0 => vec![],
        1 => {
            let only = &signals[0];
            vec![TrainingSample {
                period: only.period.clone(),
                x: build_feature_values(only, only),
                y: only.expense_ratio(),
            }]
        }
        2 => {
            let first = &signals[0];
            vec![TrainingSample {
                period: first.period.clone(),
                x: build_feature_values(first, first),
                y: signals[1].expense_ratio(),
            }]
        }
        n => (1..n - 1)
            .map(|i| TrainingSample {
                period: signals[i].period.clone(),
                x: build_feature_values(&signals[i], &signals[i - 1]),
                y: signals[i + 1].expense_ratio(),
            })
            .collect(),
    }
}

fn nowcast_samples(
    signals: &[MonthlySignal],
    month_transactions: &[Vec<&Transaction>],
    natures: &HashMap<&str, SpendingNature>,
) -> Vec<TrainingSample> {
    let mut samples = Vec::new();

    // The latest month is reserved for inference; the first one stands in
    // for its own predecessor
    for i in 0..signals.len().saturating_sub(1) {
        let month = &signals[i];
        let previous = if i > 0 { &signals[i - 1] } else { month };
        let mut txs = month_transactions[i].clone();
        if txs.is_empty() {
            continue;
        }
        txs.sort_by(|a, b| {
            a.timestamp_ms
                .cmp(&b.timestamp_ms)
                .then_with(|| a.kind.as_str().cmp(b.kind.as_str()))
                .then_with(|| a.amount_cents.cmp(&b.amount_cents))
                .then_with(|| a.category_id.cmp(&b.category_id))
        });

        let last = txs.len() - 1;
        let mut checkpoints: BTreeSet<usize> = NOWCAST_CHECKPOINTS
            .iter()
            .map(|f| ((f * last as f64).floor() as usize).min(last))
            .collect();
        checkpoints.insert(last);

        let period = Period::parse(&month.period);
        let mut partial = period.map(MonthlySignal::empty).unwrap_or_default();
        let mut observed = 0;
        for checkpoint in checkpoints {
            while observed <= checkpoint {
                let tx = txs[observed];
                partial.record(tx, attribution(tx, natures));
                observed += 1;
            }

            let remaining = (month.expense_cents - partial.expense_cents).max(0) as f64;
            let y = clamp(remaining / partial.nowcast_baseline() as f64, 0.0, MAX_TARGET);
            samples.push(TrainingSample {
                period: format!("{}:{}/{}", month.period, checkpoint + 1, txs.len()),
                x: build_feature_values(&partial, previous),
                y,
            });
        }
    }

    samples
}

/// Mean income over the trailing window; falls back to mean expenses when no
/// month in the window had income
fn reference_income(signals: &[MonthlySignal]) -> i64 {
    let window = &signals[signals.len().saturating_sub(REFERENCE_WINDOW)..];
    let with_income: Vec<i64> = window
        .iter()
        .map(|s| s.income_cents)
        .filter(|c| *c > 0)
        .collect();

    if !with_income.is_empty() {
        return mean(&with_income);
    }
    let expenses: Vec<i64> = window.iter().map(|s| s.expense_cents).collect();
    mean(&expenses)
}

fn mean(values: &[i64]) -> i64 {
    if values.is_empty() {
        return 0;
    }
    let total: i128 = values.iter().map(|v| *v as i128).sum();
    (total as f64 / values.len() as f64).round() as i64
}

fn category_natures(categories: &[Category]) -> HashMap<&str, SpendingNature> {
    categories
        .iter()
        .map(|c| (c.id.as_str(), c.spending_nature))
        .collect()
}

fn attribution(
    tx: &Transaction,
    natures: &HashMap<&str, SpendingNature>,
) -> Option<SpendingNature> {
    if tx.is_superfluous == Some(true) {
        return Some(SpendingNature::Superfluous);
    }
    natures.get(tx.category_id.as_str()).copied()
}

fn bucket_by_month(transactions: &[Transaction]) -> BTreeMap<Period, Vec<&Transaction>> {
    let mut buckets: BTreeMap<Period, Vec<&Transaction>> = BTreeMap::new();
    for tx in transactions {
        match Period::from_timestamp_ms(tx.timestamp_ms) {
            Some(period) => buckets.entry(period).or_default().push(tx),
            None => debug!(
                timestamp = tx.timestamp_ms,
                "Skipping transaction with out-of-range timestamp"
            ),
        }
    }
    buckets
}

fn fill_months(
    buckets: &BTreeMap<Period, Vec<&Transaction>>,
    natures: &HashMap<&str, SpendingNature>,
) -> Vec<MonthlySignal> {
    let (first, last) = match (buckets.keys().next(), buckets.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return vec![],
    };

    let earliest = Period::from_ordinal(last.ordinal() - (MAX_MONTH_SPAN - 1)).unwrap_or(first);
    let first = if first < earliest {
        let dropped: usize = buckets.range(..earliest).map(|(_, txs)| txs.len()).sum();
        warn!(
            dropped,
            from = %first,
            kept_from = %earliest,
            "History spans too many months, ignoring the oldest transactions"
        );
        earliest
    } else {
        first
    };

    let mut signals = Vec::new();
    let mut period = first;
    loop {
        let mut signal = MonthlySignal::empty(period);
        if let Some(txs) = buckets.get(&period) {
            for tx in txs {
                signal.record(tx, attribution(tx, natures));
            }
        }
        signals.push(signal);

        if period >= last {
            break;
        }
        period = period.next();
    }
    signals
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    numerator / denominator.max(1.0)
}

fn momentum(change: f64) -> f64 {
    (clamp(change, -1.0, 1.0) + 1.0) / 2.0
}

fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        min
    }
}
