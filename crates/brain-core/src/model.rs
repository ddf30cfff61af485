//! Model: two independent linear + sigmoid heads and their persisted snapshot
//!
//! Every function here is pure. Functions take snapshot/head references and
//! return new values, so the caller decides when (and whether) a new state is
//! persisted.
//!
//! ## Snapshot states
//!
//! A persisted value is either absent, a current-shape snapshot, or something
//! else ("legacy"). [`StoredSnapshot`] makes that explicit, and
//! [`migrate_snapshot`] is the only path from legacy to current. Migration is
//! total: it returns `None` for anything it cannot coerce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::features::{TrainingSample, FEATURE_VECTOR_SIZE, MAX_TARGET};

/// Persisted snapshot shape version
pub const SNAPSHOT_VERSION: u32 = 2;

/// Version of the feature vector layout the weights were trained against
pub const FEATURE_SCHEMA_VERSION: u32 = 2;

pub const MIN_LEARNING_RATE: f64 = 0.008;
pub const MAX_LEARNING_RATE: f64 = 0.05;

/// Weights and bias are kept within [-WEIGHT_LIMIT, WEIGHT_LIMIT]
pub const WEIGHT_LIMIT: f64 = 8.0;

/// Smoothing factor for the loss moving average
pub const LOSS_EMA_ALPHA: f64 = 0.22;

/// Learning-rate annealing applied on every finalize
pub const LEARNING_RATE_DECAY: f64 = 0.997;

pub const DEFAULT_NEXT_MONTH_LEARNING_RATE: f64 = 0.03;
pub const DEFAULT_CURRENT_MONTH_LEARNING_RATE: f64 = 0.024;

const CONFIDENCE_FLOOR: f64 = 0.12;
const CONFIDENCE_SAMPLE_WEIGHT: f64 = 0.70;
const CONFIDENCE_LOSS_WEIGHT: f64 = 0.18;
/// Trained samples at which the sample factor saturates
const CONFIDENCE_SAMPLE_SATURATION: f64 = 72.0;
/// Loss EMA at which the loss factor reaches zero
const CONFIDENCE_LOSS_CEILING: f64 = 0.22;
const MIN_CONFIDENCE: f64 = 0.08;
const MAX_CONFIDENCE: f64 = 0.99;

/// Steepness of the risk curve around a ratio of 1.0
const RISK_STEEPNESS: f64 = 5.5;

/// One trainable unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeuralHead {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub learning_rate: f64,
    /// Cumulative number of samples seen across finalize calls
    pub trained_samples: u64,
    pub loss_ema: f64,
}

/// The complete persisted state
///
/// The next-month head is flattened into the top level so older readers that
/// only know a single head keep working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrainSnapshot {
    pub version: u32,
    pub feature_schema_version: u32,
    #[serde(flatten)]
    pub next_month: NeuralHead,
    pub current_month_head: NeuralHead,
    /// Fingerprint of the dataset the heads were last trained on
    pub data_fingerprint: String,
    pub updated_at: DateTime<Utc>,
}

/// Which head a value refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadKind {
    NextMonth,
    CurrentMonth,
}

impl HeadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeadKind::NextMonth => "next_month",
            HeadKind::CurrentMonth => "current_month",
        }
    }
}

impl std::fmt::Display for HeadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl BrainSnapshot {
    pub fn head(&self, kind: HeadKind) -> &NeuralHead {
        match kind {
            HeadKind::NextMonth => &self.next_month,
            HeadKind::CurrentMonth => &self.current_month_head,
        }
    }

    /// Copy of this snapshot with one head replaced
    pub fn with_head(&self, kind: HeadKind, head: NeuralHead) -> Self {
        let mut next = self.clone();
        match kind {
            HeadKind::NextMonth => next.next_month = head,
            HeadKind::CurrentMonth => next.current_month_head = head,
        }
        next
    }
}

/// Classification of whatever sits in the storage slot
#[derive(Debug, Clone, PartialEq)]
pub enum StoredSnapshot {
    Absent,
    /// Parseable JSON that is not a compatible current snapshot
    Legacy(Value),
    Current(BrainSnapshot),
}

impl StoredSnapshot {
    pub fn classify(raw: Option<Value>) -> Self {
        match raw {
            None | Some(Value::Null) => StoredSnapshot::Absent,
            Some(value) => match serde_json::from_value::<BrainSnapshot>(value.clone()) {
                Ok(snapshot) if is_compatible(&snapshot) => StoredSnapshot::Current(snapshot),
                _ => StoredSnapshot::Legacy(value),
            },
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, StoredSnapshot::Legacy(_))
    }

    /// Resolve to a usable snapshot; legacy values go through migration
    pub fn resolve(self, now: DateTime<Utc>) -> Option<BrainSnapshot> {
        match self {
            StoredSnapshot::Absent => None,
            StoredSnapshot::Current(snapshot) => Some(snapshot),
            StoredSnapshot::Legacy(raw) => migrate_snapshot(&raw, now),
        }
    }
}

/// Output of a forward pass
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardPass {
    /// Input padded/truncated to the vector size and clamped to [0, 1]
    pub normalized_x: Vec<f64>,
    pub logit: f64,
    /// sigmoid(logit)
    pub activation: f64,
    /// 2 * sigmoid(logit), in [0, 2]
    pub predicted_ratio: f64,
}

/// Result of one pass over a sample set
#[derive(Debug, Clone, PartialEq)]
pub struct EpochOutcome {
    pub head: NeuralHead,
    pub average_loss: f64,
}

/// A single feature's share of a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureContribution {
    pub feature: String,
    pub value: f64,
    pub weight: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub predicted_ratio: f64,
    pub risk_score: f64,
    pub confidence: f64,
    /// Sorted by descending absolute contribution
    pub contributors: Vec<FeatureContribution>,
}

pub fn create_empty_head(learning_rate: f64) -> NeuralHead {
    NeuralHead {
        weights: vec![0.0; FEATURE_VECTOR_SIZE],
        bias: 0.0,
        learning_rate: clamp_learning_rate(learning_rate),
        trained_samples: 0,
        loss_ema: 0.0,
    }
}

/// Newborn snapshot with the default learning rates
pub fn create_new_snapshot(now: DateTime<Utc>) -> BrainSnapshot {
    newborn_snapshot(
        now,
        DEFAULT_NEXT_MONTH_LEARNING_RATE,
        DEFAULT_CURRENT_MONTH_LEARNING_RATE,
    )
}

/// Newborn snapshot with explicit per-head learning rates
pub fn newborn_snapshot(
    now: DateTime<Utc>,
    next_month_learning_rate: f64,
    current_month_learning_rate: f64,
) -> BrainSnapshot {
    BrainSnapshot {
        version: SNAPSHOT_VERSION,
        feature_schema_version: FEATURE_SCHEMA_VERSION,
        next_month: create_empty_head(next_month_learning_rate),
        current_month_head: create_empty_head(current_month_learning_rate),
        data_fingerprint: String::new(),
        updated_at: now,
    }
}

/// Coerce an arbitrary JSON value into a current snapshot
///
/// Returns `None` when the value is not an object, when the top-level weights
/// are missing or non-numeric, or when a present `currentMonthHead` is
/// malformed. A missing `currentMonthHead` is the single-head legacy shape and
/// gets an empty nowcast head.
pub fn migrate_snapshot(raw: &Value, now: DateTime<Utc>) -> Option<BrainSnapshot> {
    let obj = raw.as_object()?;

    let next_month = normalize_head(obj, DEFAULT_NEXT_MONTH_LEARNING_RATE)?;
    let current_month_head = match obj.get("currentMonthHead") {
        None | Some(Value::Null) => create_empty_head(DEFAULT_CURRENT_MONTH_LEARNING_RATE),
        Some(Value::Object(head)) => normalize_head(head, DEFAULT_CURRENT_MONTH_LEARNING_RATE)?,
        Some(_) => return None,
    };

    let data_fingerprint = obj
        .get("dataFingerprint")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let updated_at = obj
        .get("updatedAt")
        .and_then(|v| match v {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
            _ => None,
        })
        .unwrap_or(now);

    Some(BrainSnapshot {
        version: SNAPSHOT_VERSION,
        feature_schema_version: FEATURE_SCHEMA_VERSION,
        next_month,
        current_month_head,
        data_fingerprint,
        updated_at,
    })
}

fn normalize_head(obj: &Map<String, Value>, default_learning_rate: f64) -> Option<NeuralHead> {
    let raw_weights = obj.get("weights")?.as_array()?;

    let mut weights = Vec::with_capacity(FEATURE_VECTOR_SIZE);
    for value in raw_weights.iter().take(FEATURE_VECTOR_SIZE) {
        weights.push(clamp_parameter(value.as_f64()?));
    }
    weights.resize(FEATURE_VECTOR_SIZE, 0.0);

    let bias = obj
        .get("bias")
        .and_then(Value::as_f64)
        .map(clamp_parameter)
        .unwrap_or(0.0);

    let learning_rate = obj
        .get("learningRate")
        .and_then(Value::as_f64)
        .filter(|lr| lr.is_finite() && *lr > 0.0)
        .unwrap_or(default_learning_rate);

    let trained_samples = obj
        .get("trainedSamples")
        .and_then(|v| {
            v.as_u64().or_else(|| {
                v.as_f64()
                    .filter(|n| n.is_finite() && *n > 0.0)
                    .map(|n| n.floor() as u64)
            })
        })
        .unwrap_or(0);

    let loss_ema = obj
        .get("lossEma")
        .and_then(Value::as_f64)
        .filter(|l| l.is_finite() && *l >= 0.0)
        .unwrap_or(0.0);

    Some(NeuralHead {
        weights,
        bias,
        learning_rate: clamp_learning_rate(learning_rate),
        trained_samples,
        loss_ema,
    })
}

/// Whether a snapshot can be used as-is
pub fn is_compatible(snapshot: &BrainSnapshot) -> bool {
    snapshot.version == SNAPSHOT_VERSION
        && snapshot.feature_schema_version == FEATURE_SCHEMA_VERSION
        && head_is_valid(&snapshot.next_month)
        && head_is_valid(&snapshot.current_month_head)
}

fn head_is_valid(head: &NeuralHead) -> bool {
    let in_limits = |v: &f64| v.is_finite() && v.abs() <= WEIGHT_LIMIT;

    head.weights.len() == FEATURE_VECTOR_SIZE
        && head.weights.iter().all(in_limits)
        && in_limits(&head.bias)
        && head.learning_rate.is_finite()
        && (MIN_LEARNING_RATE..=MAX_LEARNING_RATE).contains(&head.learning_rate)
        && head.loss_ema.is_finite()
        && head.loss_ema >= 0.0
}

pub fn forward(head: &NeuralHead, x: &[f64]) -> ForwardPass {
    let normalized_x = normalize_input(x);
    let logit = head.bias
        + head
            .weights
            .iter()
            .zip(normalized_x.iter())
            .map(|(w, v)| w * v)
            .sum::<f64>();
    let activation = sigmoid(logit);

    ForwardPass {
        normalized_x,
        logit,
        activation,
        predicted_ratio: 2.0 * activation,
    }
}

/// One SGD pass over `samples` in input order
///
/// Weights and bias are clamped after every sample, not just per epoch.
pub fn train_epoch(head: &NeuralHead, samples: &[TrainingSample]) -> EpochOutcome {
    let mut next = head.clone();
    if samples.is_empty() {
        return EpochOutcome {
            head: next,
            average_loss: 0.0,
        };
    }

    let learning_rate = next.learning_rate;
    let mut total_loss = 0.0;

    for sample in samples {
        let pass = forward(&next, &sample.x);
        let target = if sample.y.is_finite() {
            sample.y.clamp(0.0, MAX_TARGET)
        } else {
            0.0
        };

        let error = pass.predicted_ratio - target;
        total_loss += error * error;

        // d(loss)/dz through predicted = 2 * sigmoid(z)
        let gradient = 2.0 * error * (2.0 * pass.activation * (1.0 - pass.activation));

        for (weight, value) in next.weights.iter_mut().zip(pass.normalized_x.iter()) {
            *weight = clamp_parameter(*weight - learning_rate * gradient * value);
        }
        next.bias = clamp_parameter(next.bias - learning_rate * gradient);
    }

    EpochOutcome {
        head: next,
        average_loss: total_loss / samples.len() as f64,
    }
}

/// Fold a finished training run into the head's running statistics
pub fn finalize_head(head: &NeuralHead, sample_count: usize, average_loss: f64) -> NeuralHead {
    let mut next = head.clone();
    next.trained_samples = next.trained_samples.saturating_add(sample_count as u64);

    if average_loss.is_finite() && average_loss >= 0.0 {
        next.loss_ema = if next.loss_ema == 0.0 {
            average_loss
        } else {
            next.loss_ema * (1.0 - LOSS_EMA_ALPHA) + average_loss * LOSS_EMA_ALPHA
        };
    }

    next.learning_rate = clamp_learning_rate(next.learning_rate * LEARNING_RATE_DECAY);
    next
}

/// Confidence in [0.08, 0.99] from sample count and loss
pub fn compute_confidence(head: &NeuralHead) -> f64 {
    let sample_factor = (head.trained_samples as f64 / CONFIDENCE_SAMPLE_SATURATION).min(1.0);
    let loss_factor = if head.loss_ema.is_finite() {
        (1.0 - head.loss_ema / CONFIDENCE_LOSS_CEILING).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let confidence = CONFIDENCE_FLOOR
        + sample_factor * CONFIDENCE_SAMPLE_WEIGHT
        + loss_factor * CONFIDENCE_LOSS_WEIGHT;
    confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

/// Inference with per-feature contributions
pub fn predict(head: &NeuralHead, x: &[f64], feature_names: &[&str]) -> Prediction {
    let pass = forward(head, x);

    let mut contributors: Vec<FeatureContribution> = pass
        .normalized_x
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let weight = head.weights.get(i).copied().unwrap_or(0.0);
            FeatureContribution {
                feature: feature_names
                    .get(i)
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| format!("feature_{}", i)),
                value: *value,
                weight,
                contribution: value * weight,
            }
        })
        .collect();

    contributors.sort_by(|a, b| {
        b.contribution
            .abs()
            .partial_cmp(&a.contribution.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Prediction {
        predicted_ratio: pass.predicted_ratio,
        risk_score: sigmoid((pass.predicted_ratio - 1.0) * RISK_STEEPNESS),
        confidence: compute_confidence(head),
        contributors,
    }
}

fn normalize_input(x: &[f64]) -> Vec<f64> {
    (0..FEATURE_VECTOR_SIZE)
        .map(|i| match x.get(i) {
            Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
            _ => 0.0,
        })
        .collect()
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn clamp_parameter(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(-WEIGHT_LIMIT, WEIGHT_LIMIT)
    } else {
        0.0
    }
}

fn clamp_learning_rate(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(MIN_LEARNING_RATE, MAX_LEARNING_RATE)
    } else {
        MIN_LEARNING_RATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_NAMES;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn sample(x: [f64; FEATURE_VECTOR_SIZE], y: f64) -> TrainingSample {
        TrainingSample {
            period: "2025-01".to_string(),
            x,
            y,
        }
    }

    #[test]
    fn test_newborn_confidence() {
        let head = create_empty_head(DEFAULT_NEXT_MONTH_LEARNING_RATE);
        assert!((compute_confidence(&head) - 0.30).abs() < 1e-12);
    }

    #[test]
    fn test_confidence_bounds() {
        let mut head = create_empty_head(0.03);
        head.trained_samples = 10_000;
        assert!((compute_confidence(&head) - 0.99).abs() < 1e-12);

        head.loss_ema = 50.0;
        assert!((compute_confidence(&head) - 0.82).abs() < 1e-12);

        head.loss_ema = f64::NAN;
        head.trained_samples = 0;
        let c = compute_confidence(&head);
        assert!((0.08..=0.99).contains(&c));
    }

    #[test]
    fn test_empty_head_clamps_learning_rate() {
        assert_eq!(create_empty_head(1.0).learning_rate, MAX_LEARNING_RATE);
        assert_eq!(create_empty_head(0.0).learning_rate, MIN_LEARNING_RATE);
        assert_eq!(create_empty_head(f64::NAN).learning_rate, MIN_LEARNING_RATE);
        assert_eq!(create_empty_head(0.02).weights.len(), FEATURE_VECTOR_SIZE);
    }

    #[test]
    fn test_forward_newborn_predicts_ratio_one() {
        let head = create_empty_head(0.03);
        let pass = forward(&head, &[0.4; FEATURE_VECTOR_SIZE]);
        assert_eq!(pass.logit, 0.0);
        assert!((pass.predicted_ratio - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_forward_normalizes_input() {
        let mut head = create_empty_head(0.03);
        head.weights = vec![1.0; FEATURE_VECTOR_SIZE];
        let pass = forward(&head, &[2.0, -1.0, f64::NAN]);
        assert_eq!(pass.normalized_x.len(), FEATURE_VECTOR_SIZE);
        assert_eq!(&pass.normalized_x[..4], &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(pass.logit, 1.0);
    }

    #[test]
    fn test_training_reduces_loss() {
        let samples = vec![
            sample([0.2, 0.1, 0.3, 0.6, 0.5, 0.5, 0.5, 0.2], 0.4),
            sample([0.3, 0.2, 0.2, 0.4, 0.6, 0.6, 0.5, 0.2], 0.6),
            sample([0.3, 0.1, 0.3, 0.4, 0.5, 0.4, 0.4, 0.3], 0.5),
        ];
        let mut head = create_empty_head(0.05);
        let first = train_epoch(&head, &samples);
        head = first.head.clone();
        let mut last_loss = first.average_loss;
        for _ in 0..200 {
            let outcome = train_epoch(&head, &samples);
            head = outcome.head;
            last_loss = outcome.average_loss;
        }
        assert!(last_loss < first.average_loss);
    }

    #[test]
    fn test_train_epoch_does_not_mutate_input() {
        let head = create_empty_head(0.03);
        let before = head.clone();
        let outcome = train_epoch(&head, &[sample([1.0; FEATURE_VECTOR_SIZE], 2.0)]);
        assert_eq!(head, before);
        assert_ne!(outcome.head.weights, before.weights);
    }

    #[test]
    fn test_weights_stay_bounded() {
        let mut head = create_empty_head(MAX_LEARNING_RATE);
        head.weights = vec![7.99; FEATURE_VECTOR_SIZE];
        head.bias = -7.99;
        let samples = vec![
            sample([1.0; FEATURE_VECTOR_SIZE], 2.0),
            sample([0.0; FEATURE_VECTOR_SIZE], 0.0),
            sample([1.0; FEATURE_VECTOR_SIZE], f64::INFINITY),
        ];
        for _ in 0..500 {
            head = train_epoch(&head, &samples).head;
            assert!(head.weights.iter().all(|w| w.abs() <= WEIGHT_LIMIT));
            assert!(head.bias.abs() <= WEIGHT_LIMIT);
        }
    }

    #[test]
    fn test_empty_epoch_is_noop() {
        let head = create_empty_head(0.03);
        let outcome = train_epoch(&head, &[]);
        assert_eq!(outcome.head, head);
        assert_eq!(outcome.average_loss, 0.0);
    }

    #[test]
    fn test_finalize_head() {
        let head = create_empty_head(0.03);

        let first = finalize_head(&head, 5, 0.1);
        assert_eq!(first.trained_samples, 5);
        assert!((first.loss_ema - 0.1).abs() < 1e-12);
        assert!((first.learning_rate - 0.03 * LEARNING_RATE_DECAY).abs() < 1e-12);

        let second = finalize_head(&first, 3, 0.2);
        assert_eq!(second.trained_samples, 8);
        assert!((second.loss_ema - (0.1 * 0.78 + 0.2 * 0.22)).abs() < 1e-12);

        let mut slow = create_empty_head(MIN_LEARNING_RATE);
        slow = finalize_head(&slow, 1, 0.1);
        assert_eq!(slow.learning_rate, MIN_LEARNING_RATE);
    }

    #[test]
    fn test_predict_contributors_sorted() {
        let mut head = create_empty_head(0.03);
        head.weights = vec![0.5, -3.0, 1.0, 0.0, 2.0, 0.0, 0.0, -0.1];
        let x = [1.0, 1.0, 0.5, 1.0, 0.25, 0.0, 0.0, 1.0];
        let prediction = predict(&head, &x, &FEATURE_NAMES);

        let names: Vec<&str> = prediction
            .contributors
            .iter()
            .map(|c| c.feature.as_str())
            .collect();
        assert_eq!(names[0], "superfluous_share");
        assert_eq!(prediction.contributors[0].contribution, -3.0);
        assert_eq!(prediction.contributors.len(), FEATURE_VECTOR_SIZE);
        assert_eq!(prediction, predict(&head, &x, &FEATURE_NAMES));
    }

    #[test]
    fn test_risk_score_is_half_at_ratio_one() {
        let head = create_empty_head(0.03);
        let prediction = predict(&head, &[0.0; FEATURE_VECTOR_SIZE], &FEATURE_NAMES);
        assert!((prediction.risk_score - 0.5).abs() < 1e-12);
        assert!((prediction.confidence - 0.30).abs() < 1e-12);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = create_new_snapshot(now());
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["version"], SNAPSHOT_VERSION);
        assert_eq!(json["weights"].as_array().unwrap().len(), FEATURE_VECTOR_SIZE);
        assert!(json["learningRate"].is_number());
        assert!(json["currentMonthHead"]["weights"].is_array());
        assert_eq!(json["dataFingerprint"], "");
    }

    #[test]
    fn test_classify_current_snapshot() {
        let snapshot = create_new_snapshot(now());
        let raw = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            StoredSnapshot::classify(Some(raw)),
            StoredSnapshot::Current(snapshot)
        );
        assert_eq!(StoredSnapshot::classify(None), StoredSnapshot::Absent);
        assert_eq!(StoredSnapshot::classify(Some(Value::Null)), StoredSnapshot::Absent);
    }

    #[test]
    fn test_migrate_legacy_single_head() {
        let raw = json!({
            "version": 1,
            "weights": [0.5, -0.25, 12.0, 0.1, 0.2],
            "bias": -20.0,
            "learningRate": 0.2,
            "trainedSamples": 12,
            "lossEma": 0.05,
            "dataFingerprint": "deadbeef",
            "updatedAt": "2025-01-15T10:00:00Z"
        });

        let stored = StoredSnapshot::classify(Some(raw));
        assert!(stored.is_legacy());
        let snapshot = stored.resolve(now()).unwrap();

        assert!(is_compatible(&snapshot));
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        assert_eq!(snapshot.next_month.weights, vec![0.5, -0.25, 8.0, 0.1, 0.2, 0.0, 0.0, 0.0]);
        assert_eq!(snapshot.next_month.bias, -WEIGHT_LIMIT);
        assert_eq!(snapshot.next_month.learning_rate, MAX_LEARNING_RATE);
        assert_eq!(snapshot.next_month.trained_samples, 12);
        assert_eq!(snapshot.current_month_head.trained_samples, 0);
        assert_eq!(snapshot.data_fingerprint, "deadbeef");
        assert_eq!(
            snapshot.updated_at,
            Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_migrate_truncates_and_defaults() {
        let raw = json!({
            "weights": [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
            "learningRate": 0,
            "trainedSamples": -4,
            "lossEma": -1,
            "currentMonthHead": { "weights": [] },
            "updatedAt": 1_700_000_000_000i64
        });
        let snapshot = migrate_snapshot(&raw, now()).unwrap();
        assert_eq!(snapshot.next_month.weights.len(), FEATURE_VECTOR_SIZE);
        assert_eq!(snapshot.next_month.learning_rate, DEFAULT_NEXT_MONTH_LEARNING_RATE);
        assert_eq!(snapshot.next_month.trained_samples, 0);
        assert_eq!(snapshot.next_month.loss_ema, 0.0);
        assert_eq!(snapshot.current_month_head.weights, vec![0.0; FEATURE_VECTOR_SIZE]);
        assert_eq!(snapshot.data_fingerprint, "");
        assert_eq!(snapshot.updated_at.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_migrate_rejects_unusable_shapes() {
        assert!(migrate_snapshot(&json!({}), now()).is_none());
        assert!(migrate_snapshot(&json!({"weights": "nope"}), now()).is_none());
        assert!(migrate_snapshot(&json!({"weights": [1, "x"]}), now()).is_none());
        assert!(migrate_snapshot(
            &json!({"weights": [], "currentMonthHead": {"bias": 1}}),
            now()
        )
        .is_none());
        assert!(migrate_snapshot(&json!({"weights": [], "currentMonthHead": 3}), now()).is_none());
    }

    #[test]
    fn test_migration_is_total() {
        let inputs = vec![
            json!(null),
            json!(true),
            json!(42),
            json!("snapshot"),
            json!([1, 2, 3]),
            json!({"weights": null}),
            json!({"weights": [[1]]}),
            json!({"weights": [1e308, -1e308], "bias": "x", "learningRate": "fast"}),
            json!({"weights": [], "currentMonthHead": {"weights": [0.1], "lossEma": 1e300}}),
            json!({"weights": [], "updatedAt": {"nested": true}, "dataFingerprint": 7}),
        ];
        for raw in inputs {
            if let Some(snapshot) = migrate_snapshot(&raw, now()) {
                assert!(is_compatible(&snapshot), "incompatible migration of {}", raw);
            }
        }
    }

    #[test]
    fn test_is_compatible_rejects_stale_versions() {
        let mut snapshot = create_new_snapshot(now());
        assert!(is_compatible(&snapshot));

        snapshot.feature_schema_version = 1;
        assert!(!is_compatible(&snapshot));

        let mut snapshot = create_new_snapshot(now());
        snapshot.current_month_head.weights.pop();
        assert!(!is_compatible(&snapshot));

        let mut snapshot = create_new_snapshot(now());
        snapshot.next_month.learning_rate = 0.5;
        assert!(!is_compatible(&snapshot));
    }

    #[test]
    fn test_with_head_copies() {
        let snapshot = create_new_snapshot(now());
        let trained = finalize_head(&snapshot.current_month_head, 4, 0.1);
        let updated = snapshot.with_head(HeadKind::CurrentMonth, trained.clone());
        assert_eq!(updated.head(HeadKind::CurrentMonth), &trained);
        assert_eq!(snapshot.current_month_head.trained_samples, 0);
    }
}
