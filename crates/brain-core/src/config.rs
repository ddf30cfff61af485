//! Brain configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. An explicit path, or the override in the data dir
//!    (~/.local/share/brain/config/brain.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Keys missing from a file keep their built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{DEFAULT_CURRENT_MONTH_LEARNING_RATE, DEFAULT_NEXT_MONTH_LEARNING_RATE};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/brain.toml");

/// Default storage slot key
pub const DEFAULT_SLOT_KEY: &str = "brain_snapshot_v2";

#[derive(Debug, Clone, PartialEq)]
pub struct BrainConfig {
    pub slot_key: String,
    /// A head trains only when its sample set has at least this many samples
    pub min_samples_for_training: usize,
    pub next_month_learning_rate: f64,
    pub current_month_learning_rate: f64,
    pub nowcast: NowcastGate,
}

/// Thresholds a nowcast must clear before it is reported as ready
#[derive(Debug, Clone, PartialEq)]
pub struct NowcastGate {
    pub min_months: usize,
    pub min_trained_samples: u64,
    pub min_confidence: f64,
}

impl Default for NowcastGate {
    fn default() -> Self {
        Self {
            min_months: 2,
            min_trained_samples: 16,
            min_confidence: 0.55,
        }
    }
}

impl NowcastGate {
    pub fn is_ready(&self, months: usize, trained_samples: u64, confidence: f64) -> bool {
        months >= self.min_months
            && trained_samples >= self.min_trained_samples
            && confidence >= self.min_confidence
    }
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            slot_key: DEFAULT_SLOT_KEY.to_string(),
            min_samples_for_training: 1,
            next_month_learning_rate: DEFAULT_NEXT_MONTH_LEARNING_RATE,
            current_month_learning_rate: DEFAULT_CURRENT_MONTH_LEARNING_RATE,
            nowcast: NowcastGate::default(),
        }
    }
}

impl BrainConfig {
    /// Load from the default override location, else the embedded defaults
    pub fn load() -> Result<Self> {
        load_config(None)
    }

    /// Load from an explicit path; a missing file falls back to the embedded defaults
    pub fn from_path(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    /// Parse config from TOML content
    pub fn parse(content: &str) -> Result<Self> {
        parse_config(content)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("brain").join("config").join("brain.toml"))
}

fn load_config(override_path: Option<&Path>) -> Result<BrainConfig> {
    let path = match override_path {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path(),
    };

    let content = match path {
        Some(path) if path.exists() => {
            debug!(path = %path.display(), "Loading brain config override");
            fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?
        }
        _ => DEFAULT_CONFIG.to_string(),
    };

    parse_config(&content)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    storage: Option<RawStorage>,
    training: Option<RawTraining>,
    nowcast: Option<RawNowcast>,
}

#[derive(Debug, Deserialize)]
struct RawStorage {
    slot_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTraining {
    min_samples: Option<usize>,
    next_month_learning_rate: Option<f64>,
    current_month_learning_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawNowcast {
    min_months: Option<usize>,
    min_trained_samples: Option<u64>,
    min_confidence: Option<f64>,
}

fn parse_config(content: &str) -> Result<BrainConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = BrainConfig::default();

    if let Some(storage) = raw.storage {
        if let Some(slot_key) = storage.slot_key {
            if slot_key.trim().is_empty() {
                return Err(Error::Config("storage.slot_key must not be empty".to_string()));
            }
            config.slot_key = slot_key;
        }
    }

    if let Some(training) = raw.training {
        if let Some(min_samples) = training.min_samples {
            // Zero would train on empty sample sets
            config.min_samples_for_training = min_samples.max(1);
        }
        if let Some(lr) = training.next_month_learning_rate {
            config.next_month_learning_rate = positive_rate("next_month_learning_rate", lr)?;
        }
        if let Some(lr) = training.current_month_learning_rate {
            config.current_month_learning_rate = positive_rate("current_month_learning_rate", lr)?;
        }
    }

    if let Some(nowcast) = raw.nowcast {
        if let Some(min_months) = nowcast.min_months {
            config.nowcast.min_months = min_months;
        }
        if let Some(min_trained) = nowcast.min_trained_samples {
            config.nowcast.min_trained_samples = min_trained;
        }
        if let Some(min_confidence) = nowcast.min_confidence {
            if !(0.0..=1.0).contains(&min_confidence) {
                return Err(Error::Config(format!(
                    "nowcast.min_confidence must be within [0, 1], got {}",
                    min_confidence
                )));
            }
            config.nowcast.min_confidence = min_confidence;
        }
    }

    Ok(config)
}

fn positive_rate(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::Config(format!(
            "training.{} must be a positive number, got {}",
            name, value
        )))
    }
}
