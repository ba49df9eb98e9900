// Configuration schema and types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level Zeus configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZeusConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub stale: StaleSection,
    #[serde(default)]
    pub affinity: AffinitySection,
}

/// File store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    /// Base directory every store path is relative to
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
    /// Milliseconds a mutating flow waits for the per-file lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_base_dir() -> String {
    ".zeus".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// Bottleneck / timeline thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSection {
    /// Days without an update before a task counts as stagnating
    #[serde(default = "default_stagnation_days")]
    pub stagnation_days: i64,
    /// Grace days before a past-due task is reported
    #[serde(default)]
    pub overdue_days: i64,
}

fn default_stagnation_days() -> i64 {
    14
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            stagnation_days: default_stagnation_days(),
            overdue_days: 0,
        }
    }
}

/// Stale entity thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaleSection {
    #[serde(default = "default_completed_days")]
    pub completed_days: i64,
    #[serde(default = "default_blocked_days")]
    pub blocked_days: i64,
    #[serde(default = "default_no_progress_days")]
    pub no_progress_days: i64,
}

fn default_completed_days() -> i64 {
    30
}

fn default_blocked_days() -> i64 {
    14
}

fn default_no_progress_days() -> i64 {
    21
}

impl Default for StaleSection {
    fn default() -> Self {
        Self {
            completed_days: default_completed_days(),
            blocked_days: default_blocked_days(),
            no_progress_days: default_no_progress_days(),
        }
    }
}

/// Affinity graph settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffinitySection {
    /// Sibling group size beyond which hub mode engages
    #[serde(default = "default_max_siblings")]
    pub max_siblings: usize,
    /// Minimum edge score kept after weighting
    #[serde(default)]
    pub min_score: f64,
    /// Edge cap (0 = unlimited)
    #[serde(default)]
    pub max_edges: usize,
}

fn default_max_siblings() -> usize {
    20
}

impl Default for AffinitySection {
    fn default() -> Self {
        Self {
            max_siblings: default_max_siblings(),
            min_score: 0.0,
            max_edges: 0,
        }
    }
}

/// Reject configurations no engine could run with
pub fn validate_config(config: &ZeusConfig) -> Result<(), ConfigError> {
    if config.store.base_dir.is_empty() {
        return Err(ConfigError::Validation("store.base_dir is empty".into()));
    }
    if config.analysis.stagnation_days < 1 {
        return Err(ConfigError::Validation(
            "analysis.stagnation_days must be >= 1".into(),
        ));
    }
    if config.affinity.min_score < 0.0 || config.affinity.min_score > 1.0 {
        return Err(ConfigError::Validation(
            "affinity.min_score must be within [0, 1]".into(),
        ));
    }
    Ok(())
}
