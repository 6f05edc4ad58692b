//! Benchmark configuration.
//!
//! [`BenchConfig`] is the loose, user-facing shape (JSON file or CLI flags);
//! [`BenchConfig::validate`] turns it into a [`RunPlan`] of already-checked
//! values, or a [`ConfigError`] listing the valid options. Nothing here
//! touches a store.

use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use treeload_model::case::case_names;
use treeload_model::{find_case, Case};

use crate::assembler::BatchBound;
use crate::strategy::Strategy;

/// Store-appropriate range for `batch_size`.
pub const BATCH_SIZE_RANGE: RangeInclusive<usize> = 100..=10_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown case `{name}` (valid cases: {valid})")]
    UnknownCase { name: String, valid: String },

    #[error("unsupported strategy `{name}` (valid strategies: {valid})")]
    UnsupportedStrategy { name: String, valid: String },

    #[error("batch size {value} out of range (valid range: {min}..={max})")]
    BatchSizeOutOfRange { value: usize, min: usize, max: usize },

    #[error("iteration count must be at least 1, got {value}")]
    InvalidIterations { value: usize },

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Where benchmark trees come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureSource {
    /// Generate each case deterministically from a seed.
    Synthetic { seed: u64 },
    /// Load `<dir>/<case name>.json` snapshots.
    SnapshotDir { dir: PathBuf },
}

impl Default for FixtureSource {
    fn default() -> Self {
        FixtureSource::Synthetic { seed: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Strategy numbers or names (`"2"`, `"bounded"`).
    pub strategies: Vec<String>,
    pub iterations: usize,
    pub batch_size: usize,
    /// Optional hard cap on lines per batch.
    pub max_batch_lines: Option<usize>,
    pub cases: Vec<String>,
    pub validate: bool,
    pub fixture: FixtureSource,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            strategies: Strategy::ALL.iter().map(|s| s.name().to_string()).collect(),
            iterations: 5,
            batch_size: 1_000,
            max_batch_lines: None,
            cases: vec!["case_100".to_string()],
            validate: false,
            fixture: FixtureSource::default(),
        }
    }
}

/// A checked benchmark run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub strategies: Vec<Strategy>,
    pub cases: Vec<&'static Case>,
    pub iterations: usize,
    pub bound: BatchBound,
    pub validate: bool,
    pub fixture: FixtureSource,
}

impl BenchConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<RunPlan, ConfigError> {
        let strategies = self
            .strategies
            .iter()
            .map(|s| s.parse::<Strategy>())
            .collect::<Result<Vec<_>, _>>()?;

        let cases = self
            .cases
            .iter()
            .map(|name| {
                find_case(name).map_err(|_| ConfigError::UnknownCase {
                    name: name.clone(),
                    valid: case_names(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if !BATCH_SIZE_RANGE.contains(&self.batch_size) {
            return Err(ConfigError::BatchSizeOutOfRange {
                value: self.batch_size,
                min: *BATCH_SIZE_RANGE.start(),
                max: *BATCH_SIZE_RANGE.end(),
            });
        }
        if self.iterations < 1 {
            return Err(ConfigError::InvalidIterations {
                value: self.iterations,
            });
        }

        let mut bound = BatchBound::soft(self.batch_size);
        if let Some(ceiling) = self.max_batch_lines {
            bound = bound.with_ceiling(ceiling);
        }

        Ok(RunPlan {
            strategies,
            cases,
            iterations: self.iterations,
            bound,
            validate: self.validate,
            fixture: self.fixture.clone(),
        })
    }
}
