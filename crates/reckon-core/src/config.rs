//! Engine configuration
//!
//! Resolution order, highest priority last:
//! 1. Built-in defaults
//! 2. Optional TOML file (`EngineConfig::load`)
//! 3. Environment overrides (`RECKON_AMOUNT_EPSILON`,
//!    `RECKON_SIMILARITY_THRESHOLD`)
//!
//! The source precedence lives here on purpose: which capture path survives a
//! duplicate cluster is a policy decision, not an implementation accident.

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing::warn;

use crate::dedup::DedupConfig;
use crate::error::{Error, Result};
use crate::models::SourceKind;

/// Tuning knobs for the reconciliation engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Currency-unit epsilon for the duplicate amount check
    pub amount_epsilon: f64,
    /// Title similarity a candidate must exceed to count as a duplicate
    pub similarity_threshold: f64,
    /// Fixed processing order of the two sources. The earlier source wins
    /// duplicate ties; this is concatenation order, not a claim about which
    /// record was created first in real time.
    pub precedence: [SourceKind; 2],
    /// Capacity of the snapshot fan-in channel
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            amount_epsilon: 0.01,      // one cent
            similarity_threshold: 0.7, // normalized Levenshtein
            precedence: [SourceKind::Manual, SourceKind::Ocr],
            channel_capacity: 16,
        }
    }
}

/// On-disk shape; every key optional so partial files work
#[derive(Debug, Deserialize)]
struct TomlConfig {
    amount_epsilon: Option<f64>,
    similarity_threshold: Option<f64>,
    precedence: Option<Vec<String>>,
    channel_capacity: Option<usize>,
}

impl EngineConfig {
    /// Parse a TOML config string over the defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let parsed: TomlConfig = toml::from_str(text)?;
        let mut config = Self::default();

        if let Some(epsilon) = parsed.amount_epsilon {
            config.amount_epsilon = epsilon;
        }
        if let Some(threshold) = parsed.similarity_threshold {
            config.similarity_threshold = threshold;
        }
        if let Some(names) = parsed.precedence {
            if names.len() != 2 {
                return Err(Error::Config(format!(
                    "precedence must name exactly 2 sources, got {}",
                    names.len()
                )));
            }
            let first = SourceKind::from_str(&names[0]).map_err(Error::Config)?;
            let second = SourceKind::from_str(&names[1]).map_err(Error::Config)?;
            config.precedence = [first, second];
        }
        if let Some(capacity) = parsed.channel_capacity {
            config.channel_capacity = capacity;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file over the defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Apply environment overrides on top of the current values.
    ///
    /// Unparseable values are ignored with a warning rather than failing
    /// startup.
    pub fn apply_env(&mut self) {
        if let Ok(raw) = std::env::var("RECKON_AMOUNT_EPSILON") {
            match raw.parse::<f64>() {
                Ok(value) => self.amount_epsilon = value,
                Err(_) => warn!("Ignoring unparseable RECKON_AMOUNT_EPSILON: {}", raw),
            }
        }
        if let Ok(raw) = std::env::var("RECKON_SIMILARITY_THRESHOLD") {
            match raw.parse::<f64>() {
                Ok(value) => self.similarity_threshold = value,
                Err(_) => warn!("Ignoring unparseable RECKON_SIMILARITY_THRESHOLD: {}", raw),
            }
        }
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.amount_epsilon.is_finite() || self.amount_epsilon <= 0.0 {
            return Err(Error::Config(format!(
                "amount_epsilon must be positive, got {}",
                self.amount_epsilon
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::Config(format!(
                "similarity_threshold must be within 0.0..=1.0, got {}",
                self.similarity_threshold
            )));
        }
        if self.precedence[0] == self.precedence[1] {
            return Err(Error::Config(format!(
                "precedence lists {} twice",
                self.precedence[0]
            )));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config("channel_capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// Duplicate-detector view of this config
    pub fn dedup(&self) -> DedupConfig {
        DedupConfig {
            amount_epsilon: self.amount_epsilon,
            similarity_threshold: self.similarity_threshold,
        }
    }
}
