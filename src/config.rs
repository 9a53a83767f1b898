use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    classifier::TrainOptions,
    error::{Error, Result},
};

/// Tuning knobs for facet learning.
///
/// Read from `config.json` in the data directory; every field is optional
/// and falls back to its default.
///
/// # Examples
///
/// ```
/// use facetlearn::FacetConfig;
///
/// let config: FacetConfig = serde_json::from_str(r#"{"n_results": 20}"#).unwrap();
/// assert_eq!(config.n_results, 20);
/// assert_eq!(config.seed, 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacetConfig {
    /// Number of novel candidates a session aims to return.
    pub n_results: usize,
    /// Seed for negative sampling, reapplied at the start of every query.
    pub seed: u64,
    /// Sample weight given to every positive and negative training row.
    pub example_weight: f64,
    /// Inverse L2 regularization strength.
    pub regularization: f64,
    pub max_iter: usize,
    pub tolerance: f64,
    /// Embedding rows scored per inference batch.
    pub batch_size: usize,
}

impl Default for FacetConfig {
    fn default() -> Self {
        Self {
            n_results: 1000,
            seed: 0,
            example_weight: 10.0,
            regularization: 1.0,
            max_iter: 100_000,
            tolerance: 1e-4,
            batch_size: 65_536,
        }
    }
}

impl FacetConfig {
    /// Load from a JSON file, or return the defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.example_weight.is_finite() && self.example_weight > 0.0) {
            return Err(Error::Config(format!(
                "example_weight must be a positive number, got {}",
                self.example_weight
            )));
        }
        if !(self.regularization.is_finite() && self.regularization > 0.0) {
            return Err(Error::Config(format!(
                "regularization must be a positive number, got {}",
                self.regularization
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(Error::Config(format!(
                "tolerance must be a positive number, got {}",
                self.tolerance
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        Ok(())
    }

    pub fn train_options(&self) -> TrainOptions {
        TrainOptions {
            regularization: self.regularization,
            max_iter: self.max_iter,
            tolerance: self.tolerance,
        }
    }
}
