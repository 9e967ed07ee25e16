//! Calibrator configuration
//!
//! A calibrator can be described by a small JSON document, so operators can
//! regenerate caches without writing code:
//!
//! ```json
//! {
//!     "cache_path": "model.calib",
//!     "algorithm": "entropy_2",
//!     "batch_size": 8,
//!     "scale_file": "scales.txt"
//! }
//! ```

use crate::algorithm::CalibrationAlgorithm;
use crate::calibrator::DEFAULT_QUANTILE;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for a [`Calibrator`](crate::Calibrator)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratorConfig {
    /// Calibration cache file
    #[serde(alias = "cache_file", alias = "calibration_table")]
    pub cache_path: PathBuf,

    /// Algorithm key: `legacy`, `entropy`, `entropy_2` or `minmax`
    #[serde(default = "default_algorithm", alias = "algo")]
    pub algorithm: String,

    /// Samples per batch
    #[serde(alias = "batchsize")]
    pub batch_size: usize,

    /// Legacy calibration quantile
    #[serde(default = "default_quantile")]
    pub quantile: f64,

    /// Operator scale file applied on construction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_file: Option<PathBuf>,

    /// Device for batch buffers: `cpu`, `cuda` or `cuda:N`
    #[serde(default = "default_device")]
    pub device: String,
}

fn default_algorithm() -> String {
    CalibrationAlgorithm::default().key().to_string()
}

fn default_quantile() -> f64 {
    DEFAULT_QUANTILE
}

fn default_device() -> String {
    "cpu".to_string()
}

impl CalibratorConfig {
    /// Create a configuration with default algorithm, quantile and device
    pub fn new(cache_path: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            cache_path: cache_path.into(),
            algorithm: default_algorithm(),
            batch_size,
            quantile: default_quantile(),
            scale_file: None,
            device: default_device(),
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| {
            Error::invalid_config(format!(
                "Failed to read calibrator config at {:?}: {}",
                path, e
            ))
        })?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Set the algorithm
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: CalibrationAlgorithm) -> Self {
        self.algorithm = algorithm.key().to_string();
        self
    }

    /// Set the legacy quantile
    #[must_use]
    pub fn with_quantile(mut self, quantile: f64) -> Self {
        self.quantile = quantile;
        self
    }

    /// Set the operator scale file
    #[must_use]
    pub fn with_scale_file(mut self, scale_file: impl Into<PathBuf>) -> Self {
        self.scale_file = Some(scale_file.into());
        self
    }

    /// Set the device string
    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Resolved algorithm selector
    pub fn algorithm(&self) -> Result<CalibrationAlgorithm> {
        CalibrationAlgorithm::from_key(&self.algorithm)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache_path.as_os_str().is_empty() {
            return Err(Error::invalid_config("cache_path must not be empty"));
        }

        if self.batch_size == 0 {
            return Err(Error::invalid_config("batch_size must be > 0"));
        }

        if !(self.quantile > 0.0 && self.quantile <= 1.0) {
            return Err(Error::invalid_config(format!(
                "quantile must be in (0, 1], got {}",
                self.quantile
            )));
        }

        self.algorithm()?;
        Ok(())
    }
}
