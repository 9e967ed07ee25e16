//! Calibration algorithm selector
//!
//! The quantization engine owns the actual calibration math. This crate only
//! records which algorithm the engine should run, chosen once from a string key.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calibration algorithm requested from the quantization engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationAlgorithm {
    /// Legacy percentile calibration (uses quantile and regression cutoff)
    Legacy,
    /// Entropy calibration
    Entropy,
    /// Entropy calibration, second revision
    #[serde(rename = "entropy_2")]
    Entropy2,
    /// Min-max calibration
    #[serde(rename = "minmax")]
    MinMax,
}

impl CalibrationAlgorithm {
    /// All selectors, in engine enumeration order
    pub const ALL: [CalibrationAlgorithm; 4] = [
        CalibrationAlgorithm::Legacy,
        CalibrationAlgorithm::Entropy,
        CalibrationAlgorithm::Entropy2,
        CalibrationAlgorithm::MinMax,
    ];

    /// Resolve a selector from its configuration key
    ///
    /// Keys are `legacy`, `entropy`, `entropy_2` and `minmax`. Matching is exact.
    ///
    /// # Examples
    /// ```rust
    /// use int8cal::CalibrationAlgorithm;
    ///
    /// let algo = CalibrationAlgorithm::from_key("entropy_2")?;
    /// assert_eq!(algo, CalibrationAlgorithm::Entropy2);
    /// # Ok::<(), int8cal::Error>(())
    /// ```
    pub fn from_key(key: &str) -> Result<Self> {
        match key {
            "legacy" => Ok(Self::Legacy),
            "entropy" => Ok(Self::Entropy),
            "entropy_2" => Ok(Self::Entropy2),
            "minmax" => Ok(Self::MinMax),
            _ => Err(Error::unknown_algorithm(key)),
        }
    }

    /// Configuration key for this selector
    pub fn key(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Entropy => "entropy",
            Self::Entropy2 => "entropy_2",
            Self::MinMax => "minmax",
        }
    }

    /// Numeric value the engine uses for this selector
    pub fn engine_code(&self) -> i32 {
        match self {
            Self::Legacy => 0,
            Self::Entropy => 1,
            Self::Entropy2 => 2,
            Self::MinMax => 3,
        }
    }

    /// Whether the legacy-only accessors (quantile, regression cutoff) apply
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy)
    }
}

impl Default for CalibrationAlgorithm {
    fn default() -> Self {
        Self::Entropy
    }
}

impl FromStr for CalibrationAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_key(s)
    }
}

impl fmt::Display for CalibrationAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
