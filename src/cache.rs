//! Calibration cache persistence
//!
//! The cache is an engine-defined blob. [`CalibrationCache`] stores and
//! retrieves it verbatim and never validates its structure. The text helpers
//! at the bottom of this module understand the line format the engine and the
//! scale override transcoder both emit:
//!
//! ```text
//! conv1: 3c010204
//! conv2
//! ```
//!
//! where the hex value is the IEEE-754 bit pattern of the per-element
//! quantization step, and a bare name asks the engine to compute that tensor.

use crate::error::{Error, Result};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Calibration cache file with an in-memory copy of the last read
#[derive(Debug, Clone)]
pub struct CalibrationCache {
    path: PathBuf,
    data: Vec<u8>,
}

impl CalibrationCache {
    /// Bind a cache to `path`. Nothing is read until [`CalibrationCache::read`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: Vec::new(),
        }
    }

    /// Path of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the cache file currently exists
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the whole cache file
    ///
    /// Returns `None` when the file cannot be opened, which tells the engine to
    /// run a full calibration. The returned slice stays valid until the next
    /// cache operation on `self`.
    pub fn read(&mut self) -> Option<&[u8]> {
        let mut file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) => {
                tracing::debug!("No calibration cache at {}: {}", self.path.display(), e);
                self.data.clear();
                return None;
            }
        };

        self.data.clear();
        if let Err(e) = file.read_to_end(&mut self.data) {
            tracing::warn!(
                "Failed to read calibration cache {}: {}",
                self.path.display(),
                e
            );
            self.data.clear();
            return None;
        }

        tracing::info!(
            "Loaded calibration cache {} ({} bytes)",
            self.path.display(),
            self.data.len()
        );
        Some(&self.data)
    }

    /// Overwrite the cache file with exactly `blob`
    pub fn try_write(&self, blob: &[u8]) -> Result<()> {
        fs::write(&self.path, blob)?;
        tracing::info!(
            "Wrote calibration cache {} ({} bytes)",
            self.path.display(),
            blob.len()
        );
        Ok(())
    }

    /// Best-effort variant of [`CalibrationCache::try_write`]
    ///
    /// Failures are logged and otherwise ignored. Returns whether the write
    /// succeeded.
    pub fn write(&self, blob: &[u8]) -> bool {
        match self.try_write(blob) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    "Could not write calibration cache {}: {}",
                    self.path.display(),
                    e
                );
                false
            }
        }
    }
}

/// Render a quantization step as the cache's hex field
///
/// Lowercase hex of the `f32` bit pattern, no prefix, no zero padding.
pub fn encode_step(step: f32) -> String {
    format!("{:x}", step.to_bits())
}

/// Parse a cache hex field back into the quantization step
pub fn decode_step(hex: &str) -> Option<f32> {
    u32::from_str_radix(hex.trim(), 16).ok().map(f32::from_bits)
}

/// One line of a text calibration cache
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Tensor name
    pub name: String,
    /// Per-element quantization step; `None` means the engine computes it
    pub step: Option<f32>,
}

impl CacheEntry {
    /// Scale in int8 full-scale units (`step * 127`)
    pub fn scale(&self) -> Option<f32> {
        self.step.map(|s| s * crate::transcode::INT8_FULL_SCALE)
    }

    /// Render the entry in cache text form, without a line terminator
    pub fn to_line(&self) -> String {
        match self.step {
            Some(step) => format!("{}: {}", self.name, encode_step(step)),
            None => self.name.clone(),
        }
    }
}

/// Parse a text calibration cache into entries
///
/// Blank lines are skipped. Lines without a colon (including engine header
/// lines) become entries without a step.
pub fn parse_cache_text(text: &str) -> Result<Vec<CacheEntry>> {
    let mut entries = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let (name, step) = match line.split_once(':') {
            Some((name, hex)) if !hex.trim().is_empty() => {
                let step = decode_step(hex).ok_or_else(|| Error::InvalidScale {
                    line: i + 1,
                    value: hex.trim().to_string(),
                })?;
                (name, Some(step))
            }
            Some((name, _)) => (name, None),
            None => (line, None),
        };

        entries.push(CacheEntry {
            name: name.to_string(),
            step,
        });
    }
    Ok(entries)
}
