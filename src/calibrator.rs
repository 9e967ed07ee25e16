//! INT8 calibrator driven by an external quantization engine
//!
//! The engine treats the calibrator as an opaque plugin and calls back into it
//! through [`Int8Calibrator`]:
//!
//! 1. `read_calibration_cache` - if it returns data, calibration is skipped.
//! 2. `next_batch` repeatedly until it returns `false`.
//! 3. `write_calibration_cache` once with the computed table.
//!
//! [`Calibrator`] implements that contract on top of a [`BatchStream`], a
//! [`DeviceBufferPool`] and a [`CalibrationCache`].
//!
//! # Example
//!
//! ```rust
//! use int8cal::{Calibrator, HostBatchStream, Int8Calibrator};
//! use candle_core::{Device, Tensor};
//!
//! let dir = tempfile::tempdir()?;
//! let stream = HostBatchStream::new(2, vec![4]).with_batch(vec![vec![1u8; 8]])?;
//! let mut calibrator =
//!     Calibrator::from_stream(stream, dir.path().join("calib.cache"), "entropy_2", &Device::Cpu)?;
//!
//! assert!(calibrator.read_calibration_cache().is_none());
//!
//! let mut bindings: Vec<Option<Tensor>> = vec![None];
//! while calibrator.next_batch(&mut bindings, &["input"]) {}
//! assert_eq!(calibrator.batches_fed(), 1);
//!
//! calibrator.write_calibration_cache(b"input: 3c010204\n");
//! assert_eq!(calibrator.read_calibration_cache(), Some(&b"input: 3c010204\n"[..]));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::algorithm::CalibrationAlgorithm;
use crate::cache::CalibrationCache;
use crate::config::CalibratorConfig;
use crate::device::{parse_device, DeviceBufferPool};
use crate::error::{Error, Result};
use crate::progress::{CalibrationEvent, ProgressFn};
use crate::stream::BatchStream;
use crate::transcode::ScaleOverrideTranscoder;
use candle_core::{Device, Tensor};
use std::path::{Path, PathBuf};

/// Quantile used by legacy calibration when none is given
pub const DEFAULT_QUANTILE: f64 = 0.9999;

/// Regression cutoff reported to legacy calibration
pub const REGRESSION_CUTOFF: f64 = 1.0;

/// Callback contract the quantization engine drives during calibration
///
/// `false`/`None` returns mean "stop" or "miss", never an error.
pub trait Int8Calibrator {
    /// Number of samples in every batch
    fn batch_size(&self) -> usize;

    /// Feed the next batch into the device bindings
    ///
    /// On success `bindings[i]` holds the device buffer of input `i`. Returns
    /// `false` once the batch source is exhausted. `bindings.len()` must equal
    /// the number of model inputs.
    fn next_batch(&mut self, bindings: &mut [Option<Tensor>], names: &[&str]) -> bool;

    /// Previously stored calibration table, or `None` to request calibration
    fn read_calibration_cache(&mut self) -> Option<&[u8]>;

    /// Persist the calibration table computed by the engine
    fn write_calibration_cache(&mut self, cache: &[u8]);

    /// Algorithm the engine should calibrate with
    fn algorithm(&self) -> CalibrationAlgorithm;

    /// Legacy calibration only
    fn quantile(&self) -> f64;

    /// Legacy calibration only
    fn regression_cutoff(&self) -> f64;

    /// Legacy calibration only
    fn read_histogram_cache(&mut self) -> Option<&[u8]>;

    /// Legacy calibration only
    fn write_histogram_cache(&mut self, histogram: &[u8]);
}

/// Calibrator feeding batches from a stream and persisting the cache to a file
///
/// Built either from a batch stream (batch-fed calibration) or from a cache
/// path alone (cache replay, typically combined with an operator scale file).
pub struct Calibrator {
    stream: Option<Box<dyn BatchStream>>,
    buffers: Option<DeviceBufferPool>,
    cache: CalibrationCache,
    algorithm: CalibrationAlgorithm,
    batch_size: usize,
    quantile: f64,
    batches_fed: usize,
    exhausted: bool,
    progress: Option<ProgressFn>,
}

impl Calibrator {
    /// Create a stream-fed calibrator
    ///
    /// Allocates one device buffer per input on `device`, sized from the
    /// stream's batch size and per-input byte counts.
    pub fn from_stream<S>(
        stream: S,
        cache_path: impl Into<PathBuf>,
        algorithm: &str,
        device: &Device,
    ) -> Result<Self>
    where
        S: BatchStream + 'static,
    {
        let algorithm = CalibrationAlgorithm::from_key(algorithm)?;
        let batch_size = stream.batch_size();
        let buffers = DeviceBufferPool::new(device, batch_size, &stream.bytes_per_batch())?;

        Ok(Self {
            stream: Some(Box::new(stream)),
            buffers: Some(buffers),
            cache: CalibrationCache::new(cache_path),
            algorithm,
            batch_size,
            quantile: DEFAULT_QUANTILE,
            batches_fed: 0,
            exhausted: false,
            progress: None,
        })
    }

    /// Create a cache-replay calibrator without a batch stream
    ///
    /// No device memory is allocated. Use [`Calibrator::reset_scale_file`] to
    /// regenerate the cache from operator-authored scales.
    pub fn from_cache(
        cache_path: impl Into<PathBuf>,
        algorithm: &str,
        batch_size: usize,
    ) -> Result<Self> {
        Ok(Self {
            stream: None,
            buffers: None,
            cache: CalibrationCache::new(cache_path),
            algorithm: CalibrationAlgorithm::from_key(algorithm)?,
            batch_size,
            quantile: DEFAULT_QUANTILE,
            batches_fed: 0,
            exhausted: false,
            progress: None,
        })
    }

    /// Create a cache-replay calibrator from a config, applying its scale file
    pub fn from_config(config: &CalibratorConfig) -> Result<Self> {
        config.validate()?;
        let mut calibrator =
            Self::from_cache(&config.cache_path, &config.algorithm, config.batch_size)?
                .with_quantile(config.quantile);

        if let Some(scale_file) = &config.scale_file {
            calibrator.reset_scale_file(scale_file)?;
        }
        Ok(calibrator)
    }

    /// Create a stream-fed calibrator from a config
    ///
    /// The batch size comes from the stream; a mismatch with the config is an
    /// error.
    pub fn from_config_with_stream<S>(config: &CalibratorConfig, stream: S) -> Result<Self>
    where
        S: BatchStream + 'static,
    {
        config.validate()?;
        if stream.batch_size() != config.batch_size {
            return Err(Error::invalid_config(format!(
                "batch_size {} does not match stream batch size {}",
                config.batch_size,
                stream.batch_size()
            )));
        }

        let device = parse_device(&config.device)?;
        Ok(
            Self::from_stream(stream, &config.cache_path, &config.algorithm, &device)?
                .with_quantile(config.quantile),
        )
    }

    /// Set the legacy calibration quantile
    #[must_use]
    pub fn with_quantile(mut self, quantile: f64) -> Self {
        self.quantile = quantile;
        self
    }

    /// Report calibration events to `progress`
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Path of the calibration cache file
    pub fn cache_path(&self) -> &Path {
        self.cache.path()
    }

    /// Device buffers, present only for stream-fed calibrators
    pub fn device_buffers(&self) -> Option<&DeviceBufferPool> {
        self.buffers.as_ref()
    }

    /// Number of model inputs (zero in cache-replay mode)
    pub fn input_count(&self) -> usize {
        self.buffers.as_ref().map_or(0, DeviceBufferPool::len)
    }

    /// Batches successfully copied to the device so far
    pub fn batches_fed(&self) -> usize {
        self.batches_fed
    }

    /// Replace the cache with the scales in an operator scale file
    ///
    /// See [`ScaleOverrideTranscoder::apply`]. The existing cache is left
    /// untouched when the scale file cannot be read or parsed.
    pub fn reset_scale_file(&mut self, scale_file: impl AsRef<Path>) -> Result<usize> {
        let entries = ScaleOverrideTranscoder::new(self.cache.path()).apply(scale_file)?;
        self.emit(CalibrationEvent::ScaleFileApplied { entries });
        Ok(entries)
    }

    /// Fallible form of [`Int8Calibrator::next_batch`]
    ///
    /// Exhaustion is terminal: once the stream reports it, later calls return
    /// `false` without touching the stream or the device buffers.
    pub fn try_next_batch(
        &mut self,
        bindings: &mut [Option<Tensor>],
        names: &[&str],
    ) -> Result<bool> {
        let (Some(stream), Some(buffers)) = (self.stream.as_mut(), self.buffers.as_ref()) else {
            return Ok(false);
        };
        debug_assert_eq!(bindings.len(), buffers.len());

        if self.exhausted {
            return Ok(false);
        }

        if !stream.next() {
            self.exhausted = true;
            tracing::info!(
                "Calibration batch stream exhausted after {} batch(es)",
                self.batches_fed
            );
            self.emit(CalibrationEvent::StreamExhausted {
                batches: self.batches_fed,
            });
            return Ok(false);
        }

        let batch = stream.batch();
        if batch.len() < bindings.len() {
            return Err(Error::batch_shape(format!(
                "stream produced {} inputs, engine expects {}",
                batch.len(),
                bindings.len()
            )));
        }

        let mut bytes = 0;
        for (i, slot) in bindings.iter_mut().enumerate() {
            let buffer = buffers.upload(i, batch[i])?;
            bytes += buffers.capacity(i);
            *slot = Some(buffer.clone());
        }

        self.batches_fed += 1;
        tracing::debug!(
            "Uploaded calibration batch {} ({} bytes) for inputs {:?}",
            self.batches_fed,
            bytes,
            names
        );
        self.emit(CalibrationEvent::BatchUploaded {
            batch: self.batches_fed,
            bytes,
        });
        Ok(true)
    }

    fn emit(&self, event: CalibrationEvent) {
        if let Some(progress) = &self.progress {
            progress(event);
        }
    }
}

impl Int8Calibrator for Calibrator {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn next_batch(&mut self, bindings: &mut [Option<Tensor>], names: &[&str]) -> bool {
        match self.try_next_batch(bindings, names) {
            Ok(fed) => fed,
            Err(e) => {
                // A half-written device buffer cannot be calibrated against
                tracing::error!("Calibration batch upload failed: {}", e);
                panic!("calibration batch upload failed: {}", e);
            }
        }
    }

    fn read_calibration_cache(&mut self) -> Option<&[u8]> {
        let blob = self.cache.read();
        let event = match &blob {
            Some(data) => CalibrationEvent::CacheLoaded { bytes: data.len() },
            None => CalibrationEvent::CacheMissing,
        };
        if let Some(progress) = &self.progress {
            progress(event);
        }
        blob
    }

    fn write_calibration_cache(&mut self, cache: &[u8]) {
        let persisted = self.cache.write(cache);
        self.emit(CalibrationEvent::CacheWritten {
            bytes: cache.len(),
            persisted,
        });
    }

    fn algorithm(&self) -> CalibrationAlgorithm {
        self.algorithm
    }

    fn quantile(&self) -> f64 {
        self.quantile
    }

    fn regression_cutoff(&self) -> f64 {
        REGRESSION_CUTOFF
    }

    fn read_histogram_cache(&mut self) -> Option<&[u8]> {
        None
    }

    fn write_histogram_cache(&mut self, _histogram: &[u8]) {}
}
