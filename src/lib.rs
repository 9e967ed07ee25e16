//! int8cal - INT8 calibration data manager
//!
//! This crate sits between a quantization engine and the data used to
//! calibrate it. The engine computes the scale factors; int8cal provides what
//! the engine asks for while doing so:
//!
//! - **Batch feeding**: copies representative host batches into device buffers
//! - **Cache persistence**: stores and reloads the engine's calibration table
//! - **Scale overrides**: turns operator-authored `name:scale` files into cache entries
//! - **Configuration**: JSON-described calibrators for cache regeneration
//! - **Progress Reporting**: optional callbacks for each step of a pass
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use int8cal::{Calibrator, HostBatchStream, Int8Calibrator};
//! use candle_core::Device;
//!
//! let stream = HostBatchStream::new(8, vec![3 * 224 * 224 * 4]);
//! let mut calibrator = Calibrator::from_stream(stream, "model.calib", "entropy_2", &Device::Cpu)?
//!     .with_progress(int8cal::progress::log_progress());
//!
//! if calibrator.read_calibration_cache().is_none() {
//!     // hand `calibrator` to the engine, which drives next_batch / write_calibration_cache
//! }
//! # Ok::<(), int8cal::Error>(())
//! ```
//!
//! # Scale Overrides
//!
//! ```rust,no_run
//! use int8cal::Calibrator;
//!
//! let mut calibrator = Calibrator::from_cache("model.calib", "entropy", 1)?;
//! let entries = calibrator.reset_scale_file("scales.txt")?;
//! println!("wrote {} cache entries", entries);
//! # Ok::<(), int8cal::Error>(())
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Public modules
pub mod algorithm;
pub mod cache;
pub mod calibrator;
pub mod config;
pub mod device;
pub mod error;
pub mod progress;
pub mod stream;
pub mod transcode;

// Re-export commonly used types
pub use algorithm::CalibrationAlgorithm;
pub use cache::{CacheEntry, CalibrationCache};
pub use calibrator::{Calibrator, Int8Calibrator, DEFAULT_QUANTILE, REGRESSION_CUTOFF};
pub use config::CalibratorConfig;
pub use device::DeviceBufferPool;
pub use error::{Error, Result};
pub use progress::{CalibrationEvent, ProgressFn};
pub use stream::{BatchStream, HostBatchStream};
pub use transcode::ScaleOverrideTranscoder;
