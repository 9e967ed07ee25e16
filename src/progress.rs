//! Progress reporting for calibration passes
//!
//! A calibration pass can run for many batches. Callers that want to follow it
//! pass a [`ProgressFn`] to the calibrator and receive [`CalibrationEvent`]s.

/// Progress callback function type
pub type ProgressFn = Box<dyn Fn(CalibrationEvent) + Send + Sync>;

/// Events reported during calibration
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationEvent {
    /// A batch was copied to the device buffers
    BatchUploaded {
        /// 1-based index of the batch within the pass
        batch: usize,
        /// Bytes copied across all inputs
        bytes: usize,
    },

    /// The batch stream reported exhaustion
    StreamExhausted {
        /// Batches uploaded before exhaustion
        batches: usize,
    },

    /// A cache blob was loaded from disk
    CacheLoaded {
        /// Blob size in bytes
        bytes: usize,
    },

    /// No cache file was found; the engine will calibrate from batches
    CacheMissing,

    /// The engine's cache blob was persisted
    CacheWritten {
        /// Blob size in bytes
        bytes: usize,
        /// Whether the write reached disk
        persisted: bool,
    },

    /// An operator scale file replaced the cache
    ScaleFileApplied {
        /// Number of cache entries written
        entries: usize,
    },
}

impl CalibrationEvent {
    /// Get a human-readable description of this event
    pub fn description(&self) -> String {
        match self {
            CalibrationEvent::BatchUploaded { batch, bytes } => {
                format!("Uploaded calibration batch {} ({} bytes)", batch, bytes)
            }
            CalibrationEvent::StreamExhausted { batches } => {
                format!("Batch stream exhausted after {} batch(es)", batches)
            }
            CalibrationEvent::CacheLoaded { bytes } => {
                format!("Loaded calibration cache ({} bytes)", bytes)
            }
            CalibrationEvent::CacheMissing => {
                "No calibration cache, running full calibration".to_string()
            }
            CalibrationEvent::CacheWritten { bytes, persisted } => {
                if *persisted {
                    format!("Wrote calibration cache ({} bytes)", bytes)
                } else {
                    format!("Failed to persist calibration cache ({} bytes)", bytes)
                }
            }
            CalibrationEvent::ScaleFileApplied { entries } => {
                format!("Reset calibration cache from scale file ({} entries)", entries)
            }
        }
    }

    /// Check if this event ends the batch phase of a pass
    pub fn is_complete(&self) -> bool {
        matches!(self, CalibrationEvent::StreamExhausted { .. })
    }
}

/// Progress reporter that forwards events to `tracing` at info level
pub fn log_progress() -> ProgressFn {
    Box::new(|event: CalibrationEvent| {
        tracing::info!("{}", event.description());
    })
}

/// Progress reporter from a closure
pub fn custom_progress<F>(f: F) -> ProgressFn
where
    F: Fn(CalibrationEvent) + Send + Sync + 'static,
{
    Box::new(f)
}
