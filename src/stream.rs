//! Batch sources feeding the calibrator
//!
//! The calibrator never decodes or preprocesses input data itself. A
//! [`BatchStream`] hands it ready-made host buffers, one per model input.

use crate::error::{Error, Result};

/// Source of calibration batches on host memory
///
/// For input `i`, the buffer returned by [`BatchStream::batch`] holds
/// `batch_size() * bytes_per_batch()[i]` bytes.
pub trait BatchStream {
    /// Advance to the next batch. Returns `false` once the stream is exhausted.
    fn next(&mut self) -> bool;

    /// Host buffers of the current batch, one per model input
    fn batch(&self) -> Vec<&[u8]>;

    /// Byte size of one sample of each model input
    fn bytes_per_batch(&self) -> Vec<usize>;

    /// Number of samples in each batch
    fn batch_size(&self) -> usize;
}

/// In-memory batch stream
///
/// Batches are pushed up front and replayed in order. Useful for tests and for
/// engines that already hold their calibration set in memory.
#[derive(Debug, Clone)]
pub struct HostBatchStream {
    batch_size: usize,
    input_bytes: Vec<usize>,
    batches: Vec<Vec<Vec<u8>>>,
    /// Index of the current batch; `None` before the first `next()`
    cursor: Option<usize>,
}

impl HostBatchStream {
    /// Create an empty stream for the given batch size and per-sample input sizes
    pub fn new(batch_size: usize, input_bytes: Vec<usize>) -> Self {
        Self {
            batch_size,
            input_bytes,
            batches: Vec::new(),
            cursor: None,
        }
    }

    /// Append a batch, one host buffer per input
    ///
    /// Every buffer must hold exactly `batch_size * input_bytes[i]` bytes.
    pub fn push_batch(&mut self, inputs: Vec<Vec<u8>>) -> Result<()> {
        if inputs.len() != self.input_bytes.len() {
            return Err(Error::batch_shape(format!(
                "expected {} inputs, got {}",
                self.input_bytes.len(),
                inputs.len()
            )));
        }

        for (i, (buffer, bytes)) in inputs.iter().zip(&self.input_bytes).enumerate() {
            let expected = self.batch_size * bytes;
            if buffer.len() != expected {
                return Err(Error::batch_shape(format!(
                    "input {} holds {} bytes, expected {}",
                    i,
                    buffer.len(),
                    expected
                )));
            }
        }

        self.batches.push(inputs);
        Ok(())
    }

    /// Builder-style variant of [`HostBatchStream::push_batch`]
    pub fn with_batch(mut self, inputs: Vec<Vec<u8>>) -> Result<Self> {
        self.push_batch(inputs)?;
        Ok(self)
    }

    /// Number of batches held
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Whether no batches have been pushed
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Rewind so the next call to `next()` yields the first batch again
    pub fn reset(&mut self) {
        self.cursor = None;
    }
}

impl BatchStream for HostBatchStream {
    fn next(&mut self) -> bool {
        let next = self.cursor.map_or(0, |c| c + 1);
        if next < self.batches.len() {
            self.cursor = Some(next);
            true
        } else {
            // Park past the end so repeated calls stay exhausted
            self.cursor = Some(self.batches.len());
            false
        }
    }

    fn batch(&self) -> Vec<&[u8]> {
        match self.cursor.and_then(|c| self.batches.get(c)) {
            Some(inputs) => inputs.iter().map(Vec::as_slice).collect(),
            None => Vec::new(),
        }
    }

    fn bytes_per_batch(&self) -> Vec<usize> {
        self.input_bytes.clone()
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}
