//! Device buffers for calibration batches
//!
//! The calibrator owns one device region per model input. Regions are sized
//! once from the batch layout, overwritten by every batch, and released when
//! the pool is dropped.

use crate::error::{Error, Result};
use candle_core::{DType, Device, Tensor};

/// Parse a device string: `cpu`, `auto`, `cuda` or `cuda:N`
///
/// `auto` picks CUDA device 0 when it is usable and falls back to the CPU.
///
/// # Examples
/// ```rust
/// use int8cal::device::parse_device;
///
/// let device = parse_device("cpu")?;
/// assert!(device.is_cpu());
/// # Ok::<(), int8cal::Error>(())
/// ```
pub fn parse_device(spec: &str) -> Result<Device> {
    let spec = spec.trim();
    let ordinal = match spec {
        "cpu" => return Ok(Device::Cpu),
        "auto" => return Ok(Device::cuda_if_available(0).unwrap_or(Device::Cpu)),
        "cuda" => 0,
        _ => match spec.strip_prefix("cuda:") {
            Some(n) => n.parse::<usize>().map_err(|_| {
                Error::device_validation(format!("invalid CUDA ordinal in '{}'", spec))
            })?,
            None => {
                return Err(Error::device_validation(format!(
                    "unknown device '{}', expected cpu, auto, cuda or cuda:N",
                    spec
                )))
            }
        },
    };

    Device::new_cuda(ordinal).map_err(|e| {
        Error::device_validation(format!("CUDA device {} not available: {}", ordinal, e))
    })
}

/// Fixed set of device buffers, one per model input
///
/// Buffer `i` holds `batch_size * input_bytes[i]` bytes. Buffers are allocated
/// together in [`DeviceBufferPool::new`]; either all exist or construction fails.
#[derive(Debug)]
pub struct DeviceBufferPool {
    device: Device,
    batch_size: usize,
    input_bytes: Vec<usize>,
    buffers: Vec<Tensor>,
}

impl DeviceBufferPool {
    /// Allocate one zeroed `u8` buffer per input on `device`
    pub fn new(device: &Device, batch_size: usize, input_bytes: &[usize]) -> Result<Self> {
        let buffers = input_bytes
            .iter()
            .map(|bytes| Tensor::zeros(batch_size * bytes, DType::U8, device))
            .collect::<candle_core::Result<Vec<_>>>()?;

        tracing::debug!(
            "Allocated {} device buffers ({} bytes total) on {:?}",
            buffers.len(),
            input_bytes.iter().sum::<usize>() * batch_size,
            device
        );

        Ok(Self {
            device: device.clone(),
            batch_size,
            input_bytes: input_bytes.to_vec(),
            buffers,
        })
    }

    /// Number of buffers (equals the number of model inputs)
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether the pool holds no buffers
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Device the buffers live on
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Byte capacity of buffer `index`
    pub fn capacity(&self, index: usize) -> usize {
        self.batch_size * self.input_bytes[index]
    }

    /// Byte capacity of every buffer, in input order
    pub fn capacities(&self) -> Vec<usize> {
        self.buffers.iter().map(Tensor::elem_count).collect()
    }

    /// Device buffer for input `index`
    ///
    /// The returned handle shares storage with the pool, so later uploads are
    /// visible through clones of it.
    pub fn binding(&self, index: usize) -> &Tensor {
        &self.buffers[index]
    }

    /// Copy one input's host batch into its device buffer
    ///
    /// Exactly `capacity(index)` bytes are copied from the front of `host`.
    /// The copy completes before this returns.
    pub fn upload(&self, index: usize, host: &[u8]) -> Result<&Tensor> {
        let capacity = self.capacity(index);
        if host.len() < capacity {
            return Err(Error::batch_shape(format!(
                "input {} host buffer holds {} bytes, device buffer needs {}",
                index,
                host.len(),
                capacity
            )));
        }

        let buffer = &self.buffers[index];
        if capacity > 0 {
            let src = Tensor::from_slice(&host[..capacity], capacity, &self.device)?;
            buffer.slice_set(&src, 0, 0)?;
        }
        Ok(buffer)
    }
}

impl Drop for DeviceBufferPool {
    fn drop(&mut self) {
        if !self.buffers.is_empty() {
            tracing::debug!("Releasing {} device buffers", self.buffers.len());
        }
    }
}
