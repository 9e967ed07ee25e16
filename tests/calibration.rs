//! End-to-end calibration passes on the CPU device

use candle_core::{Device, Tensor};
use int8cal::progress::custom_progress;
use int8cal::{
    BatchStream, CalibrationAlgorithm, CalibrationEvent, Calibrator, CalibratorConfig,
    HostBatchStream, Int8Calibrator,
};
use std::cell::Cell;
use std::fs;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

/// Stream that yields `limit` batches and counts how often its host buffers are read
struct CountingStream {
    inputs: Vec<Vec<u8>>,
    remaining: usize,
    batch_reads: Rc<Cell<usize>>,
}

impl CountingStream {
    fn new(limit: usize, batch_reads: Rc<Cell<usize>>) -> Self {
        Self {
            inputs: vec![vec![1; 400], vec![2; 200], vec![3; 100]],
            remaining: limit,
            batch_reads,
        }
    }
}

impl BatchStream for CountingStream {
    fn next(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    fn batch(&self) -> Vec<&[u8]> {
        self.batch_reads.set(self.batch_reads.get() + 1);
        self.inputs.iter().map(Vec::as_slice).collect()
    }

    fn bytes_per_batch(&self) -> Vec<usize> {
        vec![100, 50, 25]
    }

    fn batch_size(&self) -> usize {
        4
    }
}

#[test]
fn test_three_inputs_two_batches_then_exhaustion() {
    let dir = tempfile::tempdir().unwrap();
    let batch_reads = Rc::new(Cell::new(0));
    let stream = CountingStream::new(2, batch_reads.clone());

    let mut calibrator =
        Calibrator::from_stream(stream, dir.path().join("calib.cache"), "entropy", &Device::Cpu)
            .unwrap();

    let buffers = calibrator.device_buffers().unwrap();
    assert_eq!(buffers.capacities(), vec![400, 200, 100]);
    assert_eq!(calibrator.input_count(), 3);

    let names = ["image", "mask", "meta"];
    let mut bindings: Vec<Option<Tensor>> = vec![None, None, None];
    let results: Vec<bool> = (0..3)
        .map(|_| calibrator.next_batch(&mut bindings, &names))
        .collect();

    assert_eq!(results, vec![true, true, false]);
    assert_eq!(calibrator.batches_fed(), 2);
    assert_eq!(batch_reads.get(), 2);
    assert_eq!(calibrator.batch_size(), 4);

    let mask = bindings[1].as_ref().unwrap().to_vec1::<u8>().unwrap();
    assert_eq!(mask, vec![2; 200]);

    // Exhaustion is terminal
    assert!(!calibrator.next_batch(&mut bindings, &names));
    assert_eq!(batch_reads.get(), 2);
}

#[test]
fn test_engine_protocol_with_progress() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("calib.cache");
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();

    let stream = HostBatchStream::new(1, vec![2])
        .with_batch(vec![vec![5, 6]])
        .unwrap()
        .with_batch(vec![vec![7, 8]])
        .unwrap();

    let mut calibrator = Calibrator::from_stream(stream, &cache_path, "minmax", &Device::Cpu)
        .unwrap()
        .with_progress(custom_progress(move |event| sink.lock().unwrap().push(event)));

    // What an engine does: probe the cache, calibrate, persist the table
    assert!(calibrator.read_calibration_cache().is_none());
    let mut bindings = vec![None];
    while calibrator.next_batch(&mut bindings, &["x"]) {}
    calibrator.write_calibration_cache(b"TRT-8601-MinMaxCalibration\nx: 3c010204\n");

    assert_eq!(
        fs::read(&cache_path).unwrap(),
        b"TRT-8601-MinMaxCalibration\nx: 3c010204\n"
    );

    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            CalibrationEvent::CacheMissing,
            CalibrationEvent::BatchUploaded { batch: 1, bytes: 2 },
            CalibrationEvent::BatchUploaded { batch: 2, bytes: 2 },
            CalibrationEvent::StreamExhausted { batches: 2 },
            CalibrationEvent::CacheWritten {
                bytes: 39,
                persisted: true
            },
        ]
    );
}

#[test]
fn test_second_pass_reuses_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("calib.cache");
    let blob: Vec<u8> = (0..64u8).collect();

    let mut first = Calibrator::from_cache(&cache_path, "entropy_2", 8).unwrap();
    first.write_calibration_cache(&blob);
    drop(first);

    let mut second = Calibrator::from_cache(&cache_path, "entropy_2", 8).unwrap();
    let cached = second.read_calibration_cache().unwrap();
    assert_eq!(cached.len(), blob.len());
    assert_eq!(cached, blob.as_slice());
}

#[test]
fn test_override_file_becomes_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("calib.cache");
    let scale_path = dir.path().join("scales.txt");
    fs::write(&cache_path, b"stale cache").unwrap();
    fs::write(&scale_path, "convA:2.0\nconvB:\n").unwrap();

    let config = CalibratorConfig::new(&cache_path, 1)
        .with_algorithm(CalibrationAlgorithm::Legacy)
        .with_scale_file(&scale_path);
    let mut calibrator = Calibrator::from_config(&config).unwrap();
    assert_eq!(calibrator.algorithm(), CalibrationAlgorithm::Legacy);

    let text = String::from_utf8(calibrator.read_calibration_cache().unwrap().to_vec()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1], "convB");

    let (name, hex) = lines[0].split_once(": ").unwrap();
    assert_eq!(name, "convA");
    let step = f32::from_bits(u32::from_str_radix(hex, 16).unwrap());
    assert_eq!(step, 2.0f32 / 127.0);
}

#[test]
fn test_missing_override_file_keeps_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("calib.cache");
    fs::write(&cache_path, b"engine cache").unwrap();

    let mut calibrator = Calibrator::from_cache(&cache_path, "entropy", 1).unwrap();
    assert!(calibrator
        .reset_scale_file(dir.path().join("missing.txt"))
        .is_err());
    assert_eq!(calibrator.read_calibration_cache().unwrap(), b"engine cache");
}

#[test]
fn test_config_with_stream_checks_batch_size() {
    let dir = tempfile::tempdir().unwrap();
    let config = CalibratorConfig::new(dir.path().join("calib.cache"), 2);

    let mismatched = HostBatchStream::new(3, vec![1]);
    assert!(Calibrator::from_config_with_stream(&config, mismatched).is_err());

    let stream = HostBatchStream::new(2, vec![1]);
    let calibrator = Calibrator::from_config_with_stream(&config, stream).unwrap();
    assert_eq!(calibrator.quantile(), int8cal::DEFAULT_QUANTILE);
    assert_eq!(calibrator.device_buffers().unwrap().capacities(), vec![2]);
}
