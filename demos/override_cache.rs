//! Regenerate a calibration cache from an operator scale file
//!
//! Usage:
//!   cargo run --example override_cache -- <calibrator.json>
//!   cargo run --example override_cache -- <cache_path> <scale_file>

use anyhow::{bail, Context};
use int8cal::progress::log_progress;
use int8cal::{cache, Calibrator, CalibratorConfig, Int8Calibrator};
use std::path::Path;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match args.as_slice() {
        [config_path] => CalibratorConfig::from_file(Path::new(config_path))
            .with_context(|| format!("loading {}", config_path))?,
        [cache_path, scale_file] => {
            CalibratorConfig::new(cache_path, 1).with_scale_file(scale_file)
        }
        _ => bail!("usage: override_cache <calibrator.json> | <cache_path> <scale_file>"),
    };

    config.validate()?;
    let Some(scale_file) = &config.scale_file else {
        bail!("config has no scale_file, nothing to regenerate");
    };

    let mut calibrator =
        Calibrator::from_cache(&config.cache_path, &config.algorithm, config.batch_size)?
            .with_quantile(config.quantile)
            .with_progress(log_progress());
    calibrator
        .reset_scale_file(scale_file)
        .with_context(|| format!("applying {}", scale_file.display()))?;
    println!("Algorithm: {}", calibrator.algorithm());

    let blob = calibrator
        .read_calibration_cache()
        .context("cache was not written")?
        .to_vec();
    let text = String::from_utf8_lossy(&blob);
    for entry in cache::parse_cache_text(&text)? {
        match entry.scale() {
            Some(scale) => println!("  {:<32} {:>12.6}  ({})", entry.name, scale, entry.to_line()),
            None => println!("  {:<32} {:>12}", entry.name, "engine"),
        }
    }
    Ok(())
}
