//! Operator scale overrides
//!
//! Operators can author calibration scales by hand in a `name:decimal` text
//! file. [`ScaleOverrideTranscoder`] rewrites such a file into the cache text
//! format so the engine picks the scales up as if it had calibrated them:
//!
//! ```text
//! convA:2.0      ->  convA: 3c810204
//! convB:         ->  convB
//! ```
//!
//! The decimal value is an int8 full-scale value; the cache stores the
//! per-element step `value / 127` as the hex bit pattern of an `f32`.

use crate::cache::{encode_step, parse_cache_text};
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Largest magnitude of a symmetric int8 value
pub const INT8_FULL_SCALE: f32 = 127.0;

/// Transcode one override line into its cache line
///
/// Returns `None` for blank lines. `line_no` is 1-based and only used for
/// error reporting.
pub fn transcode_line(line: &str, line_no: usize) -> Result<Option<String>> {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        return Ok(None);
    }

    // name[:scale[:ignored]]
    let mut fields = line.splitn(3, ':');
    let name = fields.next().unwrap_or_default();
    let scale = fields.next().unwrap_or_default().trim();

    if scale.is_empty() {
        return Ok(Some(name.to_string()));
    }

    let value: f32 = scale.parse().map_err(|_| Error::InvalidScale {
        line: line_no,
        value: scale.to_string(),
    })?;

    Ok(Some(format!(
        "{}: {}",
        name,
        encode_step(value / INT8_FULL_SCALE)
    )))
}

/// Transcode a whole override text into cache text
///
/// Returns the cache text and the number of entries it holds.
pub fn transcode_text(source: &str) -> Result<(String, usize)> {
    let mut out = String::with_capacity(source.len() * 2);
    let mut entries = 0;
    for (i, line) in source.lines().enumerate() {
        if let Some(cache_line) = transcode_line(line, i + 1)? {
            out.push_str(&cache_line);
            out.push('\n');
            entries += 1;
        }
    }
    Ok((out, entries))
}

/// Writes operator scale files into a calibration cache, and back
#[derive(Debug, Clone)]
pub struct ScaleOverrideTranscoder {
    cache_path: PathBuf,
}

impl ScaleOverrideTranscoder {
    /// Create a transcoder targeting the cache file at `cache_path`
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
        }
    }

    /// Cache file this transcoder writes
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Replace the cache with the transcoded content of `scale_file`
    ///
    /// The cache is only touched once the whole scale file has been read and
    /// transcoded; a missing file or a bad scale leaves it as it was. Returns
    /// the number of entries written.
    pub fn apply(&self, scale_file: impl AsRef<Path>) -> Result<usize> {
        let scale_file = scale_file.as_ref();
        let source = fs::read_to_string(scale_file).map_err(|source| {
            tracing::warn!(
                "Could not load user calibration scale file: {}",
                scale_file.display()
            );
            Error::ScaleFile {
                path: scale_file.display().to_string(),
                source,
            }
        })?;

        tracing::info!(
            "Reset calibration cache with scale file user provided: {}",
            scale_file.display()
        );

        let (text, entries) = transcode_text(&source)?;
        fs::write(&self.cache_path, text)?;

        tracing::debug!(
            "Wrote {} scale entries to {}",
            entries,
            self.cache_path.display()
        );
        Ok(entries)
    }

    /// Write the cache back out as an operator-editable scale file
    ///
    /// Entries with a step become `name:scale` with the scale in int8
    /// full-scale units; entries without one become a bare `name`.
    pub fn export(&self, scale_file: impl AsRef<Path>) -> Result<usize> {
        let text = fs::read_to_string(&self.cache_path)?;
        let entries = parse_cache_text(&text)?;

        let mut out = String::new();
        for entry in &entries {
            match entry.scale() {
                Some(scale) => out.push_str(&format!("{}:{}\n", entry.name, scale)),
                None => {
                    out.push_str(&entry.name);
                    out.push('\n');
                }
            }
        }

        fs::write(scale_file.as_ref(), out)?;
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::decode_step;

    fn step_of(cache_line: &str) -> f32 {
        let (_, hex) = cache_line.split_once(": ").unwrap();
        decode_step(hex).unwrap()
    }

    #[test]
    fn test_scale_is_divided_by_full_scale() {
        let line = transcode_line("tensorA:1.0", 1).unwrap().unwrap();
        assert!(line.starts_with("tensorA: "));
        assert_eq!(step_of(&line), 1.0f32 / 127.0);
        assert_eq!(line, format!("tensorA: {:x}", (1.0f32 / 127.0).to_bits()));
    }

    #[test]
    fn test_empty_scale_emits_bare_name() {
        assert_eq!(transcode_line("tensorB:", 1).unwrap().unwrap(), "tensorB");
        assert_eq!(transcode_line("tensorC", 1).unwrap().unwrap(), "tensorC");
        assert_eq!(transcode_line("tensorD:  \r", 1).unwrap().unwrap(), "tensorD");
        assert_eq!(transcode_line("   ", 1).unwrap(), None);
    }

    #[test]
    fn test_third_field_is_ignored() {
        let line = transcode_line("x:2.5:comment", 1).unwrap().unwrap();
        assert_eq!(step_of(&line), 2.5f32 / 127.0);
    }

    #[test]
    fn test_whitespace_around_scale() {
        let line = transcode_line("x: 4\r", 1).unwrap().unwrap();
        assert_eq!(step_of(&line), 4.0f32 / 127.0);
    }

    #[test]
    fn test_bad_scale_reports_line() {
        let err = transcode_text("a:1\nb:abc\n").unwrap_err();
        assert!(matches!(err, Error::InvalidScale { line: 2, ref value } if value == "abc"));
    }

    #[test]
    fn test_transcode_text() {
        let (text, entries) = transcode_text("convA:2.0\nconvB:\n").unwrap();
        assert_eq!(entries, 2);
        assert_eq!(
            text,
            format!("convA: {:x}\nconvB\n", (2.0f32 / 127.0).to_bits())
        );
    }

    #[test]
    fn test_apply_missing_file_keeps_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("calib.cache");
        fs::write(&cache_path, b"existing").unwrap();

        let transcoder = ScaleOverrideTranscoder::new(&cache_path);
        let err = transcoder.apply(dir.path().join("missing.txt")).unwrap_err();
        assert!(matches!(err, Error::ScaleFile { .. }));
        assert_eq!(fs::read(&cache_path).unwrap(), b"existing");
    }

    #[test]
    fn test_apply_bad_scale_keeps_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("calib.cache");
        let scale_path = dir.path().join("scales.txt");
        fs::write(&cache_path, b"existing").unwrap();
        fs::write(&scale_path, "a:1.0\nb:oops\n").unwrap();

        let transcoder = ScaleOverrideTranscoder::new(&cache_path);
        assert!(transcoder.apply(&scale_path).is_err());
        assert_eq!(fs::read(&cache_path).unwrap(), b"existing");
    }

    #[test]
    fn test_export_recovers_scales() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("calib.cache");
        let scale_path = dir.path().join("scales.txt");
        let exported = dir.path().join("exported.txt");
        fs::write(&scale_path, "convA:2.0\nconvB:\n").unwrap();

        let transcoder = ScaleOverrideTranscoder::new(&cache_path);
        assert_eq!(transcoder.apply(&scale_path).unwrap(), 2);
        assert_eq!(transcoder.export(&exported).unwrap(), 2);

        let text = fs::read_to_string(&exported).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let (name, scale) = lines[0].split_once(':').unwrap();
        assert_eq!(name, "convA");
        assert!((scale.parse::<f32>().unwrap() - 2.0).abs() < 1e-5);
        assert_eq!(lines[1], "convB");
    }
}
