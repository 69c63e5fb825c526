//! Tolerant loading of shared JSON files.
//!
//! The charger controller rewrites its files in place rather than
//! atomically, so any read can race a writer. A load either returns a fully
//! parsed document or a typed error; callers retry on their own schedule and
//! decide how loudly to complain.

use std::fs;
use std::path::Path;

use thiserror::Error;

/// Why a shared file could not be used this cycle.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found")]
    NotFound,

    #[error("file too small ({size} bytes, minimum {min})")]
    TooSmall { size: u64, min: u64 },

    #[error("file too large ({size} bytes, maximum {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("read failed: {0}")]
    Read(#[from] std::io::Error),

    #[error("malformed JSON: {detail}")]
    Parse { detail: String },
}

impl LoadError {
    /// Parse failures are corruption; everything else is transient I/O.
    pub fn is_corruption(&self) -> bool {
        matches!(self, LoadError::Parse { .. })
    }
}

/// Read and parse one JSON document, gated on plausible size.
///
/// A file below `min_bytes` is assumed to be mid-write and rejected without
/// being read; oversized files are rejected the same way. Malformed content
/// is a [`LoadError::Parse`] with serde's position hint. Never retries,
/// that is the polling loop's job.
pub fn load_json(
    path: &Path,
    min_bytes: u64,
    max_bytes: u64,
) -> Result<serde_json::Value, LoadError> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(LoadError::NotFound),
        Err(e) => return Err(LoadError::Read(e)),
    };

    let size = meta.len();
    if size < min_bytes {
        return Err(LoadError::TooSmall {
            size,
            min: min_bytes,
        });
    }
    if size > max_bytes {
        return Err(LoadError::TooLarge {
            size,
            max: max_bytes,
        });
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(LoadError::NotFound),
        Err(e) => return Err(LoadError::Read(e)),
    };

    serde_json::from_str(&content).map_err(|e| LoadError::Parse {
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_json(&dir.path().join("absent.json"), 1, 1024).unwrap_err();
        assert!(matches!(err, LoadError::NotFound));
        assert!(!err.is_corruption());
    }

    #[test]
    fn test_undersized_file_rejected_as_mid_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "small.json", "{}");
        let err = load_json(&path, 50, 1024).unwrap_err();
        assert!(matches!(err, LoadError::TooSmall { size: 2, min: 50 }));
    }

    #[test]
    fn test_oversized_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let big = format!("{{\"pad\": \"{}\"}}", "x".repeat(200));
        let path = write_file(&dir, "big.json", &big);
        let err = load_json(&path, 1, 100).unwrap_err();
        assert!(matches!(err, LoadError::TooLarge { max: 100, .. }));
    }

    #[test]
    fn test_half_written_json_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "torn.json", "{\"modules\": [{\"bus_volt");
        let err = load_json(&path, 1, 1024).unwrap_err();
        assert!(err.is_corruption());
        // serde's position hint survives into the message
        assert!(err.to_string().contains("line"));
    }

    #[test]
    fn test_valid_document_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "ok.json", "{\"modules\": [{\"bus_voltage\": 19.5}]}");
        let doc = load_json(&path, 1, 1024).unwrap();
        assert!(doc.get("modules").unwrap().is_array());
    }
}
