//! Write-once artifact output and optional run reports.
//!
//! Layout: `<output_dir>/<target>_parser.py`. Files are written to a
//! temporary file in the same directory and renamed into place, so a reader
//! never sees a partial script.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} was already written in this run", path.display())]
    AlreadyWritten { path: PathBuf },

    #[error("run report serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("digest mismatch for {}: expected {expected}, got {actual}", path.display())]
    DigestMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

pub type Result<T> = std::result::Result<T, ArtifactError>;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ArtifactError + '_ {
    move |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Output directory for accepted scripts.
///
/// A store refuses to write the same path twice, which is what keeps a run
/// to at most one artifact per target.
#[derive(Debug)]
pub struct ArtifactStore {
    output_dir: PathBuf,
    written: Mutex<HashSet<PathBuf>>,
}

impl ArtifactStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            written: Mutex::new(HashSet::new()),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path_for(&self, target: &str) -> PathBuf {
        self.output_dir.join(format!("{target}_parser.py"))
    }

    /// Atomically write `source` as the artifact for `target`.
    pub fn persist(&self, target: &str, source: &str) -> Result<PathBuf> {
        let path = self.path_for(target);
        let mut written = self
            .written
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if written.contains(&path) {
            return Err(ArtifactError::AlreadyWritten { path });
        }

        atomic_write(&path, source.as_bytes())?;
        written.insert(path.clone());
        Ok(path)
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(io_err(&dir))?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err(&dir))?;
    tmp.write_all(data).map_err(io_err(path))?;
    tmp.persist(path).map_err(|e| ArtifactError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

fn digest_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".sha256");
    PathBuf::from(name)
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Write `report` as pretty JSON to `path` plus a `<path>.sha256` file
/// holding the hex digest of the JSON bytes.
pub fn write_run_report<T: Serialize>(report: &T, path: &Path) -> Result<PathBuf> {
    let json = serde_json::to_vec_pretty(report)?;
    atomic_write(path, &json)?;
    let digest = digest_path(path);
    atomic_write(&digest, sha256_hex(&json).as_bytes())?;
    Ok(digest)
}

/// Read a report written by [`write_run_report`], verifying its digest.
pub fn read_run_report<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = std::fs::read(path).map_err(io_err(path))?;
    let digest_file = digest_path(path);
    let expected = std::fs::read_to_string(&digest_file).map_err(io_err(&digest_file))?;
    let expected = expected.trim().to_string();
    let actual = sha256_hex(&json);
    if expected != actual {
        return Err(ArtifactError::DigestMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_follows_target_name() {
        let store = ArtifactStore::new("custom_parsers");
        assert_eq!(
            store.path_for("icici"),
            PathBuf::from("custom_parsers/icici_parser.py")
        );
    }

    #[test]
    fn persist_creates_dir_and_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("out"));

        let path = store.persist("icici", "def parse(p):\n    pass\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "def parse(p):\n    pass\n");

        match store.persist("icici", "other") {
            Err(ArtifactError::AlreadyWritten { path: p }) => assert_eq!(p, path),
            other => panic!("expected AlreadyWritten, got {other:?}"),
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "def parse(p):\n    pass\n");

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("out")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn persist_replaces_file_from_earlier_run() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sbi_parser.py"), "old").unwrap();
        let store = ArtifactStore::new(dir.path());
        let path = store.persist("sbi", "new").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "new");
    }

    #[test]
    fn report_roundtrip_verifies_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let value = serde_json::json!({"target": "icici", "attempts": 2});

        let digest = write_run_report(&value, &path).unwrap();
        assert_eq!(digest, dir.path().join("report.json.sha256"));
        let back: serde_json::Value = read_run_report(&path).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn tampered_report_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_run_report(&serde_json::json!({"a": 1}), &path).unwrap();
        std::fs::write(&path, br#"{"a": 2}"#).unwrap();

        let err = read_run_report::<serde_json::Value>(&path).unwrap_err();
        assert!(matches!(err, ArtifactError::DigestMismatch { .. }));
    }
}
