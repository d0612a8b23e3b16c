//! Durable state shared between runs.
//!
//! Two files survive across invocations:
//! - `ledger.json`: processed release ids, the pending queue and the catalog
//!   of what has been published downstream
//! - `forum_state.json`: the active forum post and what it announced
//!
//! Both are written with write-then-rename so a crash mid-write leaves the
//! previous version intact.

mod forum_state;
mod ledger;
mod release_stage;

pub use forum_state::ForumPostState;
pub use ledger::{
    compare_versions, CatalogEntry, CatalogUpdate, LedgerError, PendingRelease, ReleaseLedger,
};
pub use release_stage::{ReleaseStage, ReleaseTrace, StageError};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File name of the release ledger inside the state directory
pub const LEDGER_FILE: &str = "ledger.json";

/// File name of the forum state inside the state directory
pub const FORUM_STATE_FILE: &str = "forum_state.json";

/// File name of the last run summary inside the state directory
pub const SUMMARY_FILE: &str = "summary.json";

/// Errors reading or writing state files
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("corrupt state file {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("state file {path} has schema {found}, expected {expected}")]
    SchemaMismatch {
        path: PathBuf,
        found: String,
        expected: &'static str,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Check if a state is terminal (no further transitions possible)
pub trait TerminalState {
    fn is_terminal(&self) -> bool;
}

/// Current UTC time
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Write `value` as pretty JSON atomically (write-then-rename).
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    let json = serde_json::to_string_pretty(value)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, json)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Read a JSON state file. A missing file is `Ok(None)`; anything
/// unparseable is [`StateError::Corrupt`].
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StateError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| StateError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

fn check_schema(path: &Path, found: &str, expected: &'static str) -> Result<(), StateError> {
    if found != expected {
        return Err(StateError::SchemaMismatch {
            path: path.to_path_buf(),
            found: found.to_string(),
            expected,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("sample.json");

        write_json_atomic(&path, &Sample { value: 7 }).unwrap();
        let loaded: Option<Sample> = read_json(&path).unwrap();

        assert_eq!(loaded, Some(Sample { value: 7 }));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_missing_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<Sample> = read_json(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();

        let result: Result<Option<Sample>, _> = read_json(&path);
        assert!(matches!(result, Err(StateError::Corrupt { .. })));
    }
}
