// =============================================================================
// Persistence — atomic JSON snapshots for performance state & outcome ledger
// =============================================================================
//
// Grounded directly on `runtime_config.rs::{load, save}`'s atomic
// tmp+rename pattern and `.context(...)`-annotated I/O. This module adds the
// two behaviors spec.md §6 requires beyond the teacher's config persistence:
// a `schema_version` field carried on every snapshot, and a `.bad`-rename
// fallback when a file exists but fails to parse, so a corrupt snapshot
// never blocks startup.
// =============================================================================

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use tracing::{info, warn};

pub const SCHEMA_VERSION: u32 = 1;

/// Wraps any persisted payload with the schema version it was written under.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct Snapshot<T> {
    pub schema_version: u32,
    pub payload: T,
}

impl<T> Snapshot<T> {
    pub fn new(payload: T) -> Self {
        Self { schema_version: SCHEMA_VERSION, payload }
    }
}

/// Persists `payload` to `path` using an atomic write (tmp sibling + rename).
pub fn save_snapshot<T: Serialize>(path: impl AsRef<Path>, payload: &T) -> Result<()> {
    let path = path.as_ref();
    let snapshot = Snapshot::new(payload);
    let content = serde_json::to_string_pretty(&snapshot).context("failed to serialize snapshot to JSON")?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &content).with_context(|| format!("failed to write tmp snapshot to {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path).with_context(|| format!("failed to rename tmp snapshot to {}", path.display()))?;

    info!(path = %path.display(), schema_version = SCHEMA_VERSION, "snapshot saved (atomic)");
    Ok(())
}

/// Loads a snapshot from `path`. Missing files return `Ok(None)` so callers
/// can fall back to defaults. A file that exists but fails to parse is
/// renamed to `<path>.bad` (best-effort) and also yields `Ok(None)`, rather
/// than blocking startup on a corrupt snapshot.
pub fn load_snapshot<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Option<T>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read snapshot from {}", path.display()))?;

    match serde_json::from_str::<Snapshot<T>>(&content) {
        Ok(snapshot) => {
            if snapshot.schema_version != SCHEMA_VERSION {
                warn!(path = %path.display(), found = snapshot.schema_version, expected = SCHEMA_VERSION, "snapshot schema version mismatch, using payload as-is");
            }
            Ok(Some(snapshot.payload))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt snapshot, renaming to .bad and continuing with defaults");
            let bad_path = path.with_extension("json.bad");
            if let Err(rename_err) = std::fs::rename(path, &bad_path) {
                warn!(path = %path.display(), error = %rename_err, "failed to rename corrupt snapshot out of the way");
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Sample {
        nav: f64,
        open_positions: usize,
    }

    #[test]
    fn round_trips_through_atomic_save_and_load() {
        let dir = std::env::temp_dir().join(format!("nova-pulse-persist-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("snapshot.json");

        let original = Sample { nav: 123.45, open_positions: 3 };
        save_snapshot(&path, &original).unwrap();
        let loaded: Option<Sample> = load_snapshot(&path).unwrap();
        assert_eq!(loaded, Some(original));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_file_yields_none_without_error() {
        let path = std::env::temp_dir().join(format!("nova-pulse-missing-{}.json", uuid::Uuid::new_v4()));
        let loaded: Option<Sample> = load_snapshot(&path).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn corrupt_file_is_renamed_to_bad_and_yields_none() {
        let dir = std::env::temp_dir().join(format!("nova-pulse-corrupt-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("snapshot.json");
        std::fs::write(&path, "{ not valid json").unwrap();

        let loaded: Option<Sample> = load_snapshot(&path).unwrap();
        assert!(loaded.is_none());
        assert!(path.with_extension("json.bad").exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
