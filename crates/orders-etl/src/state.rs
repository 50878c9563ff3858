//! Persisted pipeline state (the high-water mark)
//!
//! A small JSON file records the completion time of the last successful
//! cycle, so a restarted pipeline resumes incrementally instead of re-running
//! the capped cold-start extraction. The file is advisory: if it is missing
//! or unreadable the pipeline degrades to a cold start, which is safe because
//! both sinks are idempotent by `order_id`.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Persistent state for the orders pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EtlState {
    /// Completion time of the last successful cycle; `None` means no cycle
    /// has ever completed and the next extraction is a capped cold start
    pub last_etl_time: Option<DateTime<Utc>>,
}

impl EtlState {
    /// Load state from `path`, degrading to the empty state if the file is
    /// missing or unreadable
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => state,
                Err(err) => {
                    warn!(path = %path.display(), error = %err,
                        "State file is unreadable, falling back to cold start");
                    Self::default()
                },
            },
            Err(err) => {
                warn!(path = %path.display(), error = %err,
                    "Could not read state file, falling back to cold start");
                Self::default()
            },
        }
    }

    /// Save state to `path`, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_means_cold_start() {
        let dir = TempDir::new().unwrap();
        let state = EtlState::load(dir.path().join("absent.json"));
        assert_eq!(state.last_etl_time, None);
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("etl_state.json");

        let state = EtlState {
            last_etl_time: Some(Utc::now()),
        };
        state.save(&path).unwrap();

        let loaded = EtlState::load(&path);
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_corrupt_file_degrades_to_cold_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etl_state.json");
        std::fs::write(&path, "{ last_etl_time: oops").unwrap();

        let state = EtlState::load(&path);
        assert_eq!(state.last_etl_time, None);
    }
}
