//! Timer trigger state kept in a small JSON file.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use powermgmt_core::PowerMgmtError;
use powermgmt_engine::TickStore;

#[derive(Debug, Default, Serialize, Deserialize)]
struct TimerState {
    last_tick: Option<DateTime<Utc>>,
}

pub struct FileTickStore {
    path: PathBuf,
}

impl FileTickStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(&self, e: std::io::Error) -> PowerMgmtError {
        PowerMgmtError::Other(format!("timer state {}: {e}", self.path.display()))
    }
}

#[async_trait]
impl TickStore for FileTickStore {
    async fn last_tick(&self) -> Result<Option<DateTime<Utc>>, PowerMgmtError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str::<TimerState>(&content)?.last_tick),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn record_tick(&self, at: DateTime<Utc>) -> Result<(), PowerMgmtError> {
        let content = serde_json::to_string(&TimerState { last_tick: Some(at) })?;
        // Atomic replace.
        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, content).await.map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&staging, &self.path).await.map_err(|e| self.io_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_missing_file_has_no_tick() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTickStore::new(dir.path().join("timer.json"));
        assert_eq!(store.last_tick().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_recorded_tick_survives_a_new_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timer.json");
        let tick = Utc.with_ymd_and_hms(2025, 1, 13, 4, 55, 0).unwrap();

        FileTickStore::new(&path).record_tick(tick).await.unwrap();
        assert_eq!(FileTickStore::new(&path).last_tick().await.unwrap(), Some(tick));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timer.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(FileTickStore::new(&path).last_tick().await.is_err());
    }
}
