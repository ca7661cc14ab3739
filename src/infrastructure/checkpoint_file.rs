//! JSON checkpoint file
//!
//! Holds `{"last_vn_id": N, "error_count": M}`. Saves write a sibling temp
//! file, fsync it, rename it over the checkpoint and fsync the directory, so a
//! crash leaves either the previous checkpoint or the new one on disk.
//!
//! Only a missing file means a cold start. An existing file that is empty or
//! not JSON is `Corrupt`: restarting from v1 would silently rescan the catalog.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::domain::checkpoint::SyncCheckpoint;
use crate::domain::repositories::CheckpointStore;
use crate::sync_engine::error::CheckpointError;

#[derive(Debug, Clone)]
pub struct JsonCheckpointFile {
    path: PathBuf,
}

impl JsonCheckpointFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Persist the rename itself. Directories cannot be opened for fsync on
    /// Windows, so this is a no-op there.
    #[cfg(unix)]
    async fn sync_parent_dir(&self) -> Result<(), CheckpointError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let dir = tokio::fs::File::open(parent)
            .await
            .map_err(|e| self.io_error(e))?;
        dir.sync_all().await.map_err(|e| self.io_error(e))
    }

    #[cfg(not(unix))]
    async fn sync_parent_dir(&self) -> Result<(), CheckpointError> {
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl CheckpointStore for JsonCheckpointFile {
    async fn load(&self) -> Result<SyncCheckpoint, CheckpointError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("📍 No checkpoint at {}, starting cold", self.path.display());
                return Ok(SyncCheckpoint::default());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(CheckpointError::Corrupt {
                path: self.path.clone(),
                message: "checkpoint file is empty".to_string(),
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| CheckpointError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    async fn save(&self, checkpoint: &SyncCheckpoint) -> Result<(), CheckpointError> {
        let json = serde_json::to_vec_pretty(checkpoint).map_err(|e| CheckpointError::Encode(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_error(e))?;
            }
        }

        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(&json).await.map_err(|e| self.io_error(e))?;
        file.sync_all().await.map_err(|e| self.io_error(e))?;
        drop(file);

        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        self.sync_parent_dir().await?;

        debug!("Checkpoint saved to {}: {}", self.path.display(), checkpoint);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_is_cold_start() {
        let dir = tempdir().unwrap();
        let file = JsonCheckpointFile::new(dir.path().join("checkpoint.json"));
        assert_eq!(file.load().await.unwrap(), SyncCheckpoint::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let file = JsonCheckpointFile::new(dir.path().join("state").join("checkpoint.json"));

        file.save(&SyncCheckpoint::new(30, 5)).await.unwrap();
        assert_eq!(file.load().await.unwrap(), SyncCheckpoint::new(30, 5));
        assert!(!file.temp_path().exists());
    }

    #[tokio::test]
    async fn test_on_disk_format_uses_last_vn_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        JsonCheckpointFile::new(&path)
            .save(&SyncCheckpoint::new(12, 3))
            .await
            .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["last_vn_id"], 12);
        assert_eq!(value["error_count"], 3);
    }

    #[tokio::test]
    async fn test_missing_fields_default_to_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        std::fs::write(&path, r#"{"last_vn_id": 40}"#).unwrap();

        let loaded = JsonCheckpointFile::new(&path).load().await.unwrap();
        assert_eq!(loaded, SyncCheckpoint::new(40, 0));
    }

    #[tokio::test]
    async fn test_empty_file_is_corrupt_not_cold_start() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");

        for contents in ["", "  \n"] {
            std::fs::write(&path, contents).unwrap();
            let result = JsonCheckpointFile::new(&path).load().await;
            assert!(
                matches!(result, Err(CheckpointError::Corrupt { .. })),
                "{contents:?} loaded as {result:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_save_replaces_existing_checkpoint() {
        let dir = tempdir().unwrap();
        let file = JsonCheckpointFile::new(dir.path().join("checkpoint.json"));

        file.save(&SyncCheckpoint::new(10, 0)).await.unwrap();
        file.save(&SyncCheckpoint::new(20, 4)).await.unwrap();

        assert_eq!(file.load().await.unwrap(), SyncCheckpoint::new(20, 4));
        assert_eq!(file.path(), dir.path().join("checkpoint.json"));
        assert!(!file.temp_path().exists());
    }

    #[tokio::test]
    async fn test_garbage_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        std::fs::write(&path, "not json").unwrap();

        let result = JsonCheckpointFile::new(&path).load().await;
        assert!(matches!(result, Err(CheckpointError::Corrupt { .. })));
    }
}
