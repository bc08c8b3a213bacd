use super::{Checkpoint, CheckpointId, CheckpointTable, HistoryError};
use async_trait::async_trait;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

const EXTENSION: &str = "json";

/// A checkpoint table made of one JSON file per checkpoint
///
/// Records are written to a hidden temporary file first and then renamed into
/// place, so listing the directory never yields a half-written checkpoint.
#[derive(Debug, Clone)]
pub struct FsTable {
    /// The directory that has to exist for the table to be usable
    root: PathBuf,
    /// The directory that holds the records
    dir: PathBuf,
}

fn unavailable(err: io::Error) -> HistoryError {
    HistoryError::StorageUnavailable(err)
}

impl FsTable {
    pub fn new(root: PathBuf, dir: PathBuf) -> Self {
        Self { root, dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: CheckpointId) -> PathBuf {
        self.dir.join(format!("{}.{}", id, EXTENSION))
    }

    async fn check_root(&self) -> Result<(), HistoryError> {
        match fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(unavailable(io::Error::new(
                ErrorKind::Other,
                format!("{} is not a directory", self.root.display()),
            ))),
            Err(err) => Err(unavailable(err)),
        }
    }

    async fn read_record(&self, path: &Path) -> Result<Option<Checkpoint>, HistoryError> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(unavailable(err)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| HistoryError::Corrupt(path.display().to_string(), err))
    }
}

#[async_trait]
impl CheckpointTable for FsTable {
    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), HistoryError> {
        self.check_root().await?;
        fs::create_dir_all(&self.dir).await.map_err(unavailable)?;

        let id = checkpoint.id();
        let bytes = serde_json::to_vec_pretty(checkpoint)
            .map_err(|err| HistoryError::Corrupt(id.to_string(), err))?;
        let tmp = self.dir.join(format!(".{}.tmp", id));
        fs::write(&tmp, bytes).await.map_err(unavailable)?;
        fs::rename(&tmp, self.record_path(id))
            .await
            .map_err(unavailable)
    }

    async fn get(&self, id: CheckpointId) -> Result<Option<Checkpoint>, HistoryError> {
        self.check_root().await?;
        self.read_record(&self.record_path(id)).await
    }

    async fn all(&self) -> Result<Vec<Checkpoint>, HistoryError> {
        self.check_root().await?;
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(unavailable(err)),
        };

        let mut checkpoints = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(unavailable)? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            match self.read_record(&path).await {
                Ok(Some(checkpoint)) => checkpoints.push(checkpoint),
                // removed between listing and reading
                Ok(None) => {}
                Err(HistoryError::Corrupt(path, err)) => {
                    warn!(%path, %err, "Skipping corrupt checkpoint record");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(checkpoints)
    }

    async fn remove(&self, id: CheckpointId) -> Result<bool, HistoryError> {
        self.check_root().await?;
        match fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(unavailable(err)),
        }
    }
}
