use super::{Checkpoint, CheckpointId, HistoryError};
use crate::model::Node;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument};

/// The durable key-value table that holds one document's checkpoints
///
/// A completed `put` must be durable and must never be observable half
/// written: a concurrent `all` sees the table either before or after it.
#[async_trait]
pub trait CheckpointTable: Send + Sync {
    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), HistoryError>;
    async fn get(&self, id: CheckpointId) -> Result<Option<Checkpoint>, HistoryError>;
    async fn all(&self) -> Result<Vec<Checkpoint>, HistoryError>;
    /// Returns whether a record was removed
    async fn remove(&self, id: CheckpointId) -> Result<bool, HistoryError>;
}

/// The checkpoint history of a single document
#[derive(Debug)]
pub struct CheckpointStore<T> {
    table: T,
    last_created: Option<DateTime<Utc>>,
}

impl<T: CheckpointTable> CheckpointStore<T> {
    /// Open the store on a table
    pub async fn open(table: T) -> Result<Self, HistoryError> {
        let last_created = table.all().await?.iter().map(Checkpoint::created_at).max();
        Ok(Self {
            table,
            last_created,
        })
    }

    /// Capture `content` as a new checkpoint below `parent`
    ///
    /// The caller decides the lineage, usually by passing its session head.
    /// Timestamps strictly increase within a store so that sorting by
    /// `createdAt` matches the order of saves. Lineage is only ever read from
    /// the parent ids.
    #[instrument(skip(self, content))]
    pub async fn save(
        &mut self,
        content: Node,
        label: &str,
        parent: Option<CheckpointId>,
    ) -> Result<Checkpoint, HistoryError> {
        let now = Utc::now();
        let created_at = match self.last_created {
            Some(last) if last >= now => last + Duration::microseconds(1),
            _ => now,
        };
        let checkpoint = Checkpoint::new(content, label.to_owned(), parent, created_at);
        self.table.put(&checkpoint).await?;
        self.last_created = Some(created_at);
        info!(id = %checkpoint.id(), "Saved checkpoint");
        Ok(checkpoint)
    }

    /// All checkpoints, in no particular order
    pub async fn list(&self) -> Result<Vec<Checkpoint>, HistoryError> {
        self.table.all().await
    }

    /// All checkpoints, newest first
    pub async fn list_newest_first(&self) -> Result<Vec<Checkpoint>, HistoryError> {
        let mut checkpoints = self.list().await?;
        checkpoints.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.id().cmp(&b.id()))
        });
        Ok(checkpoints)
    }

    pub async fn get(&self, id: CheckpointId) -> Result<Checkpoint, HistoryError> {
        self.table.get(id).await?.ok_or(HistoryError::NotFound(id))
    }

    /// The stored content of a checkpoint, exactly as it was saved
    pub async fn restore(&self, id: CheckpointId) -> Result<Node, HistoryError> {
        self.get(id).await.map(Checkpoint::into_content)
    }

    /// Remove one checkpoint
    ///
    /// Deleting an unknown id is not an error. Children of the removed
    /// checkpoint keep their (now dangling) parent id.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: CheckpointId) -> Result<bool, HistoryError> {
        let removed = self.table.remove(id).await?;
        if removed {
            info!("Deleted checkpoint");
        } else {
            debug!("Checkpoint was already gone");
        }
        Ok(removed)
    }
}

#[cfg(test)]
pub(crate) use memory::MemoryTable;
