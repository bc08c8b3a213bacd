//! # Checkpoint history
//!
//! Every document has an append-only table of immutable checkpoints. The
//! checkpoints form a tree through their parent ids: restoring an older
//! checkpoint and saving again starts a sibling branch, it never rewrites what
//! is already there.
//!
//! Which checkpoint a session is currently based on is tracked by a
//! [`HistoryHead`] that belongs to the session, not to the store.
mod checkpoint;
mod fs;
mod lineage;
mod store;

pub use checkpoint::{Checkpoint, CheckpointId, CheckpointSummary};
pub use fs::FsTable;
pub use lineage::Lineage;
pub use store::{CheckpointStore, CheckpointTable};

#[cfg(test)]
pub(crate) use store::MemoryTable;

use displaydoc::Display;
use std::io;
use thiserror::Error;

/// Error from the checkpoint history
#[derive(Debug, Error, Display)]
pub enum HistoryError {
    /// Checkpoint storage is unavailable: {0}
    StorageUnavailable(#[source] io::Error),
    /// Checkpoint {0} not found
    NotFound(CheckpointId),
    /// Checkpoint record {0} is corrupt: {1}
    Corrupt(String, #[source] serde_json::Error),
}

/// The checkpoint a session's live document was last derived from
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct HistoryHead {
    current: Option<CheckpointId>,
}

impl HistoryHead {
    pub fn current(&self) -> Option<CheckpointId> {
        self.current
    }

    /// Point the head at a freshly saved or restored checkpoint
    pub fn move_to(&mut self, id: CheckpointId) {
        self.current = Some(id);
    }

    /// Detach the head if it points at a deleted checkpoint
    pub fn forget(&mut self, id: CheckpointId) {
        if self.current == Some(id) {
            self.current = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CheckpointId, HistoryHead};

    #[test]
    fn test_head() {
        let a = CheckpointId::random();
        let b = CheckpointId::random();
        let mut head = HistoryHead::default();
        assert_eq!(head.current(), None);

        head.move_to(a);
        head.forget(b);
        assert_eq!(head.current(), Some(a));

        head.forget(a);
        assert_eq!(head.current(), None);
    }
}
