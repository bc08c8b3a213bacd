use crate::model::Node;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// ID of a checkpoint
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CheckpointId(Uuid);

impl CheckpointId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CheckpointId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl From<Uuid> for CheckpointId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// An immutable snapshot of one document
///
/// There is no way to change a checkpoint after it was created, the store only
/// ever adds or removes whole records.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    id: CheckpointId,
    created_at: DateTime<Utc>,
    label: String,
    content: Node,
    parent_id: Option<CheckpointId>,
}

/// A checkpoint without its content, for listings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSummary {
    pub id: CheckpointId,
    pub created_at: DateTime<Utc>,
    pub label: String,
    pub parent_id: Option<CheckpointId>,
}

impl Checkpoint {
    pub(super) fn new(
        content: Node,
        label: String,
        parent_id: Option<CheckpointId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CheckpointId::random(),
            created_at,
            label,
            content,
            parent_id,
        }
    }

    pub fn id(&self) -> CheckpointId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn content(&self) -> &Node {
        &self.content
    }

    pub fn parent_id(&self) -> Option<CheckpointId> {
        self.parent_id
    }

    pub fn into_content(self) -> Node {
        self.content
    }

    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            id: self.id,
            created_at: self.created_at,
            label: self.label.clone(),
            parent_id: self.parent_id,
        }
    }
}
