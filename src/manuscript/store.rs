use super::codex::Codex;
use super::project::{DocumentId, Project, ProjectDir};
use crate::model::{plain_text, Node};
use async_trait::async_trait;
use displaydoc::Display;
use serde_json::Value;
use std::io::{self, ErrorKind};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, instrument};

/// Error from the document store
#[derive(Debug, Error, Display)]
pub enum StoreError {
    /// Document storage is unavailable: {0}
    StorageUnavailable(#[source] io::Error),
    /// Could not resolve document {0}: {1}
    Unresolved(DocumentId, String),
    /// Could not write {0}: {1}
    Encode(String, #[source] serde_json::Error),
}

/// Supplies the latest content of a document
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn content(&self, id: DocumentId) -> Result<Node, StoreError>;

    /// The stored JSON of a document, before it is checked against the schema
    async fn raw(&self, id: DocumentId) -> Result<Value, StoreError> {
        let content = self.content(id).await?;
        serde_json::to_value(&content).map_err(|err| StoreError::Encode(id.to_string(), err))
    }

    /// The document as plain text, blocks separated by a blank line
    async fn plain_text(&self, id: DocumentId) -> Result<String, StoreError> {
        let content = self.content(id).await?;
        Ok(plain_text(&content))
    }
}

/// The documents and the manifest of one project directory
#[derive(Debug, Clone)]
pub struct DocumentStore {
    dir: ProjectDir,
}

async fn write_atomic(path: &Path, bytes: Vec<u8>) -> io::Result<()> {
    let mut tmp = path.to_path_buf();
    tmp.set_extension("json.tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await
}

impl DocumentStore {
    pub fn new(dir: ProjectDir) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &ProjectDir {
        &self.dir
    }

    /// Create the project directory if it does not exist yet
    pub async fn init(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.dir.docs_dir())
            .await
            .map_err(StoreError::StorageUnavailable)
    }

    async fn check_root(&self) -> Result<(), StoreError> {
        match fs::metadata(self.dir.root()).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StoreError::StorageUnavailable(io::Error::new(
                ErrorKind::Other,
                format!("{} is not a directory", self.dir.root().display()),
            ))),
            Err(err) => Err(StoreError::StorageUnavailable(err)),
        }
    }

    /// Read the manifest, a missing manifest is an empty project
    pub async fn project(&self) -> Result<Project, StoreError> {
        self.check_root().await?;
        let path = self.dir.manifest_path();
        match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                StoreError::StorageUnavailable(io::Error::new(ErrorKind::InvalidData, err))
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Project::default()),
            Err(err) => Err(StoreError::StorageUnavailable(err)),
        }
    }

    pub async fn save_project(&self, project: &Project) -> Result<(), StoreError> {
        self.check_root().await?;
        let path = self.dir.manifest_path();
        let bytes = serde_json::to_vec_pretty(project)
            .map_err(|err| StoreError::Encode(path.display().to_string(), err))?;
        write_atomic(&path, bytes)
            .await
            .map_err(StoreError::StorageUnavailable)
    }

    /// Read the codex, a missing codex is empty
    pub async fn codex(&self) -> Result<Codex, StoreError> {
        self.check_root().await?;
        match fs::read(self.dir.codex_path()).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                StoreError::StorageUnavailable(io::Error::new(ErrorKind::InvalidData, err))
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Codex::default()),
            Err(err) => Err(StoreError::StorageUnavailable(err)),
        }
    }

    pub async fn save_codex(&self, codex: &Codex) -> Result<(), StoreError> {
        self.check_root().await?;
        let path = self.dir.codex_path();
        let bytes = serde_json::to_vec_pretty(codex)
            .map_err(|err| StoreError::Encode(path.display().to_string(), err))?;
        write_atomic(&path, bytes)
            .await
            .map_err(StoreError::StorageUnavailable)
    }

    /// Store the live content of a document
    #[instrument(skip(self, content))]
    pub async fn write(&self, id: DocumentId, content: &Node) -> Result<(), StoreError> {
        self.check_root().await?;
        fs::create_dir_all(self.dir.docs_dir())
            .await
            .map_err(StoreError::StorageUnavailable)?;
        let path = self.dir.doc_path(id);
        let bytes = serde_json::to_vec(content)
            .map_err(|err| StoreError::Encode(path.display().to_string(), err))?;
        write_atomic(&path, bytes)
            .await
            .map_err(StoreError::StorageUnavailable)?;
        debug!("Stored document");
        Ok(())
    }

    /// Whether the document has ever been written
    pub async fn exists(&self, id: DocumentId) -> bool {
        fs::metadata(self.dir.doc_path(id)).await.is_ok()
    }
}

#[async_trait]
impl DocumentSource for DocumentStore {
    async fn content(&self, id: DocumentId) -> Result<Node, StoreError> {
        let value = self.raw(id).await?;
        Node::from_value(value).map_err(|err| StoreError::Unresolved(id, err.to_string()))
    }

    async fn raw(&self, id: DocumentId) -> Result<Value, StoreError> {
        self.check_root().await?;
        let bytes = match fs::read(self.dir.doc_path(id)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return serde_json::to_value(Node::empty())
                    .map_err(|err| StoreError::Encode(id.to_string(), err))
            }
            Err(err) => return Err(StoreError::Unresolved(id, err.to_string())),
        };
        serde_json::from_slice(&bytes).map_err(|err| StoreError::Unresolved(id, err.to_string()))
    }
}
