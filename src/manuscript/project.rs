use crate::history::FsTable;
use chrono::{DateTime, SubsecRound, Utc};
use displaydoc::Display;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// ID of a document in a project
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocumentId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// The kind of an entry in the project manifest
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// chapter
    Chapter,
    /// note
    Note,
    /// folder
    Folder,
}

impl Default for FileKind {
    fn default() -> Self {
        FileKind::Chapter
    }
}

/// Unknown file kind {0:?}
#[derive(Debug, Error, Display)]
pub struct UnknownKind(String);

impl FromStr for FileKind {
    type Err = UnknownKind;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chapter" => Ok(Self::Chapter),
            "note" => Ok(Self::Note),
            "folder" => Ok(Self::Folder),
            _ => Err(UnknownKind(s.to_owned())),
        }
    }
}

/// An entry in the project manifest
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub id: DocumentId,
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: FileKind,
    pub order: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

/// The current time at the precision of the manifest
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// The manifest of a project, `project.json`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Project {
    #[serde(default)]
    files: Vec<ProjectFile>,
}

impl Project {
    /// Add a file at the end of the project
    pub fn create(&mut self, title: &str, kind: FileKind) -> &ProjectFile {
        let order = self.files.len() as u32;
        self.files.push(ProjectFile {
            id: DocumentId::random(),
            title: title.to_owned(),
            kind,
            order,
            updated_at: now(),
        });
        let index = self.files.len() - 1;
        &self.files[index]
    }

    /// Rename a file, returns false if it does not exist
    pub fn rename(&mut self, id: DocumentId, title: &str) -> bool {
        match self.files.iter_mut().find(|f| f.id == id) {
            Some(file) => {
                file.title = title.to_owned();
                file.updated_at = now();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: DocumentId) -> Option<ProjectFile> {
        let index = self.files.iter().position(|f| f.id == id)?;
        Some(self.files.remove(index))
    }

    pub fn get(&self, id: DocumentId) -> Option<&ProjectFile> {
        self.files.iter().find(|f| f.id == id)
    }

    /// All files, sorted by their order
    pub fn files(&self) -> Vec<&ProjectFile> {
        let mut files: Vec<_> = self.files.iter().collect();
        files.sort_by_key(|f| f.order);
        files
    }

    /// The files that make up the manuscript, in reading order
    pub fn chapters(&self) -> Vec<ProjectFile> {
        self.files()
            .into_iter()
            .filter(|f| f.kind == FileKind::Chapter)
            .cloned()
            .collect()
    }
}

/// The on-disk layout of one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDir {
    root: PathBuf,
}

impl ProjectDir {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("project.json")
    }

    pub fn codex_path(&self) -> PathBuf {
        self.root.join("codex.json")
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.root.join("docs")
    }

    pub fn doc_path(&self, id: DocumentId) -> PathBuf {
        self.docs_dir().join(format!("{}.json", id))
    }

    pub fn history_dir(&self, id: DocumentId) -> PathBuf {
        self.root.join("history").join(id.to_string())
    }

    /// The checkpoint table of one document
    pub fn history_table(&self, id: DocumentId) -> FsTable {
        FsTable::new(self.root.clone(), self.history_dir(id))
    }
}
