use crate::manuscript::{DocumentId, ProjectDir};
use serde::Deserialize;
use slug::slugify;
use std::path::PathBuf;

const DEFAULT_SAVE_DIR: &str = "studio";

/// The studio folder that holds all projects
#[derive(Default, Debug, Clone, Deserialize)]
pub struct Folder {
    /// The directory to save the projects to
    #[serde(default)]
    save_dir: Option<PathBuf>,
}

/// What a request path points to
#[derive(Debug, PartialEq, Eq)]
pub enum PathValidity {
    Invalid,
    /// `/<project>/`
    Project(ProjectDir),
    /// `/<project>/<doc-id>`
    Document(ProjectDir, DocumentId),
}

impl Folder {
    pub fn new(save_dir: PathBuf) -> Self {
        Self {
            save_dir: Some(save_dir),
        }
    }

    pub fn save_dir(&self) -> PathBuf {
        self.save_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_DIR))
    }

    /// The directory of a project, by its (slugified) name
    pub fn project(&self, name: &str) -> Option<ProjectDir> {
        let slug = slugify(name);
        if slug.is_empty() {
            None
        } else {
            Some(ProjectDir::new(self.save_dir().join(slug)))
        }
    }

    /// Checks the name for validity
    pub fn check_name(&self, path: &str) -> PathValidity {
        let mut iter = path.split('/');
        if iter.next() != Some("") {
            return PathValidity::Invalid;
        }
        let project = match iter.next().and_then(|name| self.project(name)) {
            Some(project) => project,
            None => return PathValidity::Invalid,
        };
        match (iter.next(), iter.next()) {
            (None, _) | (Some(""), None) => PathValidity::Project(project),
            (Some(doc), None) => match doc.parse() {
                Ok(id) => PathValidity::Document(project, id),
                Err(_) => PathValidity::Invalid,
            },
            _ => PathValidity::Invalid,
        }
    }
}
