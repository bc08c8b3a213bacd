//! # Manuscript assembly
//!
//! Compiles the chapters of a project, in order, into one downloadable
//! document. Chapters are resolved through a [`DocumentSource`], so the
//! assembler does not care whether content comes from the studio folder or
//! from a live session.
mod codex;
mod project;
mod shell;
mod store;

pub use codex::{Codex, Entity, EntityId, EntityKind, EntityUpdate, UnknownEntityKind};
pub use project::{DocumentId, FileKind, Project, ProjectDir, ProjectFile, UnknownKind};
pub use shell::{ExportFormat, UnknownFormat};
pub use store::{DocumentSource, DocumentStore, StoreError};

use crate::compile::{compile_value, escape, CompileMode};
use tracing::{instrument, warn};

/// Emitted for a chapter whose content could not be loaded
pub const LOAD_ERROR: &str = "<p class=\"compile-error\">[Error loading chapter content]</p>";

/// How far an assembly has come
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.done as f32 / self.total as f32
        }
    }
}

/// An assembled manuscript, ready to be written or sent
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub file_name: String,
    pub mime: &'static str,
    pub markup: String,
}

#[derive(Debug)]
pub struct Assembler<S> {
    source: S,
}

impl<S: DocumentSource> Assembler<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Compile `docs` in the given order into one body
    ///
    /// A chapter that cannot be resolved is replaced by [`LOAD_ERROR`] and
    /// the assembly continues. Content that loads but does not fit the schema
    /// compiles to the placeholder. Only unavailable storage aborts.
    #[instrument(skip(self, docs, progress), fields(chapters = docs.len()))]
    pub async fn assemble<F>(
        &self,
        docs: &[ProjectFile],
        mode: CompileMode,
        mut progress: F,
    ) -> Result<String, StoreError>
    where
        F: FnMut(Progress) + Send,
    {
        let total = docs.len();
        let mut body = String::new();
        for (index, doc) in docs.iter().enumerate() {
            body.push_str("<h1 class=\"chapter-title\">");
            escape(&doc.title, &mut body);
            body.push_str("</h1>\n");

            match self.source.raw(doc.id).await {
                Ok(value) => body.push_str(&compile_value(value, mode)),
                Err(err @ StoreError::StorageUnavailable(_)) => return Err(err),
                Err(err) => {
                    warn!(id = %doc.id, title = %doc.title, %err, "Could not load chapter");
                    body.push_str(LOAD_ERROR);
                }
            }
            body.push('\n');

            progress(Progress {
                done: index + 1,
                total,
            });
        }
        Ok(body)
    }

    /// Assemble and wrap the result in the shell of `format`
    pub async fn export<F>(
        &self,
        docs: &[ProjectFile],
        mode: CompileMode,
        format: ExportFormat,
        progress: F,
    ) -> Result<Export, StoreError>
    where
        F: FnMut(Progress) + Send,
    {
        let body = self.assemble(docs, mode, progress).await?;
        Ok(Export {
            file_name: format.file_name(mode),
            mime: format.mime(),
            markup: format.wrap(&body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Assembler, DocumentId, DocumentSource, DocumentStore, ExportFormat, FileKind, Progress,
        Project, ProjectDir, ProjectFile, StoreError, LOAD_ERROR,
    };
    use crate::compile::{CompileMode, PLACEHOLDER};
    use crate::model::{Mark, Node};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::io;

    #[derive(Default)]
    struct Shelf {
        docs: HashMap<DocumentId, Node>,
        raw: HashMap<DocumentId, Value>,
        offline: bool,
    }

    #[async_trait]
    impl DocumentSource for Shelf {
        async fn content(&self, id: DocumentId) -> Result<Node, StoreError> {
            if self.offline {
                let err = io::Error::new(io::ErrorKind::NotConnected, "offline");
                return Err(StoreError::StorageUnavailable(err));
            }
            self.docs
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::Unresolved(id, String::from("missing")))
        }

        async fn raw(&self, id: DocumentId) -> Result<Value, StoreError> {
            if let Some(value) = self.raw.get(&id) {
                return Ok(value.clone());
            }
            let content = self.content(id).await?;
            Ok(serde_json::to_value(content).unwrap())
        }
    }

    fn chapters(titles: &[&str]) -> (Project, Vec<ProjectFile>) {
        let mut project = Project::default();
        for title in titles {
            project.create(title, FileKind::Chapter);
        }
        let chapters = project.chapters();
        (project, chapters)
    }

    fn para(text: &str) -> Node {
        Node::doc(vec![Node::paragraph(vec![Node::text(text)])])
    }

    #[tokio::test]
    async fn test_order_and_isolation() {
        let (_, docs) = chapters(&["One", "Two & Three", "Four"]);
        let mut shelf = Shelf::default();
        shelf.docs.insert(docs[0].id, para("first"));
        shelf.docs.insert(
            docs[2].id,
            Node::doc(vec![Node::paragraph(vec![
                Node::text("kept"),
                Node::marked(" gone", vec![Mark::Deletion]),
            ])]),
        );

        let mut seen = Vec::new();
        let body = Assembler::new(shelf)
            .assemble(&docs, CompileMode::Final, |p| seen.push(p))
            .await
            .unwrap();

        assert_eq!(
            body,
            format!(
                "<h1 class=\"chapter-title\">One</h1>\n<p>first</p>\n\
                 <h1 class=\"chapter-title\">Two &amp; Three</h1>\n{}\n\
                 <h1 class=\"chapter-title\">Four</h1>\n<p>kept</p>\n",
                LOAD_ERROR
            )
        );
        let fractions: Vec<f32> = seen.iter().map(Progress::fraction).collect();
        assert_eq!(seen.last(), Some(&Progress { done: 3, total: 3 }));
        assert_eq!(fractions.len(), 3);
        assert!(fractions.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_invalid_structure_compiles_to_placeholder() {
        let (_, docs) = chapters(&["One", "Two"]);
        let mut shelf = Shelf::default();
        shelf.raw.insert(
            docs[0].id,
            json!({ "type": "doc", "content": [{ "type": "table", "content": [] }] }),
        );
        shelf.raw.insert(
            docs[1].id,
            json!({ "type": "doc", "content": [
                { "type": "paragraph", "content": [{ "text": "kept" }] },
                { "content": [] }
            ]}),
        );

        let body = Assembler::new(shelf)
            .assemble(&docs, CompileMode::Final, |_| {})
            .await
            .unwrap();
        assert_eq!(
            body,
            format!(
                "<h1 class=\"chapter-title\">One</h1>\n{}\n\
                 <h1 class=\"chapter-title\">Two</h1>\n<p>kept</p>\n",
                PLACEHOLDER
            )
        );
        assert!(!body.contains(LOAD_ERROR));
    }

    #[tokio::test]
    async fn test_stored_invalid_chapter() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(ProjectDir::new(tmp.path().join("novel")));
        store.init().await.unwrap();

        let (_, docs) = chapters(&["Broken", "Corrupt"]);
        std::fs::write(
            store.dir().doc_path(docs[0].id),
            r#"{"type":"doc","content":[{"type":"heading","attrs":{"level":"big"}}]}"#,
        )
        .unwrap();
        std::fs::write(store.dir().doc_path(docs[1].id), "{ broken").unwrap();

        let body = Assembler::new(store)
            .assemble(&docs, CompileMode::Final, |_| {})
            .await
            .unwrap();
        let broken = body.find(PLACEHOLDER).unwrap();
        let corrupt = body.find(LOAD_ERROR).unwrap();
        assert!(broken < corrupt);
    }

    #[tokio::test]
    async fn test_unavailable_storage_aborts() {
        let (_, docs) = chapters(&["One"]);
        let shelf = Shelf {
            offline: true,
            ..Shelf::default()
        };
        let mut calls = 0;
        let res = Assembler::new(shelf)
            .assemble(&docs, CompileMode::Review, |_| calls += 1)
            .await;
        assert!(matches!(res, Err(StoreError::StorageUnavailable(_))));
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_export_from_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(ProjectDir::new(tmp.path().join("novel")));
        store.init().await.unwrap();

        let (mut project, _) = chapters(&["Opening"]);
        let note = project.create("Notes", FileKind::Note).id;
        let docs = project.chapters();
        store.write(docs[0].id, &para("Call me")).await.unwrap();
        store.write(note, &para("not in the book")).await.unwrap();

        let export = Assembler::new(store)
            .export(&docs, CompileMode::Final, ExportFormat::Word, |_| {})
            .await
            .unwrap();
        assert_eq!(export.file_name, "Manuscript_final.doc");
        assert_eq!(export.mime, "application/msword");
        assert!(export.markup.starts_with('\u{feff}'));
        assert!(export.markup.contains("<p>Call me</p>"));
        assert!(!export.markup.contains("not in the book"));
        assert_eq!(export.markup.matches("<body>").count(), 1);
    }

    #[tokio::test]
    async fn test_empty_manuscript() {
        let body = Assembler::new(Shelf::default())
            .assemble(&[], CompileMode::Final, |_| {})
            .await
            .unwrap();
        assert_eq!(body, "");
        assert_eq!(Progress { done: 0, total: 0 }.fraction(), 1.0);
    }
}
