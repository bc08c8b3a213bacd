use crate::history::{
    Checkpoint, CheckpointId, CheckpointStore, CheckpointSummary, FsTable, HistoryError,
    HistoryHead,
};
use crate::manuscript::{
    Codex, DocumentId, DocumentSource, DocumentStore, Entity, ProjectFile, StoreError,
};
use crate::model::{plain_text, Node};
use displaydoc::Display;
use thiserror::Error;
use tracing::{info, instrument};

/// Error in a document session
#[derive(Debug, Error, Display)]
pub enum SessionError {
    /// {0}
    History(#[from] HistoryError),
    /// {0}
    Store(#[from] StoreError),
    /// Invalid document: {0}
    Document(#[from] serde_json::Error),
    /// Document {0} is not part of the project
    UnknownDocument(DocumentId),
    /// A checkpoint needs a label
    EmptyLabel,
}

/// The state of one open document
///
/// Every operation runs to completion before the next one starts, the channel
/// task owns the session and handles its requests one by one.
#[derive(Debug)]
pub struct Session {
    doc_id: DocumentId,
    store: DocumentStore,
    live: Node,
    head: HistoryHead,
    history: CheckpointStore<FsTable>,
}

impl Session {
    /// Load the live document and its history
    pub async fn open(store: DocumentStore, doc_id: DocumentId) -> Result<Self, SessionError> {
        let project = store.project().await?;
        if project.get(doc_id).is_none() {
            return Err(SessionError::UnknownDocument(doc_id));
        }
        let live = store.content(doc_id).await?;
        let history = CheckpointStore::open(store.dir().history_table(doc_id)).await?;
        Ok(Self {
            doc_id,
            store,
            live,
            head: HistoryHead::default(),
            history,
        })
    }

    pub fn doc_id(&self) -> DocumentId {
        self.doc_id
    }

    pub fn live(&self) -> &Node {
        &self.live
    }

    pub fn head(&self) -> Option<CheckpointId> {
        self.head.current()
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    async fn set_live(&mut self, content: Node) -> Result<(), SessionError> {
        self.store.write(self.doc_id, &content).await?;
        self.live = content;
        Ok(())
    }

    /// Replace the live document with editor JSON
    pub async fn update(&mut self, json: &str) -> Result<(), SessionError> {
        let content = Node::from_json(json)?;
        self.set_live(content).await
    }

    /// Checkpoint the live document below the current head
    #[instrument(skip(self), fields(doc = %self.doc_id))]
    pub async fn save(&mut self, label: &str) -> Result<Checkpoint, SessionError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(SessionError::EmptyLabel);
        }
        let checkpoint = self
            .history
            .save(self.live.clone(), label, self.head.current())
            .await?;
        self.head.move_to(checkpoint.id());
        Ok(checkpoint)
    }

    /// All checkpoints without content, newest first
    pub async fn checkpoints(&self) -> Result<Vec<CheckpointSummary>, SessionError> {
        let checkpoints = self.history.list_newest_first().await?;
        Ok(checkpoints.iter().map(Checkpoint::summary).collect())
    }

    /// Make a checkpoint's content the live document
    #[instrument(skip(self), fields(doc = %self.doc_id))]
    pub async fn restore(&mut self, id: CheckpointId) -> Result<(), SessionError> {
        let content = self.history.restore(id).await?;
        self.set_live(content).await?;
        self.head.move_to(id);
        info!("Restored checkpoint");
        Ok(())
    }

    #[instrument(skip(self), fields(doc = %self.doc_id))]
    pub async fn delete(&mut self, id: CheckpointId) -> Result<bool, SessionError> {
        let removed = self.history.delete(id).await?;
        self.head.forget(id);
        Ok(removed)
    }

    /// The plain text of the live document and of a checkpoint
    pub async fn weave_inputs(&self, id: CheckpointId) -> Result<(String, String), SessionError> {
        let checkpoint = self.history.get(id).await?;
        Ok((plain_text(&self.live), plain_text(checkpoint.content())))
    }

    /// Take over an accepted weave result as the live document
    pub async fn accept(&mut self, text: &str) -> Result<(), SessionError> {
        self.set_live(Node::from_plain_text(text)).await
    }

    /// The chapters of the project, in reading order
    pub async fn chapters(&self) -> Result<Vec<ProjectFile>, SessionError> {
        Ok(self.store.project().await?.chapters())
    }

    pub async fn codex(&self) -> Result<Codex, SessionError> {
        Ok(self.store.codex().await?)
    }

    /// The codex entities mentioned in the live document
    pub async fn scan(&self) -> Result<Vec<Entity>, SessionError> {
        let codex = self.store.codex().await?;
        let text = plain_text(&self.live);
        Ok(codex.scan(&text).into_iter().cloned().collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{Session, SessionError};
    use crate::history::HistoryError;
    use crate::manuscript::{
        DocumentId, DocumentSource, DocumentStore, EntityKind, FileKind, ProjectDir,
    };
    use crate::model::Node;
    use std::path::Path;

    /// A project with a single chapter
    pub(crate) async fn project(root: &Path) -> (DocumentStore, DocumentId) {
        let store = DocumentStore::new(ProjectDir::new(root.join("novel")));
        store.init().await.unwrap();
        let mut project = store.project().await.unwrap();
        let id = project.create("Opening", FileKind::Chapter).id;
        store.save_project(&project).await.unwrap();
        (store, id)
    }

    fn doc_json(text: &str) -> String {
        Node::doc(vec![Node::paragraph(vec![Node::text(text)])]).to_json()
    }

    #[tokio::test]
    async fn test_save_restore_branch() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, id) = project(tmp.path()).await;
        let mut session = Session::open(store.clone(), id).await.unwrap();
        assert_eq!(session.live(), &Node::empty());

        session.update(&doc_json("first")).await.unwrap();
        let a = session.save("A").await.unwrap();
        session.update(&doc_json("second")).await.unwrap();
        let b = session.save("B").await.unwrap();
        assert_eq!(b.parent_id(), Some(a.id()));

        session.restore(a.id()).await.unwrap();
        assert_eq!(session.head(), Some(a.id()));
        assert_eq!(store.plain_text(id).await.unwrap(), "first");

        let c = session.save("C").await.unwrap();
        assert_eq!(c.parent_id(), Some(a.id()));
        assert_eq!(session.head(), Some(c.id()));

        let labels: Vec<String> = session
            .checkpoints()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.label)
            .collect();
        assert_eq!(labels, vec!["C", "B", "A"]);

        // history survives the session
        drop(session);
        let session = Session::open(store, id).await.unwrap();
        assert_eq!(session.checkpoints().await.unwrap().len(), 3);
        assert_eq!(session.head(), None);
    }

    #[tokio::test]
    async fn test_delete_clears_head() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, id) = project(tmp.path()).await;
        let mut session = Session::open(store, id).await.unwrap();

        let a = session.save("A").await.unwrap();
        let b = session.save("B").await.unwrap();
        assert!(session.delete(a.id()).await.unwrap());
        assert_eq!(session.head(), Some(b.id()));
        assert!(session.delete(b.id()).await.unwrap());
        assert_eq!(session.head(), None);
        assert!(!session.delete(b.id()).await.unwrap());

        let next = session.save("C").await.unwrap();
        assert_eq!(next.parent_id(), None);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_head() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, id) = project(tmp.path()).await;
        let mut session = Session::open(store.clone(), id).await.unwrap();
        let a = session.save("A").await.unwrap();

        assert!(matches!(session.save("  ").await, Err(SessionError::EmptyLabel)));

        std::fs::remove_dir_all(store.dir().root()).unwrap();
        assert!(matches!(
            session.save("B").await,
            Err(SessionError::History(HistoryError::StorageUnavailable(_)))
        ));
        assert_eq!(session.head(), Some(a.id()));
    }

    #[tokio::test]
    async fn test_weave_inputs_and_accept() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, id) = project(tmp.path()).await;
        let mut session = Session::open(store.clone(), id).await.unwrap();

        session.update(&doc_json("The vase stood whole.")).await.unwrap();
        let a = session.save("whole").await.unwrap();
        session.update(&doc_json("The vase lay shattered.")).await.unwrap();

        let (current, incoming) = session.weave_inputs(a.id()).await.unwrap();
        assert_eq!(current, "The vase lay shattered.");
        assert_eq!(incoming, "The vase stood whole.");

        session.accept("It stood whole.\n\nThen it fell.").await.unwrap();
        assert_eq!(
            store.plain_text(id).await.unwrap(),
            "It stood whole.\n\nThen it fell."
        );
        assert_eq!(session.head(), Some(a.id()));
        assert_eq!(session.checkpoints().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scan_live_document() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, id) = project(tmp.path()).await;
        let mut codex = store.codex().await.unwrap();
        codex.add("Ahab", EntityKind::Character, "");
        codex.add("Nantucket", EntityKind::Location, "");
        store.save_codex(&codex).await.unwrap();

        let mut session = Session::open(store, id).await.unwrap();
        assert!(session.scan().await.unwrap().is_empty());
        session.update(&doc_json("AHAB paced the deck.")).await.unwrap();
        let found: Vec<String> = session
            .scan()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(found, vec!["Ahab"]);
        assert_eq!(session.codex().await.unwrap().entities().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_document() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _) = project(tmp.path()).await;
        assert!(matches!(
            Session::open(store, DocumentId::random()).await,
            Err(SessionError::UnknownDocument(_))
        ));
    }
}
