//! # Document channels
//!
//! Every open document is served by one channel task. The task owns the
//! document's [`Session`] and handles the requests of all connected clients in
//! order, which makes it the single writer of the live document and of the
//! checkpoint history. Weaving and compiling run in tasks of their own, they
//! only get copies of what they need and answer the requesting client directly.
pub(crate) mod session;

pub use session::{Session, SessionError};

use crate::command::Command;
use crate::compile::CompileMode;
use crate::history::CheckpointId;
use crate::lobby::{ChannelID, UserID};
use crate::manuscript::{Assembler, ExportFormat, Progress};
use crate::weave::{MergeStrategy, WeaveError, Weaver};
use displaydoc::Display;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, info_span, warn};
use tracing_futures::Instrument;

/// A command from one client
#[derive(Debug)]
pub struct Request {
    pub source: UserID,
    /// Where to send the answer for this client
    pub reply: mpsc::Sender<Reply>,
    pub cmd: Command,
}

/// The state a client starts from
#[derive(Debug, Clone)]
pub struct InitReply {
    pub user: UserID,
    pub doc: String,
    pub head: Option<CheckpointId>,
    pub checkpoints: String,
}

/// An answer for a single client
#[derive(Debug, Clone)]
pub enum Reply {
    Init(InitReply),
    Checkpoints(String),
    Saved(CheckpointId),
    Weave(MergeStrategy, String),
    Compiled(ExportFormat, String),
    /// The codex of the project, as JSON
    Codex(String),
    /// The entities mentioned in the live document, as JSON
    Mentions(String),
    Error(String),
}

/// An event for every client of the channel
#[derive(Debug, Clone)]
pub enum Broadcast {
    NewUser(UserID),
    UserLeft(UserID),
    /// The live document changed, `origin` already has it
    Document {
        origin: Option<UserID>,
        doc: String,
    },
    /// The history or the head changed
    History {
        head: Option<CheckpointId>,
        checkpoints: String,
    },
    Progress(f32),
}

/// Error when handling a request
#[derive(Debug, Error, Display)]
enum RequestError {
    /// {0}
    Session(#[from] SessionError),
    /// {0}
    Weave(#[from] WeaveError),
    /// Could not encode reply: {0}
    Encode(#[from] serde_json::Error),
}

/// The ways a channel talks to the outside
#[derive(Debug)]
pub struct ChannelComms {
    pub id: ChannelID,
    pub bct_tx: broadcast::Sender<Broadcast>,
    pub end_tx: mpsc::Sender<ChannelID>,
}

#[derive(Debug)]
struct ChannelState {
    comms: ChannelComms,
    session: Session,
    weaver: Weaver,
}

#[derive(Debug)]
pub struct Channel {
    msg_rx: mpsc::Receiver<Request>,
    ter_rx: oneshot::Receiver<()>,
    state: ChannelState,
}

async fn send_reply(reply: &mpsc::Sender<Reply>, msg: Reply) {
    if reply.send(msg).await.is_err() {
        debug!("Client went away before the reply");
    }
}

impl Channel {
    pub fn new(
        msg_rx: mpsc::Receiver<Request>,
        ter_rx: oneshot::Receiver<()>,
        comms: ChannelComms,
        session: Session,
        weaver: Weaver,
    ) -> Self {
        Self {
            msg_rx,
            ter_rx,
            state: ChannelState {
                comms,
                session,
                weaver,
            },
        }
    }

    pub async fn handle_messages(self) {
        let Channel {
            mut msg_rx,
            mut ter_rx,
            mut state,
        } = self;
        loop {
            tokio::select! {
                ter = &mut ter_rx => {
                    match ter {
                        Ok(()) => info!("No clients left, terminating"),
                        Err(_) => info!("Server shutdown, terminating"),
                    }
                    break;
                }
                req = msg_rx.recv() => match req {
                    Some(request) => state.handle_request(request).await,
                    None => {
                        info!("Request stream ended, terminating");
                        break;
                    }
                }
            }
        }
    }
}

impl ChannelState {
    fn broadcast(&self, msg: Broadcast) {
        if self.comms.bct_tx.send(msg).is_err() {
            debug!("No clients listening");
        }
    }

    async fn broadcast_history(&self) -> Result<(), RequestError> {
        let checkpoints = serde_json::to_string(&self.session.checkpoints().await?)?;
        self.broadcast(Broadcast::History {
            head: self.session.head(),
            checkpoints,
        });
        Ok(())
    }

    fn broadcast_document(&self, origin: Option<UserID>) {
        self.broadcast(Broadcast::Document {
            origin,
            doc: self.session.live().to_json(),
        });
    }

    async fn handle_request(&mut self, request: Request) {
        let Request { source, reply, cmd } = request;
        let result = match cmd {
            Command::Init => self.init(source, &reply).await,
            Command::Update(json) => self.update(source, &json).await,
            Command::Save(label) => self.save(&label, &reply).await,
            Command::List => self.list(&reply).await,
            Command::Restore(id) => self.restore(id).await,
            Command::Delete(id) => self.delete(id).await,
            Command::Weave(strategy, id) => self.weave(strategy, id, reply.clone()).await,
            Command::Accept(text) => self.accept(&text).await,
            Command::Compile(mode, format) => self.compile(mode, format, reply.clone()).await,
            Command::Codex => self.codex(&reply).await,
            Command::Scan => self.scan(&reply).await,
            Command::Close => {
                self.leave(source).await;
                Ok(())
            }
        };
        if let Err(err) = result {
            warn!(user = %source, %err, "Request failed");
            send_reply(&reply, Reply::Error(err.to_string())).await;
        }
    }

    async fn init(&self, user: UserID, reply: &mpsc::Sender<Reply>) -> Result<(), RequestError> {
        info!("New user: {}", user);
        let checkpoints = serde_json::to_string(&self.session.checkpoints().await?)?;
        let init = InitReply {
            user,
            doc: self.session.live().to_json(),
            head: self.session.head(),
            checkpoints,
        };
        send_reply(reply, Reply::Init(init)).await;
        self.broadcast(Broadcast::NewUser(user));
        Ok(())
    }

    async fn update(&mut self, user: UserID, json: &str) -> Result<(), RequestError> {
        self.session.update(json).await?;
        self.broadcast_document(Some(user));
        Ok(())
    }

    async fn save(&mut self, label: &str, reply: &mpsc::Sender<Reply>) -> Result<(), RequestError> {
        let checkpoint = self.session.save(label).await?;
        send_reply(reply, Reply::Saved(checkpoint.id())).await;
        self.broadcast_history().await
    }

    async fn list(&self, reply: &mpsc::Sender<Reply>) -> Result<(), RequestError> {
        let checkpoints = serde_json::to_string(&self.session.checkpoints().await?)?;
        send_reply(reply, Reply::Checkpoints(checkpoints)).await;
        Ok(())
    }

    async fn restore(&mut self, id: CheckpointId) -> Result<(), RequestError> {
        self.session.restore(id).await?;
        self.broadcast_document(None);
        self.broadcast_history().await
    }

    async fn delete(&mut self, id: CheckpointId) -> Result<(), RequestError> {
        self.session.delete(id).await?;
        self.broadcast_history().await
    }

    async fn weave(
        &self,
        strategy: MergeStrategy,
        id: CheckpointId,
        reply: mpsc::Sender<Reply>,
    ) -> Result<(), RequestError> {
        if !self.weaver.is_configured() {
            return Err(WeaveError::ServiceNotConfigured.into());
        }
        let (current, incoming) = self.session.weave_inputs(id).await?;
        let weaver = self.weaver.clone();
        let span = info_span!("weave", channel = %self.comms.id, checkpoint = %id);
        tokio::spawn(
            async move {
                let msg = match weaver.weave(&current, &incoming, strategy).await {
                    Ok(text) => Reply::Weave(strategy, text),
                    Err(err) => {
                        warn!(%err, "Weave failed");
                        Reply::Error(err.to_string())
                    }
                };
                send_reply(&reply, msg).await;
            }
            .instrument(span),
        );
        Ok(())
    }

    async fn accept(&mut self, text: &str) -> Result<(), RequestError> {
        self.session.accept(text).await?;
        self.broadcast_document(None);
        Ok(())
    }

    async fn compile(
        &self,
        mode: CompileMode,
        format: ExportFormat,
        reply: mpsc::Sender<Reply>,
    ) -> Result<(), RequestError> {
        let chapters = self.session.chapters().await?;
        let assembler = Assembler::new(self.session.store().clone());
        let bct_tx = self.comms.bct_tx.clone();
        let span = info_span!("compile", channel = %self.comms.id, %mode, %format);
        tokio::spawn(
            async move {
                let progress = |p: Progress| {
                    let _ = bct_tx.send(Broadcast::Progress(p.fraction()));
                };
                let msg = match assembler.export(&chapters, mode, format, progress).await {
                    Ok(export) => {
                        info!(file = %export.file_name, "Compiled manuscript");
                        Reply::Compiled(format, export.markup)
                    }
                    Err(err) => {
                        warn!(%err, "Compile failed");
                        Reply::Error(err.to_string())
                    }
                };
                send_reply(&reply, msg).await;
            }
            .instrument(span),
        );
        Ok(())
    }

    async fn codex(&self, reply: &mpsc::Sender<Reply>) -> Result<(), RequestError> {
        let codex = self.session.codex().await?;
        let entities = serde_json::to_string(codex.entities())?;
        send_reply(reply, Reply::Codex(entities)).await;
        Ok(())
    }

    async fn scan(&self, reply: &mpsc::Sender<Reply>) -> Result<(), RequestError> {
        let mentions = serde_json::to_string(&self.session.scan().await?)?;
        send_reply(reply, Reply::Mentions(mentions)).await;
        Ok(())
    }

    async fn leave(&self, user: UserID) {
        info!("User left: {}", user);
        self.broadcast(Broadcast::UserLeft(user));
        if let Err(err) = self.comms.end_tx.send(self.comms.id).await {
            warn!("Could not send quit message: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::session::tests::project;
    use super::{Broadcast, Channel, ChannelComms, ChannelState, Reply, Request, Session};
    use crate::command::Command;
    use crate::compile::CompileMode;
    use crate::lobby::{ChannelID, UserID};
    use crate::manuscript::{EntityKind, ExportFormat};
    use crate::model::Node;
    use crate::weave::{MergeStrategy, ServiceError, TextTransform, Weaver};
    use async_trait::async_trait;
    use tokio::sync::{broadcast, mpsc, oneshot};

    struct Fixed;

    #[async_trait]
    impl TextTransform for Fixed {
        async fn generate(&self, _prompt: &str) -> Result<String, ServiceError> {
            Ok(String::from("Merged."))
        }
    }

    struct Harness {
        state: ChannelState,
        reply_tx: mpsc::Sender<Reply>,
        reply_rx: mpsc::Receiver<Reply>,
        bct_rx: broadcast::Receiver<Broadcast>,
        end_rx: mpsc::Receiver<ChannelID>,
        _tmp: tempfile::TempDir,
    }

    impl Harness {
        async fn new(weaver: Weaver) -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let (store, id) = project(tmp.path()).await;
            let session = Session::open(store, id).await.unwrap();
            let (bct_tx, bct_rx) = broadcast::channel(16);
            let (end_tx, end_rx) = mpsc::channel(1);
            let (reply_tx, reply_rx) = mpsc::channel(16);
            let comms = ChannelComms {
                id: ChannelID::from(0),
                bct_tx,
                end_tx,
            };
            Self {
                state: ChannelState {
                    comms,
                    session,
                    weaver,
                },
                reply_tx,
                reply_rx,
                bct_rx,
                end_rx,
                _tmp: tmp,
            }
        }

        async fn send(&mut self, cmd: Command) {
            let request = Request {
                source: UserID::from(1),
                reply: self.reply_tx.clone(),
                cmd,
            };
            self.state.handle_request(request).await;
        }

        async fn reply(&mut self) -> Reply {
            self.reply_rx.recv().await.unwrap()
        }
    }

    fn doc_json(text: &str) -> String {
        Node::doc(vec![Node::paragraph(vec![Node::text(text)])]).to_json()
    }

    #[tokio::test]
    async fn test_save_and_broadcast() {
        let mut h = Harness::new(Weaver::unconfigured()).await;
        h.send(Command::Update(doc_json("Draft"))).await;
        match h.bct_rx.recv().await.unwrap() {
            Broadcast::Document { origin, doc } => {
                assert_eq!(origin, Some(UserID::from(1)));
                assert_eq!(doc, doc_json("Draft"));
            }
            other => panic!("unexpected broadcast {:?}", other),
        }

        h.send(Command::Save(String::from("First"))).await;
        let id = match h.reply().await {
            Reply::Saved(id) => id,
            other => panic!("unexpected reply {:?}", other),
        };
        match h.bct_rx.recv().await.unwrap() {
            Broadcast::History { head, checkpoints } => {
                assert_eq!(head, Some(id));
                assert!(checkpoints.contains("\"label\":\"First\""));
                assert!(!checkpoints.contains("content"));
            }
            other => panic!("unexpected broadcast {:?}", other),
        }

        h.send(Command::Init).await;
        match h.reply().await {
            Reply::Init(init) => {
                assert_eq!(init.head, Some(id));
                assert_eq!(init.doc, doc_json("Draft"));
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_weave_does_not_mutate() {
        let mut h = Harness::new(Weaver::new(Fixed)).await;
        h.send(Command::Update(doc_json("Before"))).await;
        h.send(Command::Save(String::from("A"))).await;
        let id = match h.reply().await {
            Reply::Saved(id) => id,
            other => panic!("unexpected reply {:?}", other),
        };
        h.send(Command::Update(doc_json("After"))).await;
        while h.bct_rx.try_recv().is_ok() {}

        h.send(Command::Weave(MergeStrategy::Blend, id)).await;
        match h.reply().await {
            Reply::Weave(strategy, text) => {
                assert_eq!(strategy, MergeStrategy::Blend);
                assert_eq!(text, "Merged.");
            }
            other => panic!("unexpected reply {:?}", other),
        }
        assert!(h.bct_rx.try_recv().is_err());
        assert_eq!(h.state.session.live().to_json(), doc_json("After"));
        assert_eq!(h.state.session.head(), Some(id));
        assert_eq!(h.state.session.checkpoints().await.unwrap().len(), 1);

        h.send(Command::Accept(String::from("Merged."))).await;
        assert_eq!(h.state.session.live().to_json(), doc_json("Merged."));
        assert!(matches!(
            h.bct_rx.recv().await.unwrap(),
            Broadcast::Document { origin: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_errors_are_replied() {
        let mut h = Harness::new(Weaver::unconfigured()).await;
        h.send(Command::Save(String::from("A"))).await;
        let id = match h.reply().await {
            Reply::Saved(id) => id,
            other => panic!("unexpected reply {:?}", other),
        };

        h.send(Command::Weave(MergeStrategy::Bridge, id)).await;
        assert!(matches!(h.reply().await, Reply::Error(msg) if msg.contains("No text-transform service")));

        h.send(Command::Update(String::from("{ not json"))).await;
        assert!(matches!(h.reply().await, Reply::Error(_)));

        h.send(Command::Restore(crate::history::CheckpointId::random())).await;
        assert!(matches!(h.reply().await, Reply::Error(msg) if msg.contains("not found")));
    }

    #[tokio::test]
    async fn test_compile_reports_progress() {
        let mut h = Harness::new(Weaver::unconfigured()).await;
        h.send(Command::Update(doc_json("Call me"))).await;
        while h.bct_rx.try_recv().is_ok() {}

        h.send(Command::Compile(CompileMode::Final, ExportFormat::Html)).await;
        match h.reply().await {
            Reply::Compiled(format, markup) => {
                assert_eq!(format, ExportFormat::Html);
                assert!(markup.contains("<h1 class=\"chapter-title\">Opening</h1>"));
                assert!(markup.contains("<p>Call me</p>"));
            }
            other => panic!("unexpected reply {:?}", other),
        }
        assert!(matches!(h.bct_rx.recv().await.unwrap(), Broadcast::Progress(f) if (f - 1.0).abs() < f32::EPSILON));
    }

    #[tokio::test]
    async fn test_codex_and_scan() {
        let mut h = Harness::new(Weaver::unconfigured()).await;
        h.send(Command::Codex).await;
        assert!(matches!(h.reply().await, Reply::Codex(json) if json == "[]"));

        let store = h.state.session.store().clone();
        let mut codex = store.codex().await.unwrap();
        codex.add("Starbuck", EntityKind::Character, "First mate");
        codex.add("Moby Dick", EntityKind::Lore, "");
        store.save_codex(&codex).await.unwrap();

        h.send(Command::Codex).await;
        match h.reply().await {
            Reply::Codex(json) => {
                assert!(json.contains("\"name\":\"Starbuck\""));
                assert!(json.contains("\"type\":\"lore\""));
            }
            other => panic!("unexpected reply {:?}", other),
        }

        h.send(Command::Update(doc_json("Starbuck saw moby dick."))).await;
        h.send(Command::Scan).await;
        match h.reply().await {
            Reply::Mentions(json) => {
                let found: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
                assert_eq!(found.len(), 2);
                assert_eq!(found[0]["name"], "Starbuck");
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_and_terminate() {
        let mut h = Harness::new(Weaver::unconfigured()).await;
        h.send(Command::Close).await;
        assert_eq!(h.end_rx.recv().await, Some(ChannelID::from(0)));
        assert!(matches!(
            h.bct_rx.recv().await.unwrap(),
            Broadcast::UserLeft(user) if user == UserID::from(1)
        ));

        let (_req_tx, req_rx) = mpsc::channel(1);
        let (ter_tx, ter_rx) = oneshot::channel();
        let channel = Channel {
            msg_rx: req_rx,
            ter_rx,
            state: h.state,
        };
        let task = tokio::spawn(channel.handle_messages());
        ter_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
