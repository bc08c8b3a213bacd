use super::{JoinError, JoinRequest, JoinResponse};
use crate::channel::{Broadcast, Channel, ChannelComms, Request, Session};
use crate::config::{Folder, PathValidity};
use crate::manuscript::{DocumentId, DocumentStore, ProjectDir};
use crate::util::{Counter, LoopState};
use crate::weave::Weaver;
use derive_new::new;
use displaydoc::Display;
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::{fmt, path::PathBuf};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{error, info, info_span, trace, warn};
use tracing_futures::Instrument;

macro_rules! make_id {
    (#[$doc:meta] $name:ident, $key:literal) => {
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        #[$doc]
        pub struct $name(u64);

        impl $name {
            /// Integer value
            pub fn int_val(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, $key, self.0)
            }
        }

        impl From<$name> for u64 {
            fn from(u_id: $name) -> u64 {
                u_id.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> $name {
                $name(id)
            }
        }
    };
}

make_id!(
    /// ID for a client/user
    UserID,
    "user#{0}"
);

#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Hash)]
/// channel#{0}
pub struct ChannelID(u64);
impl From<ChannelID> for u64 {
    fn from(c_id: ChannelID) -> u64 {
        c_id.0
    }
}

impl From<u64> for ChannelID {
    fn from(id: u64) -> ChannelID {
        ChannelID(id)
    }
}

#[derive(Debug, new)]
pub struct LobbyChannel {
    next_id: Counter<UserID>,
    count: u64,
    path: PathBuf,
    bct_tx: broadcast::Sender<Broadcast>,
    req_tx: mpsc::Sender<Request>,
    terminate: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
pub struct LobbyState {
    next_id: Counter<ChannelID>,
    channels: HashMap<ChannelID, LobbyChannel>,
    channel_names: HashMap<PathBuf, ChannelID>,
}

type JoinResult = Result<JoinResponse, JoinError>;

fn log_join_response(res: Result<(), JoinResult>) {
    if res.is_err() {
        error!("Client connection dropped while joining");
    }
}

/// The manifest of a project, for a client that opened the project itself
async fn project_listing(dir: ProjectDir) -> JoinError {
    match DocumentStore::new(dir).project().await {
        Ok(project) => match serde_json::to_string(&project) {
            Ok(json) => JoinError::IsProject(json),
            Err(err) => JoinError::Encode(err),
        },
        Err(err) => JoinError::Store(err),
    }
}

impl LobbyState {
    async fn handle_end(&mut self, sig: ChannelID) -> LoopState<()> {
        match self.channels.entry(sig) {
            Entry::Vacant(_v) => {
                error!("Channel entry vanished");
                LoopState::Break(())
            }
            Entry::Occupied(mut o) => {
                let channel = o.get_mut();
                match channel.count.cmp(&1) {
                    Ordering::Less => {
                        error!("Channel {} not cleaned up correctly", sig);
                        LoopState::Break(())
                    }
                    Ordering::Equal => {
                        let channel = o.remove();
                        self.channel_names.remove(&channel.path);
                        if let Err(()) = channel.terminate.send(()) {
                            error!("Error terminating channel {}", sig);
                        }
                        LoopState::Continue
                    }
                    Ordering::Greater => {
                        channel.count -= 1;
                        LoopState::Continue
                    }
                }
            }
        }
    }

    fn join_existing(&mut self, channel_id: ChannelID, response: oneshot::Sender<JoinResult>) {
        let channel = match self.channels.get_mut(&channel_id) {
            Some(channel) => channel,
            None => {
                error!("Channel {} is named but not registered", channel_id);
                log_join_response(response.send(Err(JoinError::Vanished)));
                return;
            }
        };

        let id = channel.next_id.next();
        let res = response.send(Ok(JoinResponse {
            id,
            msg_tx: channel.req_tx.clone(),
            bct_rx: channel.bct_tx.subscribe(),
        }));
        match res {
            Ok(()) => {
                channel.count += 1;
                info!("Accepted client {} into channel {}", id, channel_id);
            }
            Err(_) => {
                error!("Client connection {} dropped while joining", id);
            }
        }
    }

    async fn open_channel(
        &mut self,
        dir: ProjectDir,
        doc_id: DocumentId,
        response: oneshot::Sender<JoinResult>,
        end_tx: &mpsc::Sender<ChannelID>,
        weaver: &Weaver,
    ) {
        let path = dir.doc_path(doc_id);
        let session = match Session::open(DocumentStore::new(dir), doc_id).await {
            Ok(session) => session,
            Err(err) => {
                warn!(%doc_id, %err, "Could not open document");
                log_join_response(response.send(Err(JoinError::Session(err))));
                return;
            }
        };

        let (req_tx, req_rx) = mpsc::channel(100);
        let (bct_tx, bct_rx) = broadcast::channel(100);
        let (ter_tx, ter_rx) = oneshot::channel::<()>();
        let channel_id = self.next_id.next();

        let comms = ChannelComms {
            id: channel_id,
            bct_tx: bct_tx.clone(),
            end_tx: end_tx.clone(),
        };
        let channel = Channel::new(req_rx, ter_rx, comms, session, weaver.clone());
        let span = info_span!("channel", id = %channel_id, doc = %doc_id);
        tokio::spawn(channel.handle_messages().instrument(span));

        let mut next_id = Counter::default();
        let res = response.send(Ok(JoinResponse {
            id: next_id.next(),
            msg_tx: req_tx.clone(),
            bct_rx,
        }));
        if res.is_err() {
            // dropping `ter_tx` ends the channel again
            error!("Client connection dropped while joining");
            return;
        }

        info!("Opened channel {} for {}", channel_id, path.display());
        self.channels.insert(
            channel_id,
            LobbyChannel::new(next_id, 1, path.clone(), bct_tx, req_tx, ter_tx),
        );
        self.channel_names.insert(path, channel_id);
    }

    pub async fn handle_join_request(
        &mut self,
        msg: JoinRequest,
        end_tx: &mpsc::Sender<ChannelID>,
        folder: &Folder,
        weaver: &Weaver,
    ) {
        let response = msg.response;
        match folder.check_name(&msg.path) {
            PathValidity::Invalid => {
                log_join_response(response.send(Err(JoinError::InvalidPath(msg.path))));
            }
            PathValidity::Project(dir) => {
                log_join_response(response.send(Err(project_listing(dir).await)));
            }
            PathValidity::Document(dir, doc_id) => {
                let path = dir.doc_path(doc_id);
                match self.channel_names.get(&path).copied() {
                    Some(channel_id) => self.join_existing(channel_id, response),
                    None => {
                        self.open_channel(dir, doc_id, response, end_tx, weaver)
                            .await
                    }
                }
            }
        }
    }
}

/// The task for the lobby
#[derive(Debug, new)]
pub struct LobbyServer {
    inner: mpsc::Receiver<JoinRequest>,
    #[new(default)]
    state: LobbyState,
    folder: Folder,
    weaver: Weaver,
}

impl LobbyServer {
    /// The main loop of the server
    pub async fn run(mut self) {
        let (end_tx, mut end_rx) = mpsc::channel::<ChannelID>(5);

        loop {
            tokio::select! {
                sig = end_rx.recv() => {
                    if let Some(sig) = sig {
                        if let LoopState::Break(()) = self.state.handle_end(sig).await {
                            break;
                        }
                    }
                }
                msg = self.inner.recv() => {
                    if let Some(msg) = msg {
                        self.state
                            .handle_join_request(msg, &end_tx, &self.folder, &self.weaver)
                            .await;
                    } else {
                        trace!("JoinRequest stream broke!");
                        break;
                    }
                }
            }
        }
    }
}
