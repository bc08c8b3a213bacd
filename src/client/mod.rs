//! # Websocket clients
//!
//! One task per connection. It joins the channel of the requested document,
//! turns text frames into [`Request`]s and writes replies and broadcasts back
//! as `kind|payload` frames.
use crate::channel::{Broadcast, Reply, Request};
use crate::command::{Command, ParseCommandError};
use crate::history::CheckpointId;
use crate::lobby::{JoinError, LobbyClient, UserID};
use crate::stream::ClientStream;
use color_eyre::eyre::WrapErr;
use color_eyre::Report;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, trace, warn};
use tungstenite::http::{
    header::SEC_WEBSOCKET_PROTOCOL, response::Response as HttpResponse, status::StatusCode,
    uri::Uri,
};
use tungstenite::{handshake::server, Message, Result as TResult};

const PROTOCOL: &str = "quire";

type WsSender = SplitSink<WebSocketStream<ClientStream>, Message>;

fn reject(msg: String) -> server::ErrorResponse {
    error!("{}", msg);
    let mut rep = HttpResponse::new(Some(msg));
    *rep.status_mut() = StatusCode::NOT_ACCEPTABLE;
    rep
}

fn make_callback(tx: oneshot::Sender<Uri>) -> impl server::Callback {
    move |http_req: &server::Request, mut http_rep: server::Response| {
        let headers = http_req.headers();
        match headers.get(SEC_WEBSOCKET_PROTOCOL) {
            Some(value) if value == PROTOCOL => {
                http_rep
                    .headers_mut()
                    .append(SEC_WEBSOCKET_PROTOCOL, value.clone());
                match tx.send(http_req.uri().clone()) {
                    Ok(()) => Ok(http_rep),
                    Err(uri) => Err(reject(format!("Connection to {} dropped", uri))),
                }
            }
            Some(value) => Err(reject(format!("Invalid protocol {:?}", value))),
            None => Err(reject(String::from("Missing Sec-WebSocket-Protocol header"))),
        }
    }
}

fn head_str(head: Option<CheckpointId>) -> String {
    match head {
        Some(id) => id.to_string(),
        None => String::from("-"),
    }
}

/// The frames for an answer to this client
fn reply_frames(reply: Reply) -> Vec<String> {
    match reply {
        Reply::Init(init) => vec![
            format!(
                "init|{}|{}|{}",
                init.user.int_val(),
                init.doc,
                head_str(init.head)
            ),
            format!("checkpoints|{}", init.checkpoints),
        ],
        Reply::Checkpoints(checkpoints) => vec![format!("checkpoints|{}", checkpoints)],
        Reply::Saved(id) => vec![format!("saved|{}", id)],
        Reply::Weave(strategy, text) => vec![format!("weave|{}|{}", strategy, text)],
        Reply::Compiled(format, markup) => vec![format!("compiled|{}|{}", format, markup)],
        Reply::Codex(entities) => vec![format!("codex|{}", entities)],
        Reply::Mentions(entities) => vec![format!("mentions|{}", entities)],
        Reply::Error(msg) => vec![format!("error|{}", msg)],
    }
}

/// The frames for an event in the channel, as seen by client `id`
fn broadcast_frames(id: UserID, msg: Broadcast) -> Vec<String> {
    match msg {
        Broadcast::NewUser(user) => vec![format!("new-user|{}", user.int_val())],
        Broadcast::UserLeft(user) => vec![format!("user-left|{}", user.int_val())],
        Broadcast::Document { origin, .. } if origin == Some(id) => vec![],
        Broadcast::Document { doc, .. } => vec![format!("doc|{}", doc)],
        Broadcast::History { head, checkpoints } => vec![
            format!("head|{}", head_str(head)),
            format!("checkpoints|{}", checkpoints),
        ],
        Broadcast::Progress(fraction) => vec![format!("progress|{}", fraction)],
    }
}

async fn send_frames(ws_sender: &mut WsSender, frames: Vec<String>) -> TResult<()> {
    for frame in frames {
        ws_sender.send(Message::text(frame)).await?;
    }
    Ok(())
}

enum CommandRes {
    Break,
    Continue,
}

/// The handle of a joined client
struct Membership {
    id: UserID,
    msg_tx: mpsc::Sender<Request>,
    reply_tx: mpsc::Sender<Reply>,
}

impl Membership {
    async fn submit(&self, cmd: Command) -> CommandRes {
        let req = Request {
            source: self.id,
            reply: self.reply_tx.clone(),
            cmd,
        };
        match self.msg_tx.send(req).await {
            Ok(()) => CommandRes::Continue,
            Err(e) => {
                error!("Channel is gone: {}", e);
                CommandRes::Break
            }
        }
    }

    async fn submit_close(&self) {
        if let CommandRes::Continue = self.submit(Command::Close).await {
            debug!("Sent {:?}", Command::Close);
        }
    }

    async fn handle_command(
        &self,
        ws_sender: &mut WsSender,
        cmd_res: Result<Command, ParseCommandError>,
    ) -> TResult<CommandRes> {
        match cmd_res {
            Ok(Command::Close) => {
                self.submit_close().await;
                Ok(CommandRes::Break)
            }
            Ok(cmd) => Ok(self.submit(cmd).await),
            Err(err) => {
                ws_sender
                    .send(Message::text(format!("error|{}", err)))
                    .await?;
                Ok(CommandRes::Continue)
            }
        }
    }

    async fn handle_message(&self, msg: Message, ws_sender: &mut WsSender) -> TResult<CommandRes> {
        match msg {
            Message::Text(t) => self.handle_command(ws_sender, t.parse()).await,
            Message::Binary(_) => {
                ws_sender
                    .send(Message::text("error|Binary frames are not supported"))
                    .await?;
                Ok(CommandRes::Continue)
            }
            Message::Close(c) => {
                debug!("WebSocket closed ({:?})", c);
                self.submit_close().await;
                Ok(CommandRes::Break)
            }
            Message::Ping(p) => {
                ws_sender.send(Message::Pong(p)).await?;
                Ok(CommandRes::Continue)
            }
            Message::Pong(_) => Ok(CommandRes::Continue),
        }
    }
}

pub async fn handle_connection(
    lc: LobbyClient,
    peer: SocketAddr,
    stream: ClientStream,
) -> Result<(), Report> {
    let (tx, rx) = oneshot::channel::<Uri>();
    let ws_stream: WebSocketStream<ClientStream> =
        accept_hdr_async(stream, make_callback(tx)).await?;
    let uri: Uri = rx.await.wrap_err("Callback dropped")?;
    let start_time = Instant::now();

    info!("New WebSocket connection: {} to {}", peer, uri);
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let channel_path = urlencoding::decode(uri.path())?;
    let join_response = match lc.join_channel(channel_path).await {
        Ok(jr) => jr,
        Err(JoinError::IsProject(manifest)) => {
            send_frames(&mut ws_sender, vec![format!("project|{}", manifest)]).await?;
            ws_sender.send(Message::Close(None)).await?;
            return Ok(());
        }
        Err(e) => {
            warn!("Could not join {}: {}", uri, e);
            send_frames(&mut ws_sender, vec![format!("error|{}", e)]).await?;
            ws_sender.send(Message::Close(None)).await?;
            return Ok(());
        }
    };
    let mut bct_rx = join_response.bct_rx;
    let (reply_tx, mut reply_rx) = mpsc::channel::<Reply>(16);
    let member = Membership {
        id: join_response.id,
        msg_tx: join_response.msg_tx,
        reply_tx,
    };
    let id = member.id;

    let mut interval = tokio::time::interval(Duration::from_millis(1000));
    loop {
        trace!("Loop iteration");
        tokio::select! {
            msg = ws_receiver.next() => match msg {
                Some(Ok(msg)) => match member.handle_message(msg, &mut ws_sender).await {
                    Ok(CommandRes::Break) => break,
                    Ok(CommandRes::Continue) => {}
                    Err(err) => {
                        error!("Could not handle message: {}", err);
                        member.submit_close().await;
                        break;
                    }
                },
                Some(Err(e)) => {
                    error!("Error on input stream: {}", e);
                    member.submit_close().await;
                    break;
                }
                None => {
                    debug!("WebSocket stream was terminated unexpectedly");
                    member.submit_close().await;
                    break;
                }
            },
            reply = reply_rx.recv() => {
                if let Some(reply) = reply {
                    if let Err(err) = send_frames(&mut ws_sender, reply_frames(reply)).await {
                        error!("Could not send reply: {}", err);
                        member.submit_close().await;
                        break;
                    }
                }
            }
            bct = bct_rx.recv() => match bct {
                Ok(msg) => {
                    if let Err(err) = send_frames(&mut ws_sender, broadcast_frames(id, msg)).await {
                        error!("Could not send broadcast: {}", err);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("{} missed {} broadcasts", id, n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Channel closed");
                    break;
                }
            },
            time = interval.tick() => {
                trace!("Send ping to {}", id);
                let dur = time.duration_since(start_time);
                let bytes: [u8; 16] = dur.as_micros().to_le_bytes();
                if let Err(err) = ws_sender.send(Message::Ping(Vec::from(&bytes[..]))).await {
                    error!("Could not send ping: {}", err);
                    member.submit_close().await;
                    break;
                }
            }
        }
    }

    trace!("Leaving handle_connection");

    Ok(())
}
