pub mod channel;
pub mod cli;
pub mod client;
pub mod command;
pub mod compile;
pub mod config;
pub mod history;
pub mod lobby;
pub mod manuscript;
pub mod model;
pub mod stream;
pub mod util;
pub mod weave;

use crate::client::handle_connection;
use crate::config::{Command, ConnSetup, Flags, Setup};
use crate::lobby::{JoinRequest, LobbyClient, LobbyServer};
use crate::manuscript::EntityUpdate;
use crate::stream::ClientStream;
use crate::weave::Weaver;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::{Report, Result};
use futures_util::future::ready;
use std::future::Future;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use structopt::StructOpt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{error, info, info_span, warn};
use tracing_error::ErrorLayer;
use tracing_futures::Instrument;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use tungstenite::Error;

#[cfg(feature = "tls")]
use std::sync::Arc;
#[cfg(feature = "tls")]
use tokio_rustls::rustls::{NoClientAuth, ServerConfig};
#[cfg(feature = "tls")]
use tokio_rustls::TlsAcceptor;

async fn accept_connection(lc: LobbyClient, peer: SocketAddr, stream: ClientStream) {
    if let Err(e) = handle_connection(lc, peer, stream).await {
        match e.downcast_ref::<Error>() {
            Some(Error::ConnectionClosed) | Some(Error::Protocol(_)) | Some(Error::Utf8) => (),
            _ => error!("Error processing connection: {:?}", e),
        }
    }
}

async fn wait_for_connections<F, R>(
    listener: TcpListener,
    lobby_sender: mpsc::Sender<JoinRequest>,
    map: F,
) where
    F: Fn(TcpStream) -> R,
    R: Future<Output = Result<ClientStream, io::Error>>,
{
    while let Ok((stream, peer)) = listener.accept().await {
        let lc = LobbyClient::from(lobby_sender.clone());
        match map(stream).await {
            Ok(stream) => {
                let span = info_span!("connection", %peer);
                tokio::spawn(accept_connection(lc, peer, stream).instrument(span));
            }
            Err(e) => error!("Invalid connection request: {:?}", e),
        }
    }
}

fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        #[cfg(debug_assertions)]
        let default = "warn,quire_server=trace";
        #[cfg(not(debug_assertions))]
        let default = "warn,quire_server=info";
        EnvFilter::new(default)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(ErrorLayer::default())
        .init();
}

async fn serve(cfg: Setup) -> Result<()> {
    let addr = cfg
        .addr
        .as_str()
        .to_socket_addrs()
        .wrap_err("Invalid address")?
        .next()
        .ok_or_else(|| eyre!("Address {:?} did not resolve", cfg.addr))?;

    let weaver = Weaver::from_config(&cfg.weave);
    if !weaver.is_configured() {
        warn!("No text-transform service configured, weaving is disabled");
    }

    let (lobby_sender, lobby_receiver) = mpsc::channel(100);
    let lobby = LobbyServer::new(lobby_receiver, cfg.folder, weaver);
    tokio::spawn(lobby.run().instrument(info_span!("lobby")));

    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err("Can't listen")?;
    info!("Listening on: {}", addr);

    let conn = cfg.conn;
    let accept = async move {
        match conn {
            ConnSetup::Basic => {
                wait_for_connections(listener, lobby_sender, |stream| {
                    ready(Ok(ClientStream::Plain(stream)))
                })
                .await;
            }
            #[cfg(feature = "tls")]
            ConnSetup::Tls { certs, mut keys } => {
                let mut config = ServerConfig::new(NoClientAuth::new());
                if keys.is_empty() {
                    return Err(eyre!("Key-File contains no keys"));
                }
                config
                    .set_single_cert(certs, keys.remove(0))
                    .wrap_err("Invalid certificate or key")?;
                let acceptor = TlsAcceptor::from(Arc::new(config));
                wait_for_connections(listener, lobby_sender, |stream: TcpStream| {
                    let acceptor = acceptor.clone();
                    async move {
                        let stream = acceptor.accept(stream).await?;
                        Ok::<_, io::Error>(ClientStream::Rustls(Box::new(stream)))
                    }
                })
                .await;
            }
        }
        Ok::<(), Report>(())
    };

    tokio::select! {
        res = accept => res,
        sig = tokio::signal::ctrl_c() => {
            sig.wrap_err("Could not listen for ctrl-c")?;
            info!("Shutting down");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    install_tracing();
    color_eyre::install()?;

    let flags = Flags::from_args();
    let cfg = flags.load_cfg().await?;

    match flags.cmd {
        None | Some(Command::Serve) => serve(cfg).await,
        Some(Command::Compile {
            project,
            mode,
            format,
            out,
        }) => {
            let path = cli::compile(&cfg.folder, &project, mode, format, out).await?;
            println!("{}", path.display());
            Ok(())
        }
        Some(Command::History { project, doc }) => {
            print!("{}", cli::history(&cfg.folder, &project, doc).await?);
            Ok(())
        }
        Some(Command::NewDoc {
            project,
            title,
            kind,
        }) => {
            println!("{}", cli::new_doc(&cfg.folder, &project, &title, kind).await?);
            Ok(())
        }
        Some(Command::RenameDoc {
            project,
            doc,
            title,
        }) => cli::rename_doc(&cfg.folder, &project, doc, &title).await,
        Some(Command::RemoveDoc { project, doc }) => {
            cli::remove_doc(&cfg.folder, &project, doc).await
        }
        Some(Command::Codex { project }) => {
            print!("{}", cli::codex(&cfg.folder, &project).await?);
            Ok(())
        }
        Some(Command::CodexAdd {
            project,
            name,
            kind,
            description,
        }) => {
            let id = cli::codex_add(&cfg.folder, &project, &name, kind, &description).await?;
            println!("{}", id);
            Ok(())
        }
        Some(Command::CodexEdit {
            project,
            id,
            name,
            kind,
            description,
            color,
        }) => {
            let update = EntityUpdate {
                name,
                kind,
                description,
                color,
            };
            cli::codex_edit(&cfg.folder, &project, id, update).await
        }
        Some(Command::CodexRemove { project, id }) => {
            cli::codex_remove(&cfg.folder, &project, id).await
        }
        Some(Command::CodexScan { project, doc }) => {
            print!("{}", cli::codex_scan(&cfg.folder, &project, doc).await?);
            Ok(())
        }
    }
}
