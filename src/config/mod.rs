//! # Server configuration

mod folder;

pub use folder::{Folder, PathValidity};

use crate::compile::CompileMode;
use crate::manuscript::{DocumentId, EntityId, EntityKind, ExportFormat, FileKind};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::{Report, Result};
use serde::{de, Deserialize, Deserializer};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use structopt::StructOpt;
use tokio::fs::read_to_string;
use tracing::instrument;
use tungstenite::http::Uri;

#[cfg(feature = "tls")]
use std::{fs::File, io::BufReader};
#[cfg(feature = "tls")]
use tokio_rustls::rustls::internal::pemfile::{certs, pkcs8_private_keys};
#[cfg(feature = "tls")]
use tokio_rustls::rustls::{Certificate, PrivateKey};

/// The commandline flags for the server
#[derive(Debug, StructOpt)]
#[structopt(name = "quire-server")]
pub struct Flags {
    /// Which config file to use
    #[structopt(long = "cfg", short = "c")]
    pub cfg: Option<PathBuf>,
    /// Which port to use (if cfg isn't present)
    #[structopt(long = "port", short = "p")]
    pub port: Option<u16>,
    #[structopt(subcommand)]
    pub cmd: Option<Command>,
}

/// What to do
#[derive(Debug, StructOpt)]
pub enum Command {
    /// Run the websocket server (default)
    Serve,
    /// Compile the chapters of a project into a manuscript file
    Compile {
        /// Name of the project
        project: String,
        /// final, original or review
        #[structopt(long, short, default_value = "final")]
        mode: CompileMode,
        /// html, word or epub
        #[structopt(long, short, default_value = "html")]
        format: ExportFormat,
        /// Where to write the file (defaults to `Manuscript_<mode>.<ext>`)
        #[structopt(long, short, parse(from_os_str))]
        out: Option<PathBuf>,
    },
    /// Print the checkpoint tree of a document
    History {
        /// Name of the project
        project: String,
        /// ID of the document
        doc: DocumentId,
    },
    /// Add a new document to a project
    NewDoc {
        /// Name of the project
        project: String,
        /// Title of the document
        title: String,
        /// chapter, note or folder
        #[structopt(long, short, default_value = "chapter")]
        kind: FileKind,
    },
    /// Give a document of a project a new title
    RenameDoc {
        /// Name of the project
        project: String,
        /// ID of the document
        doc: DocumentId,
        /// The new title
        title: String,
    },
    /// Remove a document, its content and its history from a project
    RemoveDoc {
        /// Name of the project
        project: String,
        /// ID of the document
        doc: DocumentId,
    },
    /// Print the codex of a project
    Codex {
        /// Name of the project
        project: String,
    },
    /// Add an entity to the codex of a project
    CodexAdd {
        /// Name of the project
        project: String,
        /// Name of the entity
        name: String,
        /// character, location, item or lore
        #[structopt(long, short, default_value = "character")]
        kind: EntityKind,
        #[structopt(long, short, default_value = "")]
        description: String,
    },
    /// Change an entity of the codex
    CodexEdit {
        /// Name of the project
        project: String,
        /// ID of the entity
        id: EntityId,
        #[structopt(long, short)]
        name: Option<String>,
        /// character, location, item or lore
        #[structopt(long, short)]
        kind: Option<EntityKind>,
        #[structopt(long, short)]
        description: Option<String>,
        /// Highlight color, e.g. `#3b82f6`
        #[structopt(long)]
        color: Option<String>,
    },
    /// Remove an entity from the codex
    CodexRemove {
        /// Name of the project
        project: String,
        /// ID of the entity
        id: EntityId,
    },
    /// List the codex entities mentioned in a document
    CodexScan {
        /// Name of the project
        project: String,
        /// ID of the document
        doc: DocumentId,
    },
}

/// The type of connection we want
pub enum ConnSetup {
    /// A simple connection (localhost or behind a web-server)
    Basic,
    /// A TLS connection set up within this service
    #[cfg(feature = "tls")]
    Tls {
        /// The loaded keys
        keys: Vec<PrivateKey>,
        /// The loaded certificates
        certs: Vec<Certificate>,
    },
}

/// The setup that we are actually using
pub struct Setup {
    /// The address to bind to
    pub addr: String,
    /// The kind of connection we use
    pub conn: ConnSetup,
    /// The folder we use
    pub folder: Folder,
    /// The text-transform service for weaving
    pub weave: WeaveConfig,
}

impl Flags {
    #[instrument]
    /// Load the configuration from a file
    pub async fn load_cfg(&self) -> Result<Setup, Report> {
        if let Some(cfg) = &self.cfg {
            let cfg_string: String = read_to_string(cfg)
                .await
                .wrap_err("Could not read config file")?;
            let config: Config =
                toml::from_str(&cfg_string).wrap_err("Could not parse config file")?;
            config.into_setup()
        } else if let Some(port) = self.port {
            Ok(Setup {
                addr: format!("0.0.0.0:{}", port),
                conn: ConnSetup::Basic,
                folder: Folder::default(),
                weave: WeaveConfig::default(),
            })
        } else {
            Ok(Setup {
                addr: String::from("127.0.0.1:9002"),
                conn: ConnSetup::Basic,
                folder: Folder::default(),
                weave: WeaveConfig::default(),
            })
        }
    }
}

/// The TLS config options
#[derive(Debug, Deserialize)]
pub struct Tls {
    /// Whether the TLS config is actually used
    pub enabled: bool,
    /// Which certificate file to use
    pub cert: PathBuf,
    /// Which key file to use
    pub key: PathBuf,
}

#[cfg(feature = "tls")]
impl Tls {
    #[instrument]
    /// Load the TLS certificates
    pub fn load_certs(&self) -> Result<Vec<Certificate>> {
        let path = &self.cert;
        let file = File::open(path)?;
        certs(&mut BufReader::new(file)).map_err(|()| eyre!("Invalid certificate"))
    }

    #[instrument]
    /// Load the TLS keys
    pub fn load_keys(&self) -> Result<Vec<PrivateKey>> {
        let path = &self.key;
        let file = File::open(path)?;
        pkcs8_private_keys(&mut BufReader::new(file)).map_err(|()| eyre!("Invalid key"))
    }
}

/// The text-transform service options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeaveConfig {
    /// Base URL of the service, e.g. `http://localhost:11434`
    pub endpoint: Option<String>,
    /// The model to ask
    pub model: Option<String>,
    /// The environment variable that holds the API key, if one is needed
    pub api_key_env: Option<String>,
    /// How long to wait for an answer
    pub timeout_secs: u64,
}

impl Default for WeaveConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: None,
            api_key_env: None,
            timeout_secs: 60,
        }
    }
}

/// A configuration for the system
#[derive(Deserialize)]
pub struct Config {
    /// The address to bind the service to
    #[serde(deserialize_with = "deserialize_from_str")]
    pub addr: Uri,
    /// The TLS options
    pub tls: Option<Tls>,
    /// The folder options
    #[serde(default)]
    pub folder: Folder,
    /// The weave options
    #[serde(default)]
    pub weave: WeaveConfig,
}

impl Config {
    fn into_setup(self) -> Result<Setup> {
        let addr = self.addr.to_string();
        let conn = match self.tls {
            Some(tls) if tls.enabled => tls_setup(&tls)?,
            _ => ConnSetup::Basic,
        };
        Ok(Setup {
            addr,
            conn,
            folder: self.folder,
            weave: self.weave,
        })
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "tls")] {
        fn tls_setup(tls: &Tls) -> Result<ConnSetup> {
            let certs = tls.load_certs().wrap_err("Could not load certificate file")?;
            let keys = tls.load_keys().wrap_err("Could not load key file")?;
            Ok(ConnSetup::Tls { certs, keys })
        }
    } else {
        fn tls_setup(_tls: &Tls) -> Result<ConnSetup> {
            Err(eyre!("TLS is enabled in the config, but the server was built without the `tls` feature"))
        }
    }
}

// You can use this deserializer for any type that implements FromStr
// and the FromStr::Err implements Display
fn deserialize_from_str<'de, S, D>(deserializer: D) -> Result<S, D::Error>
where
    S: FromStr,      // Required for S::from_str...
    S::Err: Display, // Required for .map_err(de::Error::custom)
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    S::from_str(&s).map_err(de::Error::custom)
}
