//! # Quire commands
//!
//! Clients talk to the server with text frames of the form `cmd|arg|arg`. The
//! last argument of a command takes the rest of the frame, so it may contain
//! `|` itself.

use crate::compile::CompileMode;
use crate::history::CheckpointId;
use crate::manuscript::ExportFormat;
use crate::weave::MergeStrategy;
use displaydoc::Display;
use std::str::FromStr;
use thiserror::Error;

/// Error when parsing a command
#[derive(Debug, Display, Error)]
pub enum ParseCommandError {
    /// The command expected an argument (e.g. `{0}|foo`)
    MissingArg(CommandKind),
    /// The command `{0}` is not known
    UnknownCommand(String),
    /// Invalid argument for `{0}`: {1}
    InvalidArg(CommandKind, String),
}

/// A kind of incoming command
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
pub enum CommandKind {
    /// init
    Init,
    /// update
    Update,
    /// save
    Save,
    /// list
    List,
    /// restore
    Restore,
    /// delete
    Delete,
    /// weave
    Weave,
    /// accept
    Accept,
    /// compile
    Compile,
    /// codex
    Codex,
    /// scan
    Scan,
    /// close
    Close,
}

/// An incoming command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Join the session and get the current state
    Init,
    /// Replace the live document with new editor JSON
    Update(String),
    /// Save a checkpoint of the live document with a label
    Save(String),
    /// List the checkpoints
    List,
    /// Make a checkpoint the live document
    Restore(CheckpointId),
    /// Delete a checkpoint
    Delete(CheckpointId),
    /// Merge a checkpoint into the live document's text, without applying it
    Weave(MergeStrategy, CheckpointId),
    /// Replace the live document with an accepted text
    Accept(String),
    /// Compile the project into a manuscript
    Compile(CompileMode, ExportFormat),
    /// List the codex of the project
    Codex,
    /// Find the codex entities mentioned in the live document
    Scan,
    /// Close the connection
    Close,
}

impl FromStr for CommandKind {
    type Err = ParseCommandError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Self::Init),
            "update" => Ok(Self::Update),
            "save" => Ok(Self::Save),
            "list" => Ok(Self::List),
            "restore" => Ok(Self::Restore),
            "delete" => Ok(Self::Delete),
            "weave" => Ok(Self::Weave),
            "accept" => Ok(Self::Accept),
            "compile" => Ok(Self::Compile),
            "codex" => Ok(Self::Codex),
            "scan" => Ok(Self::Scan),
            "close" => Ok(Self::Close),
            _ => Err(ParseCommandError::UnknownCommand(s.to_owned())),
        }
    }
}

fn split_arg(input: &str) -> (&str, Option<&str>) {
    if let Some(cmd_len) = input.find('|') {
        let (cmd, r) = input.split_at(cmd_len);
        let (_, arg) = r.split_at(1);
        (cmd, Some(arg))
    } else {
        (input, None)
    }
}

fn parse_arg<T>(kind: CommandKind, arg: Option<&str>) -> Result<T, ParseCommandError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let text = arg.ok_or(ParseCommandError::MissingArg(kind))?;
    text.parse()
        .map_err(|e: T::Err| ParseCommandError::InvalidArg(kind, e.to_string()))
}

impl FromStr for Command {
    type Err = ParseCommandError;
    fn from_str(input: &str) -> Result<Command, ParseCommandError> {
        let (cmd, arg) = split_arg(input);

        match cmd.parse()? {
            CommandKind::Init => Ok(Command::Init),
            CommandKind::List => Ok(Command::List),
            CommandKind::Codex => Ok(Command::Codex),
            CommandKind::Scan => Ok(Command::Scan),
            CommandKind::Close => Ok(Command::Close),
            CommandKind::Update => {
                let text = arg.ok_or(ParseCommandError::MissingArg(CommandKind::Update))?;
                Ok(Command::Update(text.to_owned()))
            }
            CommandKind::Save => {
                let label = arg.map(str::trim).unwrap_or_default();
                if label.is_empty() {
                    return Err(ParseCommandError::MissingArg(CommandKind::Save));
                }
                Ok(Command::Save(label.to_owned()))
            }
            CommandKind::Accept => {
                let text = arg.ok_or(ParseCommandError::MissingArg(CommandKind::Accept))?;
                Ok(Command::Accept(text.to_owned()))
            }
            CommandKind::Restore => {
                let id = parse_arg(CommandKind::Restore, arg)?;
                Ok(Command::Restore(id))
            }
            CommandKind::Delete => {
                let id = parse_arg(CommandKind::Delete, arg)?;
                Ok(Command::Delete(id))
            }
            CommandKind::Weave => {
                let text = arg.ok_or(ParseCommandError::MissingArg(CommandKind::Weave))?;
                let (strategy_str, id_str) = split_arg(text);
                let strategy = parse_arg(CommandKind::Weave, Some(strategy_str))?;
                let id = parse_arg(CommandKind::Weave, id_str)?;
                Ok(Command::Weave(strategy, id))
            }
            CommandKind::Compile => {
                let (mode_str, format_str) = match arg {
                    Some(text) => split_arg(text),
                    None => ("final", None),
                };
                let mode = parse_arg(CommandKind::Compile, Some(mode_str))?;
                let format = parse_arg(CommandKind::Compile, format_str.or(Some("html")))?;
                Ok(Command::Compile(mode, format))
            }
        }
    }
}
