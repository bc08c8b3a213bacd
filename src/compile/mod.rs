//! # Content compiler
//!
//! Resolves the track-changes state of a document into markup for one
//! audience. Compiling is total: a document that cannot be serialized yields
//! [`PLACEHOLDER`] so that one broken chapter never blocks a manuscript.
mod filter;
mod html;
pub mod policy;

pub use filter::{filter, repair};
pub use html::escape;

use crate::model::Node;
use displaydoc::Display;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Emitted in place of a document that could not be compiled
pub const PLACEHOLDER: &str = "<p>[content unavailable]</p>";

/// Which track-changes state is visible in the output
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompileMode {
    /// final
    Final,
    /// original
    Original,
    /// review
    Review,
}

impl Default for CompileMode {
    fn default() -> Self {
        CompileMode::Final
    }
}

/// Unknown compile mode {0:?}
#[derive(Debug, Error, Display)]
pub struct UnknownMode(String);

impl FromStr for CompileMode {
    type Err = UnknownMode;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "final" => Ok(Self::Final),
            "original" => Ok(Self::Original),
            "review" => Ok(Self::Review),
            _ => Err(UnknownMode(s.to_owned())),
        }
    }
}

/// Error when compiling a single document
#[derive(Debug, Error, Display)]
pub enum CompileError {
    /// Invalid document structure: {0}
    Invalid(#[from] serde_json::Error),
    /// Heading level {0} is outside of 1..=6
    HeadingLevel(u8),
    /// Could not write markup
    Fmt(#[from] fmt::Error),
}

/// Compile a document, reporting structural errors
pub fn try_compile(tree: &Node, mode: CompileMode) -> Result<String, CompileError> {
    match filter(repair(tree.clone()), mode) {
        Some(filtered) => html::serialize(&filtered),
        None => Ok(String::new()),
    }
}

/// Compile a document, substituting [`PLACEHOLDER`] on error
pub fn compile(tree: &Node, mode: CompileMode) -> String {
    try_compile(tree, mode).unwrap_or_else(|error| {
        warn!(%error, %mode, "Could not compile document");
        String::from(PLACEHOLDER)
    })
}

/// Normalize and compile raw editor JSON
///
/// Content that does not fit the schema compiles to [`PLACEHOLDER`].
pub fn compile_value(value: Value, mode: CompileMode) -> String {
    match Node::from_value(value).map_err(CompileError::from) {
        Ok(tree) => compile(&tree, mode),
        Err(error) => {
            warn!(%error, %mode, "Could not compile raw document");
            String::from(PLACEHOLDER)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{compile, compile_value, try_compile, CompileMode, PLACEHOLDER};
    use crate::model::{HeadingAttrs, Mark, Node};
    use serde_json::json;

    const MODES: [CompileMode; 3] = [CompileMode::Final, CompileMode::Original, CompileMode::Review];

    fn hello_world() -> Node {
        Node::doc(vec![Node::paragraph(vec![
            Node::text("Hello"),
            Node::marked(" world", vec![Mark::Deletion]),
        ])])
    }

    #[test]
    fn test_hello_world() {
        assert_eq!(compile(&hello_world(), CompileMode::Final), "<p>Hello</p>");
        assert_eq!(
            compile(&hello_world(), CompileMode::Original),
            "<p>Hello world</p>"
        );
        assert_eq!(
            compile(&hello_world(), CompileMode::Review),
            "<p>Hello<span class=\"suggestion-del\"> world</span></p>"
        );
    }

    #[test]
    fn test_insertion_is_converse() {
        let doc = Node::doc(vec![Node::paragraph(vec![
            Node::text("Hello"),
            Node::marked(" there", vec![Mark::Insertion]),
        ])]);
        assert_eq!(compile(&doc, CompileMode::Final), "<p>Hello there</p>");
        assert_eq!(compile(&doc, CompileMode::Original), "<p>Hello</p>");
        assert_eq!(
            compile(&doc, CompileMode::Review),
            "<p>Hello<span class=\"suggestion-add\"> there</span></p>"
        );
    }

    #[test]
    fn test_comments_only_in_review() {
        let doc = Node::from_value(json!({ "type": "doc", "content": [{ "type": "paragraph", "content": [
            { "type": "text", "text": "look", "marks": [{ "type": "comment", "attrs": { "id": "7", "text": "hm" } }] }
        ]}]}))
        .unwrap();
        assert_eq!(compile(&doc, CompileMode::Final), "<p>look</p>");
        assert_eq!(compile(&doc, CompileMode::Original), "<p>look</p>");
        assert_eq!(
            compile(&doc, CompileMode::Review),
            "<p><span class=\"comment-mark\" data-comment-id=\"7\" data-comment=\"hm\">look</span></p>"
        );
    }

    #[test]
    fn test_total_for_every_mode() {
        let trees = vec![
            Node::empty(),
            Node::doc(vec![Node::paragraph(vec![Node::marked("x", vec![Mark::Deletion])])]),
            Node::doc(vec![Node::paragraph(vec![Node::marked("y", vec![Mark::Insertion])])]),
            hello_world(),
        ];
        for tree in &trees {
            for mode in MODES.iter() {
                assert!(try_compile(tree, *mode).is_ok());
            }
        }
        assert_eq!(compile(&trees[1], CompileMode::Final), "");
        assert_eq!(compile(&trees[2], CompileMode::Original), "");
    }

    #[test]
    fn test_placeholder() {
        let broken = Node::doc(vec![Node::Heading {
            attrs: HeadingAttrs { level: 0 },
            content: vec![Node::text("?")],
        }]);
        assert_eq!(compile(&broken, CompileMode::Final), PLACEHOLDER);
        assert_eq!(
            compile_value(json!({ "type": "doc", "content": [{ "type": "table" }] }), CompileMode::Review),
            PLACEHOLDER
        );
    }

    #[test]
    fn test_raw_value() {
        let raw = json!([{ "type": "paragraph", "content": [{ "text": "Hi" }, { "text": "!", "marks": [{ "type": "suggestionAdd" }] }] }]);
        assert_eq!(compile_value(raw.clone(), CompileMode::Final), "<p>Hi!</p>");
        assert_eq!(compile_value(raw, CompileMode::Original), "<p>Hi</p>");
    }

    #[test]
    fn test_untyped_container_is_skipped() {
        let raw = json!({ "type": "doc", "content": [
            { "type": "paragraph", "content": [{ "text": "kept" }] },
            { "content": [{ "type": "paragraph", "content": [{ "text": "lost" }] }] }
        ]});
        assert_eq!(compile_value(raw, CompileMode::Final), "<p>kept</p>");
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("review".parse::<CompileMode>().unwrap(), CompileMode::Review);
        assert!("draft".parse::<CompileMode>().is_err());
        assert_eq!(CompileMode::Original.to_string(), "original");
    }
}
