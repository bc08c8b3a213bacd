//! # The document model
//!
//! This module follows the JSON serialization of the editor's nodes and marks
//! (the ProseMirror/tiptap schema with its camelCase type names). Raw JSON coming
//! from the editing surface is normalized by [`de::normalize`] before it is
//! deserialized into a [`Node`].
pub mod de;
mod text;

pub use text::plain_text;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HeadingAttrs {
    pub level: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CodeBlockAttrs {
    #[serde(default, deserialize_with = "de::deserialize_or_default")]
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OrderedListAttrs {
    #[serde(default = "OrderedListAttrs::first")]
    pub start: u32,
}

impl OrderedListAttrs {
    fn first() -> u32 {
        1
    }
}

impl Default for OrderedListAttrs {
    fn default() -> Self {
        Self { start: 1 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CommentAttrs {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "de::deserialize_or_default")]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LinkAttrs {
    #[serde(default, deserialize_with = "de::deserialize_or_default")]
    pub href: String,
}

/// A mark attached to a text leaf
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Mark {
    /// Suggested text that is not accepted yet
    #[serde(rename = "suggestionAdd")]
    Insertion,
    /// Original text that is suggested for removal
    #[serde(rename = "suggestionDel")]
    Deletion,
    Comment {
        #[serde(default)]
        attrs: CommentAttrs,
    },
    Bold,
    Italic,
    Strike,
    Code,
    Link {
        #[serde(default)]
        attrs: LinkAttrs,
    },
    /// A mark this schema does not know, rendered as plain text
    #[serde(other)]
    Other,
}

/// The track-changes role of a mark
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MarkKind {
    Insertion,
    Deletion,
    Comment,
    Formatting,
}

impl Mark {
    pub fn kind(&self) -> MarkKind {
        match self {
            Mark::Insertion => MarkKind::Insertion,
            Mark::Deletion => MarkKind::Deletion,
            Mark::Comment { .. } => MarkKind::Comment,
            Mark::Bold
            | Mark::Italic
            | Mark::Strike
            | Mark::Code
            | Mark::Link { .. }
            | Mark::Other => MarkKind::Formatting,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Node {
    Doc {
        #[serde(default)]
        content: Fragment,
    },
    Paragraph {
        #[serde(default)]
        content: Fragment,
    },
    Heading {
        attrs: HeadingAttrs,
        #[serde(default)]
        content: Fragment,
    },
    Blockquote {
        #[serde(default)]
        content: Fragment,
    },
    CodeBlock {
        #[serde(default)]
        attrs: CodeBlockAttrs,
        #[serde(default)]
        content: Fragment,
    },
    BulletList {
        #[serde(default)]
        content: Fragment,
    },
    OrderedList {
        #[serde(default)]
        attrs: OrderedListAttrs,
        #[serde(default)]
        content: Fragment,
    },
    ListItem {
        #[serde(default)]
        content: Fragment,
    },
    HorizontalRule,
    HardBreak,
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        marks: Vec<Mark>,
    },
}

pub type Fragment = Vec<Node>;

impl Default for Node {
    fn default() -> Self {
        Node::empty()
    }
}

impl Node {
    /// A document without any content
    pub fn empty() -> Self {
        Node::Doc {
            content: Vec::new(),
        }
    }

    pub fn text<S: Into<String>>(text: S) -> Self {
        Node::Text {
            text: text.into(),
            marks: Vec::new(),
        }
    }

    pub fn marked<S: Into<String>>(text: S, marks: Vec<Mark>) -> Self {
        Node::Text {
            text: text.into(),
            marks,
        }
    }

    pub fn paragraph(content: Fragment) -> Self {
        Node::Paragraph { content }
    }

    pub fn doc(content: Fragment) -> Self {
        Node::Doc { content }
    }

    /// Normalize raw editor JSON and deserialize it
    ///
    /// Normalization always runs first, so text leaves that lost their `type`
    /// on the way through the replication layer are still accepted.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let value = de::normalize(value).unwrap_or_else(de::empty_doc);
        serde_json::from_value(value)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Build a document from plain text
    ///
    /// Blank lines separate paragraphs, single newlines become hard breaks.
    pub fn from_plain_text(text: &str) -> Self {
        text::parse_plain_text(text)
    }

    /// The children of a container node, `None` for leaves
    pub fn content(&self) -> Option<&Fragment> {
        match self {
            Node::Doc { content }
            | Node::Paragraph { content }
            | Node::Heading { content, .. }
            | Node::Blockquote { content }
            | Node::CodeBlock { content, .. }
            | Node::BulletList { content }
            | Node::OrderedList { content, .. }
            | Node::ListItem { content } => Some(content),
            Node::HorizontalRule | Node::HardBreak | Node::Text { .. } => None,
        }
    }

    pub fn content_mut(&mut self) -> Option<&mut Fragment> {
        match self {
            Node::Doc { content }
            | Node::Paragraph { content }
            | Node::Heading { content, .. }
            | Node::Blockquote { content }
            | Node::CodeBlock { content, .. }
            | Node::BulletList { content }
            | Node::OrderedList { content, .. }
            | Node::ListItem { content } => Some(content),
            Node::HorizontalRule | Node::HardBreak | Node::Text { .. } => None,
        }
    }

    /// Whether this node belongs inside a textblock
    pub fn is_inline(&self) -> bool {
        matches!(self, Node::Text { .. } | Node::HardBreak)
    }

    /// Whether this node holds inline content (paragraph, heading, code block)
    pub fn is_textblock(&self) -> bool {
        matches!(
            self,
            Node::Paragraph { .. } | Node::Heading { .. } | Node::CodeBlock { .. }
        )
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from(de::EMPTY_DOC))
    }
}
