//! # HTML serialization
//!
//! Produces the same markup the editor renders, including the classes that
//! the review stylesheet hooks into.
use super::CompileError;
use crate::model::{Mark, Node};
use std::fmt::Write;

pub fn serialize(node: &Node) -> Result<String, CompileError> {
    let mut out = String::new();
    write_node(node, &mut out)?;
    Ok(out)
}

fn write_children(content: &[Node], out: &mut String) -> Result<(), CompileError> {
    for child in content {
        write_node(child, out)?;
    }
    Ok(())
}

fn write_wrapped(tag: &str, content: &[Node], out: &mut String) -> Result<(), CompileError> {
    write!(out, "<{}>", tag)?;
    write_children(content, out)?;
    write!(out, "</{}>", tag)?;
    Ok(())
}

fn write_node(node: &Node, out: &mut String) -> Result<(), CompileError> {
    match node {
        Node::Doc { content } => write_children(content, out)?,
        Node::Paragraph { content } => write_wrapped("p", content, out)?,
        Node::Heading { attrs, content } => {
            if !(1..=6).contains(&attrs.level) {
                return Err(CompileError::HeadingLevel(attrs.level));
            }
            write_wrapped(&format!("h{}", attrs.level), content, out)?;
        }
        Node::Blockquote { content } => write_wrapped("blockquote", content, out)?,
        Node::CodeBlock { attrs, content } => {
            out.push_str("<pre>");
            if attrs.language.is_empty() {
                out.push_str("<code>");
            } else {
                out.push_str("<code class=\"language-");
                escape(&attrs.language, out);
                out.push_str("\">");
            }
            write_children(content, out)?;
            out.push_str("</code></pre>");
        }
        Node::BulletList { content } => write_wrapped("ul", content, out)?,
        Node::OrderedList { attrs, content } => {
            if attrs.start == 1 {
                out.push_str("<ol>");
            } else {
                write!(out, "<ol start=\"{}\">", attrs.start)?;
            }
            write_children(content, out)?;
            out.push_str("</ol>");
        }
        Node::ListItem { content } => write_wrapped("li", content, out)?,
        Node::HorizontalRule => out.push_str("<hr>"),
        Node::HardBreak => out.push_str("<br>"),
        Node::Text { text, marks } => {
            for mark in marks {
                open_mark(mark, out);
            }
            escape(text, out);
            for mark in marks.iter().rev() {
                close_mark(mark, out);
            }
        }
    }
    Ok(())
}

fn open_mark(mark: &Mark, out: &mut String) {
    match mark {
        Mark::Insertion => out.push_str("<span class=\"suggestion-add\">"),
        Mark::Deletion => out.push_str("<span class=\"suggestion-del\">"),
        Mark::Comment { attrs } => {
            out.push_str("<span class=\"comment-mark\"");
            if let Some(id) = &attrs.id {
                out.push_str(" data-comment-id=\"");
                escape(id, out);
                out.push('"');
            }
            out.push_str(" data-comment=\"");
            escape(&attrs.text, out);
            out.push_str("\">");
        }
        Mark::Bold => out.push_str("<strong>"),
        Mark::Italic => out.push_str("<em>"),
        Mark::Strike => out.push_str("<s>"),
        Mark::Code => out.push_str("<code>"),
        Mark::Link { attrs } => {
            out.push_str("<a href=\"");
            escape(&attrs.href, out);
            out.push_str("\">");
        }
        Mark::Other => {}
    }
}

fn close_mark(mark: &Mark, out: &mut String) {
    match mark {
        Mark::Insertion | Mark::Deletion | Mark::Comment { .. } => out.push_str("</span>"),
        Mark::Bold => out.push_str("</strong>"),
        Mark::Italic => out.push_str("</em>"),
        Mark::Strike => out.push_str("</s>"),
        Mark::Code => out.push_str("</code>"),
        Mark::Link { .. } => out.push_str("</a>"),
        Mark::Other => {}
    }
}

/// Escape text for use in element content and quoted attributes
pub fn escape(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::serialize;
    use crate::compile::CompileError;
    use crate::model::{
        CodeBlockAttrs, CommentAttrs, HeadingAttrs, LinkAttrs, Mark, Node, OrderedListAttrs,
    };

    #[test]
    fn test_blocks() {
        let doc = Node::doc(vec![
            Node::Heading {
                attrs: HeadingAttrs { level: 2 },
                content: vec![Node::text("Part <1>")],
            },
            Node::OrderedList {
                attrs: OrderedListAttrs { start: 3 },
                content: vec![Node::ListItem {
                    content: vec![Node::paragraph(vec![Node::text("a"), Node::HardBreak])],
                }],
            },
            Node::CodeBlock {
                attrs: CodeBlockAttrs {
                    language: String::from("rust"),
                },
                content: vec![Node::text("x && y")],
            },
            Node::HorizontalRule,
        ]);
        assert_eq!(
            serialize(&doc).unwrap(),
            "<h2>Part &lt;1&gt;</h2><ol start=\"3\"><li><p>a<br></p></li></ol>\
             <pre><code class=\"language-rust\">x &amp;&amp; y</code></pre><hr>"
        );
    }

    #[test]
    fn test_marks_nest_in_order() {
        let leaf = Node::marked(
            "note",
            vec![
                Mark::Comment {
                    attrs: CommentAttrs {
                        id: Some(String::from("c1")),
                        text: String::from("say \"more\""),
                    },
                },
                Mark::Link {
                    attrs: LinkAttrs {
                        href: String::from("https://example.org/?a=1&b=2"),
                    },
                },
                Mark::Bold,
            ],
        );
        assert_eq!(
            serialize(&leaf).unwrap(),
            "<span class=\"comment-mark\" data-comment-id=\"c1\" data-comment=\"say &quot;more&quot;\">\
             <a href=\"https://example.org/?a=1&amp;b=2\"><strong>note</strong></a></span>"
        );
    }

    #[test]
    fn test_invalid_heading() {
        let doc = Node::doc(vec![Node::Heading {
            attrs: HeadingAttrs { level: 9 },
            content: vec![],
        }]);
        assert!(matches!(serialize(&doc), Err(CompileError::HeadingLevel(9))));
    }
}
