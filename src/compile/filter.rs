//! # Structural repair and track-changes filtering
use super::policy::{action, MarkAction};
use super::CompileMode;
use crate::model::{Fragment, Mark, MarkKind, Node};

/// Repair nodes the editor schema would never produce
///
/// Empty text leaves are removed, inline nodes that sit directly in a block
/// container are wrapped into a paragraph (a list item for lists) and block
/// nodes nested in a textblock are flattened to their inline content.
pub fn repair(node: Node) -> Node {
    match node {
        Node::Doc { content } => Node::Doc {
            content: repair_blocks(content, wrap_paragraph),
        },
        Node::Blockquote { content } => Node::Blockquote {
            content: repair_blocks(content, wrap_paragraph),
        },
        Node::ListItem { content } => Node::ListItem {
            content: repair_blocks(content, wrap_paragraph),
        },
        Node::BulletList { content } => Node::BulletList {
            content: repair_blocks(content, wrap_list_item),
        },
        Node::OrderedList { attrs, content } => Node::OrderedList {
            attrs,
            content: repair_blocks(content, wrap_list_item),
        },
        Node::Paragraph { content } => Node::Paragraph {
            content: repair_inline(content),
        },
        Node::Heading { attrs, content } => Node::Heading {
            attrs,
            content: repair_inline(content),
        },
        Node::CodeBlock { attrs, content } => Node::CodeBlock {
            attrs,
            content: repair_inline(content),
        },
        leaf => leaf,
    }
}

fn wrap_paragraph(inline: Fragment) -> Node {
    Node::Paragraph { content: inline }
}

fn wrap_list_item(inline: Fragment) -> Node {
    Node::ListItem {
        content: vec![wrap_paragraph(inline)],
    }
}

fn is_empty_text(node: &Node) -> bool {
    matches!(node, Node::Text { text, .. } if text.is_empty())
}

fn repair_blocks(content: Fragment, wrap: fn(Fragment) -> Node) -> Fragment {
    let mut blocks = Vec::with_capacity(content.len());
    let mut pending = Vec::new();
    for child in content {
        if is_empty_text(&child) {
            continue;
        }
        if child.is_inline() {
            pending.push(child);
            continue;
        }
        if !pending.is_empty() {
            blocks.push(wrap(std::mem::take(&mut pending)));
        }
        blocks.push(repair(child));
    }
    if !pending.is_empty() {
        blocks.push(wrap(pending));
    }
    blocks
}

fn repair_inline(content: Fragment) -> Fragment {
    let mut inline = Vec::with_capacity(content.len());
    for child in content {
        if is_empty_text(&child) {
            continue;
        }
        if child.is_inline() {
            inline.push(child);
        } else if let Some(nested) = repair(child).content_mut() {
            inline.extend(repair_inline(std::mem::take(nested)));
        }
    }
    inline
}

/// Apply the mark policy bottom-up
///
/// Returns `None` if the node resolves to nothing: a leaf that the policy
/// drops, or a container whose children were all dropped. Containers that
/// had no children to begin with are kept.
pub fn filter(node: Node, mode: CompileMode) -> Option<Node> {
    match node {
        Node::Text { text, marks } => filter_leaf(text, marks, mode),
        Node::HardBreak => Some(Node::HardBreak),
        Node::HorizontalRule => Some(Node::HorizontalRule),
        mut container => {
            if let Some(content) = container.content_mut() {
                let had_children = !content.is_empty();
                let children: Fragment = std::mem::take(content)
                    .into_iter()
                    .filter_map(|child| filter(child, mode))
                    .collect();
                if had_children && children.is_empty() {
                    return None;
                }
                *content = children;
            }
            Some(container)
        }
    }
}

fn filter_leaf(text: String, marks: Vec<Mark>, mode: CompileMode) -> Option<Node> {
    // A leaf that is both inserted and deleted keeps the original wording
    let deleted = marks.iter().any(|mark| mark.kind() == MarkKind::Deletion);

    let mut kept = Vec::with_capacity(marks.len());
    for mark in marks {
        if deleted && mark.kind() == MarkKind::Insertion {
            continue;
        }
        match action(mark.kind(), mode) {
            MarkAction::Drop => return None,
            MarkAction::Strip => {}
            MarkAction::Keep => kept.push(mark),
        }
    }
    Some(Node::Text { text, marks: kept })
}

#[cfg(test)]
mod tests {
    use super::{filter, repair};
    use crate::compile::CompileMode;
    use crate::model::{Mark, Node};

    fn hello_world() -> Node {
        Node::doc(vec![Node::paragraph(vec![
            Node::text("Hello"),
            Node::marked(" world", vec![Mark::Deletion]),
        ])])
    }

    #[test]
    fn test_deletion() {
        assert_eq!(
            filter(hello_world(), CompileMode::Final),
            Some(Node::doc(vec![Node::paragraph(vec![Node::text("Hello")])]))
        );
        assert_eq!(
            filter(hello_world(), CompileMode::Original),
            Some(Node::doc(vec![Node::paragraph(vec![
                Node::text("Hello"),
                Node::text(" world"),
            ])]))
        );
        assert_eq!(filter(hello_world(), CompileMode::Review), Some(hello_world()));
    }

    #[test]
    fn test_conflict_is_deletion_wins() {
        let leaf = Node::marked("both", vec![Mark::Insertion, Mark::Deletion, Mark::Bold]);
        assert_eq!(filter(leaf.clone(), CompileMode::Final), None);
        assert_eq!(
            filter(leaf.clone(), CompileMode::Original),
            Some(Node::marked("both", vec![Mark::Bold]))
        );
        assert_eq!(
            filter(leaf, CompileMode::Review),
            Some(Node::marked("both", vec![Mark::Deletion, Mark::Bold]))
        );
    }

    #[test]
    fn test_emptied_containers_are_dropped() {
        let doc = Node::doc(vec![
            Node::Blockquote {
                content: vec![Node::paragraph(vec![Node::marked("new", vec![Mark::Insertion])])],
            },
            Node::paragraph(vec![]),
        ]);
        assert_eq!(
            filter(doc, CompileMode::Original),
            Some(Node::doc(vec![Node::paragraph(vec![])]))
        );

        let only_deleted = Node::doc(vec![Node::paragraph(vec![Node::marked(
            "gone",
            vec![Mark::Deletion],
        )])]);
        assert_eq!(filter(only_deleted, CompileMode::Final), None);
    }

    #[test]
    fn test_repair() {
        let doc = Node::doc(vec![
            Node::text("stray"),
            Node::HardBreak,
            Node::text(""),
            Node::paragraph(vec![
                Node::text(""),
                Node::paragraph(vec![Node::text("nested")]),
            ]),
            Node::BulletList {
                content: vec![Node::text("item")],
            },
        ]);
        assert_eq!(
            repair(doc),
            Node::doc(vec![
                Node::paragraph(vec![Node::text("stray"), Node::HardBreak]),
                Node::paragraph(vec![Node::text("nested")]),
                Node::BulletList {
                    content: vec![Node::ListItem {
                        content: vec![Node::paragraph(vec![Node::text("item")])]
                    }]
                },
            ])
        );
    }
}
