use super::Node;

/// Flatten a document to plain text
///
/// Block-level nodes are separated by a blank line, text leaves are
/// concatenated as they are and hard breaks become newlines. Blocks without
/// any text are skipped.
pub fn plain_text(node: &Node) -> String {
    let mut blocks = Vec::new();
    collect_blocks(node, &mut blocks);
    blocks.join("\n\n")
}

fn collect_blocks(node: &Node, blocks: &mut Vec<String>) {
    match node {
        Node::Text { .. } | Node::HardBreak => push_block(inline_text(node), blocks),
        Node::HorizontalRule => {}
        node if node.is_textblock() => push_block(inline_text(node), blocks),
        node => {
            let mut inline = String::new();
            for child in node.content().into_iter().flatten() {
                if child.is_inline() {
                    inline.push_str(&inline_text(child));
                } else {
                    if !inline.is_empty() {
                        blocks.push(std::mem::take(&mut inline));
                    }
                    collect_blocks(child, blocks);
                }
            }
            if !inline.is_empty() {
                blocks.push(inline);
            }
        }
    }
}

fn push_block(text: String, blocks: &mut Vec<String>) {
    if !text.is_empty() {
        blocks.push(text);
    }
}

fn inline_text(node: &Node) -> String {
    match node {
        Node::Text { text, .. } => text.clone(),
        Node::HardBreak => String::from("\n"),
        node => node
            .content()
            .into_iter()
            .flatten()
            .map(inline_text)
            .collect(),
    }
}

pub(super) fn parse_plain_text(text: &str) -> Node {
    let normalized = text.replace("\r\n", "\n");
    let content = normalized
        .split("\n\n")
        .map(|block| block.trim_matches('\n'))
        .filter(|block| !block.trim().is_empty())
        .map(|block| {
            let mut inline = Vec::new();
            for (i, line) in block.split('\n').enumerate() {
                if i > 0 {
                    inline.push(Node::HardBreak);
                }
                if !line.is_empty() {
                    inline.push(Node::text(line));
                }
            }
            Node::paragraph(inline)
        })
        .collect();
    Node::doc(content)
}
