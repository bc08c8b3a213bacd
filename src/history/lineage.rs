use super::{Checkpoint, CheckpointId};
use std::collections::{HashMap, HashSet};
use std::fmt::Write;

/// The tree view over a set of checkpoints
///
/// A checkpoint whose parent is missing (deleted) is treated as a root.
#[derive(Debug)]
pub struct Lineage<'a> {
    by_id: HashMap<CheckpointId, &'a Checkpoint>,
    children: HashMap<CheckpointId, Vec<&'a Checkpoint>>,
    roots: Vec<&'a Checkpoint>,
}

fn by_creation(a: &&Checkpoint, b: &&Checkpoint) -> std::cmp::Ordering {
    a.created_at()
        .cmp(&b.created_at())
        .then_with(|| a.id().cmp(&b.id()))
}

impl<'a> Lineage<'a> {
    pub fn new(checkpoints: &'a [Checkpoint]) -> Self {
        let by_id: HashMap<_, _> = checkpoints.iter().map(|c| (c.id(), c)).collect();
        let mut children: HashMap<CheckpointId, Vec<&'a Checkpoint>> = HashMap::new();
        let mut roots = Vec::new();

        for checkpoint in checkpoints {
            match checkpoint.parent_id() {
                Some(parent) if by_id.contains_key(&parent) => {
                    children.entry(parent).or_default().push(checkpoint)
                }
                _ => roots.push(checkpoint),
            }
        }

        roots.sort_by(by_creation);
        for list in children.values_mut() {
            list.sort_by(by_creation);
        }

        Self {
            by_id,
            children,
            roots,
        }
    }

    pub fn roots(&self) -> &[&'a Checkpoint] {
        &self.roots
    }

    pub fn children(&self, id: CheckpointId) -> &[&'a Checkpoint] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The parent of a checkpoint, if it still exists
    pub fn parent(&self, id: CheckpointId) -> Option<&'a Checkpoint> {
        let checkpoint = self.by_id.get(&id)?;
        self.by_id.get(&checkpoint.parent_id()?).copied()
    }

    /// The path from a checkpoint up to its root, starting with the checkpoint
    pub fn ancestry(&self, id: CheckpointId) -> Vec<&'a Checkpoint> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut next = self.by_id.get(&id).copied();
        while let Some(checkpoint) = next {
            if !seen.insert(checkpoint.id()) {
                break;
            }
            path.push(checkpoint);
            next = self.parent(checkpoint.id());
        }
        path
    }

    /// Render the tree as indented text, marking the head
    pub fn render(&self, head: Option<CheckpointId>) -> String {
        let mut out = String::new();
        for root in &self.roots {
            self.render_node(root, 0, head, &mut out);
        }
        out
    }

    fn render_node(
        &self,
        checkpoint: &Checkpoint,
        depth: usize,
        head: Option<CheckpointId>,
        out: &mut String,
    ) {
        let marker = if head == Some(checkpoint.id()) { '*' } else { '-' };
        let _ = writeln!(
            out,
            "{:indent$}{} {}  {}  {}",
            "",
            marker,
            checkpoint.label(),
            checkpoint.created_at().format("%Y-%m-%d %H:%M"),
            checkpoint.id(),
            indent = depth * 2
        );
        for child in self.children(checkpoint.id()) {
            self.render_node(child, depth + 1, head, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Lineage;
    use crate::history::{CheckpointStore, MemoryTable};
    use crate::model::Node;

    #[tokio::test]
    async fn test_tree_queries() {
        let mut store = CheckpointStore::open(MemoryTable::default()).await.unwrap();
        let a = store.save(Node::empty(), "A", None).await.unwrap();
        let b = store.save(Node::empty(), "B", Some(a.id())).await.unwrap();
        let c = store.save(Node::empty(), "C", Some(a.id())).await.unwrap();
        let d = store.save(Node::empty(), "D", Some(c.id())).await.unwrap();

        let all = store.list().await.unwrap();
        let lineage = Lineage::new(&all);

        assert_eq!(lineage.roots().len(), 1);
        assert_eq!(lineage.children(a.id()).len(), 2);
        let path: Vec<&str> = lineage.ancestry(d.id()).iter().map(|c| c.label()).collect();
        assert_eq!(path, vec!["D", "C", "A"]);
        assert_eq!(lineage.parent(b.id()).map(|c| c.id()), Some(a.id()));

        let rendered = lineage.render(Some(d.id()));
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("- A"));
        assert!(lines[1].starts_with("  - B"));
        assert!(lines[2].starts_with("  - C"));
        assert!(lines[3].starts_with("    * D"));
    }

    #[tokio::test]
    async fn test_dangling_parent_is_a_root() {
        let mut store = CheckpointStore::open(MemoryTable::default()).await.unwrap();
        let a = store.save(Node::empty(), "A", None).await.unwrap();
        let b = store.save(Node::empty(), "B", Some(a.id())).await.unwrap();
        store.delete(a.id()).await.unwrap();

        let all = store.list().await.unwrap();
        let lineage = Lineage::new(&all);
        assert_eq!(lineage.roots().len(), 1);
        assert_eq!(lineage.roots()[0].id(), b.id());
        assert_eq!(lineage.parent(b.id()), None);
        assert_eq!(lineage.ancestry(b.id()).len(), 1);
        assert!(lineage.children(a.id()).is_empty());
    }
}
