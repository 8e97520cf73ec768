use std::fmt;

/// Catalog tree level.
///
/// The integer values double as the on-disk encoding in the sidecar index,
/// so they are part of the persistence contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root = 0,
    Set = 1,
    Volume = 2,
    Folder = 3,
    File = 4,
}

impl NodeKind {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(NodeKind::Root),
            1 => Some(NodeKind::Set),
            2 => Some(NodeKind::Volume),
            3 => Some(NodeKind::Folder),
            4 => Some(NodeKind::File),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Root => "root",
            NodeKind::Set => "set",
            NodeKind::Volume => "volume",
            NodeKind::Folder => "folder",
            NodeKind::File => "file",
        };
        f.pad(name)
    }
}

/// Minimal descriptor metadata a node keeps after the build pass.
///
/// Only the levels whose records carry identity beyond a display name have
/// a summary; folder and file nodes are fully described by name and offset.
/// Summaries are in-memory only — the sidecar index does not persist them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSummary {
    Media { media_name: String },
    Set { set_number: u16, set_name: String },
    Volume { device_name: String },
}

/// One node of the catalog tree.
///
/// Nodes own their children; insertion order is record arrival order and
/// is never re-sorted. After construction a node is only ever mutated by
/// appending children.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogNode {
    pub kind: NodeKind,
    /// Resolved display name, never carries a trailing terminator
    pub name: String,
    /// Byte position of the originating record in the backup image; file
    /// nodes seek here during extraction
    pub offset: u64,
    pub summary: Option<RecordSummary>,
    pub children: Vec<CatalogNode>,
}

impl CatalogNode {
    pub fn new(kind: NodeKind, name: String, offset: u64) -> Self {
        Self {
            kind,
            name,
            offset,
            summary: None,
            children: Vec::new(),
        }
    }

    pub fn with_summary(kind: NodeKind, name: String, offset: u64, summary: RecordSummary) -> Self {
        Self {
            summary: Some(summary),
            ..Self::new(kind, name, offset)
        }
    }

    /// Append a child, returning its index.
    ///
    /// Children of a node form an append-only sequence; the returned index
    /// stays valid for the tree's lifetime and is how the builder keeps
    /// non-owning handles to attribution targets.
    pub fn add_child(&mut self, child: CatalogNode) -> usize {
        self.children.push(child);
        self.children.len() - 1
    }

    /// Navigate to a descendant by child-index path; empty path is `self`
    pub fn node_at(&self, path: &[usize]) -> Option<&CatalogNode> {
        let mut node = self;
        for &index in path {
            node = node.children.get(index)?;
        }
        Some(node)
    }

    /// Total number of nodes in this subtree, the node itself included
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(CatalogNode::node_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_encoding_round_trips() {
        for kind in [
            NodeKind::Root,
            NodeKind::Set,
            NodeKind::Volume,
            NodeKind::Folder,
            NodeKind::File,
        ] {
            assert_eq!(NodeKind::from_i32(kind.as_i32()), Some(kind));
        }
        assert_eq!(NodeKind::from_i32(5), None);
        assert_eq!(NodeKind::from_i32(-1), None);
    }

    #[test]
    fn node_at_follows_index_paths() {
        let mut root = CatalogNode::new(NodeKind::Root, "tape".into(), 0);
        let mut set = CatalogNode::new(NodeKind::Set, "set".into(), 100);
        set.add_child(CatalogNode::new(NodeKind::Volume, "C:".into(), 200));
        root.add_child(set);

        assert_eq!(root.node_at(&[]).unwrap().name, "tape");
        assert_eq!(root.node_at(&[0, 0]).unwrap().name, "C:");
        assert!(root.node_at(&[0, 1]).is_none());
    }

    #[test]
    fn node_count_covers_subtree() {
        let mut root = CatalogNode::new(NodeKind::Root, "tape".into(), 0);
        let mut set = CatalogNode::new(NodeKind::Set, "set".into(), 0);
        set.add_child(CatalogNode::new(NodeKind::Volume, "C:".into(), 0));
        root.add_child(set);
        assert_eq!(root.node_count(), 3);
    }
}
