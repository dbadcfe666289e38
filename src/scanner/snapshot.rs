//! Render-ready snapshot of a finalized tree.
//!
//! The live tree carries atomics and locks a renderer has no use for;
//! `NodeSnapshot` is the plain, serializable mirror handed to presentation
//! layers: display name, absolute path, kind, finalized byte size, and
//! children.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::core::errors::Result;
use crate::scanner::node::{FileNode, NodeKind};

/// One node of the serialized tree.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    /// The path's final component.
    pub name: String,
    /// Absolute path.
    pub path: PathBuf,
    /// File or directory.
    pub kind: NodeKind,
    /// Finalized byte total.
    pub size_bytes: u64,
    /// Children, in discovery order (use [`Self::sort_by_size`] for
    /// display ordering).
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// Mirror a finalized tree. Children keep discovery order.
    #[must_use]
    pub fn from_tree(node: &Arc<FileNode>) -> Self {
        Self {
            name: node.name(),
            path: node.path().to_path_buf(),
            kind: node.kind(),
            size_bytes: node.size(),
            children: node.children().iter().map(Self::from_tree).collect(),
        }
    }

    /// Order every child list largest-first, recursively.
    pub fn sort_by_size(&mut self) {
        self.children
            .sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
        for child in &mut self.children {
            child.sort_by_size();
        }
    }

    /// Pretty-printed JSON document.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of nodes in this subtree, itself included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }
}
