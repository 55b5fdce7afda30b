//! Serializable per-node overview of a chain.

use serde::Serialize;

use crate::modification::ModificationKind;
use crate::types::Properties;

/// One row of a [`ChainSummary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummary {
    /// Index from the root.
    pub position: usize,
    /// Modification kind.
    pub kind: ModificationKind,
    /// Creation time.
    pub timestamp: String,
    /// Output width.
    pub width: u32,
    /// Output height.
    pub height: u32,
    /// Output channel count.
    pub channels: usize,
    /// Properties visible at this node (ancestors merged in).
    pub properties: Properties,
    /// Why the last recompute was skipped, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

/// Overview of every node, root first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainSummary {
    /// Rows, root first.
    pub nodes: Vec<NodeSummary>,
}

impl ChainSummary {
    /// Properties visible at the leaf.
    #[must_use]
    pub fn leaf_properties(&self) -> Option<&Properties> {
        self.nodes.last().map(|n| &n.properties)
    }
}

impl std::fmt::Display for ChainSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for node in &self.nodes {
            write!(
                f,
                "{:>3}  {:<15} {}  {}x{}x{}",
                node.position, node.kind, node.timestamp, node.width, node.height, node.channels
            )?;
            if let Some(reason) = &node.skipped {
                write!(f, "  (skipped: {reason})")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
