//! Flat node allocator backing every AVL tree in the engine.
//!
//! All three logical collections (the queue, the current lot, and every
//! completed lot) are subtrees living in one [`Arena`]. Nothing outside this
//! module ever holds a borrowed reference into it: callers only ever carry
//! opaque [`NodeId`]s, resolved back through `read`/`write` on every access,
//! which is what lets the rest of the engine treat "a slice moved from one
//! tree to another" as a cheap pointer rewrite instead of a copy.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::Mutez;

use crate::auctions::outcome::AuctionOutcome;
use crate::slice::Slice;

/// Opaque handle into the [`Arena`]. Both leaves and tree roots are
/// [`NodeId`]s; which one a given id names depends only on which [`Node`]
/// variant is stored there. `LeafId` and `TreeId` are aliases used at call
/// sites purely for readability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

pub type LeafId = NodeId;
pub type TreeId = NodeId;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) enum Node {
    /// The identity of a tree never changes even as its contents are
    /// replaced by splits/joins: only `child` and `data` are ever rewritten.
    Root {
        child: Option<NodeId>,
        data: Option<AuctionOutcome>,
    },
    Branch {
        parent: NodeId,
        left: NodeId,
        right: NodeId,
        height: u8,
        weight: Mutez,
    },
    Leaf {
        parent: NodeId,
        value: Slice,
    },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Arena {
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
}

impl Arena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.nodes[id.0] = Some(node);
            id
        } else {
            let id = NodeId(self.nodes.len());
            self.nodes.push(Some(node));
            id
        }
    }

    pub(crate) fn free(&mut self, id: NodeId) -> Result<(), EngineError> {
        self.get(id)?;
        self.nodes[id.0] = None;
        self.free.push(id);
        Ok(())
    }

    pub(crate) fn get(&self, id: NodeId) -> Result<&Node, EngineError> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| EngineError::InvariantViolation(format!("dangling node id {}", id.0)))
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut Node, EngineError> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| EngineError::InvariantViolation(format!("dangling node id {}", id.0)))
    }

    pub(crate) fn new_root(&mut self) -> TreeId {
        self.alloc(Node::Root {
            child: None,
            data: None,
        })
    }

    /// Total leaf count currently live, for diagnostics/tests only.
    #[must_use]
    pub fn live_node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }
}
