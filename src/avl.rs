//! Order-statistic AVL tree (component B), implemented as a set of inherent
//! methods on [`Arena`]. Trees are ordered by insertion position only (there
//! is no search key); every branch caches `height` and `weight` (the sum of
//! `tez` over its leaves) so that `take`/`push`/`del`/`find_root` are all
//! `O(log n)`.
//!
//! The core operation pair is `join` (glue two subtrees back together,
//! rebalancing) and `split_by_weight` (cut a subtree into a weight-bounded
//! prefix and a suffix, without ever slicing a leaf in half). Every other
//! mutator — `push_front`, `push_back`, `pop_front`, `pop_back`, `del`,
//! `take` — is built out of those two.

use crate::arena::{Arena, LeafId, Node, NodeId, TreeId};
use crate::auctions::outcome::AuctionOutcome;
use crate::error::EngineError;
use crate::slice::Slice;
use crate::types::Mutez;

/// Which end of a tree a push targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

fn invariant<T>(detail: impl Into<String>) -> Result<T, EngineError> {
    Err(EngineError::InvariantViolation(detail.into()))
}

impl Arena {
    // -- primitive accessors -------------------------------------------------

    fn height_of(&self, id: NodeId) -> Result<u8, EngineError> {
        match self.get(id)? {
            Node::Leaf { .. } => Ok(1),
            Node::Branch { height, .. } => Ok(*height),
            Node::Root { .. } => invariant("height_of called on a root node"),
        }
    }

    fn weight_of(&self, id: NodeId) -> Result<Mutez, EngineError> {
        match self.get(id)? {
            Node::Leaf { value, .. } => Ok(value.tez()),
            Node::Branch { weight, .. } => Ok(*weight),
            Node::Root { .. } => invariant("weight_of called on a root node"),
        }
    }

    fn set_parent(&mut self, id: NodeId, parent: NodeId) -> Result<(), EngineError> {
        match self.get_mut(id)? {
            Node::Leaf { parent: p, .. } | Node::Branch { parent: p, .. } => {
                *p = parent;
                Ok(())
            }
            Node::Root { .. } => invariant("set_parent called on a root node"),
        }
    }

    fn replace_child(&mut self, id: NodeId, old: NodeId, new: NodeId) -> Result<(), EngineError> {
        match self.get_mut(id)? {
            Node::Branch { left, right, .. } => {
                if *left == old {
                    *left = new;
                } else if *right == old {
                    *right = new;
                } else {
                    return invariant("replace_child: old id is not a child");
                }
                Ok(())
            }
            _ => invariant("replace_child called on a non-branch node"),
        }
    }

    fn recompute(&mut self, id: NodeId) -> Result<(), EngineError> {
        let (l, r) = match self.get(id)? {
            Node::Branch { left, right, .. } => (*left, *right),
            _ => return invariant("recompute called on a non-branch node"),
        };
        let h = 1 + self.height_of(l)?.max(self.height_of(r)?);
        let w = self.weight_of(l)? + self.weight_of(r)?;
        match self.get_mut(id)? {
            Node::Branch { height, weight, .. } => {
                *height = h;
                *weight = w;
            }
            _ => return invariant("recompute called on a non-branch node"),
        }
        Ok(())
    }

    fn make_branch(&mut self, left: NodeId, right: NodeId) -> Result<NodeId, EngineError> {
        let hl = self.height_of(left)?;
        let hr = self.height_of(right)?;
        let wl = self.weight_of(left)?;
        let wr = self.weight_of(right)?;
        let id = self.alloc(Node::Branch {
            parent: left, // placeholder; overwritten once this id is installed under a real parent
            left,
            right,
            height: 1 + hl.max(hr),
            weight: wl + wr,
        });
        self.set_parent(left, id)?;
        self.set_parent(right, id)?;
        Ok(id)
    }

    fn attach_root_child(&mut self, root: TreeId, child: Option<NodeId>) -> Result<(), EngineError> {
        if let Some(c) = child {
            self.set_parent(c, root)?;
        }
        match self.get_mut(root)? {
            Node::Root { child: slot, .. } => {
                *slot = child;
                Ok(())
            }
            _ => invariant("attach_root_child called on a non-root node"),
        }
    }

    // -- rotations ------------------------------------------------------------
    //
    // Both rotations keep the subtree's top `NodeId` fixed (the arena slot at
    // `id` always ends up representing the new top of the rotated subtree) so
    // that whatever externally references `id` never needs to be updated.

    fn rotate_left(&mut self, id: NodeId) -> Result<(), EngineError> {
        let (x_parent, xl, y_id) = match self.get(id)? {
            Node::Branch { parent, left, right, .. } => (*parent, *left, *right),
            _ => return invariant("rotate_left on a non-branch node"),
        };
        let (yl, yr) = match self.get(y_id)? {
            Node::Branch { left, right, .. } => (*left, *right),
            _ => return invariant("rotate_left: right child is not a branch"),
        };

        self.set_parent(xl, y_id)?;
        self.set_parent(yr, id)?;

        let new_x_height = 1 + self.height_of(xl)?.max(self.height_of(yl)?);
        let new_x_weight = self.weight_of(xl)? + self.weight_of(yl)?;
        *self.get_mut(y_id)? = Node::Branch {
            parent: id,
            left: xl,
            right: yl,
            height: new_x_height,
            weight: new_x_weight,
        };

        let new_y_height = 1 + new_x_height.max(self.height_of(yr)?);
        let new_y_weight = new_x_weight + self.weight_of(yr)?;
        *self.get_mut(id)? = Node::Branch {
            parent: x_parent,
            left: y_id,
            right: yr,
            height: new_y_height,
            weight: new_y_weight,
        };

        Ok(())
    }

    fn rotate_right(&mut self, id: NodeId) -> Result<(), EngineError> {
        let (y_parent, x_id, yr) = match self.get(id)? {
            Node::Branch { parent, left, right, .. } => (*parent, *left, *right),
            _ => return invariant("rotate_right on a non-branch node"),
        };
        let (xl, xr) = match self.get(x_id)? {
            Node::Branch { left, right, .. } => (*left, *right),
            _ => return invariant("rotate_right: left child is not a branch"),
        };

        self.set_parent(xr, x_id)?;
        self.set_parent(xl, id)?;

        let new_y_height = 1 + self.height_of(xr)?.max(self.height_of(yr)?);
        let new_y_weight = self.weight_of(xr)? + self.weight_of(yr)?;
        *self.get_mut(x_id)? = Node::Branch {
            parent: id,
            left: xr,
            right: yr,
            height: new_y_height,
            weight: new_y_weight,
        };

        let new_x_height = 1 + self.height_of(xl)?.max(new_y_height);
        let new_x_weight = self.weight_of(xl)? + new_y_weight;
        *self.get_mut(id)? = Node::Branch {
            parent: y_parent,
            left: xl,
            right: x_id,
            height: new_x_height,
            weight: new_x_weight,
        };

        Ok(())
    }

    /// Restores the AVL balance property at `id` (assumed already balanced at
    /// every node below it), keeping `id` as the subtree's top slot.
    fn rebalance(&mut self, id: NodeId) -> Result<(), EngineError> {
        let (l, r) = match self.get(id)? {
            Node::Branch { left, right, .. } => (*left, *right),
            _ => return invariant("rebalance on a non-branch node"),
        };
        let hl = i16::from(self.height_of(l)?);
        let hr = i16::from(self.height_of(r)?);

        if hl - hr > 1 {
            let (ll, lr) = match self.get(l)? {
                Node::Branch { left, right, .. } => (*left, *right),
                _ => return invariant("rebalance: left-heavy child is a leaf"),
            };
            if i16::from(self.height_of(ll)?) < i16::from(self.height_of(lr)?) {
                self.rotate_left(l)?;
            }
            self.rotate_right(id)?;
        } else if hr - hl > 1 {
            let (rl, rr) = match self.get(r)? {
                Node::Branch { left, right, .. } => (*left, *right),
                _ => return invariant("rebalance: right-heavy child is a leaf"),
            };
            if i16::from(self.height_of(rr)?) < i16::from(self.height_of(rl)?) {
                self.rotate_right(r)?;
            }
            self.rotate_left(id)?;
        }
        Ok(())
    }

    // -- join / split -----------------------------------------------------------

    /// Glues two freestanding subtrees back into one, `left` entirely before
    /// `right` in insertion order, rebalancing as needed. Both arguments (and
    /// the result) are "freestanding": their top's `parent` field is not
    /// meaningful until the caller installs the result under a real parent.
    fn join(&mut self, left: Option<NodeId>, right: Option<NodeId>) -> Result<Option<NodeId>, EngineError> {
        let (l, r) = match (left, right) {
            (None, None) => return Ok(None),
            (Some(l), None) => return Ok(Some(l)),
            (None, Some(r)) => return Ok(Some(r)),
            (Some(l), Some(r)) => (l, r),
        };

        let hl = i16::from(self.height_of(l)?);
        let hr = i16::from(self.height_of(r)?);

        if (hl - hr).abs() <= 1 {
            return Ok(Some(self.make_branch(l, r)?));
        }

        if hl > hr {
            let (ll, lr) = match self.get(l)? {
                Node::Branch { left, right, .. } => (*left, *right),
                _ => return invariant("join: taller left side is not a branch"),
            };
            let new_right = self.join(Some(lr), Some(r))?.expect("non-empty operand");
            let rebuilt = self.make_branch(ll, new_right)?;
            self.rebalance(rebuilt)?;
            Ok(Some(rebuilt))
        } else {
            let (rl, rr) = match self.get(r)? {
                Node::Branch { left, right, .. } => (*left, *right),
                _ => return invariant("join: taller right side is not a branch"),
            };
            let new_left = self.join(Some(l), Some(rl))?.expect("non-empty operand");
            let rebuilt = self.make_branch(new_left, rr)?;
            self.rebalance(rebuilt)?;
            Ok(Some(rebuilt))
        }
    }

    /// Splits `node` into `(prefix, suffix)` such that `prefix`'s weight is
    /// the largest value `<= threshold` obtainable without cutting a leaf in
    /// half, and `suffix` holds everything after it, in order.
    fn split_by_weight(
        &mut self,
        node: NodeId,
        threshold: Mutez,
    ) -> Result<(Option<NodeId>, Option<NodeId>), EngineError> {
        match self.get(node)?.clone() {
            Node::Leaf { .. } => {
                if self.weight_of(node)? <= threshold {
                    Ok((Some(node), None))
                } else {
                    Ok((None, Some(node)))
                }
            }
            Node::Branch { left, right, .. } => {
                let lw = self.weight_of(left)?;
                if threshold < lw {
                    let (ll, lr) = self.split_by_weight(left, threshold)?;
                    let new_right = self.join(lr, Some(right))?;
                    Ok((ll, new_right))
                } else {
                    let (rl, rr) = self.split_by_weight(right, threshold - lw)?;
                    let new_left = self.join(Some(left), rl)?;
                    Ok((new_left, rr))
                }
            }
            Node::Root { .. } => invariant("split_by_weight called on a root node"),
        }
    }

    fn leftmost_leaf(&self, mut id: NodeId) -> Result<LeafId, EngineError> {
        loop {
            match self.get(id)? {
                Node::Leaf { .. } => return Ok(id),
                Node::Branch { left, .. } => id = *left,
                Node::Root { .. } => return invariant("leftmost_leaf walked into a root"),
            }
        }
    }

    fn rightmost_leaf(&self, mut id: NodeId) -> Result<LeafId, EngineError> {
        loop {
            match self.get(id)? {
                Node::Leaf { .. } => return Ok(id),
                Node::Branch { right, .. } => id = *right,
                Node::Root { .. } => return invariant("rightmost_leaf walked into a root"),
            }
        }
    }

    // -- public tree API --------------------------------------------------------

    /// Allocates a brand-new, empty tree and returns its id.
    pub fn new_tree(&mut self) -> TreeId {
        self.new_root()
    }

    pub fn is_empty(&self, tree: TreeId) -> Result<bool, EngineError> {
        match self.get(tree)? {
            Node::Root { child, .. } => Ok(child.is_none()),
            _ => invariant("is_empty called on a non-root id"),
        }
    }

    /// `true` if `tree` still names a live root node. Unlike every other
    /// tree accessor this never errors on a dangling id — it exists
    /// specifically so callers holding a stale [`TreeId`] (e.g. a bid handle
    /// for a lot that has since been fully reclaimed and deallocated) can
    /// check liveness before deciding whether to treat that as ordinary
    /// "no longer exists" rather than data corruption.
    #[must_use]
    pub fn tree_exists(&self, tree: TreeId) -> bool {
        matches!(self.get(tree), Ok(Node::Root { .. }))
    }

    /// AVL height of `tree`'s contents (0 for an empty tree). Used to enforce
    /// [`crate::config::EngineConfig::max_queue_height`] (invariant I5).
    pub fn height(&self, tree: TreeId) -> Result<u8, EngineError> {
        match self.get(tree)? {
            Node::Root { child: Some(c), .. } => self.height_of(*c),
            Node::Root { child: None, .. } => Ok(0),
            _ => invariant("height called on a non-root id"),
        }
    }

    pub fn weight(&self, tree: TreeId) -> Result<Mutez, EngineError> {
        match self.get(tree)? {
            Node::Root { child: Some(c), .. } => self.weight_of(*c),
            Node::Root { child: None, .. } => Ok(0),
            _ => invariant("weight called on a non-root id"),
        }
    }

    pub fn root_data(&self, tree: TreeId) -> Result<Option<AuctionOutcome>, EngineError> {
        match self.get(tree)? {
            Node::Root { data, .. } => Ok(data.clone()),
            _ => invariant("root_data called on a non-root id"),
        }
    }

    pub fn set_root_data(&mut self, tree: TreeId, data: Option<AuctionOutcome>) -> Result<(), EngineError> {
        match self.get_mut(tree)? {
            Node::Root { data: slot, .. } => {
                *slot = data;
                Ok(())
            }
            _ => invariant("set_root_data called on a non-root id"),
        }
    }

    pub fn modify_root_data(
        &mut self,
        tree: TreeId,
        f: impl FnOnce(Option<AuctionOutcome>) -> Option<AuctionOutcome>,
    ) -> Result<(), EngineError> {
        let current = self.root_data(tree)?;
        self.set_root_data(tree, f(current))
    }

    /// Deallocates an empty tree's root node. The tree must have no children
    /// and no root data (callers are expected to have drained a completed
    /// lot, via [`crate::auctions::pop_completed_auction`], before this).
    pub fn delete_empty_tree(&mut self, tree: TreeId) -> Result<(), EngineError> {
        match self.get(tree)? {
            Node::Root { child: None, data: None } => {}
            Node::Root { .. } => return invariant("delete_empty_tree: tree is not empty"),
            _ => return invariant("delete_empty_tree called on a non-root id"),
        }
        self.free(tree)
    }

    pub fn push(&mut self, tree: TreeId, value: Slice, side: Side) -> Result<LeafId, EngineError> {
        let leaf_id = self.alloc(Node::Leaf { parent: tree, value });
        let root_child = match self.get(tree)? {
            Node::Root { child, .. } => *child,
            _ => return invariant("push called on a non-root id"),
        };
        let new_child = match side {
            Side::Left => self.join(Some(leaf_id), root_child)?,
            Side::Right => self.join(root_child, Some(leaf_id))?,
        };
        self.attach_root_child(tree, new_child)?;
        Ok(leaf_id)
    }

    pub fn peek_front(&self, tree: TreeId) -> Result<Option<(LeafId, Slice)>, EngineError> {
        let root_child = match self.get(tree)? {
            Node::Root { child, .. } => *child,
            _ => return invariant("peek_front called on a non-root id"),
        };
        let Some(c) = root_child else { return Ok(None) };
        let leaf = self.leftmost_leaf(c)?;
        match self.get(leaf)? {
            Node::Leaf { value, .. } => Ok(Some((leaf, value.clone()))),
            _ => invariant("peek_front: leftmost node is not a leaf"),
        }
    }

    pub fn peek_back(&self, tree: TreeId) -> Result<Option<(LeafId, Slice)>, EngineError> {
        let root_child = match self.get(tree)? {
            Node::Root { child, .. } => *child,
            _ => return invariant("peek_back called on a non-root id"),
        };
        let Some(c) = root_child else { return Ok(None) };
        let leaf = self.rightmost_leaf(c)?;
        match self.get(leaf)? {
            Node::Leaf { value, .. } => Ok(Some((leaf, value.clone()))),
            _ => invariant("peek_back: rightmost node is not a leaf"),
        }
    }

    pub fn pop_front(&mut self, tree: TreeId) -> Result<Option<(LeafId, Slice)>, EngineError> {
        let Some((leaf_id, value)) = self.peek_front(tree)? else {
            return Ok(None);
        };
        self.del(leaf_id)?;
        Ok(Some((leaf_id, value)))
    }

    pub fn pop_back(&mut self, tree: TreeId) -> Result<Option<(LeafId, Slice)>, EngineError> {
        let Some((leaf_id, value)) = self.peek_back(tree)? else {
            return Ok(None);
        };
        self.del(leaf_id)?;
        Ok(Some((leaf_id, value)))
    }

    /// Removes `leaf` from whichever tree currently contains it, rebalancing
    /// on the way back to the root, and returns that tree's id.
    pub fn del(&mut self, leaf: LeafId) -> Result<TreeId, EngineError> {
        let parent = match self.get(leaf)? {
            Node::Leaf { parent, .. } => *parent,
            _ => return invariant("del called on a non-leaf id"),
        };
        self.free(leaf)?;
        self.splice_out(leaf, parent)
    }

    fn splice_out(&mut self, removed: NodeId, parent: NodeId) -> Result<TreeId, EngineError> {
        match self.get(parent)?.clone() {
            Node::Root { .. } => {
                self.attach_root_child(parent, None)?;
                Ok(parent)
            }
            Node::Branch {
                parent: grandparent,
                left,
                right,
                ..
            } => {
                let sibling = if left == removed { right } else { left };
                self.free(parent)?;
                self.set_parent(sibling, grandparent)?;
                match self.get(grandparent)?.clone() {
                    Node::Root { .. } => {
                        self.attach_root_child(grandparent, Some(sibling))?;
                        Ok(grandparent)
                    }
                    Node::Branch { .. } => {
                        self.replace_child(grandparent, parent, sibling)?;
                        self.rebalance_upward(grandparent)
                    }
                    Node::Leaf { .. } => invariant("splice_out: grandparent is a leaf"),
                }
            }
            Node::Leaf { .. } => invariant("splice_out: parent is a leaf"),
        }
    }

    fn rebalance_upward(&mut self, mut id: NodeId) -> Result<TreeId, EngineError> {
        loop {
            self.recompute(id)?;
            self.rebalance(id)?;
            let parent = match self.get(id)? {
                Node::Branch { parent, .. } => *parent,
                _ => return invariant("rebalance_upward: lost track of a branch"),
            };
            match self.get(parent)? {
                Node::Root { .. } => return Ok(parent),
                Node::Branch { .. } => id = parent,
                Node::Leaf { .. } => return invariant("rebalance_upward: parent is a leaf"),
            }
        }
    }

    /// Returns the id of the tree that `leaf` currently belongs to, by
    /// walking parent pointers up to the owning root.
    pub fn find_root(&self, leaf: LeafId) -> Result<TreeId, EngineError> {
        let mut id = match self.get(leaf)? {
            Node::Leaf { parent, .. } => *parent,
            _ => return invariant("find_root called on a non-leaf id"),
        };
        loop {
            match self.get(id)? {
                Node::Root { .. } => return Ok(id),
                Node::Branch { parent, .. } => id = *parent,
                Node::Leaf { .. } => return invariant("find_root walked into a leaf"),
            }
        }
    }

    /// Mutates a leaf's value in place. `f` must not change the leaf's `tez`
    /// (cached ancestor weights are not recomputed by this call) — it exists
    /// solely for the `older`/`younger` pointer fixups the slice index needs.
    pub fn update_leaf(&mut self, leaf: LeafId, f: impl FnOnce(&mut Slice)) -> Result<(), EngineError> {
        match self.get_mut(leaf)? {
            Node::Leaf { value, .. } => {
                f(value);
                Ok(())
            }
            _ => invariant("update_leaf called on a non-leaf id"),
        }
    }

    pub fn read_leaf(&self, leaf: LeafId) -> Result<Slice, EngineError> {
        match self.get(leaf)? {
            Node::Leaf { value, .. } => Ok(value.clone()),
            _ => invariant("read_leaf called on a non-leaf id"),
        }
    }

    /// Splits off the largest-possible prefix (by weight) of `tree` that is
    /// `<= threshold`, as a brand-new tree; `tree` retains the suffix.
    pub fn take(&mut self, tree: TreeId, threshold: Mutez) -> Result<TreeId, EngineError> {
        let root_child = match self.get(tree)? {
            Node::Root { child, .. } => *child,
            _ => return invariant("take called on a non-root id"),
        };
        let (prefix, suffix) = match root_child {
            None => (None, None),
            Some(c) => self.split_by_weight(c, threshold)?,
        };
        self.attach_root_child(tree, suffix)?;
        let new_tree = self.new_tree();
        self.attach_root_child(new_tree, prefix)?;
        Ok(new_tree)
    }
}
