//! Component D: the top-level state machine tying the queue, the current
//! lot, and the completed-lots list together, plus the per-burrow slice
//! index (component C) operations that only make sense with access to all
//! three.

pub mod bidding;
pub mod outcome;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::arena::{Arena, LeafId, TreeId};
use crate::avl::Side;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::slice::{split_slice_contents, BurrowSlicesHead, Slice, SliceContents};
use crate::types::{Address, BlockHeight, Kit, Mutez, Ratio, Timestamp};

pub use bidding::{AuctionState, BidHandle, CurrentAuction};
pub use outcome::{AuctionOutcome, Bid};

/// Doubly-linked-list head over every tree that has completed but still has
/// at least one undrained slice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedAuctionsHead {
    pub youngest: TreeId,
    pub oldest: TreeId,
}

/// The result of draining a single slice out of a completed lot: what the
/// burrow gets back (`repay`) and what is burned as a liquidation penalty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceSettlement {
    pub contents: SliceContents,
    pub repay: Kit,
    pub burn: Kit,
}

/// The full state of the liquidation auction engine: one arena backing three
/// overlaid indexes (the FIFO queue, the per-burrow chains, and the
/// completed-lots list), plus whatever lot is currently up for auction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LiquidationAuctions {
    pub(crate) arena: Arena,
    pub queued: TreeId,
    pub current: Option<CurrentAuction>,
    pub completed: Option<CompletedAuctionsHead>,
    pub(crate) burrow_slices: BTreeMap<Address, BurrowSlicesHead>,
    /// Tombstones for trees whose winning bid has already been reclaimed via
    /// [`Self::reclaim_winning_bid`] and whose root has since been freed by
    /// `delete_empty_tree`. `arena.tree_exists` alone cannot answer "did this
    /// bid ever win" once the id is gone — the allocator's free list can hand
    /// that same `TreeId` to an unrelated later lot — so winning-ness is
    /// recorded here independently of root-node liveness.
    pub(crate) reclaimed_winners: BTreeMap<TreeId, Bid>,
}

impl Default for LiquidationAuctions {
    fn default() -> Self {
        Self::new()
    }
}

impl LiquidationAuctions {
    #[must_use]
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let queued = arena.new_tree();
        Self {
            arena,
            queued,
            current: None,
            completed: None,
            burrow_slices: BTreeMap::new(),
            reclaimed_winners: BTreeMap::new(),
        }
    }

    /// Diagnostic only: total live arena nodes across all trees.
    #[must_use]
    pub fn live_node_count(&self) -> usize {
        self.arena.live_node_count()
    }

    /// Total tez held by `tree` (the queue, the current lot, or any
    /// completed lot by its id). Exposed for diagnostics/reporting; the
    /// engine itself never needs to ask this from the outside.
    pub fn tree_weight(&self, tree: TreeId) -> Result<Mutez, EngineError> {
        self.arena.weight(tree)
    }

    /// The oldest not-yet-drained slice of `tree` (the queue, the current
    /// lot, or a completed lot), if any. Diagnostics only.
    pub fn peek_front(&self, tree: TreeId) -> Result<Option<(LeafId, Slice)>, EngineError> {
        self.arena.peek_front(tree)
    }

    /// The oldest slice of `burrow`'s chain, if it currently has any slice
    /// anywhere (queued, in the current lot, or awaiting drain). Diagnostics
    /// only; the engine itself always walks chains starting from a leaf it
    /// already holds.
    #[must_use]
    pub fn burrow_oldest_slice(&self, burrow: &Address) -> Option<LeafId> {
        self.burrow_slices.get(burrow).map(|h| h.oldest)
    }

    /// Reads a leaf's value without mutating anything. Diagnostics only.
    pub fn read_slice(&self, leaf: LeafId) -> Result<Slice, EngineError> {
        self.arena.read_leaf(leaf)
    }

    // -- component C: slice queue / per-burrow chain -------------------------

    /// Enqueues a freshly-cut slice of collateral for liquidation. Appended
    /// to the back of both the FIFO queue and the burrow's chain (the
    /// burrow's existing youngest slice, if any, becomes this slice's
    /// `older`).
    pub fn send_to_auction(&mut self, cfg: &EngineConfig, contents: SliceContents) -> Result<LeafId, EngineError> {
        if u32::from(self.arena.height(self.queued)?) >= u32::from(cfg.max_queue_height) {
            return Err(EngineError::QueueTooLong);
        }

        let burrow = contents.burrow.clone();
        let existing_youngest = self.burrow_slices.get(&burrow).map(|h| h.youngest);

        let slice = Slice {
            contents,
            older: existing_youngest,
            younger: None,
        };
        let leaf_id = self.arena.push(self.queued, slice, Side::Right)?;

        if let Some(prev_youngest) = existing_youngest {
            self.arena.update_leaf(prev_youngest, |s| s.younger = Some(leaf_id))?;
            self.burrow_slices
                .get_mut(&burrow)
                .ok_or_else(|| EngineError::InvariantViolation("burrow head vanished mid-insert".into()))?
                .youngest = leaf_id;
        } else {
            self.burrow_slices.insert(
                burrow,
                BurrowSlicesHead {
                    oldest: leaf_id,
                    youngest: leaf_id,
                },
            );
        }

        Ok(leaf_id)
    }

    /// Withdraws a slice that has not yet been pulled into a lot. Only valid
    /// while the slice is still sitting in `queued`; a slice already in the
    /// current or a completed lot cannot be cancelled.
    pub fn cancel_slice(&mut self, leaf: LeafId) -> Result<SliceContents, EngineError> {
        let (contents, root) = self.pop_slice_internal(leaf)?;
        if root != self.queued {
            return Err(EngineError::UnwarrantedCancellation);
        }
        Ok(contents)
    }

    /// Unlinks `leaf` from the per-burrow chain and removes it from whichever
    /// tree currently holds it, returning its contents and that tree's id.
    /// Shared by [`Self::cancel_slice`] and [`Self::pop_completed_slice`].
    fn pop_slice_internal(&mut self, leaf: LeafId) -> Result<(SliceContents, TreeId), EngineError> {
        let slice = self.arena.read_leaf(leaf)?;
        let burrow = slice.contents.burrow.clone();

        if let Some(older) = slice.older {
            self.arena.update_leaf(older, |s| s.younger = slice.younger)?;
        }
        if let Some(younger) = slice.younger {
            self.arena.update_leaf(younger, |s| s.older = slice.older)?;
        }

        match (slice.older, slice.younger) {
            (Some(_), Some(_)) => {}
            (None, Some(y)) => {
                if let Some(head) = self.burrow_slices.get_mut(&burrow) {
                    head.oldest = y;
                }
            }
            (Some(o), None) => {
                if let Some(head) = self.burrow_slices.get_mut(&burrow) {
                    head.youngest = o;
                }
            }
            (None, None) => {
                self.burrow_slices.remove(&burrow);
            }
        }

        let root = self.arena.del(leaf)?;
        Ok((slice.contents, root))
    }

    /// Fails with [`EngineError::BurrowHasCompletedLiquidation`] if any slice
    /// belonging to `burrow` is sitting in a completed lot awaiting drain —
    /// the guard every burrow-mutating entrypoint runs first.
    pub fn ensure_no_unclaimed_slices(&self, burrow: &Address) -> Result<(), EngineError> {
        let Some(head) = self.burrow_slices.get(burrow) else {
            return Ok(());
        };
        let mut cursor = Some(head.oldest);
        while let Some(leaf) = cursor {
            let slice = self.arena.read_leaf(leaf)?;
            let root = self.arena.find_root(leaf)?;
            let in_queue = root == self.queued;
            let in_current = self.current.as_ref().is_some_and(|c| c.tree == root);
            if !in_queue && !in_current {
                return Err(EngineError::BurrowHasCompletedLiquidation(burrow.clone()));
            }
            cursor = slice.younger;
        }
        Ok(())
    }

    // -- component D: lot formation -------------------------------------------

    /// Completes the current lot if its auction window has elapsed, then
    /// starts a new one if the queue holds enough to form one. Returns the
    /// outcome of whichever lot just completed, if any.
    #[tracing::instrument(skip(self, cfg), fields(now = now.0, block_height = block_height.0))]
    pub fn touch(
        &mut self,
        cfg: &EngineConfig,
        now: Timestamp,
        block_height: BlockHeight,
        start_price: Ratio,
    ) -> Result<Option<AuctionOutcome>, EngineError> {
        let completed = self.complete_if_possible(cfg, now, block_height)?;
        self.start_if_possible(cfg, now, start_price)?;
        Ok(completed)
    }

    #[tracing::instrument(skip(self, cfg), fields(now = now.0, block_height = block_height.0))]
    pub fn complete_if_possible(
        &mut self,
        cfg: &EngineConfig,
        now: Timestamp,
        block_height: BlockHeight,
    ) -> Result<Option<AuctionOutcome>, EngineError> {
        let Some(current) = self.current.clone() else {
            return Ok(None);
        };
        if !current.is_complete(now, block_height, cfg.bid_interval_sec, cfg.bid_interval_blocks) {
            return Ok(None);
        }

        let bid = current
            .winning_bid()
            .cloned()
            .ok_or_else(|| EngineError::InvariantViolation("auction reported complete with no bid".into()))?;
        let sold_tez = self.arena.weight(current.tree)?;

        let outcome = AuctionOutcome {
            winning_bid: bid.clone(),
            sold_tez,
            kit_remaining: bid.kit,
            tez_remaining: sold_tez,
            younger_auction: None,
            older_auction: self.completed.map(|h| h.youngest),
        };

        if self.arena.root_data(current.tree)?.is_some() {
            return Err(EngineError::InvariantViolation(
                "current lot already carries root data".into(),
            ));
        }
        self.arena.set_root_data(current.tree, Some(outcome.clone()))?;

        self.completed = Some(match self.completed {
            Some(prev) => {
                self.arena.modify_root_data(prev.youngest, |data| {
                    let mut data = data.expect("previous youngest completed tree has no outcome");
                    data.younger_auction = Some(current.tree);
                    Some(data)
                })?;
                CompletedAuctionsHead {
                    youngest: current.tree,
                    oldest: prev.oldest,
                }
            }
            None => CompletedAuctionsHead {
                youngest: current.tree,
                oldest: current.tree,
            },
        });

        self.current = None;
        Ok(Some(outcome))
    }

    #[tracing::instrument(skip(self, cfg), fields(now = now.0))]
    pub fn start_if_possible(&mut self, cfg: &EngineConfig, now: Timestamp, start_price: Ratio) -> Result<(), EngineError> {
        if self.current.is_some() {
            return Ok(());
        }

        let queued_weight = self.arena.weight(self.queued)?;
        let fraction_floor = ((u128::from(queued_weight) * u128::from(cfg.min_lot_queue_fraction.num))
            / u128::from(cfg.min_lot_queue_fraction.den)) as u64;
        // A lot is as large as the configured cap allows, but never smaller
        // than the configured fraction of whatever is currently queued — so
        // a thin queue still forms a lot instead of waiting indefinitely for
        // `max_lot_size` to accumulate.
        let split_threshold = cfg.max_lot_size.max(fraction_floor);

        let new_tree = self.take_with_splitting(split_threshold)?;
        if self.arena.is_empty(new_tree)? {
            self.arena.delete_empty_tree(new_tree)?;
            return Ok(());
        }

        let weight = self.arena.weight(new_tree)?;
        let numerator = u128::from(weight) * u128::from(start_price.num);
        let denominator = u128::from(crate::types::KIT_SCALING_FACTOR) * u128::from(start_price.den);
        let start_value = Kit(numerator.div_ceil(denominator) as u64);

        self.current = Some(CurrentAuction {
            tree: new_tree,
            state: AuctionState::Descending {
                start_value,
                start_time: now,
            },
        });
        Ok(())
    }

    /// Takes a weight-bounded prefix of `queued`, splitting the boundary
    /// slice in two (see [`Self::split_liquidation_slice`]) when the prefix
    /// would otherwise fall short of `threshold` by less than a whole slice.
    fn take_with_splitting(&mut self, threshold: Mutez) -> Result<TreeId, EngineError> {
        let new_tree = self.arena.take(self.queued, threshold)?;
        let got = self.arena.weight(new_tree)?;

        if got < threshold {
            if let Some((leaf, slice)) = self.arena.peek_front(self.queued)? {
                let needed = threshold - got;
                if needed >= slice.tez() {
                    return Err(EngineError::InvariantViolation(
                        "take left a whole slice behind that should have fit".into(),
                    ));
                }
                self.arena.del(leaf)?;
                self.split_liquidation_slice(leaf, &slice, needed, new_tree)?;
            }
        }

        Ok(new_tree)
    }

    /// Cuts `original` (already removed from the arena at `original_leaf`,
    /// but not yet unlinked from the burrow chain) into two leaves: `part1`
    /// (`needed` tez) appended to the back of `new_tree`, and `part2` (the
    /// remainder) pushed back onto the front of `queued`.
    ///
    /// `part1` takes over `original`'s position on the `older` side of the
    /// burrow chain (the neighbor that used to call `original` its
    /// `younger` now points at `part1`); `part2` takes over the `younger`
    /// side symmetrically. This is the resolved choice for the
    /// chosen resolution for the split pointer-fixup: it keeps the chain's
    /// age ordering intact no matter which side of the cut a given neighbor
    /// sits on.
    fn split_liquidation_slice(
        &mut self,
        original_leaf: LeafId,
        original: &Slice,
        needed: Mutez,
        new_tree: TreeId,
    ) -> Result<(), EngineError> {
        let (part1_contents, part2_contents) = split_slice_contents(needed, &original.contents);
        let burrow = original.contents.burrow.clone();

        let part2_id = self.arena.push(
            self.queued,
            Slice {
                contents: part2_contents,
                older: None,
                younger: original.younger,
            },
            Side::Left,
        )?;
        let part1_id = self.arena.push(
            new_tree,
            Slice {
                contents: part1_contents,
                older: original.older,
                younger: Some(part2_id),
            },
            Side::Right,
        )?;
        self.arena.update_leaf(part2_id, |s| s.older = Some(part1_id))?;

        if let Some(o) = original.older {
            self.arena.update_leaf(o, |s| s.younger = Some(part1_id))?;
        }
        if let Some(y) = original.younger {
            self.arena.update_leaf(y, |s| s.older = Some(part2_id))?;
        }

        let head = self
            .burrow_slices
            .get_mut(&burrow)
            .ok_or_else(|| EngineError::InvariantViolation("split of a slice with no burrow head".into()))?;
        if head.oldest == original_leaf {
            head.oldest = part1_id;
        }
        if head.youngest == original_leaf {
            head.youngest = part2_id;
        }

        Ok(())
    }

    // -- component E: bidding --------------------------------------------------

    #[tracing::instrument(skip(self, cfg, bidder), fields(now = now.0, block_height = block_height.0, bidder = %bidder, kit = %kit))]
    pub fn place_bid(
        &mut self,
        cfg: &EngineConfig,
        now: Timestamp,
        block_height: BlockHeight,
        bidder: Address,
        kit: Kit,
    ) -> Result<BidHandle, EngineError> {
        let current = self.current.as_mut().ok_or(EngineError::NoOpenAuction)?;
        let min_bid = current.current_min_bid(now, cfg.auction_decay_rate, cfg.bid_improvement_factor);
        if kit < min_bid {
            return Err(EngineError::BidTooLow);
        }

        let bid = Bid { address: bidder, kit };
        current.state = AuctionState::Ascending {
            leading: bid.clone(),
            bid_time: now,
            bid_block: block_height,
        };
        Ok(BidHandle {
            auction_id: current.tree,
            bid,
        })
    }

    #[must_use]
    pub fn is_leading(&self, handle: &BidHandle) -> bool {
        self.current.as_ref().is_some_and(|c| c.is_leading(handle))
    }

    /// Refunds a bid that never became, or is no longer, the leading bid.
    /// Checks [`Self::reclaimed_winners`] before consulting the tree at all:
    /// once a tree's winner has reclaimed their tez the root may already be
    /// freed and its id reused by an unrelated later lot, so "the tree no
    /// longer exists" is never treated as proof this bid never won.
    pub fn reclaim_losing_bid(&self, handle: &BidHandle) -> Result<Kit, EngineError> {
        if let Some(current) = &self.current {
            if current.is_leading(handle) {
                return Err(EngineError::CannotReclaimLeadingBid);
            }
        }
        if self.reclaimed_winners.get(&handle.auction_id) == Some(&handle.bid) {
            return Err(EngineError::CannotReclaimWinningBid);
        }
        if self.arena.tree_exists(handle.auction_id) {
            if let Some(outcome) = self.arena.root_data(handle.auction_id)? {
                if outcome.winning_bid == handle.bid {
                    return Err(EngineError::CannotReclaimWinningBid);
                }
            }
        }
        Ok(handle.bid.kit)
    }

    /// Releases the tez a winning bid purchased, once every slice of the lot
    /// has been drained via [`Self::pop_completed_slice`]. Deallocates the
    /// (by now empty) tree and records the win in [`Self::reclaimed_winners`]
    /// so a later [`Self::reclaim_losing_bid`] call against the same handle
    /// still recognizes it as already settled instead of refunding it again.
    pub fn reclaim_winning_bid(&mut self, handle: &BidHandle) -> Result<Mutez, EngineError> {
        if !self.arena.tree_exists(handle.auction_id) {
            return Err(EngineError::NotAWinningBid);
        }
        let outcome = self
            .arena
            .root_data(handle.auction_id)?
            .ok_or(EngineError::NotAWinningBid)?;
        if outcome.winning_bid != handle.bid {
            return Err(EngineError::NotAWinningBid);
        }
        if !self.arena.is_empty(handle.auction_id)? {
            return Err(EngineError::NotAllSlicesClaimed);
        }
        self.reclaimed_winners.insert(handle.auction_id, handle.bid.clone());
        self.arena.set_root_data(handle.auction_id, None)?;
        self.arena.delete_empty_tree(handle.auction_id)?;
        Ok(outcome.sold_tez)
    }

    // -- completed-lot drain ----------------------------------------------------

    /// Settles and removes a single slice from a completed lot, computing
    /// the burrow's repay/burn split and debiting the lot's running
    /// remainder so the final slice absorbs whatever rounding residual is
    /// left (this is what guarantees `sum(repay) + sum(burn) ==
    /// winning_bid.kit` exactly).
    #[tracing::instrument(skip(self, cfg))]
    pub fn pop_completed_slice(&mut self, cfg: &EngineConfig, leaf: LeafId) -> Result<SliceSettlement, EngineError> {
        let root = self.arena.find_root(leaf)?;
        if root == self.queued || self.current.as_ref().is_some_and(|c| c.tree == root) {
            return Err(EngineError::NotACompletedSlice);
        }
        let mut outcome = self
            .arena
            .root_data(root)?
            .ok_or(EngineError::NotACompletedSlice)?;

        let slice = self.arena.read_leaf(leaf)?;
        let (repay, burn) = settle_slice(cfg, &mut outcome, &slice.contents);

        let (contents, popped_root) = self.pop_slice_internal(leaf)?;
        if popped_root != root {
            return Err(EngineError::InvariantViolation("slice resolved to a different tree mid-drain".into()));
        }

        self.arena.set_root_data(root, Some(outcome))?;
        if self.arena.is_empty(root)? {
            self.pop_completed_auction(root)?;
        }

        Ok(SliceSettlement { contents, repay, burn })
    }

    /// Drains up to `leaves.len()` slices (capped at
    /// [`EngineConfig::number_of_slices_to_process`]); excess entries are
    /// left untouched for a later call.
    pub fn touch_slices(&mut self, cfg: &EngineConfig, leaves: &[LeafId]) -> Result<Vec<SliceSettlement>, EngineError> {
        let cap = leaves.len().min(cfg.number_of_slices_to_process);
        leaves[..cap].iter().map(|&leaf| self.pop_completed_slice(cfg, leaf)).collect()
    }

    /// Drains up to `cfg.number_of_slices_to_process` slices starting from
    /// the oldest undrained slice of the oldest completed lot, walking
    /// forward across lots as each empties. Draining from `completed.oldest`
    /// preserves true FIFO draining regardless of which side new lots were
    /// appended on.
    pub fn touch_oldest(&mut self, cfg: &EngineConfig, max: usize) -> Result<Vec<SliceSettlement>, EngineError> {
        let n = max.min(cfg.number_of_slices_to_process);
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let Some(oldest_tree) = self.completed.map(|h| h.oldest) else {
                break;
            };
            let Some((leaf, _)) = self.arena.peek_front(oldest_tree)? else {
                break;
            };
            out.push(self.pop_completed_slice(cfg, leaf)?);
        }
        Ok(out)
    }

    /// Unlinks a now-empty tree from the completed-lots list. The tree
    /// itself is left allocated (still carrying its outcome, with its list
    /// pointers nulled) until the winner calls [`Self::reclaim_winning_bid`].
    fn pop_completed_auction(&mut self, tree: TreeId) -> Result<(), EngineError> {
        let outcome = self
            .arena
            .root_data(tree)?
            .ok_or_else(|| EngineError::InvariantViolation("pop_completed_auction: tree has no outcome".into()))?;
        let mut head = self
            .completed
            .ok_or_else(|| EngineError::InvariantViolation("pop_completed_auction: completed list is empty".into()))?;

        if let Some(y) = outcome.younger_auction {
            self.arena.modify_root_data(y, |data| {
                let mut data = data.expect("younger neighbor in completed list has no outcome");
                data.older_auction = outcome.older_auction;
                Some(data)
            })?;
        }
        if let Some(o) = outcome.older_auction {
            self.arena.modify_root_data(o, |data| {
                let mut data = data.expect("older neighbor in completed list has no outcome");
                data.younger_auction = outcome.younger_auction;
                Some(data)
            })?;
        }

        match (outcome.older_auction, outcome.younger_auction) {
            (None, None) => self.completed = None,
            (None, Some(y)) => {
                head.oldest = y;
                self.completed = Some(head);
            }
            (Some(o), None) => {
                head.youngest = o;
                self.completed = Some(head);
            }
            (Some(_), Some(_)) => self.completed = Some(head),
        }

        self.arena.modify_root_data(tree, |data| {
            let mut data = data.expect("tree being unlinked has no outcome");
            data.younger_auction = None;
            data.older_auction = None;
            Some(data)
        })
    }
}

/// Computes one slice's repay/burn split against a lot's running remainder,
/// debiting `outcome` in place. When `tez_remaining` exactly equals this
/// slice's tez (it is the last undrained slice of the lot) the whole
/// `kit_remaining` is assigned to it rather than the floored proportional
/// share, which is what makes the aggregate exact.
fn settle_slice(cfg: &EngineConfig, outcome: &mut AuctionOutcome, slice: &SliceContents) -> (Kit, Kit) {
    let corresponding_kit = if outcome.tez_remaining == slice.tez {
        outcome.kit_remaining
    } else {
        Kit(((u128::from(outcome.winning_bid.kit.0) * u128::from(slice.tez)) / u128::from(outcome.sold_tez)) as u64)
    };

    let penalty = if corresponding_kit < slice.min_kit_for_unwarranted {
        corresponding_kit.scale_ceil(cfg.liquidation_penalty.num.into(), cfg.liquidation_penalty.den.into())
    } else {
        Kit::ZERO
    };

    outcome.kit_remaining = outcome.kit_remaining - corresponding_kit;
    outcome.tez_remaining -= slice.tez;

    (corresponding_kit - penalty, penalty)
}
