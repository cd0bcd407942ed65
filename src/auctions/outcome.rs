//! Root-data attached to a completed lot, and the bid it sold for.

use serde::{Deserialize, Serialize};

use crate::arena::TreeId;
use crate::types::{Address, Kit, Mutez};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub address: Address,
    pub kit: Kit,
}

/// Attached to the root of a tree once its lot's auction has completed.
/// `younger_auction`/`older_auction` thread every completed tree into one
/// doubly-linked list, newest-first from [`crate::auctions::LiquidationAuctions::completed`].
///
/// `kit_remaining`/`tez_remaining` let draining slices one at a time still
/// guarantee `sum(repay) + sum(burn) == winning_bid.kit` exactly (the
/// aggregated rounding residual lands on whichever slice empties the lot)
/// without a second pass over the lot. Both start equal to
/// `winning_bid.kit`/`sold_tez` and are debited as each slice is settled;
/// see [`crate::auctions::LiquidationAuctions::pop_completed_slice`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionOutcome {
    pub winning_bid: Bid,
    pub sold_tez: Mutez,
    pub kit_remaining: Kit,
    pub tez_remaining: Mutez,
    pub younger_auction: Option<TreeId>,
    pub older_auction: Option<TreeId>,
}
