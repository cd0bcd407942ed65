//! Slice contents and the per-burrow doubly-linked overlay (component C).

use serde::{Deserialize, Serialize};

use crate::arena::LeafId;
use crate::types::{Address, Kit, Mutez};

/// The payload a burrow hands the auction engine when a piece of its
/// collateral is chopped off for sale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceContents {
    pub burrow: Address,
    pub tez: Mutez,
    pub min_kit_for_unwarranted: Kit,
}

/// The value stored at every leaf of every tree in the arena.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slice {
    pub contents: SliceContents,
    pub older: Option<LeafId>,
    pub younger: Option<LeafId>,
}

impl Slice {
    #[must_use]
    pub const fn tez(&self) -> Mutez {
        self.contents.tez
    }
}

/// Head of a burrow's doubly-linked slice chain. Present iff that burrow
/// currently has at least one slice somewhere in the arena (queued, in the
/// current lot, or awaiting drain in a completed lot).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurrowSlicesHead {
    pub oldest: LeafId,
    pub youngest: LeafId,
}

/// Splits `slice` into `(part1, part2)` with `part1.tez == amount` and
/// `part2.tez == slice.tez - amount`. `0 < amount < slice.tez` is required;
/// callers must check this before calling (split is never asked to produce
/// an empty or a no-op half).
///
/// `min_kit_for_unwarranted` is apportioned by tez share and rounded *up* on
/// both halves (invariant I7): the sum of the two halves' minimums is never
/// less than the original, so splitting can only make a liquidation look
/// *more* warranted in aggregate, never less.
///
/// `older`/`younger` are copied verbatim from the original onto both halves;
/// the caller (see [`crate::auctions::split_liquidation_slice`]) is
/// responsible for re-linking `part1`/`part2` to each other and fixing up
/// the neighbors' pointers, because that requires arena access this free
/// function does not have.
#[must_use]
pub fn split_slice_contents(amount: Mutez, slice: &SliceContents) -> (SliceContents, SliceContents) {
    assert!(amount > 0 && amount < slice.tez, "split amount out of range");

    let ltez = amount;
    let rtez = slice.tez - amount;

    let lkit = slice
        .min_kit_for_unwarranted
        .scale_ceil(u128::from(ltez), u128::from(slice.tez));
    let rkit = slice
        .min_kit_for_unwarranted
        .scale_ceil(u128::from(rtez), u128::from(slice.tez));

    (
        SliceContents {
            burrow: slice.burrow.clone(),
            tez: ltez,
            min_kit_for_unwarranted: lkit,
        },
        SliceContents {
            burrow: slice.burrow.clone(),
            tez: rtez,
            min_kit_for_unwarranted: rkit,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_rounds_up_and_conserves_tez() {
        let original = SliceContents {
            burrow: Address::from("b1"),
            tez: 10,
            min_kit_for_unwarranted: Kit(100),
        };
        let (l, r) = split_slice_contents(3, &original);
        assert_eq!(l.tez + r.tez, original.tez);
        // ceil(100*3/10)=30, ceil(100*7/10)=70 -> sums exactly here, but the
        // invariant only requires >=, not ==.
        assert!(l.min_kit_for_unwarranted.0 + r.min_kit_for_unwarranted.0 >= original.min_kit_for_unwarranted.0);
    }

    #[test]
    fn split_rounding_can_only_increase_total_minimum() {
        let original = SliceContents {
            burrow: Address::from("b1"),
            tez: 3,
            min_kit_for_unwarranted: Kit(10),
        };
        let (l, r) = split_slice_contents(1, &original);
        assert_eq!(l.tez, 1);
        assert_eq!(r.tez, 2);
        // ceil(10*1/3)=4, ceil(10*2/3)=7, sum=11 > 10
        assert_eq!(l.min_kit_for_unwarranted, Kit(4));
        assert_eq!(r.min_kit_for_unwarranted, Kit(7));
    }
}
