//! Message bus in front of [`LiquidationAuctions`]: per-entrypoint
//! authorization and payability checks, `tracing` spans, and translation of
//! the engine's pure return values into the effects the host must still
//! carry out (moving tez, burning or transferring kit, crediting a burrow).
//!
//! Grounded on the sequencer's `App`/`app::error` layering: a thin message
//! handler wraps the pure core the same way `app::insert_identity` wraps
//! `IdentityManager`, translating domain errors into a caller-facing
//! [`DispatchError`] and leaving the actual side effects (there: a tree
//! insertion job; here: fund movement) to be carried out by the caller.

use serde::{Deserialize, Serialize};

use crate::auctions::{BidHandle, LiquidationAuctions, SliceSettlement};
use crate::config::EngineConfig;
use crate::error::{abort_on_invariant_violation, DispatchError, EngineError};
use crate::slice::SliceContents;
use crate::types::{Address, BlockHeight, Kit, Mutez, Ratio, Timestamp};

/// Every message the engine accepts from its host.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Message {
    /// Enqueues a slice of `burrow`'s collateral for liquidation. Only the
    /// configured `authority` (the minter/host contract, not an end user)
    /// may call this — individual burrow owners never decide to liquidate
    /// themselves.
    SendToAuction { burrow: Address, tez: Mutez, min_kit_for_unwarranted: Kit },
    /// Withdraws a slice that is still sitting in the queue. Callable by
    /// anyone holding the slice's id; the authorization that matters (is
    /// this really the owning burrow's decision) is the host's problem, not
    /// the engine's.
    CancelSlice { leaf: crate::arena::LeafId },
    /// Advances lot formation and completion. Restricted to `authority`
    /// since it is meant to be called once per host block, not on demand by
    /// arbitrary callers racing each other to decide when a lot starts.
    Touch { now: Timestamp, block_height: BlockHeight, start_price: Ratio },
    /// Places a bid on the current lot.
    PlaceBid { now: Timestamp, block_height: BlockHeight, kit: Kit },
    ReclaimLosingBid { handle: BidHandle },
    ReclaimWinningBid { handle: BidHandle },
    /// Drains specific slices out of completed lots. Restricted to
    /// `authority` for the same reason as `Touch`.
    TouchSlices { leaves: Vec<crate::arena::LeafId> },
    /// Drains the oldest undrained slices across all completed lots.
    TouchOldestSlices { max: usize },
    /// Fails if `burrow` still has an unclaimed completed-liquidation slice;
    /// the guard the host runs before letting a burrow mutate its own
    /// collateral or debt.
    EnsureNoUnclaimedSlices { burrow: Address },
}

/// A side effect the host must still carry out; the engine itself never
/// touches a ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectDescriptor {
    /// Move `amount` mutez from the auction's escrow to `to` (the winning
    /// bidder, once their bid is reclaimed).
    TransferTez { to: Address, amount: Mutez },
    /// Move `amount` kit from the auction's escrow back to `to` (a losing
    /// bidder reclaiming their bid).
    ReleaseKitToBidder { to: Address, amount: Kit },
    /// Destroy `amount` kit outright (the liquidation penalty on a slice
    /// whose repay fell short of its minimum).
    BurnKit { amount: Kit },
    /// Credit `burrow`'s outstanding kit debt by `amount` (the non-penalty
    /// portion of a drained slice's settlement).
    RepayBurrow { burrow: Address, amount: Kit },
    /// Escrow `amount` kit taken from `from` when their bid becomes leading.
    EscrowKit { from: Address, amount: Kit },
    /// Informational: `burrow` has no more unclaimed completed-liquidation
    /// slices as of this call, for the host to relay to watchers.
    BurrowFullySettled { burrow: Address },
}

/// Everything a dispatched message produces: the effects the host must carry
/// out, plus (for `PlaceBid` only) the handle the caller needs to reclaim
/// their bid later.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub effects: Vec<EffectDescriptor>,
    pub bid_handle: Option<BidHandle>,
}

impl From<Vec<EffectDescriptor>> for DispatchOutcome {
    fn from(effects: Vec<EffectDescriptor>) -> Self {
        Self { effects, bid_handle: None }
    }
}

/// Converts an engine-level error into a dispatcher error, except for
/// [`EngineError::InvariantViolation`]: that one never becomes an ordinary
/// `Result::Err` a caller could recover from. It is logged and the process
/// aborts right here, at the one chokepoint every dispatched message passes
/// through, so an invariant violation can never be observed as "just another
/// failed call" by a host retrying the next message.
fn engine_result<T>(result: Result<T, EngineError>) -> Result<T, DispatchError> {
    match result {
        Ok(value) => Ok(value),
        Err(EngineError::InvariantViolation(detail)) => abort_on_invariant_violation(&detail),
        Err(other) => Err(DispatchError::Engine(other)),
    }
}

/// Dispatches one [`Message`] against `engine`, returning the effects the
/// host must now carry out. `sender` is whoever the host believes is
/// calling; `amount` is whatever value (if any) was attached to the call.
///
/// None of this engine's entrypoints are payable: any nonzero `amount`
/// is rejected before the message ever reaches the pure state machine.
///
/// Each arm below opens its own span named after the message variant (rather
/// than one span shared by every variant) and records the number of effects
/// emitted once the call succeeds.
pub fn dispatch(
    engine: &mut LiquidationAuctions,
    cfg: &EngineConfig,
    authority: &Address,
    sender: &Address,
    amount: Mutez,
    message: Message,
) -> Result<DispatchOutcome, DispatchError> {
    if amount != 0 {
        return Err(DispatchError::UnexpectedAmount { amount });
    }

    match message {
        Message::SendToAuction { burrow, tez, min_kit_for_unwarranted } => {
            let span = tracing::info_span!("send_to_auction", sender = %sender, effects = tracing::field::Empty);
            let _enter = span.enter();
            require_authority(authority, sender)?;
            tracing::info!(burrow = %burrow, tez, "sending slice to auction");
            engine_result(engine.send_to_auction(
                cfg,
                SliceContents { burrow, tez, min_kit_for_unwarranted },
            ))?;
            let outcome: DispatchOutcome = vec![].into();
            span.record("effects", outcome.effects.len());
            Ok(outcome)
        }

        Message::CancelSlice { leaf } => {
            let span = tracing::info_span!("cancel_slice", sender = %sender, effects = tracing::field::Empty);
            let _enter = span.enter();
            let contents = engine_result(engine.cancel_slice(leaf))?;
            tracing::info!(burrow = %contents.burrow, "slice cancelled");
            let outcome: DispatchOutcome = vec![].into();
            span.record("effects", outcome.effects.len());
            Ok(outcome)
        }

        Message::Touch { now, block_height, start_price } => {
            let span = tracing::info_span!("touch", sender = %sender, effects = tracing::field::Empty);
            let _enter = span.enter();
            require_authority(authority, sender)?;
            let completed = engine_result(engine.touch(cfg, now, block_height, start_price))?;
            if let Some(completed) = &completed {
                tracing::info!(winner = %completed.winning_bid.address, sold_tez = completed.sold_tez, "lot completed");
            }
            let outcome: DispatchOutcome = vec![].into();
            span.record("effects", outcome.effects.len());
            Ok(outcome)
        }

        Message::PlaceBid { now, block_height, kit } => {
            let span = tracing::info_span!("place_bid", sender = %sender, effects = tracing::field::Empty);
            let _enter = span.enter();
            let previous_leading = engine.current.as_ref().and_then(|c| c.winning_bid().cloned());
            let handle = engine_result(engine.place_bid(cfg, now, block_height, sender.clone(), kit))?;
            tracing::info!(bidder = %sender, kit = %kit, "bid placed");

            let mut effects = vec![EffectDescriptor::EscrowKit { from: sender.clone(), amount: kit }];
            if let Some(previous) = previous_leading {
                effects.push(EffectDescriptor::ReleaseKitToBidder {
                    to: previous.address,
                    amount: previous.kit,
                });
            }
            let outcome = DispatchOutcome { effects, bid_handle: Some(handle) };
            span.record("effects", outcome.effects.len());
            Ok(outcome)
        }

        Message::ReclaimLosingBid { handle } => {
            let span = tracing::info_span!("reclaim_losing_bid", sender = %sender, effects = tracing::field::Empty);
            let _enter = span.enter();
            let kit = engine_result(engine.reclaim_losing_bid(&handle))?;
            let outcome: DispatchOutcome =
                vec![EffectDescriptor::ReleaseKitToBidder { to: handle.bid.address, amount: kit }].into();
            span.record("effects", outcome.effects.len());
            Ok(outcome)
        }

        Message::ReclaimWinningBid { handle } => {
            let span = tracing::info_span!("reclaim_winning_bid", sender = %sender, effects = tracing::field::Empty);
            let _enter = span.enter();
            let tez = engine_result(engine.reclaim_winning_bid(&handle))?;
            let outcome: DispatchOutcome =
                vec![EffectDescriptor::TransferTez { to: handle.bid.address, amount: tez }].into();
            span.record("effects", outcome.effects.len());
            Ok(outcome)
        }

        Message::TouchSlices { leaves } => {
            let span = tracing::info_span!("touch_slices", sender = %sender, effects = tracing::field::Empty);
            let _enter = span.enter();
            require_authority(authority, sender)?;
            let settlements = engine_result(engine.touch_slices(cfg, &leaves))?;
            let outcome: DispatchOutcome = settlement_effects(settlements).into();
            span.record("effects", outcome.effects.len());
            Ok(outcome)
        }

        Message::TouchOldestSlices { max } => {
            let span = tracing::info_span!("touch_oldest_slices", sender = %sender, effects = tracing::field::Empty);
            let _enter = span.enter();
            require_authority(authority, sender)?;
            let settlements = engine_result(engine.touch_oldest(cfg, max))?;
            let outcome: DispatchOutcome = settlement_effects(settlements).into();
            span.record("effects", outcome.effects.len());
            Ok(outcome)
        }

        Message::EnsureNoUnclaimedSlices { burrow } => {
            let span = tracing::info_span!("ensure_no_unclaimed_slices", sender = %sender, effects = tracing::field::Empty);
            let _enter = span.enter();
            engine_result(engine.ensure_no_unclaimed_slices(&burrow))?;
            let outcome: DispatchOutcome = vec![EffectDescriptor::BurrowFullySettled { burrow }].into();
            span.record("effects", outcome.effects.len());
            Ok(outcome)
        }
    }
}

fn require_authority(authority: &Address, sender: &Address) -> Result<(), DispatchError> {
    if sender != authority {
        return Err(DispatchError::NotAuthorized { sender: sender.clone() });
    }
    Ok(())
}

/// One `RepayBurrow` per settled slice, plus a single `BurnKit` aggregating
/// the whole batch's penalty (mirrors a batched settlement effect's
/// `total_burn: Kit` field, rather than one burn per slice).
fn settlement_effects(settlements: Vec<SliceSettlement>) -> Vec<EffectDescriptor> {
    let mut effects = Vec::with_capacity(settlements.len() + 1);
    let mut total_burn = Kit::ZERO;
    for settlement in settlements {
        if settlement.repay.0 > 0 {
            effects.push(EffectDescriptor::RepayBurrow {
                burrow: settlement.contents.burrow.clone(),
                amount: settlement.repay,
            });
        }
        total_burn = total_burn + settlement.burn;
    }
    if total_burn.0 > 0 {
        effects.push(EffectDescriptor::BurnKit { amount: total_burn });
    }
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn non_authority_cannot_send_to_auction() {
        let mut engine = LiquidationAuctions::new();
        let cfg = EngineConfig::default();
        let authority = Address::from("minter");
        let err = dispatch(
            &mut engine,
            &cfg,
            &authority,
            &Address::from("random"),
            0,
            Message::SendToAuction {
                burrow: Address::from("b1"),
                tez: 1_000,
                min_kit_for_unwarranted: Kit(10),
            },
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::NotAuthorized { .. }));
    }

    #[test]
    fn nonzero_amount_is_rejected_on_every_entrypoint() {
        let mut engine = LiquidationAuctions::new();
        let cfg = EngineConfig::default();
        let authority = Address::from("minter");
        let err = dispatch(
            &mut engine,
            &cfg,
            &authority,
            &authority,
            1,
            Message::TouchOldestSlices { max: 1 },
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::UnexpectedAmount { amount: 1 }));
    }

    #[test]
    fn authority_can_send_to_auction() {
        let mut engine = LiquidationAuctions::new();
        let cfg = EngineConfig::default();
        let authority = Address::from("minter");
        let outcome = dispatch(
            &mut engine,
            &cfg,
            &authority,
            &authority,
            0,
            Message::SendToAuction {
                burrow: Address::from("b1"),
                tez: 1_000,
                min_kit_for_unwarranted: Kit(10),
            },
        )
        .unwrap();
        assert!(outcome.effects.is_empty());
        assert_eq!(engine.arena.weight(engine.queued).unwrap(), 1_000);
    }

    #[test]
    #[traced_test]
    fn invariant_violation_logs_before_aborting_instead_of_returning_an_error() {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            engine_result::<()>(Err(EngineError::InvariantViolation("boom".into())))
        }));
        assert!(result.is_err(), "an invariant violation must abort, not return Err");
        assert!(logs_contain("invariant violation, aborting"));
    }
}
