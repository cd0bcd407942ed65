//! Sending a slice to auction, then withdrawing it before any lot forms.
//!
//! `send_to_auction` is called directly (as a host would before relaying the
//! resulting leaf id back to whoever might cancel it); every other step goes
//! through the dispatcher to exercise authorization and effect translation.

use liquidation_auctions::config::EngineConfig;
use liquidation_auctions::dispatcher::{self, Message};
use liquidation_auctions::error::{DispatchError, EngineError};
use liquidation_auctions::slice::SliceContents;
use liquidation_auctions::types::{Address, BlockHeight, Kit, Ratio, Timestamp};
use liquidation_auctions::LiquidationAuctions;

fn authority() -> Address {
    Address::from("minter")
}

#[test]
fn cancelled_slice_leaves_no_trace_in_the_queue() {
    let mut engine = LiquidationAuctions::new();
    let cfg = EngineConfig::default();
    let authority = authority();

    let leaf = engine
        .send_to_auction(
            &cfg,
            SliceContents {
                burrow: Address::from("burrow-1"),
                tez: 500,
                min_kit_for_unwarranted: Kit(10),
            },
        )
        .unwrap();
    assert_eq!(engine.tree_weight(engine.queued).unwrap(), 500);

    let outcome = dispatcher::dispatch(
        &mut engine,
        &cfg,
        &authority,
        &Address::from("anyone"),
        0,
        Message::CancelSlice { leaf },
    )
    .unwrap();
    assert!(outcome.effects.is_empty());
    assert_eq!(engine.tree_weight(engine.queued).unwrap(), 0);

    // A burrow with no remaining slices trivially has no unclaimed
    // completed-liquidation slices.
    dispatcher::dispatch(
        &mut engine,
        &cfg,
        &authority,
        &Address::from("anyone"),
        0,
        Message::EnsureNoUnclaimedSlices { burrow: Address::from("burrow-1") },
    )
    .unwrap();
}

#[test]
fn cancelling_a_slice_already_pulled_into_a_lot_is_rejected() {
    let mut engine = LiquidationAuctions::new();
    let cfg = EngineConfig::default();
    let authority = authority();

    let leaf = engine
        .send_to_auction(
            &cfg,
            SliceContents {
                burrow: Address::from("burrow-1"),
                tez: 500,
                min_kit_for_unwarranted: Kit(10),
            },
        )
        .unwrap();

    dispatcher::dispatch(
        &mut engine,
        &cfg,
        &authority,
        &authority,
        0,
        Message::Touch {
            now: Timestamp(0),
            block_height: BlockHeight(0),
            start_price: Ratio::new(1, 1),
        },
    )
    .unwrap();
    assert!(engine.current.is_some());

    let err = dispatcher::dispatch(
        &mut engine,
        &cfg,
        &authority,
        &authority,
        0,
        Message::CancelSlice { leaf },
    )
    .unwrap_err();
    assert!(matches!(err, DispatchError::Engine(EngineError::UnwarrantedCancellation)));
}

#[test]
fn only_the_authority_may_send_a_slice_to_auction() {
    let mut engine = LiquidationAuctions::new();
    let cfg = EngineConfig::default();
    let authority = authority();

    let err = dispatcher::dispatch(
        &mut engine,
        &cfg,
        &authority,
        &Address::from("impostor"),
        0,
        Message::SendToAuction {
            burrow: Address::from("burrow-1"),
            tez: 500,
            min_kit_for_unwarranted: Kit(10),
        },
    )
    .unwrap_err();
    assert!(matches!(err, DispatchError::NotAuthorized { .. }));
    assert_eq!(engine.tree_weight(engine.queued).unwrap(), 0);
}
