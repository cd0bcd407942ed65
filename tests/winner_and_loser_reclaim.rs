//! Exactly one bid handle on a given lot may ever release tez; every other
//! handle on that lot only ever releases its own escrowed kit back.

use liquidation_auctions::config::EngineConfig;
use liquidation_auctions::dispatcher::{self, EffectDescriptor, Message};
use liquidation_auctions::error::EngineError;
use liquidation_auctions::slice::SliceContents;
use liquidation_auctions::types::{Address, BlockHeight, Kit, Ratio, Timestamp};
use liquidation_auctions::LiquidationAuctions;

fn authority() -> Address {
    Address::from("minter")
}

#[test]
fn a_losing_bid_can_reclaim_as_soon_as_it_stops_leading() {
    let mut engine = LiquidationAuctions::new();
    let cfg = EngineConfig::default();
    engine
        .send_to_auction(&cfg, SliceContents { burrow: Address::from("b1"), tez: 1_000, min_kit_for_unwarranted: Kit(10) })
        .unwrap();
    engine.start_if_possible(&cfg, Timestamp(0), Ratio::new(1, 1)).unwrap();

    let early = engine.place_bid(&cfg, Timestamp(0), BlockHeight(0), Address::from("early"), Kit(4_000_000)).unwrap();
    let later = engine.place_bid(&cfg, Timestamp(1), BlockHeight(0), Address::from("later"), Kit(5_000_000)).unwrap();

    // `early` no longer leads; it can reclaim immediately, well before the
    // lot itself completes.
    assert_eq!(engine.reclaim_losing_bid(&early).unwrap(), Kit(4_000_000));
    // `later` is leading and cannot reclaim through the losing-bid path.
    assert_eq!(engine.reclaim_losing_bid(&later).unwrap_err(), EngineError::CannotReclaimLeadingBid);
}

#[test]
fn the_winner_must_wait_for_every_slice_to_drain_before_reclaiming_tez() {
    let mut engine = LiquidationAuctions::new();
    let cfg = EngineConfig::default();
    engine
        .send_to_auction(&cfg, SliceContents { burrow: Address::from("b1"), tez: 1_000, min_kit_for_unwarranted: Kit(10) })
        .unwrap();
    engine.start_if_possible(&cfg, Timestamp(0), Ratio::new(1, 1)).unwrap();
    let handle = engine.place_bid(&cfg, Timestamp(0), BlockHeight(0), Address::from("winner"), Kit(5_000_000)).unwrap();
    engine
        .complete_if_possible(&cfg, Timestamp(cfg.bid_interval_sec as i64 + 1), BlockHeight(cfg.bid_interval_blocks + 1))
        .unwrap();

    let err = engine.reclaim_winning_bid(&handle).unwrap_err();
    assert_eq!(err, EngineError::NotAllSlicesClaimed);

    let (leaf, _) = engine.peek_front(handle.auction_id).unwrap().unwrap();
    engine.touch_slices(&cfg, &[leaf]).unwrap();

    assert_eq!(engine.reclaim_winning_bid(&handle).unwrap(), 1_000);
    // A second reclaim against the now-deallocated tree is definitively not
    // a winning bid anymore, not an invariant violation.
    assert_eq!(engine.reclaim_winning_bid(&handle).unwrap_err(), EngineError::NotAWinningBid);
}

#[test]
fn dispatcher_level_bid_and_reclaim_round_trip() {
    let mut engine = LiquidationAuctions::new();
    let cfg = EngineConfig::default();
    let authority = authority();

    engine
        .send_to_auction(&cfg, SliceContents { burrow: Address::from("b1"), tez: 1_000, min_kit_for_unwarranted: Kit(10) })
        .unwrap();
    dispatcher::dispatch(
        &mut engine,
        &cfg,
        &authority,
        &authority,
        0,
        Message::Touch { now: Timestamp(0), block_height: BlockHeight(0), start_price: Ratio::new(1, 1) },
    )
    .unwrap();

    let bid_outcome = dispatcher::dispatch(
        &mut engine,
        &cfg,
        &authority,
        &Address::from("winner"),
        0,
        Message::PlaceBid { now: Timestamp(0), block_height: BlockHeight(0), kit: Kit(5_000_000) },
    )
    .unwrap();
    assert_eq!(bid_outcome.effects, vec![EffectDescriptor::EscrowKit { from: Address::from("winner"), amount: Kit(5_000_000) }]);
    let handle = bid_outcome.bid_handle.expect("PlaceBid must return a handle");

    dispatcher::dispatch(
        &mut engine,
        &cfg,
        &authority,
        &authority,
        0,
        Message::Touch {
            now: Timestamp(cfg.bid_interval_sec as i64 + 1),
            block_height: BlockHeight(cfg.bid_interval_blocks + 1),
            start_price: Ratio::new(1, 1),
        },
    )
    .unwrap();

    let (leaf, _) = engine.peek_front(handle.auction_id).unwrap().unwrap();
    dispatcher::dispatch(
        &mut engine,
        &cfg,
        &authority,
        &authority,
        0,
        Message::TouchSlices { leaves: vec![leaf] },
    )
    .unwrap();

    let reclaim_outcome = dispatcher::dispatch(
        &mut engine,
        &cfg,
        &authority,
        &Address::from("winner"),
        0,
        Message::ReclaimWinningBid { handle },
    )
    .unwrap();
    assert_eq!(
        reclaim_outcome.effects,
        vec![EffectDescriptor::TransferTez { to: Address::from("winner"), amount: 1_000 }]
    );
}
