//! Cross-cutting properties that must hold regardless of the specific
//! sequence of operations that produced a given state.

use test_case::test_case;

use liquidation_auctions::config::EngineConfig;
use liquidation_auctions::slice::SliceContents;
use liquidation_auctions::types::{Address, BlockHeight, Kit, Ratio, Timestamp};
use liquidation_auctions::LiquidationAuctions;

/// Walking a burrow's chain from its oldest slice to its youngest must visit
/// every slice it ever sent, in the order it sent them, with no duplicates
/// and no gaps — even after one of those slices has been split in two by
/// lot formation.
#[test]
fn burrow_chain_walk_covers_every_slice_in_fifo_order_even_after_a_split() {
    let mut engine = LiquidationAuctions::new();
    let mut cfg = EngineConfig::default();
    cfg.max_lot_size = 50;
    cfg.min_lot_queue_fraction = Ratio::new(0, 1);

    let burrow = Address::from("b1");
    for tez in [20u64, 20, 20] {
        engine
            .send_to_auction(&cfg, SliceContents { burrow: burrow.clone(), tez, min_kit_for_unwarranted: Kit(1) })
            .unwrap();
    }
    // threshold = 50: takes the first two slices (40) then splits the third
    // (20) into a 10-tez sliver for the lot and a 10-tez remainder.
    engine.start_if_possible(&cfg, Timestamp(0), Ratio::new(1, 1)).unwrap();
    let lot = engine.current.as_ref().unwrap().tree;
    assert_eq!(engine.tree_weight(lot).unwrap(), 50);
    assert_eq!(engine.tree_weight(engine.queued).unwrap(), 10);

    let mut seen_tez = Vec::new();
    let mut cursor = engine.burrow_oldest_slice(&burrow);
    while let Some(leaf) = cursor {
        let slice = engine.read_slice(leaf).unwrap();
        seen_tez.push(slice.contents.tez);
        cursor = slice.younger;
    }
    assert_eq!(seen_tez, vec![20, 20, 10, 10]);
    assert_eq!(seen_tez.iter().sum::<u64>(), 60);
}

/// A winning bid's kit is always split into `repay + burn` across every
/// slice of its lot with no leftover and no shortfall, no matter how the
/// lot's tez is apportioned across its slices.
#[test_case(&[1, 1, 1]; "three equal slices")]
#[test_case(&[7, 3]; "uneven two-way split")]
#[test_case(&[97]; "single slice")]
#[test_case(&[1, 2, 3, 4, 5]; "five increasing slices")]
fn settlement_always_conserves_the_winning_bid_kit(shares: &[u64]) {
    let mut engine = LiquidationAuctions::new();
    let mut cfg = EngineConfig::default();
    let total_tez: u64 = shares.iter().sum();
    cfg.max_lot_size = total_tez;
    cfg.min_lot_queue_fraction = Ratio::new(0, 1);

    for (i, &tez) in shares.iter().enumerate() {
        engine
            .send_to_auction(
                &cfg,
                SliceContents { burrow: Address::from(format!("b{i}").as_str()), tez, min_kit_for_unwarranted: Kit(1) },
            )
            .unwrap();
    }
    engine.start_if_possible(&cfg, Timestamp(0), Ratio::new(1, 1)).unwrap();
    let tree = engine.current.as_ref().unwrap().tree;

    let winning_kit = Kit(1_234_567);
    engine.place_bid(&cfg, Timestamp(0), BlockHeight(0), Address::from("winner"), winning_kit).unwrap();
    engine
        .complete_if_possible(&cfg, Timestamp(cfg.bid_interval_sec as i64 + 1), BlockHeight(cfg.bid_interval_blocks + 1))
        .unwrap();

    let mut total = Kit::ZERO;
    for _ in 0..shares.len() {
        let (leaf, _) = engine.peek_front(tree).unwrap().unwrap();
        let settlements = engine.touch_slices(&cfg, &[leaf]).unwrap();
        total = total + settlements[0].repay + settlements[0].burn;
    }
    assert_eq!(total, winning_kit);
}

/// Once a bid is placed, a lot's ascending price floor only ever rises; it
/// can never accept a bid below a previously-accepted one.
#[test]
fn ascending_bids_are_strictly_monotonically_increasing() {
    let mut engine = LiquidationAuctions::new();
    let cfg = EngineConfig::default();
    engine
        .send_to_auction(&cfg, SliceContents { burrow: Address::from("b1"), tez: 1_000, min_kit_for_unwarranted: Kit(1) })
        .unwrap();
    engine.start_if_possible(&cfg, Timestamp(0), Ratio::new(1, 1)).unwrap();

    let mut last = Kit(1_000_000);
    engine.place_bid(&cfg, Timestamp(0), BlockHeight(0), Address::from("b0"), last).unwrap();
    for i in 1..5u64 {
        let bumped = Kit(last.0 + last.0 / 50);
        let handle = engine
            .place_bid(&cfg, Timestamp(i as i64), BlockHeight(0), Address::from(format!("b{i}").as_str()), bumped)
            .unwrap();
        assert!(handle.bid.kit > last);
        last = handle.bid.kit;
    }
}
