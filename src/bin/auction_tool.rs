//! Operator CLI: replays a JSON-described sequence of messages against a
//! fresh engine instance and prints the effects each step produced. Modeled
//! on the sequencer's `src/bin/tool.rs` one-shot operator harness, trading
//! its direct-database-access style for a pure in-memory replay since this
//! engine has no storage layer of its own to connect to.

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

use liquidation_auctions::cli::SharedArgs;
use liquidation_auctions::config;
use liquidation_auctions::dispatcher::{self, Message};
use liquidation_auctions::types::{Address, Mutez};
use liquidation_auctions::LiquidationAuctions;

#[derive(Parser, Debug)]
#[command(about = "Replay a liquidation-auction scenario file")]
struct Args {
    #[command(flatten)]
    shared: SharedArgs,

    /// Path to a JSON scenario file (see `demos/` for examples).
    scenario: PathBuf,
}

#[derive(Deserialize)]
struct Scenario {
    authority: Address,
    steps: Vec<Step>,
}

#[derive(Deserialize)]
struct Step {
    sender: Address,
    #[serde(default)]
    amount: Mutez,
    message: Message,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    liquidation_auctions::cli::logging::init(args.shared.log_format, args.shared.verbose);

    let cfg = config::load_config(args.shared.config_file.as_deref())?;
    tracing::debug!(?cfg, "loaded configuration");

    let raw = std::fs::read_to_string(&args.scenario)?;
    let scenario: Scenario = serde_json::from_str(&raw)?;

    let mut engine = LiquidationAuctions::new();

    for (index, step) in scenario.steps.into_iter().enumerate() {
        let span = tracing::info_span!("step", index, sender = %step.sender);
        let _enter = span.enter();

        match dispatcher::dispatch(&mut engine, &cfg, &scenario.authority, &step.sender, step.amount, step.message) {
            Ok(outcome) => {
                for effect in &outcome.effects {
                    println!("{}", serde_json::to_string(effect)?);
                }
                if let Some(handle) = &outcome.bid_handle {
                    println!("{}", serde_json::to_string(&serde_json::json!({ "bid_handle": handle }))?);
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "step failed");
                println!("{}", serde_json::to_string(&serde_json::json!({ "error": err.to_string() }))?);
            }
        }
    }

    println!(
        "{}",
        serde_json::to_string(&serde_json::json!({
            "queued_tez": engine.tree_weight(engine.queued)?,
            "live_nodes": engine.live_node_count(),
            "current_open": engine.current.is_some(),
            "completed_lots_pending": engine.completed.is_some(),
        }))?
    );

    Ok(())
}
