//! Engine configuration: every tunable constant the engine reads from its
//! external-interfaces section, loaded the way `signup-sequencer` loads its
//! own `Config` — a TOML/JSON file, if given, layered under environment
//! variables — via the `config` crate, deserialized with `serde`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{Mutez, Ratio};

/// Environment variables override file settings when prefixed `LAE__`, with
/// `__` splitting nested keys (so `LAE__MAX_LOT_SIZE=5000000` overrides
/// `max_lot_size`), mirroring `signup-sequencer`'s `SEQ__` convention.
const ENV_PREFIX: &str = "LAE";

pub fn load_config(config_file_path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let mut settings = config::Config::builder();

    if let Some(path) = config_file_path {
        settings = settings.add_source(config::File::from(path).required(true));
    }

    let settings = settings
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize::<RawConfig>()?.into())
}

/// Deserialization shape: every field optional with a documented default, so
/// a config file only needs to mention the constants it wants to override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct RawConfig {
    max_queue_height: u8,
    max_lot_size: Mutez,
    min_lot_queue_fraction: Ratio,
    auction_decay_rate: Ratio,
    bid_improvement_factor: Ratio,
    liquidation_penalty: Ratio,
    bid_interval_sec: u64,
    bid_interval_blocks: u64,
    number_of_slices_to_process: usize,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            max_queue_height: default::max_queue_height(),
            max_lot_size: default::max_lot_size(),
            min_lot_queue_fraction: default::min_lot_queue_fraction(),
            auction_decay_rate: default::auction_decay_rate(),
            bid_improvement_factor: default::bid_improvement_factor(),
            liquidation_penalty: default::liquidation_penalty(),
            bid_interval_sec: default::bid_interval_sec(),
            bid_interval_blocks: default::bid_interval_blocks(),
            number_of_slices_to_process: default::number_of_slices_to_process(),
        }
    }
}

impl From<RawConfig> for EngineConfig {
    fn from(raw: RawConfig) -> Self {
        Self {
            max_queue_height: raw.max_queue_height,
            max_lot_size: raw.max_lot_size,
            min_lot_queue_fraction: raw.min_lot_queue_fraction,
            auction_decay_rate: raw.auction_decay_rate,
            bid_improvement_factor: raw.bid_improvement_factor,
            liquidation_penalty: raw.liquidation_penalty,
            bid_interval_sec: raw.bid_interval_sec,
            bid_interval_blocks: raw.bid_interval_blocks,
            number_of_slices_to_process: raw.number_of_slices_to_process,
        }
    }
}

mod default {
    use crate::types::{Mutez, Ratio};

    /// `AVL height <= floor(1.44 * log2(n+2))`; a height of 32 already bounds
    /// the queue to tens of millions of slices, well past any burrow count
    /// the host is expected to ever liquidate in one epoch.
    pub const fn max_queue_height() -> u8 {
        32
    }

    /// 10,000 tez, in mutez.
    pub const fn max_lot_size() -> Mutez {
        10_000_000_000
    }

    pub const fn min_lot_queue_fraction() -> Ratio {
        Ratio::new(5, 100)
    }

    /// ~1/3600 per second halves the reserve roughly every 40 minutes.
    pub const fn auction_decay_rate() -> Ratio {
        Ratio::new(1, 3600)
    }

    pub const fn bid_improvement_factor() -> Ratio {
        Ratio::new(1, 100)
    }

    pub const fn liquidation_penalty() -> Ratio {
        Ratio::new(1, 10)
    }

    pub const fn bid_interval_sec() -> u64 {
        1_200
    }

    pub const fn bid_interval_blocks() -> u64 {
        20
    }

    pub const fn number_of_slices_to_process() -> usize {
        5
    }
}

/// Every tunable constant named in the engine's external-interfaces
/// section, resolved to a single immutable value for the lifetime of the
/// process. There is no process-wide mutable configuration: every entrypoint
/// takes a `&EngineConfig` explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub max_queue_height: u8,
    pub max_lot_size: Mutez,
    pub min_lot_queue_fraction: Ratio,
    pub auction_decay_rate: Ratio,
    pub bid_improvement_factor: Ratio,
    pub liquidation_penalty: Ratio,
    pub bid_interval_sec: u64,
    pub bid_interval_blocks: u64,
    /// Cap shared by `TouchSlices` and `TouchOldestSlices` (an unbounded
    /// drain per call risked becoming a gas/compute griefing vector; this
    /// closes that denial-of-service surface by capping both bulk drains at
    /// the same value rather than rejecting an oversized batch outright —
    /// the remainder is simply left for a later call).
    pub number_of_slices_to_process: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}
