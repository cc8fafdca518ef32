//! Simulation tuning knobs.
//!
//! Every field has a default, so a config file only needs to name the values
//! it changes.

use crate::fixed::Millis;
use serde::{Deserialize, Serialize};

/// Fixed-step timing and default behavior parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Simulated milliseconds per step.
    pub step_ms: Millis,
    /// Pixel size of one tile, reported to renderers.
    pub tile_size: u32,
    /// Time between miner extractions.
    pub miner_interval_ms: Millis,
    /// Time an inserter spends carrying before it drops.
    pub inserter_swing_ms: Millis,
    /// Furnace recipe duration.
    pub furnace_ms: Millis,
    /// Assembler recipe duration.
    pub assembler_ms: Millis,
    /// Clear a resource tile when a miner extracts from it.
    pub deplete_on_extract: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            step_ms: 50,
            tile_size: 32,
            miner_interval_ms: 1000,
            inserter_swing_ms: 300,
            furnace_ms: 2000,
            assembler_ms: 3000,
            deplete_on_extract: false,
        }
    }
}

impl SimConfig {
    /// Step length, never zero.
    pub fn step(&self) -> Millis {
        self.step_ms.max(1)
    }
}
