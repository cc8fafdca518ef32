//! Serde structs for game config files.
//!
//! A config file names the world to generate, the simulation tuning, and
//! optionally replacement recipes for the crafter kinds. Every section has
//! defaults, so an empty file is a valid config.

use serde::{Deserialize, Serialize};
use tilefab_core::config::SimConfig;
use tilefab_core::fixed::Millis;
use tilefab_core::kind::{EntityKind, Item};
use tilefab_core::rng::WorldSeed;

// ===========================================================================
// World
// ===========================================================================

/// Map dimensions and seed. Dimensions stay signed so that a bad value in a
/// file reaches the grid's own validation instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub width: i64,
    pub height: i64,
    /// A number or any text.
    pub seed: WorldSeed,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 48,
            seed: WorldSeed::Number(1),
        }
    }
}

// ===========================================================================
// Recipes
// ===========================================================================

/// A recipe override for one crafter kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeData {
    pub kind: EntityKind,
    pub inputs: Vec<(Item, u32)>,
    pub output: Item,
    pub duration_ms: Millis,
}

// ===========================================================================
// Top level
// ===========================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub world: WorldConfig,
    pub sim: SimConfig,
    pub recipes: Vec<RecipeData>,
}
