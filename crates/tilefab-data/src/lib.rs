//! Config files for the tilefab core.
//!
//! A single `game.{ron,toml,json}` file describes the world to generate, the
//! simulation tuning, and optional recipe overrides.

pub mod loader;
pub mod schema;

pub use loader::{DataLoadError, build_simulation, load_game_config, load_game_config_dir};
pub use schema::{GameConfig, RecipeData, WorldConfig};
