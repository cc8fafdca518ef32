//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::config::SimConfig;
use crate::grid::{Direction, Tile, TilePos, WorldGrid};
use crate::id::EntityId;
use crate::kind::EntityKind;
use crate::registry::Registry;
use crate::sim::Simulation;

// ===========================================================================
// Configs
// ===========================================================================

/// Short timings so chains produce within a few dozen steps.
pub fn fast_config() -> SimConfig {
    SimConfig {
        miner_interval_ms: 100,
        inserter_swing_ms: 100,
        furnace_ms: 100,
        assembler_ms: 150,
        ..SimConfig::default()
    }
}

// ===========================================================================
// Worlds
// ===========================================================================

/// A blank `width x height` simulation with the stock registry.
pub fn flat_sim(width: u32, height: u32) -> Simulation {
    flat_sim_with(width, height, SimConfig::default())
}

pub fn flat_sim_with(width: u32, height: u32, config: SimConfig) -> Simulation {
    let grid = WorldGrid::empty(width as i64, height as i64, 1)
        .expect("test dimensions are valid");
    let registry = Registry::with_defaults(&config);
    Simulation::new(grid, registry, config)
}

/// A blank simulation with `tile` painted at each of `cells`.
pub fn sim_with_resources(
    width: u32,
    height: u32,
    config: SimConfig,
    tile: Tile,
    cells: &[(i32, i32)],
) -> Simulation {
    let mut grid = WorldGrid::empty(width as i64, height as i64, 1)
        .expect("test dimensions are valid");
    for &(x, y) in cells {
        assert!(grid.set_tile(TilePos::new(x, y), tile), "({x}, {y}) out of bounds");
    }
    let registry = Registry::with_defaults(&config);
    Simulation::new(grid, registry, config)
}

// ===========================================================================
// Placement
// ===========================================================================

/// Place an entity, panicking on failure. Returns its id.
pub fn place(sim: &mut Simulation, kind: EntityKind, x: i32, y: i32, rot: Direction) -> EntityId {
    sim.add_entity(kind, TilePos::new(x, y), rot)
        .unwrap_or_else(|e| panic!("placing {kind} at ({x}, {y}): {e}"))
        .occupant
        .id
}

/// Lay `len` belts starting at `start`, each facing `dir`. Returns the tiles
/// in travel order.
pub fn belt_line(sim: &mut Simulation, start: TilePos, dir: Direction, len: u32) -> Vec<TilePos> {
    let mut tiles = Vec::with_capacity(len as usize);
    let mut pos = start;
    for _ in 0..len {
        sim.add_entity(EntityKind::Belt, pos, dir)
            .unwrap_or_else(|e| panic!("belt at {pos}: {e}"));
        tiles.push(pos);
        pos = pos.step(dir);
    }
    tiles
}

/// Miner on an ore tile at `(1, y)` feeding an eastward belt run, an
/// inserter, and a furnace. Returns the furnace tile.
///
/// Layout: `M B B I F` along row `y`.
pub fn smelter_line(config: SimConfig, y: i32) -> (Simulation, TilePos) {
    let mut sim = sim_with_resources(12, y as u32 + 3, config, Tile::Ore, &[(1, y)]);
    place(&mut sim, EntityKind::Miner, 1, y, Direction::East);
    belt_line(&mut sim, TilePos::new(2, y), Direction::East, 2);
    place(&mut sim, EntityKind::Inserter, 4, y, Direction::East);
    place(&mut sim, EntityKind::Furnace, 5, y, Direction::East);
    (sim, TilePos::new(5, y))
}
