//! Persisted world state.
//!
//! [`SaveState`] is the flat record of everything needed to rebuild a
//! [`Simulation`]: the map is regenerated from its seed and patched with the
//! recorded tile edits, then entities, loose items, clocks and the player
//! record are restored on top.
//!
//! Two encodings: pretty JSON via `serde_json`, and a compact binary form via
//! `bitcode` prefixed with a versioned [`SaveHeader`].

use crate::config::SimConfig;
use crate::fixed::Millis;
use crate::generate::generate_from_derived;
use crate::grid::{Direction, GridError, Occupant, PlacementError, Tile, TilePos, WorldGrid};
use crate::id::EntityId;
use crate::kind::{Entity, EntityKind, EntityState, Item};
use crate::registry::Registry;
use crate::sim::{PlayerState, Simulation};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a binary tilefab save.
pub const SAVE_MAGIC: u32 = 0x711E_FAB1;

/// Current schema version. Increment when breaking the saved shape.
pub const SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SAVE_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported schema version {0} (this build reads {SCHEMA_VERSION})")]
    UnsupportedVersion(u32),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("entity {id} appears twice")]
    DuplicateId { id: EntityId },
    #[error("entity {id} is not below the next id {next}")]
    IdOutOfRange { id: EntityId, next: EntityId },
    #[error("saved {counter} is at its maximum and cannot advance")]
    CounterExhausted { counter: &'static str },
    #[error("entity {id} is a {kind} but carries state {state:?}")]
    StateMismatch {
        id: EntityId,
        kind: EntityKind,
        state: EntityState,
    },
    #[error("entity {id} cannot be restored: {source}")]
    Placement {
        id: EntityId,
        #[source]
        source: PlacementError,
    },
}

// ---------------------------------------------------------------------------
// Saved shape
// ---------------------------------------------------------------------------

/// One placed entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub pos: TilePos,
    pub rot: Direction,
    pub state: EntityState,
}

impl From<&Entity> for SavedEntity {
    fn from(e: &Entity) -> Self {
        Self {
            id: e.id,
            kind: e.kind,
            pos: e.pos,
            rot: e.rot,
            state: e.state.clone(),
        }
    }
}

impl From<SavedEntity> for Entity {
    fn from(e: SavedEntity) -> Self {
        Entity {
            id: e.id,
            kind: e.kind,
            pos: e.pos,
            rot: e.rot,
            state: e.state,
        }
    }
}

/// A loose item on a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedItem {
    pub pos: TilePos,
    pub item: Item,
}

/// A tile whose classification differs from the base map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedTile {
    pub pos: TilePos,
    pub tile: Tile,
}

/// Everything needed to rebuild a simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    pub schema_version: u32,
    pub width: u32,
    pub height: u32,
    /// Derived 32-bit map seed.
    pub seed: u32,
    /// `false` when the base map was blank rather than generated.
    pub generated: bool,
    pub tick: u64,
    pub tick_count: u64,
    pub elapsed_ms: Millis,
    pub paused: bool,
    pub player: PlayerState,
    pub inventory: BTreeMap<Item, u32>,
    pub entities: Vec<SavedEntity>,
    pub next_entity_id: EntityId,
    pub items: Vec<SavedItem>,
    pub tile_edits: Vec<SavedTile>,
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Header prepended to every binary save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveHeader {
    pub magic: u32,
    pub version: u32,
    /// Tick at the time of saving.
    pub tick: u64,
}

impl SaveHeader {
    pub fn new(tick: u64) -> Self {
        Self {
            magic: SAVE_MAGIC,
            version: SCHEMA_VERSION,
            tick,
        }
    }

    pub fn validate(&self) -> Result<(), SaveError> {
        if self.magic != SAVE_MAGIC {
            return Err(SaveError::InvalidMagic(self.magic));
        }
        if self.version != SCHEMA_VERSION {
            return Err(SaveError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SaveFile {
    header: SaveHeader,
    state: SaveState,
}

// ---------------------------------------------------------------------------
// Encodings
// ---------------------------------------------------------------------------

fn check_schema(state: &SaveState) -> Result<(), SaveError> {
    if state.schema_version != SCHEMA_VERSION {
        log::warn!("rejecting save with schema version {}", state.schema_version);
        return Err(SaveError::UnsupportedVersion(state.schema_version));
    }
    Ok(())
}

/// Every counter a restored world advances must still have room to move.
fn check_counters(state: &SaveState) -> Result<(), SaveError> {
    let counters = [
        ("next_entity_id", state.next_entity_id.0),
        ("tick", state.tick),
        ("tick_count", state.tick_count),
    ];
    for (counter, value) in counters {
        if value == u64::MAX {
            log::warn!("rejecting save: {counter} is exhausted");
            return Err(SaveError::CounterExhausted { counter });
        }
    }
    Ok(())
}

pub fn to_json(state: &SaveState) -> Result<String, SaveError> {
    Ok(serde_json::to_string_pretty(state)?)
}

pub fn from_json(json: &str) -> Result<SaveState, SaveError> {
    let state: SaveState = serde_json::from_str(json)?;
    check_schema(&state)?;
    Ok(state)
}

/// Binary encoding with a versioned header.
pub fn encode(state: &SaveState) -> Result<Vec<u8>, SaveError> {
    let file = SaveFile {
        header: SaveHeader::new(state.tick),
        state: state.clone(),
    };
    bitcode::serialize(&file).map_err(|e| SaveError::Encode(e.to_string()))
}

/// Decode a binary save. The header is validated before the state is
/// returned.
pub fn decode(data: &[u8]) -> Result<SaveState, SaveError> {
    let file: SaveFile =
        bitcode::deserialize(data).map_err(|e| SaveError::Decode(e.to_string()))?;
    if let Err(e) = file.header.validate() {
        log::warn!("rejecting binary save: {e}");
        return Err(e);
    }
    check_schema(&file.state)?;
    Ok(file.state)
}

// ---------------------------------------------------------------------------
// Simulation <-> SaveState
// ---------------------------------------------------------------------------

impl Simulation {
    /// Capture the persisted state.
    pub fn to_save_state(&self) -> SaveState {
        let grid = self.grid();
        SaveState {
            schema_version: SCHEMA_VERSION,
            width: grid.width(),
            height: grid.height(),
            seed: grid.seed(),
            generated: grid.is_generated(),
            tick: self.tick(),
            tick_count: self.tick_count(),
            elapsed_ms: self.elapsed_ms(),
            paused: self.is_paused(),
            player: self.player().clone(),
            inventory: self.inventory().clone(),
            entities: self.entities().map(SavedEntity::from).collect(),
            next_entity_id: self.next_entity_id(),
            items: self
                .items()
                .map(|(pos, item)| SavedItem { pos, item })
                .collect(),
            tile_edits: grid
                .tile_edits()
                .map(|(pos, tile)| SavedTile { pos, tile })
                .collect(),
        }
    }

    /// Rebuild a simulation from a saved state.
    pub fn from_save_state(
        state: SaveState,
        registry: Registry,
        config: SimConfig,
    ) -> Result<Self, SaveError> {
        check_schema(&state)?;
        check_counters(&state)?;
        let mut grid = if state.generated {
            generate_from_derived(state.width as i64, state.height as i64, state.seed)?
        } else {
            WorldGrid::empty(state.width as i64, state.height as i64, state.seed)?
        };
        for edit in &state.tile_edits {
            if !grid.set_tile(edit.pos, edit.tile) {
                log::warn!("ignoring tile edit outside the map at {}", edit.pos);
            }
        }

        let mut seen = BTreeSet::new();
        let mut entities = Vec::with_capacity(state.entities.len());
        for saved in state.entities {
            let id = saved.id;
            if !seen.insert(id) {
                return Err(SaveError::DuplicateId { id });
            }
            if id >= state.next_entity_id {
                return Err(SaveError::IdOutOfRange {
                    id,
                    next: state.next_entity_id,
                });
            }
            if !saved.state.matches(saved.kind) {
                return Err(SaveError::StateMismatch {
                    id,
                    kind: saved.kind,
                    state: saved.state,
                });
            }
            if !registry.is_registered(saved.kind) {
                return Err(SaveError::Placement {
                    id,
                    source: PlacementError::Unregistered {
                        pos: saved.pos,
                        kind: saved.kind,
                    },
                });
            }
            let occupant = Occupant {
                id,
                kind: saved.kind,
            };
            grid.restore_occupant(saved.pos, occupant)
                .map_err(|source| SaveError::Placement { id, source })?;
            entities.push(Entity::from(saved));
        }

        let items = state.items.into_iter().map(|s| (s.pos, s.item)).collect();
        log::debug!(
            "restored {}x{} world at tick {} with {} entities",
            state.width,
            state.height,
            state.tick,
            entities.len()
        );
        Ok(Simulation::restore(
            grid,
            registry,
            config,
            entities,
            items,
            state.next_entity_id,
            (state.tick, state.tick_count, state.elapsed_ms),
            state.paused,
            state.player,
            state.inventory,
        ))
    }
}
