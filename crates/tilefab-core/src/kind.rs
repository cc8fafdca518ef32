//! Entity kinds, items, and the per-kind typed state each entity carries.
//!
//! Kinds form a closed set. Every kind has exactly one state shape and
//! dispatch over kinds is an exhaustive `match`, so an unknown kind cannot
//! reach the scheduler or the snapshot projector.

use crate::fixed::{Fixed64, Millis};
use crate::grid::{Direction, TilePos};
use crate::id::EntityId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// The kinds of machine a player can place.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Miner,
    Belt,
    Inserter,
    Furnace,
    Assembler,
}

impl EntityKind {
    /// All kinds, in declaration order.
    pub fn all() -> [EntityKind; 5] {
        [
            EntityKind::Miner,
            EntityKind::Belt,
            EntityKind::Inserter,
            EntityKind::Furnace,
            EntityKind::Assembler,
        ]
    }

    /// Extractors may only be placed on resource tiles.
    pub fn is_extractor(self) -> bool {
        matches!(self, EntityKind::Miner)
    }

    /// Kinds that run a recipe.
    pub fn is_crafter(self) -> bool {
        matches!(self, EntityKind::Furnace | EntityKind::Assembler)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Miner => "miner",
            EntityKind::Belt => "belt",
            EntityKind::Inserter => "inserter",
            EntityKind::Furnace => "furnace",
            EntityKind::Assembler => "assembler",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// Items that travel between tiles.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Item {
    IronOre,
    Coal,
    Wood,
    IronPlate,
    Gear,
}

impl Item {
    pub fn as_str(self) -> &'static str {
        match self {
            Item::IronOre => "iron_ore",
            Item::Coal => "coal",
            Item::Wood => "wood",
            Item::IronPlate => "iron_plate",
            Item::Gear => "gear",
        }
    }
}

// ---------------------------------------------------------------------------
// Per-kind state
// ---------------------------------------------------------------------------

/// Miner state. The extracted item itself sits on the miner's tile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerState {
    /// Milliseconds accumulated towards the next extraction.
    pub timer_ms: Millis,
    /// Set only during the tick in which an item was extracted.
    pub just_extracted: bool,
}

/// Belt state. The carried item sits on the belt's tile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeltState {
    /// When set, the belt only accepts this item.
    pub accepts: Option<Item>,
}

/// The four phases of an inserter swing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InserterPhase {
    #[default]
    Idle,
    Picking,
    Carrying,
    Dropping,
}

impl InserterPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            InserterPhase::Idle => "idle",
            InserterPhase::Picking => "picking",
            InserterPhase::Carrying => "carrying",
            InserterPhase::Dropping => "dropping",
        }
    }
}

/// Inserter state. The held item sits on the inserter's tile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InserterState {
    pub phase: InserterPhase,
    /// Remaining swing time while carrying.
    pub timer_ms: Millis,
}

/// Furnace and assembler state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrafterState {
    /// Items absorbed towards the current craft.
    pub input: Vec<Item>,
    /// A finished item waiting for the tile's loose slot to clear.
    pub output: Option<Item>,
    /// Craft progress, `0..=1`.
    pub progress: Fixed64,
}

/// Typed state payload, one variant per state shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityState {
    Miner(MinerState),
    Belt(BeltState),
    Inserter(InserterState),
    Crafter(CrafterState),
}

impl EntityState {
    /// The default state shape for a kind.
    pub fn default_for(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Miner => EntityState::Miner(MinerState::default()),
            EntityKind::Belt => EntityState::Belt(BeltState::default()),
            EntityKind::Inserter => EntityState::Inserter(InserterState::default()),
            EntityKind::Furnace | EntityKind::Assembler => {
                EntityState::Crafter(CrafterState::default())
            }
        }
    }

    /// Whether this state shape belongs to `kind`.
    pub fn matches(&self, kind: EntityKind) -> bool {
        matches!(
            (kind, self),
            (EntityKind::Miner, EntityState::Miner(_))
                | (EntityKind::Belt, EntityState::Belt(_))
                | (EntityKind::Inserter, EntityState::Inserter(_))
                | (EntityKind::Furnace, EntityState::Crafter(_))
                | (EntityKind::Assembler, EntityState::Crafter(_))
        )
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A placed machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub pos: TilePos,
    pub rot: Direction,
    pub state: EntityState,
}

impl Entity {
    /// The tile this entity pushes into.
    pub fn front(&self) -> TilePos {
        self.pos.step(self.rot)
    }

    /// The tile this entity pulls from.
    pub fn back(&self) -> TilePos {
        self.pos.step(self.rot.opposite())
    }
}
