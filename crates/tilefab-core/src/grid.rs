//! The world grid: static tile classification plus dynamic occupancy.
//!
//! Tiles are stored row-major. Occupancy maps each tile to at most one
//! [`Occupant`]. Every query is total: positions outside the grid answer
//! `None`/`false` instead of panicking, and placement/removal return a typed
//! error carrying the tile and a reason from a closed set.

use crate::id::EntityId;
use crate::kind::{EntityKind, Item};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Side length of the resource-free spawn square on large maps.
pub const SPAWN_SIZE: u32 = 10;

// ---------------------------------------------------------------------------
// Positions and directions
// ---------------------------------------------------------------------------

/// A tile coordinate.
///
/// Ordered row-major (`y`, then `x`). Transfer contention uses this order as
/// its tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
}

impl TilePos {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Convert floating coordinates, rejecting non-finite, fractional, or
    /// out-of-`i32` values.
    pub fn from_f64(x: f64, y: f64) -> Option<Self> {
        fn to_i32(v: f64) -> Option<i32> {
            if !v.is_finite() || v.fract() != 0.0 {
                return None;
            }
            if v < i32::MIN as f64 || v > i32::MAX as f64 {
                return None;
            }
            Some(v as i32)
        }
        Some(Self::new(to_i32(x)?, to_i32(y)?))
    }

    /// The neighboring tile in `dir`.
    pub fn step(self, dir: Direction) -> Self {
        let (dx, dy) = dir.offset();
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }
}

impl Ord for TilePos {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.y, self.x).cmp(&(other.y, other.x))
    }
}

impl PartialOrd for TilePos {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for TilePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Cardinal directions. Doubles as an entity's rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    North,
    East,
    South,
    West,
}

impl Direction {
    /// All four cardinal directions.
    pub fn all() -> [Direction; 4] {
        [
            Direction::North,
            Direction::East,
            Direction::South,
            Direction::West,
        ]
    }

    /// Offset for this direction. North is `-y`.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }

}

// ---------------------------------------------------------------------------
// Tiles
// ---------------------------------------------------------------------------

/// Static classification of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tile {
    #[default]
    Empty,
    Ore,
    Coal,
    Tree,
}

impl Tile {
    pub fn is_resource(self) -> bool {
        !matches!(self, Tile::Empty)
    }

    /// The item an extractor produces on this tile.
    pub fn yield_item(self) -> Option<Item> {
        match self {
            Tile::Empty => None,
            Tile::Ore => Some(Item::IronOre),
            Tile::Coal => Some(Item::Coal),
            Tile::Tree => Some(Item::Wood),
        }
    }
}

/// An axis-aligned rectangle of tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn contains(&self, pos: TilePos) -> bool {
        pos.x >= self.x
            && pos.y >= self.y
            && (pos.x as i64) < self.x as i64 + self.width as i64
            && (pos.y as i64) < self.y as i64 + self.height as i64
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// What occupies a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occupant {
    pub id: EntityId,
    pub kind: EntityKind,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Construction errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("invalid grid dimensions {width}x{height}: both must be positive")]
    InvalidDimensions { width: i64, height: i64 },
}

/// Closed set of placement and removal failure reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    OutOfBounds,
    Occupied,
    InvalidMinerOnResource,
    Empty,
    NonRemovableResource,
    UnregisteredKind,
    IdsExhausted,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::OutOfBounds => "out-of-bounds",
            FailureReason::Occupied => "occupied",
            FailureReason::InvalidMinerOnResource => "invalid-miner-on-resource",
            FailureReason::Empty => "empty",
            FailureReason::NonRemovableResource => "non-removable-resource",
            FailureReason::UnregisteredKind => "unregistered-kind",
            FailureReason::IdsExhausted => "ids-exhausted",
        }
    }
}

/// Why a placement was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    #[error("tile {pos} is out of bounds")]
    OutOfBounds { pos: TilePos },
    #[error("tile {pos} is already occupied ({occupant:?})")]
    Occupied { pos: TilePos, occupant: Occupant },
    #[error("{kind} requires a resource tile, {pos} has none")]
    InvalidMinerOnResource { pos: TilePos, kind: EntityKind },
    /// Integration error: the registry has no behavior for this kind.
    #[error("no behavior registered for {kind} (placing at {pos})")]
    Unregistered { pos: TilePos, kind: EntityKind },
    /// Every entity id has been handed out.
    #[error("no entity ids left (placing at {pos})")]
    IdsExhausted { pos: TilePos },
}

impl PlacementError {
    pub fn pos(&self) -> TilePos {
        match self {
            PlacementError::OutOfBounds { pos }
            | PlacementError::Occupied { pos, .. }
            | PlacementError::InvalidMinerOnResource { pos, .. }
            | PlacementError::Unregistered { pos, .. }
            | PlacementError::IdsExhausted { pos } => *pos,
        }
    }

    pub fn reason(&self) -> FailureReason {
        match self {
            PlacementError::OutOfBounds { .. } => FailureReason::OutOfBounds,
            PlacementError::Occupied { .. } => FailureReason::Occupied,
            PlacementError::InvalidMinerOnResource { .. } => {
                FailureReason::InvalidMinerOnResource
            }
            PlacementError::Unregistered { .. } => FailureReason::UnregisteredKind,
            PlacementError::IdsExhausted { .. } => FailureReason::IdsExhausted,
        }
    }
}

/// Why a removal was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemovalError {
    #[error("tile {pos} is out of bounds")]
    OutOfBounds { pos: TilePos },
    #[error("tile {pos} has nothing to remove")]
    Empty { pos: TilePos },
    #[error("tile {pos} is a bare {tile:?} resource and cannot be removed")]
    NonRemovableResource { pos: TilePos, tile: Tile },
}

impl RemovalError {
    pub fn pos(&self) -> TilePos {
        match self {
            RemovalError::OutOfBounds { pos }
            | RemovalError::Empty { pos }
            | RemovalError::NonRemovableResource { pos, .. } => *pos,
        }
    }

    pub fn reason(&self) -> FailureReason {
        match self {
            RemovalError::OutOfBounds { .. } => FailureReason::OutOfBounds,
            RemovalError::Empty { .. } => FailureReason::Empty,
            RemovalError::NonRemovableResource { .. } => FailureReason::NonRemovableResource,
        }
    }
}

/// A successful placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placed {
    pub pos: TilePos,
    pub occupant: Occupant,
}

/// A successful removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removed {
    pub pos: TilePos,
    pub occupant: Occupant,
}

// ---------------------------------------------------------------------------
// WorldGrid
// ---------------------------------------------------------------------------

/// Static map data plus occupancy.
#[derive(Debug, Clone)]
pub struct WorldGrid {
    width: u32,
    height: u32,
    seed: u32,
    tiles: Vec<Tile>,
    occupancy: BTreeMap<TilePos, Occupant>,
    resource_revision: u64,
    generated: bool,
    /// Tiles changed since construction, latest classification per tile.
    edits: BTreeMap<TilePos, Tile>,
}

impl WorldGrid {
    /// An all-empty grid. Map generation goes through
    /// [`generate`](crate::generate::generate) instead.
    pub fn empty(width: i64, height: i64, seed: u32) -> Result<Self, GridError> {
        let (w, h) = validate_dimensions(width, height)?;
        Ok(Self {
            width: w,
            height: h,
            seed,
            tiles: vec![Tile::Empty; w as usize * h as usize],
            occupancy: BTreeMap::new(),
            resource_revision: 0,
            generated: false,
            edits: BTreeMap::new(),
        })
    }

    /// Build a grid from generated tiles. `tiles` must be row-major and
    /// exactly `width * height` long.
    pub(crate) fn from_tiles(width: u32, height: u32, seed: u32, tiles: Vec<Tile>) -> Self {
        debug_assert_eq!(tiles.len(), width as usize * height as usize);
        Self {
            width,
            height,
            seed,
            tiles,
            occupancy: BTreeMap::new(),
            resource_revision: 0,
            generated: true,
            edits: BTreeMap::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The derived 32-bit seed this grid was generated from.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Advances whenever any tile's resource classification changes.
    pub fn resource_revision(&self) -> u64 {
        self.resource_revision
    }

    /// Whether the base map came from the generator (as opposed to
    /// [`WorldGrid::empty`]).
    pub fn is_generated(&self) -> bool {
        self.generated
    }

    /// Tiles whose classification changed after construction, row-major.
    /// Together with the seed and [`is_generated`](Self::is_generated) this
    /// reproduces the current map.
    pub fn tile_edits(&self) -> impl Iterator<Item = (TilePos, Tile)> + '_ {
        self.edits.iter().map(|(&p, &t)| (p, t))
    }

    /// The centered, resource-free spawn rectangle.
    pub fn spawn_rect(&self) -> Rect {
        spawn_rect(self.width, self.height)
    }

    // -- Tile queries --

    pub fn in_bounds(&self, pos: TilePos) -> bool {
        pos.x >= 0
            && pos.y >= 0
            && (pos.x as i64) < self.width as i64
            && (pos.y as i64) < self.height as i64
    }

    fn index(&self, pos: TilePos) -> Option<usize> {
        if !self.in_bounds(pos) {
            return None;
        }
        Some(pos.y as usize * self.width as usize + pos.x as usize)
    }

    /// Tile classification, `None` outside the grid.
    pub fn tile(&self, pos: TilePos) -> Option<Tile> {
        self.index(pos).map(|i| self.tiles[i])
    }

    pub fn is_resource(&self, pos: TilePos) -> bool {
        self.tile(pos).is_some_and(Tile::is_resource)
    }

    pub fn is_ore(&self, pos: TilePos) -> bool {
        self.tile(pos) == Some(Tile::Ore)
    }

    /// The resource on `pos`, `None` for empty or out-of-range tiles.
    pub fn resource_at(&self, pos: TilePos) -> Option<Tile> {
        self.tile(pos).filter(|t| t.is_resource())
    }

    /// Iterate every tile, row-major.
    pub fn cells(&self) -> impl Iterator<Item = (TilePos, Tile)> + '_ {
        let w = self.width as usize;
        self.tiles
            .iter()
            .enumerate()
            .map(move |(i, &t)| (TilePos::new((i % w) as i32, (i / w) as i32), t))
    }

    /// Number of resource tiles.
    pub fn resource_count(&self) -> usize {
        self.tiles.iter().filter(|t| t.is_resource()).count()
    }

    /// Overwrite a tile's classification. Returns `false` outside the grid.
    ///
    /// Every call is recorded as an edit, including one that leaves the tile
    /// as it was, so replaying the edit list rebuilds the same list.
    pub fn set_tile(&mut self, pos: TilePos, tile: Tile) -> bool {
        let Some(i) = self.index(pos) else {
            return false;
        };
        self.edits.insert(pos, tile);
        if self.tiles[i] != tile {
            self.tiles[i] = tile;
            self.resource_revision += 1;
        }
        true
    }

    /// Clear a resource tile (extraction). Returns the cleared classification.
    pub fn clear_resource(&mut self, pos: TilePos) -> Option<Tile> {
        let tile = self.resource_at(pos)?;
        self.set_tile(pos, Tile::Empty);
        Some(tile)
    }

    // -- Occupancy --

    pub fn occupant(&self, pos: TilePos) -> Option<Occupant> {
        self.occupancy.get(&pos).copied()
    }

    pub fn is_occupied(&self, pos: TilePos) -> bool {
        self.occupancy.contains_key(&pos)
    }

    /// All occupied tiles, row-major.
    pub fn occupants(&self) -> impl Iterator<Item = (TilePos, Occupant)> + '_ {
        self.occupancy.iter().map(|(&p, &o)| (p, o))
    }

    pub fn occupied_count(&self) -> usize {
        self.occupancy.len()
    }

    /// Check whether `kind` could be placed at `pos`.
    pub fn check_placement(&self, kind: EntityKind, pos: TilePos) -> Result<(), PlacementError> {
        let Some(tile) = self.tile(pos) else {
            return Err(PlacementError::OutOfBounds { pos });
        };
        if let Some(occupant) = self.occupant(pos) {
            return Err(PlacementError::Occupied { pos, occupant });
        }
        if kind.is_extractor() && !tile.is_resource() {
            return Err(PlacementError::InvalidMinerOnResource { pos, kind });
        }
        Ok(())
    }

    pub fn can_place(&self, kind: EntityKind, pos: TilePos) -> bool {
        self.check_placement(kind, pos).is_ok()
    }

    /// Occupy `pos` with entity `id` of `kind`. Validation happens before
    /// any write.
    pub fn place(
        &mut self,
        kind: EntityKind,
        pos: TilePos,
        id: EntityId,
    ) -> Result<Placed, PlacementError> {
        self.check_placement(kind, pos)?;
        let occupant = Occupant { id, kind };
        self.occupancy.insert(pos, occupant);
        Ok(Placed { pos, occupant })
    }

    /// Occupy `pos` when restoring a saved world. Skips the extractor rule,
    /// since a miner may sit on a tile it has already depleted.
    pub(crate) fn restore_occupant(
        &mut self,
        pos: TilePos,
        occupant: Occupant,
    ) -> Result<(), PlacementError> {
        if !self.in_bounds(pos) {
            return Err(PlacementError::OutOfBounds { pos });
        }
        if let Some(existing) = self.occupant(pos) {
            return Err(PlacementError::Occupied {
                pos,
                occupant: existing,
            });
        }
        self.occupancy.insert(pos, occupant);
        Ok(())
    }

    /// Clear the occupant at `pos`. Terrain is never removed.
    pub fn remove(&mut self, pos: TilePos) -> Result<Removed, RemovalError> {
        let Some(tile) = self.tile(pos) else {
            return Err(RemovalError::OutOfBounds { pos });
        };
        match self.occupancy.remove(&pos) {
            Some(occupant) => Ok(Removed { pos, occupant }),
            None if tile.is_resource() => Err(RemovalError::NonRemovableResource { pos, tile }),
            None => Err(RemovalError::Empty { pos }),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn validate_dimensions(width: i64, height: i64) -> Result<(u32, u32), GridError> {
    let valid = |v: i64| v > 0 && v <= u32::MAX as i64 && v <= i32::MAX as i64;
    if !valid(width) || !valid(height) {
        return Err(GridError::InvalidDimensions { width, height });
    }
    Ok((width as u32, height as u32))
}

/// Centered rectangle of `min(10, width) x min(10, height)`.
pub fn spawn_rect(width: u32, height: u32) -> Rect {
    let w = width.min(SPAWN_SIZE);
    let h = height.min(SPAWN_SIZE);
    Rect {
        x: ((width - w) / 2) as i32,
        y: ((height - h) / 2) as i32,
        width: w,
        height: h,
    }
}
