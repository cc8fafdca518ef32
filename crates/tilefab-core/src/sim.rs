//! The simulation: owns the world grid, the entity list and the tile item
//! layer, and advances them in fixed steps.
//!
//! # Step pipeline
//!
//! Each `step()` runs:
//! 1. **Begin** -- the transfer engine freezes the tick-start item layer
//! 2. **Update** -- every live entity, ascending id, updates exactly once and
//!    may queue transfer requests
//! 3. **Transfer** -- the queued requests are resolved as one batch
//! 4. **Commit** -- tick counters, simulated time and the revision advance
//!
//! Entities never touch each other directly. Whatever one entity does to the
//! item layer during the update phase is invisible to the tick-start view, so
//! the update order cannot leak into transfer outcomes.

use crate::behavior;
use crate::config::SimConfig;
use crate::fixed::Millis;
use crate::generate::generate;
use crate::grid::{
    Direction, GridError, Occupant, Placed, PlacementError, Removed, RemovalError, Tile, TilePos,
    WorldGrid,
};
use crate::id::EntityId;
use crate::kind::{Entity, EntityKind, EntityState, Item};
use crate::registry::{Recipe, Registry};
use crate::rng::WorldSeed;
use crate::transfer::{
    TransferEngine, TransferError, TransferOutcome, TransferRequest, TransferStats,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Player record
// ---------------------------------------------------------------------------

/// The player's position and fuel. Carried through saves; the simulation
/// itself never reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub x: f64,
    pub y: f64,
    pub fuel: f64,
}

impl PlayerState {
    /// Standing in the middle of the spawn rectangle, tank empty.
    pub fn at_spawn(grid: &WorldGrid) -> Self {
        let spawn = grid.spawn_rect();
        Self {
            x: spawn.x as f64 + spawn.width as f64 / 2.0,
            y: spawn.y as f64 + spawn.height as f64 / 2.0,
            fuel: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Step report
// ---------------------------------------------------------------------------

/// What one committed step did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    /// The tick that was committed.
    pub tick: u64,
    /// Entities whose behavior ran.
    pub updated: u32,
    pub transfers: TransferStats,
}

// ---------------------------------------------------------------------------
// Tick context
// ---------------------------------------------------------------------------

/// What a behavior may see and do while its entity updates.
///
/// Reads cover occupancy, terrain and both views of the item layer. Writes
/// are limited to the updating entity's own tile; anything that crosses a
/// tile boundary goes through [`request_transfer`](Self::request_transfer).
/// The entity being updated is not visible through
/// [`entity_at`](Self::entity_at).
pub struct TickContext<'a> {
    tick: u64,
    pos: TilePos,
    grid: &'a mut WorldGrid,
    entities: &'a BTreeMap<EntityId, Entity>,
    items: &'a mut TransferEngine,
    registry: &'a Registry,
    intents: &'a mut Vec<TransferRequest>,
}

impl<'a> TickContext<'a> {
    /// The tick being processed.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// The updating entity's tile.
    pub fn pos(&self) -> TilePos {
        self.pos
    }

    pub fn tile(&self, pos: TilePos) -> Option<Tile> {
        self.grid.tile(pos)
    }

    pub fn occupant(&self, pos: TilePos) -> Option<Occupant> {
        self.grid.occupant(pos)
    }

    /// Another entity by tile.
    pub fn entity_at(&self, pos: TilePos) -> Option<&Entity> {
        let occupant = self.grid.occupant(pos)?;
        self.entities.get(&occupant.id)
    }

    /// Zero or one entities on `pos`.
    pub fn entities_at(&self, pos: TilePos) -> impl Iterator<Item = &Entity> + '_ {
        self.entity_at(pos).into_iter()
    }

    pub fn recipe(&self, kind: EntityKind) -> Option<&'a Recipe> {
        self.registry.recipe(kind)
    }

    pub fn item_at(&self, pos: TilePos) -> Option<Item> {
        self.items.item_at(pos)
    }

    pub fn item_at_tick_start(&self, pos: TilePos) -> Option<Item> {
        self.items.item_at_tick_start(pos)
    }

    /// Whether the entity on `pos` would take `item`.
    pub fn accepts(&self, pos: TilePos, item: Item) -> bool {
        self.entity_at(pos)
            .is_some_and(|target| behavior::accepts(target, item, self.registry))
    }

    /// Whether the loose `item` on `pos` may be picked up.
    pub fn offers(&self, pos: TilePos, item: Item) -> bool {
        behavior::offers(self.entity_at(pos), item, self.registry)
    }

    /// The item an extractor on this tile would produce.
    pub fn resource_yield(&self) -> Option<Item> {
        self.grid.resource_at(self.pos).and_then(Tile::yield_item)
    }

    /// Put an item onto the own tile. Fails when the tile already holds one
    /// or received a transfer this tick.
    pub fn put_local(&mut self, item: Item) -> bool {
        self.items.put_local(self.pos, item)
    }

    /// Take the loose item off the own tile.
    pub fn take_local(&mut self) -> Option<Item> {
        self.items.take_local(self.pos)
    }

    /// Deplete the resource under the own tile.
    pub fn clear_resource(&mut self) -> Option<Tile> {
        self.grid.clear_resource(self.pos)
    }

    /// Queue a move for the transfer phase. Requests touching tiles outside
    /// the grid are dropped.
    pub fn request_transfer(&mut self, from: TilePos, to: TilePos) -> bool {
        if !self.grid.in_bounds(from) || !self.grid.in_bounds(to) {
            return false;
        }
        self.intents.push(TransferRequest::new(from, to));
        true
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// The live, mutable world.
#[derive(Debug)]
pub struct Simulation {
    grid: WorldGrid,
    registry: Registry,
    config: SimConfig,
    entities: BTreeMap<EntityId, Entity>,
    items: TransferEngine,
    next_id: EntityId,

    /// Index of the last committed step.
    tick: u64,
    /// Number of committed steps.
    tick_count: u64,
    elapsed_ms: Millis,
    /// Bumped on every committed step and every successful world edit.
    revision: u64,
    accumulator: Millis,
    paused: bool,

    player: PlayerState,
    inventory: BTreeMap<Item, u32>,
}

impl Simulation {
    pub fn new(grid: WorldGrid, registry: Registry, config: SimConfig) -> Self {
        let items = TransferEngine::for_grid(&grid);
        let player = PlayerState::at_spawn(&grid);
        Self {
            grid,
            registry,
            config,
            entities: BTreeMap::new(),
            items,
            next_id: EntityId(1),
            tick: 0,
            tick_count: 0,
            elapsed_ms: 0,
            revision: 0,
            accumulator: 0,
            paused: false,
            player,
            inventory: BTreeMap::new(),
        }
    }

    /// Generate a map and wrap it with the stock registry.
    pub fn generate(
        width: i64,
        height: i64,
        seed: impl Into<WorldSeed>,
        config: SimConfig,
    ) -> Result<Self, GridError> {
        let grid = generate(width, height, seed)?;
        let registry = Registry::with_defaults(&config);
        Ok(Self::new(grid, registry, config))
    }

    // -----------------------------------------------------------------------
    // Placement
    // -----------------------------------------------------------------------

    /// Whether `kind` could be placed at `pos`. Rotation never affects
    /// placement.
    pub fn can_place(&self, kind: EntityKind, pos: TilePos, _rot: Direction) -> bool {
        self.registry.is_registered(kind) && self.grid.can_place(kind, pos)
    }

    /// Place a new entity.
    pub fn add_entity(
        &mut self,
        kind: EntityKind,
        pos: TilePos,
        rot: Direction,
    ) -> Result<Placed, PlacementError> {
        self.grid.check_placement(kind, pos)?;
        let Some(behavior) = self.registry.behavior(kind) else {
            return Err(PlacementError::Unregistered { pos, kind });
        };
        let mut state = behavior.create();
        if !state.matches(kind) {
            log::warn!("behavior for {kind} created {state:?}; using the default shape");
            state = EntityState::default_for(kind);
        }

        let id = self.next_id;
        let Some(next_id) = id.next() else {
            return Err(PlacementError::IdsExhausted { pos });
        };
        let placed = self.grid.place(kind, pos, id)?;
        self.next_id = next_id;
        self.entities.insert(
            id,
            Entity {
                id,
                kind,
                pos,
                rot,
                state,
            },
        );
        self.revision += 1;
        log::debug!("placed {kind} {id} at {pos} facing {rot:?}");
        Ok(placed)
    }

    /// Remove the entity on `pos` together with any loose item on its tile.
    pub fn remove_entity(&mut self, pos: TilePos) -> Result<Removed, RemovalError> {
        let removed = self.grid.remove(pos)?;
        self.entities.remove(&removed.occupant.id);
        if let Some(item) = self.items.clear(pos) {
            log::debug!("dropped {} with {} {}", item.as_str(), removed.occupant.kind, removed.occupant.id);
        }
        self.revision += 1;
        log::debug!("removed {} {} from {pos}", removed.occupant.kind, removed.occupant.id);
        Ok(removed)
    }

    /// Put a loose item on an empty tile (player drop). It becomes movable
    /// at the next step.
    pub fn put_item(&mut self, pos: TilePos, item: Item) -> bool {
        let placed = self.items.put_local(pos, item);
        if placed {
            self.revision += 1;
        }
        placed
    }

    // -----------------------------------------------------------------------
    // Direct transfers
    // -----------------------------------------------------------------------

    /// Resolve one transfer between steps. Eligibility is judged against the
    /// layer as the last step committed it.
    pub fn transfer(&mut self, from: TilePos, to: TilePos) -> Result<TransferOutcome, TransferError> {
        let outcome = self.items.transfer(from, to)?;
        if outcome.is_moved() {
            self.revision += 1;
        }
        Ok(outcome)
    }

    /// Resolve a batch of transfers between steps.
    pub fn transfer_many(
        &mut self,
        requests: &[TransferRequest],
    ) -> Result<Vec<TransferOutcome>, TransferError> {
        let outcomes = self.items.transfer_many(requests)?;
        if outcomes.iter().any(TransferOutcome::is_moved) {
            self.revision += 1;
        }
        Ok(outcomes)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn has_entity_at(&self, pos: TilePos) -> bool {
        self.grid.is_occupied(pos)
    }

    pub fn is_resource_tile(&self, pos: TilePos) -> bool {
        self.grid.is_resource(pos)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_at(&self, pos: TilePos) -> Option<&Entity> {
        let occupant = self.grid.occupant(pos)?;
        self.entities.get(&occupant.id)
    }

    /// Zero or one entities on `pos`.
    pub fn entities_at(&self, pos: TilePos) -> impl Iterator<Item = &Entity> + '_ {
        self.entity_at(pos).into_iter()
    }

    /// All live entities, ascending id.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// The loose item on `pos`.
    pub fn item_at(&self, pos: TilePos) -> Option<Item> {
        self.items.item_at(pos)
    }

    /// All loose items, row-major.
    pub fn items(&self) -> impl Iterator<Item = (TilePos, Item)> + '_ {
        self.items.items()
    }

    pub fn grid(&self) -> &WorldGrid {
        &self.grid
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn width(&self) -> u32 {
        self.grid.width()
    }

    pub fn height(&self) -> u32 {
        self.grid.height()
    }

    pub fn tile_size(&self) -> u32 {
        self.config.tile_size
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn elapsed_ms(&self) -> Millis {
        self.elapsed_ms
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn next_entity_id(&self) -> EntityId {
        self.next_id
    }

    // -----------------------------------------------------------------------
    // Player
    // -----------------------------------------------------------------------

    pub fn player(&self) -> &PlayerState {
        &self.player
    }

    pub fn set_player(&mut self, player: PlayerState) {
        self.player = player;
    }

    pub fn inventory(&self) -> &BTreeMap<Item, u32> {
        &self.inventory
    }

    pub fn add_to_inventory(&mut self, item: Item, count: u32) {
        let slot = self.inventory.entry(item).or_insert(0);
        *slot = slot.saturating_add(count);
    }

    /// Remove `count` of `item`. Nothing is removed unless all of it is there.
    pub fn take_from_inventory(&mut self, item: Item, count: u32) -> bool {
        let Some(have) = self.inventory.get_mut(&item) else {
            return count == 0;
        };
        if *have < count {
            return false;
        }
        *have -= count;
        if *have == 0 {
            self.inventory.remove(&item);
        }
        true
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// While paused, `step()` and `advance()` are no-ops. Placement still
    /// works.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // -----------------------------------------------------------------------
    // Advance
    // -----------------------------------------------------------------------

    /// Accumulate host time and run as many fixed steps as fit, carrying the
    /// remainder forward. Returns the number of steps run.
    pub fn advance(&mut self, frame_ms: Millis) -> u64 {
        if self.paused {
            return 0;
        }
        self.accumulator = self.accumulator.saturating_add(frame_ms);
        let step = self.config.step();
        let mut steps = 0;
        while self.accumulator >= step {
            self.accumulator -= step;
            self.step_internal();
            steps += 1;
        }
        steps
    }

    /// Run exactly one step. `None` while paused.
    pub fn step(&mut self) -> Option<StepReport> {
        if self.paused {
            return None;
        }
        Some(self.step_internal())
    }

    /// Run `n` steps, returning how many ran.
    pub fn run(&mut self, n: u64) -> u64 {
        (0..n).take_while(|_| self.step().is_some()).count() as u64
    }

    // -----------------------------------------------------------------------
    // Internal: single step
    // -----------------------------------------------------------------------

    fn step_internal(&mut self) -> StepReport {
        let dt = self.config.step();
        let tick = self.tick.saturating_add(1);

        // Phase 1: Begin -- freeze the tick-start item layer.
        self.items.begin_tick();

        // Phase 2: Update -- each entity once, ascending id.
        let mut intents = Vec::new();
        let updated = self.phase_update(tick, dt, &mut intents);

        // Phase 3: Transfer -- resolve every queued request together.
        let transfers = self.phase_transfer(&intents);

        // Phase 4: Commit.
        self.tick = tick;
        self.tick_count = self.tick_count.saturating_add(1);
        self.elapsed_ms = self.elapsed_ms.saturating_add(dt);
        self.revision = self.revision.saturating_add(1);
        self.items.begin_tick();

        log::trace!(
            "tick {tick}: {updated} updated, {} moved, {} rejected",
            transfers.moved,
            transfers.empty_source + transfers.occupied_destination
        );
        StepReport {
            tick,
            updated,
            transfers,
        }
    }

    fn phase_update(&mut self, tick: u64, dt: Millis, intents: &mut Vec<TransferRequest>) -> u32 {
        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        let mut updated = 0;
        for id in ids {
            let Some(mut entity) = self.entities.remove(&id) else {
                continue;
            };
            match self.registry.behavior(entity.kind) {
                Some(behavior) => {
                    let mut ctx = TickContext {
                        tick,
                        pos: entity.pos,
                        grid: &mut self.grid,
                        entities: &self.entities,
                        items: &mut self.items,
                        registry: &self.registry,
                        intents: &mut *intents,
                    };
                    behavior.update(&mut entity, dt, &mut ctx);
                    updated += 1;
                }
                None => log::warn!("no behavior for {} {id}; skipping", entity.kind),
            }
            self.entities.insert(id, entity);
        }
        updated
    }

    fn phase_transfer(&mut self, intents: &[TransferRequest]) -> TransferStats {
        match self.items.transfer_many(intents) {
            Ok(outcomes) => TransferStats::tally(&outcomes),
            Err(e) => {
                log::warn!("discarding transfer batch: {e}");
                TransferStats::default()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Restore
    // -----------------------------------------------------------------------

    /// Reassemble a simulation from already-validated parts.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        grid: WorldGrid,
        registry: Registry,
        config: SimConfig,
        entities: Vec<Entity>,
        items: Vec<(TilePos, Item)>,
        next_id: EntityId,
        clock: (u64, u64, Millis),
        paused: bool,
        player: PlayerState,
        inventory: BTreeMap<Item, u32>,
    ) -> Self {
        let mut sim = Self::new(grid, registry, config);
        sim.entities = entities.into_iter().map(|e| (e.id, e)).collect();
        sim.items.load_items(items);
        sim.next_id = next_id;
        (sim.tick, sim.tick_count, sim.elapsed_ms) = clock;
        sim.paused = paused;
        sim.player = player;
        sim.inventory = inventory;
        sim
    }

    #[cfg(test)]
    pub(crate) fn grid_mut(&mut self) -> &mut WorldGrid {
        &mut self.grid
    }
}
