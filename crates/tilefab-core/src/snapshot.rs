//! Read-only, versioned snapshots of a simulation for renderers.
//!
//! A [`SnapshotPublisher`] keeps one cache per attached source in a slotmap
//! arena. `publish` reads the source through the [`SnapshotSource`] trait and
//! either returns the previous `Arc<Snapshot>` unchanged (nothing observable
//! moved) or builds a fresh one. Snapshots are immutable values behind `Arc`,
//! so a reader holding one never sees later steps and can never reach the
//! live simulation.

use crate::fixed::{clamp_unit, fixed64_to_f64};
use crate::grid::{Direction, Tile, TilePos, WorldGrid};
use crate::id::{EntityId, SourceHandle};
use crate::kind::{Entity, EntityKind, EntityState, InserterPhase, Item};
use crate::sim::Simulation;
use serde::Serialize;
use slotmap::SlotMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Source seam
// ---------------------------------------------------------------------------

/// Raw clock values as a source reports them. The publisher clamps them to
/// non-negative integers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockReading {
    pub tick: i64,
    pub tick_count: i64,
    pub elapsed_ms: f64,
}

/// Anything a snapshot can be taken of.
pub trait SnapshotSource {
    fn world(&self) -> &WorldGrid;

    fn clock(&self) -> ClockReading;

    /// A counter that changes whenever anything observable changes.
    fn probe(&self) -> u64;

    fn paused(&self) -> bool;

    /// Live entities in any order.
    fn live_entities(&self) -> Vec<&Entity>;

    /// The loose item on `pos`.
    fn loose_item(&self, pos: TilePos) -> Option<Item>;

    /// The item a crafter kind produces, if it runs a recipe.
    fn recipe_output(&self, kind: EntityKind) -> Option<Item>;
}

fn saturating_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

impl SnapshotSource for Simulation {
    fn world(&self) -> &WorldGrid {
        self.grid()
    }

    fn clock(&self) -> ClockReading {
        ClockReading {
            tick: saturating_i64(self.tick()),
            tick_count: saturating_i64(self.tick_count()),
            elapsed_ms: self.elapsed_ms() as f64,
        }
    }

    fn probe(&self) -> u64 {
        self.revision()
    }

    fn paused(&self) -> bool {
        self.is_paused()
    }

    fn live_entities(&self) -> Vec<&Entity> {
        self.entities().collect()
    }

    fn loose_item(&self, pos: TilePos) -> Option<Item> {
        self.item_at(pos)
    }

    fn recipe_output(&self, kind: EntityKind) -> Option<Item> {
        self.registry().recipe(kind).map(|r| r.output)
    }
}

// ---------------------------------------------------------------------------
// Snapshot values
// ---------------------------------------------------------------------------

/// Resource tile coordinates by kind, row-major.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceCells {
    ore: Vec<TilePos>,
    coal: Vec<TilePos>,
    wood: Vec<TilePos>,
}

impl ResourceCells {
    fn scan(grid: &WorldGrid) -> Self {
        let mut cells = Self::default();
        for (pos, tile) in grid.cells() {
            match tile {
                Tile::Ore => cells.ore.push(pos),
                Tile::Coal => cells.coal.push(pos),
                Tile::Tree => cells.wood.push(pos),
                Tile::Empty => {}
            }
        }
        cells
    }

    pub fn ore(&self) -> &[TilePos] {
        &self.ore
    }

    pub fn coal(&self) -> &[TilePos] {
        &self.coal
    }

    pub fn wood(&self) -> &[TilePos] {
        &self.wood
    }

    pub fn len(&self) -> usize {
        self.ore.len() + self.coal.len() + self.wood.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Kind-specific view of one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum KindView {
    Belt {
        items: Vec<Item>,
        accepts: Option<Item>,
    },
    Miner {
        output_ready: bool,
        just_extracted: bool,
    },
    Inserter {
        phase: InserterPhase,
        holding: Option<Item>,
    },
    Crafter {
        has_input: bool,
        has_output: bool,
        progress: f64,
    },
}

impl KindView {
    /// Safe defaults for a kind whose state could not be read.
    fn fallback(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Belt => KindView::Belt {
                items: Vec::new(),
                accepts: None,
            },
            EntityKind::Miner => KindView::Miner {
                output_ready: false,
                just_extracted: false,
            },
            EntityKind::Inserter => KindView::Inserter {
                phase: InserterPhase::Idle,
                holding: None,
            },
            EntityKind::Furnace | EntityKind::Assembler => KindView::Crafter {
                has_input: false,
                has_output: false,
                progress: 0.0,
            },
        }
    }
}

/// One entity as readers see it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySnapshot {
    id: EntityId,
    kind: EntityKind,
    pos: TilePos,
    rot: Direction,
    view: KindView,
}

impl EntitySnapshot {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn pos(&self) -> TilePos {
        self.pos
    }

    pub fn rot(&self) -> Direction {
        self.rot
    }

    pub fn view(&self) -> &KindView {
        &self.view
    }
}

/// An immutable projection of a source at one moment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    revision: u64,
    tick: u64,
    tick_count: u64,
    elapsed_ms: u64,
    paused: bool,
    width: u32,
    height: u32,
    entities: Vec<EntitySnapshot>,
    resources: Arc<ResourceCells>,
}

impl Snapshot {
    /// Advances only when the observed tick advances.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Entities, ascending id.
    pub fn entities(&self) -> &[EntitySnapshot] {
        &self.entities
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.entities
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|i| &self.entities[i])
    }

    pub fn resources(&self) -> &Arc<ResourceCells> {
        &self.resources
    }
}

const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Snapshot>();
    assert::<ResourceCells>();
};

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("snapshot source handle is not attached")]
    UnknownHandle,
}

/// Everything whose change forces a fresh snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Signature {
    width: u32,
    height: u32,
    tick: u64,
    tick_count: u64,
    elapsed_ms: u64,
    probe: u64,
    paused: bool,
}

/// Identifies one version of a grid's resource layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResourceKey {
    width: u32,
    height: u32,
    seed: u32,
    revision: u64,
}

impl ResourceKey {
    fn of(grid: &WorldGrid) -> Self {
        Self {
            width: grid.width(),
            height: grid.height(),
            seed: grid.seed(),
            revision: grid.resource_revision(),
        }
    }
}

/// Per-source publishing state.
#[derive(Debug, Default)]
struct PublishCache {
    tick: u64,
    tick_count: u64,
    elapsed_ms: u64,
    probe: u64,
    revision: u64,
    signature: Option<Signature>,
    last: Option<Arc<Snapshot>>,
    resources: Option<(ResourceKey, Arc<ResourceCells>)>,
}

impl PublishCache {
    fn resources_for(&mut self, grid: &WorldGrid) -> Arc<ResourceCells> {
        let key = ResourceKey::of(grid);
        if let Some((cached, cells)) = &self.resources {
            if *cached == key {
                return Arc::clone(cells);
            }
        }
        let cells = Arc::new(ResourceCells::scan(grid));
        self.resources = Some((key, Arc::clone(&cells)));
        cells
    }
}

fn clamp_count(v: i64) -> u64 {
    v.max(0) as u64
}

fn clamp_millis(v: f64) -> u64 {
    if v.is_finite() && v > 0.0 {
        v.floor() as u64
    } else {
        0
    }
}

/// Never let a counter fall below what was already published.
fn guard(name: &str, proposed: u64, committed: u64) -> u64 {
    if proposed < committed {
        log::warn!("{name} went backwards ({proposed} < {committed}); keeping {committed}");
        committed
    } else {
        proposed
    }
}

fn project<S: SnapshotSource + ?Sized>(entity: &Entity, source: &S) -> KindView {
    let loose = source.loose_item(entity.pos);
    match (entity.kind, &entity.state) {
        (EntityKind::Belt, EntityState::Belt(belt)) => KindView::Belt {
            items: loose.into_iter().collect(),
            accepts: belt.accepts,
        },
        (EntityKind::Miner, EntityState::Miner(miner)) => KindView::Miner {
            output_ready: loose.is_some(),
            just_extracted: miner.just_extracted,
        },
        (EntityKind::Inserter, EntityState::Inserter(inserter)) => KindView::Inserter {
            phase: inserter.phase,
            holding: loose,
        },
        (EntityKind::Furnace | EntityKind::Assembler, EntityState::Crafter(crafter)) => {
            let finished_on_tile =
                loose.is_some() && loose == source.recipe_output(entity.kind);
            KindView::Crafter {
                has_input: !crafter.input.is_empty(),
                has_output: crafter.output.is_some() || finished_on_tile,
                progress: fixed64_to_f64(clamp_unit(crafter.progress)),
            }
        }
        (kind, state) => {
            log::warn!("{kind} {} carries mismatched state {state:?}; projecting defaults", entity.id);
            KindView::fallback(kind)
        }
    }
}

/// Cache arena of snapshot sources.
#[derive(Debug, Default)]
pub struct SnapshotPublisher {
    caches: SlotMap<SourceHandle, PublishCache>,
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a new source.
    pub fn attach(&mut self) -> SourceHandle {
        self.caches.insert(PublishCache::default())
    }

    /// Drop a source's cache. Returns whether the handle was attached.
    pub fn detach(&mut self, handle: SourceHandle) -> bool {
        self.caches.remove(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// The current snapshot of `source`. Returns the previous `Arc` when
    /// nothing observable changed since the last publish for `handle`.
    pub fn publish<S: SnapshotSource + ?Sized>(
        &mut self,
        handle: SourceHandle,
        source: &S,
    ) -> Result<Arc<Snapshot>, PublishError> {
        let cache = self
            .caches
            .get_mut(handle)
            .ok_or(PublishError::UnknownHandle)?;

        let grid = source.world();
        let reading = source.clock();
        let proposed_tick = clamp_count(reading.tick);
        let proposed_count = clamp_count(reading.tick_count);
        let proposed_probe = source.probe();
        // A reading older than the last commit is dropped whole.
        let stale = proposed_tick < cache.tick
            || proposed_count < cache.tick_count
            || proposed_probe < cache.probe;
        let tick = guard("tick", proposed_tick, cache.tick);
        let tick_count = guard("tick_count", proposed_count, cache.tick_count);
        let probe = guard("probe", proposed_probe, cache.probe);
        let elapsed_ms = if stale {
            cache.elapsed_ms
        } else {
            guard("elapsed_ms", clamp_millis(reading.elapsed_ms), cache.elapsed_ms)
        };
        let signature = Signature {
            width: grid.width(),
            height: grid.height(),
            tick,
            tick_count,
            elapsed_ms,
            probe,
            paused: source.paused(),
        };

        if cache.signature == Some(signature) {
            if let Some(last) = &cache.last {
                return Ok(Arc::clone(last));
            }
        }

        if tick > cache.tick {
            cache.revision += 1;
        }
        cache.tick = tick;
        cache.tick_count = tick_count;
        cache.elapsed_ms = elapsed_ms;
        cache.probe = probe;

        let mut live = source.live_entities();
        live.sort_by_key(|e| e.id);
        let entities = live
            .into_iter()
            .map(|e| EntitySnapshot {
                id: e.id,
                kind: e.kind,
                pos: e.pos,
                rot: e.rot,
                view: project(e, source),
            })
            .collect();

        let snapshot = Arc::new(Snapshot {
            revision: cache.revision,
            tick,
            tick_count,
            elapsed_ms: signature.elapsed_ms,
            paused: signature.paused,
            width: signature.width,
            height: signature.height,
            entities,
            resources: cache.resources_for(grid),
        });
        cache.signature = Some(signature);
        cache.last = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::fixed::Fixed64;
    use crate::kind::{BeltState, CrafterState, InserterState, MinerState};
    use crate::registry::Registry;
    use std::collections::BTreeMap;

    /// A hand-driven source.
    struct Fake {
        grid: WorldGrid,
        clock: ClockReading,
        probe: u64,
        paused: bool,
        entities: Vec<Entity>,
        items: BTreeMap<TilePos, Item>,
    }

    impl Fake {
        fn new() -> Self {
            Self {
                grid: WorldGrid::empty(8, 6, 7).unwrap(),
                clock: ClockReading {
                    tick: 0,
                    tick_count: 0,
                    elapsed_ms: 0.0,
                },
                probe: 0,
                paused: false,
                entities: Vec::new(),
                items: BTreeMap::new(),
            }
        }

        fn set_tick(&mut self, tick: i64) {
            self.clock.tick = tick;
            self.clock.tick_count = tick;
            self.clock.elapsed_ms = tick as f64 * 50.0;
        }

        fn add(&mut self, id: u64, kind: EntityKind, pos: TilePos, state: EntityState) {
            self.entities.push(Entity {
                id: EntityId(id),
                kind,
                pos,
                rot: Direction::East,
                state,
            });
        }
    }

    impl SnapshotSource for Fake {
        fn world(&self) -> &WorldGrid {
            &self.grid
        }

        fn clock(&self) -> ClockReading {
            self.clock
        }

        fn probe(&self) -> u64 {
            self.probe
        }

        fn paused(&self) -> bool {
            self.paused
        }

        fn live_entities(&self) -> Vec<&Entity> {
            self.entities.iter().collect()
        }

        fn loose_item(&self, pos: TilePos) -> Option<Item> {
            self.items.get(&pos).copied()
        }

        fn recipe_output(&self, kind: EntityKind) -> Option<Item> {
            match kind {
                EntityKind::Furnace => Some(Item::IronPlate),
                EntityKind::Assembler => Some(Item::Gear),
                _ => None,
            }
        }
    }

    // -----------------------------------------------------------------------
    // Identity and versioning
    // -----------------------------------------------------------------------

    #[test]
    fn unchanged_source_returns_same_arc() {
        let mut publisher = SnapshotPublisher::new();
        let handle = publisher.attach();
        let source = Fake::new();
        let a = publisher.publish(handle, &source).unwrap();
        let b = publisher.publish(handle, &source).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn advancing_tick_builds_new_snapshot() {
        let mut publisher = SnapshotPublisher::new();
        let handle = publisher.attach();
        let mut source = Fake::new();
        let a = publisher.publish(handle, &source).unwrap();
        source.set_tick(1);
        let b = publisher.publish(handle, &source).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(b.tick() > a.tick());
        assert!(b.tick_count() > a.tick_count());
        assert!(b.elapsed_ms() > a.elapsed_ms());
        assert_eq!(b.revision(), a.revision() + 1);
    }

    #[test]
    fn probe_change_without_tick_keeps_revision() {
        let mut publisher = SnapshotPublisher::new();
        let handle = publisher.attach();
        let mut source = Fake::new();
        let a = publisher.publish(handle, &source).unwrap();
        source.probe = 1;
        source.add(1, EntityKind::Belt, TilePos::new(1, 1), EntityState::Belt(BeltState::default()));
        let b = publisher.publish(handle, &source).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.revision(), a.revision());
        assert_eq!(b.entities().len(), 1);
    }

    #[test]
    fn pause_flag_is_observed() {
        let mut publisher = SnapshotPublisher::new();
        let handle = publisher.attach();
        let mut source = Fake::new();
        let a = publisher.publish(handle, &source).unwrap();
        source.paused = true;
        let b = publisher.publish(handle, &source).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(b.paused());
    }

    #[test]
    fn regressing_clock_is_held() {
        let mut publisher = SnapshotPublisher::new();
        let handle = publisher.attach();
        let mut source = Fake::new();
        source.set_tick(5);
        source.probe = 9;
        let a = publisher.publish(handle, &source).unwrap();
        source.set_tick(3);
        source.probe = 2;
        let b = publisher.publish(handle, &source).unwrap();
        assert_eq!(b.tick(), 5);
        assert_eq!(b.tick_count(), 5);
        assert_eq!(b.elapsed_ms(), 250);
        assert_eq!(b.revision(), a.revision());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn stale_reading_cannot_move_elapsed_time() {
        let mut publisher = SnapshotPublisher::new();
        let handle = publisher.attach();
        let mut source = Fake::new();
        source.set_tick(5);
        let a = publisher.publish(handle, &source).unwrap();

        // Older tick with a later clock: the whole reading is ignored.
        source.set_tick(3);
        source.clock.elapsed_ms = 900.0;
        let b = publisher.publish(handle, &source).unwrap();
        assert_eq!((b.tick(), b.elapsed_ms()), (5, 250));
        assert!(Arc::ptr_eq(&a, &b));

        // Same tick, earlier clock: elapsed holds.
        source.set_tick(5);
        source.clock.elapsed_ms = 100.0;
        let c = publisher.publish(handle, &source).unwrap();
        assert_eq!(c.elapsed_ms(), 250);

        source.set_tick(6);
        let d = publisher.publish(handle, &source).unwrap();
        assert_eq!((d.tick(), d.elapsed_ms()), (6, 300));
    }

    #[test]
    fn raw_counters_are_clamped() {
        let mut publisher = SnapshotPublisher::new();
        let handle = publisher.attach();
        let mut source = Fake::new();
        source.clock = ClockReading {
            tick: -4,
            tick_count: -1,
            elapsed_ms: f64::NAN,
        };
        let a = publisher.publish(handle, &source).unwrap();
        assert_eq!((a.tick(), a.tick_count(), a.elapsed_ms()), (0, 0, 0));

        source.clock = ClockReading {
            tick: 2,
            tick_count: 2,
            elapsed_ms: 99.9,
        };
        let b = publisher.publish(handle, &source).unwrap();
        assert_eq!(b.elapsed_ms(), 99);

        source.clock.elapsed_ms = -5.0;
        let c = publisher.publish(handle, &source).unwrap();
        assert_eq!(c.elapsed_ms(), 99);
    }

    // -----------------------------------------------------------------------
    // Handles
    // -----------------------------------------------------------------------

    #[test]
    fn unknown_and_detached_handles_fail() {
        let mut publisher = SnapshotPublisher::new();
        let handle = publisher.attach();
        let source = Fake::new();
        assert!(publisher.detach(handle));
        assert!(!publisher.detach(handle));
        assert_eq!(
            publisher.publish(handle, &source).unwrap_err(),
            PublishError::UnknownHandle
        );
        assert!(publisher.is_empty());
    }

    #[test]
    fn handles_keep_independent_caches() {
        let mut publisher = SnapshotPublisher::new();
        let first = publisher.attach();
        let second = publisher.attach();
        let mut source = Fake::new();
        source.set_tick(4);
        let a = publisher.publish(first, &source).unwrap();
        let b = publisher.publish(second, &source).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.as_ref(), b.as_ref());
        assert_eq!(publisher.len(), 2);
    }

    // -----------------------------------------------------------------------
    // Projection
    // -----------------------------------------------------------------------

    #[test]
    fn entities_are_sorted_by_id() {
        let mut publisher = SnapshotPublisher::new();
        let handle = publisher.attach();
        let mut source = Fake::new();
        for id in [7, 2, 30, 11] {
            source.add(id, EntityKind::Belt, TilePos::new(id as i32 % 8, 0), EntityState::Belt(BeltState::default()));
        }
        let snap = publisher.publish(handle, &source).unwrap();
        let ids: Vec<_> = snap.entities().iter().map(|e| e.id().0).collect();
        assert_eq!(ids, vec![2, 7, 11, 30]);
        assert_eq!(snap.entity(EntityId(11)).unwrap().id(), EntityId(11));
        assert!(snap.entity(EntityId(3)).is_none());
    }

    #[test]
    fn per_kind_views() {
        let mut publisher = SnapshotPublisher::new();
        let handle = publisher.attach();
        let mut source = Fake::new();
        source.add(1, EntityKind::Belt, TilePos::new(0, 0), EntityState::Belt(BeltState { accepts: Some(Item::Coal) }));
        source.add(
            2,
            EntityKind::Miner,
            TilePos::new(1, 0),
            EntityState::Miner(MinerState { timer_ms: 0, just_extracted: true }),
        );
        source.add(
            3,
            EntityKind::Inserter,
            TilePos::new(2, 0),
            EntityState::Inserter(InserterState { phase: InserterPhase::Carrying, timer_ms: 100 }),
        );
        source.add(
            4,
            EntityKind::Furnace,
            TilePos::new(3, 0),
            EntityState::Crafter(CrafterState {
                input: vec![Item::IronOre],
                output: None,
                progress: Fixed64::from_num(3),
            }),
        );
        source.items.insert(TilePos::new(0, 0), Item::Coal);
        source.items.insert(TilePos::new(1, 0), Item::IronOre);
        source.items.insert(TilePos::new(2, 0), Item::Wood);
        source.items.insert(TilePos::new(3, 0), Item::IronPlate);

        let snap = publisher.publish(handle, &source).unwrap();
        let views: Vec<_> = snap.entities().iter().map(|e| e.view().clone()).collect();
        assert_eq!(
            views[0],
            KindView::Belt { items: vec![Item::Coal], accepts: Some(Item::Coal) }
        );
        assert_eq!(
            views[1],
            KindView::Miner { output_ready: true, just_extracted: true }
        );
        assert_eq!(
            views[2],
            KindView::Inserter { phase: InserterPhase::Carrying, holding: Some(Item::Wood) }
        );
        assert_eq!(
            views[3],
            KindView::Crafter { has_input: true, has_output: true, progress: 1.0 }
        );
    }

    #[test]
    fn mismatched_state_projects_defaults() {
        let mut publisher = SnapshotPublisher::new();
        let handle = publisher.attach();
        let mut source = Fake::new();
        source.add(1, EntityKind::Assembler, TilePos::new(0, 0), EntityState::Belt(BeltState::default()));
        source.items.insert(TilePos::new(0, 0), Item::Gear);
        let snap = publisher.publish(handle, &source).unwrap();
        assert_eq!(
            snap.entities()[0].view(),
            &KindView::Crafter { has_input: false, has_output: false, progress: 0.0 }
        );
    }

    #[test]
    fn view_serializes_with_tag() {
        let view = KindView::Inserter {
            phase: InserterPhase::Dropping,
            holding: None,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["view"], "inserter");
        assert_eq!(json["phase"], "dropping");
    }

    // -----------------------------------------------------------------------
    // Resource cache
    // -----------------------------------------------------------------------

    #[test]
    fn resource_cells_reused_until_revision_changes() {
        let mut publisher = SnapshotPublisher::new();
        let handle = publisher.attach();
        let mut source = Fake::new();
        source.grid.set_tile(TilePos::new(6, 5), Tile::Ore);
        source.grid.set_tile(TilePos::new(0, 5), Tile::Tree);
        let a = publisher.publish(handle, &source).unwrap();
        assert_eq!(a.resources().ore(), &[TilePos::new(6, 5)]);
        assert_eq!(a.resources().wood(), &[TilePos::new(0, 5)]);
        assert!(a.resources().coal().is_empty());

        source.set_tick(1);
        let b = publisher.publish(handle, &source).unwrap();
        assert!(Arc::ptr_eq(a.resources(), b.resources()));

        source.grid.clear_resource(TilePos::new(6, 5));
        source.set_tick(2);
        let c = publisher.publish(handle, &source).unwrap();
        assert!(!Arc::ptr_eq(b.resources(), c.resources()));
        assert!(c.resources().ore().is_empty());
        assert_eq!(c.resources().len(), 1);
    }

    // -----------------------------------------------------------------------
    // Against a live simulation
    // -----------------------------------------------------------------------

    #[test]
    fn published_snapshot_is_unaffected_by_later_steps() {
        let config = SimConfig::default();
        let grid = WorldGrid::empty(6, 6, 1).unwrap();
        let mut sim = Simulation::new(grid, Registry::with_defaults(&config), config);
        sim.add_entity(EntityKind::Belt, TilePos::new(0, 0), Direction::East).unwrap();
        sim.add_entity(EntityKind::Belt, TilePos::new(1, 0), Direction::East).unwrap();
        sim.put_item(TilePos::new(0, 0), Item::IronOre);

        let mut publisher = SnapshotPublisher::new();
        let handle = publisher.attach();
        let before = publisher.publish(handle, &sim).unwrap();
        let frozen = (*before).clone();

        sim.step();
        let after = publisher.publish(handle, &sim).unwrap();

        assert_eq!(*before, frozen);
        assert_eq!(before.tick(), 0);
        assert_eq!(after.tick(), 1);
        assert_eq!(
            after.entities()[1].view(),
            &KindView::Belt { items: vec![Item::IronOre], accepts: None }
        );
        assert!(Arc::ptr_eq(&after, &publisher.publish(handle, &sim).unwrap()));
    }
}
