//! Stock behaviors for the five entity kinds, plus the acceptance and
//! offering rules they share.
//!
//! Every behavior reads the tile item layer through [`TickContext`] and only
//! moves items by requesting transfers, so all movement in a tick is resolved
//! together after the update phase.

use crate::fixed::{Fixed64, Millis, ratio};
use crate::grid::TilePos;
use crate::kind::{CrafterState, Entity, EntityKind, EntityState, InserterPhase, InserterState, Item};
use crate::registry::{Behavior, Recipe, Registry};
use crate::sim::TickContext;

// ---------------------------------------------------------------------------
// Acceptance and offering
// ---------------------------------------------------------------------------

/// Whether `target` takes `item` pushed onto its tile.
///
/// Belts take anything matching their filter, crafters take recipe inputs
/// while their buffer has room. Miners and inserters never take pushes.
pub fn accepts(target: &Entity, item: Item, registry: &Registry) -> bool {
    match (target.kind, &target.state) {
        (EntityKind::Belt, EntityState::Belt(belt)) => belt.accepts.is_none_or(|f| f == item),
        (EntityKind::Furnace | EntityKind::Assembler, EntityState::Crafter(crafter)) => registry
            .recipe(target.kind)
            .is_some_and(|r| r.wants(item, &crafter.input)),
        _ => false,
    }
}

/// Whether the loose `item` on a tile may be picked up from it.
///
/// Crafters only give up their recipe output. Any other tile, including one
/// with no entity, offers whatever it holds.
pub fn offers(source: Option<&Entity>, item: Item, registry: &Registry) -> bool {
    match source {
        Some(e) if e.kind.is_crafter() => registry.recipe(e.kind).is_some_and(|r| r.output == item),
        _ => true,
    }
}

fn mismatched(entity: &Entity) {
    log::warn!(
        "{} {} carries state {:?}; skipping update",
        entity.kind,
        entity.id,
        entity.state
    );
}

/// Request `from -> to` when `from` held `item` at tick start, still holds
/// it, and the entity on `to` accepts it.
fn push_if_accepted(ctx: &mut TickContext<'_>, from: TilePos, to: TilePos) -> bool {
    let Some(item) = ctx.item_at_tick_start(from) else {
        return false;
    };
    if ctx.item_at(from) != Some(item) || !ctx.accepts(to, item) {
        return false;
    }
    ctx.request_transfer(from, to)
}

// ---------------------------------------------------------------------------
// Miner
// ---------------------------------------------------------------------------

/// Extracts the tile's resource on a fixed interval and pushes it forward.
#[derive(Debug, Clone)]
pub struct MinerBehavior {
    pub interval_ms: Millis,
    pub deplete: bool,
}

impl Behavior for MinerBehavior {
    fn create(&self) -> EntityState {
        EntityState::default_for(EntityKind::Miner)
    }

    fn update(&self, entity: &mut Entity, dt_ms: Millis, ctx: &mut TickContext<'_>) {
        let (pos, front) = (entity.pos, entity.front());
        let EntityState::Miner(state) = &mut entity.state else {
            mismatched(entity);
            return;
        };
        state.just_extracted = false;

        push_if_accepted(ctx, pos, front);

        // The timer saturates at the interval while the output is blocked.
        state.timer_ms = state.timer_ms.saturating_add(dt_ms).min(self.interval_ms);
        if state.timer_ms < self.interval_ms {
            return;
        }
        let Some(item) = ctx.resource_yield() else {
            return;
        };
        if ctx.put_local(item) {
            state.timer_ms = 0;
            state.just_extracted = true;
            if self.deplete {
                ctx.clear_resource();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Belt
// ---------------------------------------------------------------------------

/// Moves its item one tile forward per tick when the next tile accepts it.
#[derive(Debug, Clone)]
pub struct BeltBehavior;

impl Behavior for BeltBehavior {
    fn create(&self) -> EntityState {
        EntityState::default_for(EntityKind::Belt)
    }

    fn update(&self, entity: &mut Entity, _dt_ms: Millis, ctx: &mut TickContext<'_>) {
        if !matches!(entity.state, EntityState::Belt(_)) {
            mismatched(entity);
            return;
        }
        push_if_accepted(ctx, entity.pos, entity.front());
    }
}

// ---------------------------------------------------------------------------
// Inserter
// ---------------------------------------------------------------------------

/// Picks from the tile behind, swings, and drops onto the tile in front.
#[derive(Debug, Clone)]
pub struct InserterBehavior {
    pub swing_ms: Millis,
}

impl InserterBehavior {
    fn try_pick(state: &mut InserterState, ctx: &mut TickContext<'_>, pos: TilePos, back: TilePos, front: TilePos) {
        state.phase = InserterPhase::Idle;
        let Some(item) = ctx.item_at_tick_start(back) else {
            return;
        };
        if ctx.item_at(back) != Some(item) || !ctx.offers(back, item) || !ctx.accepts(front, item) {
            return;
        }
        if ctx.request_transfer(back, pos) {
            state.phase = InserterPhase::Picking;
        }
    }

    fn release(state: &mut InserterState, ctx: &mut TickContext<'_>, pos: TilePos, back: TilePos, front: TilePos) {
        match ctx.item_at(pos) {
            None => {
                state.timer_ms = 0;
                Self::try_pick(state, ctx, pos, back, front);
            }
            Some(item) => {
                if ctx.accepts(front, item) {
                    ctx.request_transfer(pos, front);
                }
            }
        }
    }
}

impl Behavior for InserterBehavior {
    fn create(&self) -> EntityState {
        EntityState::default_for(EntityKind::Inserter)
    }

    fn update(&self, entity: &mut Entity, dt_ms: Millis, ctx: &mut TickContext<'_>) {
        let (pos, back, front) = (entity.pos, entity.back(), entity.front());
        let EntityState::Inserter(state) = &mut entity.state else {
            mismatched(entity);
            return;
        };

        match state.phase {
            InserterPhase::Idle | InserterPhase::Picking => {
                if ctx.item_at(pos).is_some() {
                    state.phase = InserterPhase::Carrying;
                    state.timer_ms = self.swing_ms;
                } else {
                    Self::try_pick(state, ctx, pos, back, front);
                }
            }
            InserterPhase::Carrying => {
                state.timer_ms = state.timer_ms.saturating_sub(dt_ms);
                if state.timer_ms == 0 {
                    state.phase = InserterPhase::Dropping;
                    Self::release(state, ctx, pos, back, front);
                }
            }
            InserterPhase::Dropping => Self::release(state, ctx, pos, back, front),
        }
    }
}

// ---------------------------------------------------------------------------
// Furnace / Assembler
// ---------------------------------------------------------------------------

/// Runs the kind's recipe: absorb inputs from the tile, progress, emit the
/// output back onto the tile.
#[derive(Debug, Clone)]
pub struct CrafterBehavior;

impl CrafterBehavior {
    fn consume(state: &mut CrafterState, recipe: &Recipe) {
        for &(item, n) in &recipe.inputs {
            let mut left = n;
            state.input.retain(|&held| {
                if held == item && left > 0 {
                    left -= 1;
                    false
                } else {
                    true
                }
            });
        }
    }
}

impl Behavior for CrafterBehavior {
    fn create(&self) -> EntityState {
        EntityState::Crafter(CrafterState::default())
    }

    fn update(&self, entity: &mut Entity, dt_ms: Millis, ctx: &mut TickContext<'_>) {
        let kind = entity.kind;
        let Some(recipe) = ctx.recipe(kind) else {
            log::warn!("{kind} {} has no recipe", entity.id);
            return;
        };
        let EntityState::Crafter(state) = &mut entity.state else {
            mismatched(entity);
            return;
        };

        if let Some(item) = ctx.item_at(ctx.pos()) {
            if recipe.wants(item, &state.input) && ctx.take_local().is_some() {
                state.input.push(item);
            }
        }

        if state.output.is_none() && recipe.is_satisfied(&state.input) {
            let one = Fixed64::from_num(1);
            let step = if recipe.duration_ms == 0 {
                one
            } else {
                ratio(dt_ms, recipe.duration_ms)
            };
            state.progress = state.progress.saturating_add(step);
            if state.progress >= one {
                Self::consume(state, recipe);
                state.output = Some(recipe.output);
                state.progress = Fixed64::ZERO;
            }
        }

        if let Some(out) = state.output {
            if ctx.put_local(out) {
                state.output = None;
            }
        }
    }
}
