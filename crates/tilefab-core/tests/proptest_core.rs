//! Property-based tests for the tilefab core.
//!
//! Uses proptest to generate random maps, item layers, transfer batches and
//! belt layouts, then verify determinism and the contention rules hold.

use proptest::prelude::*;
use std::collections::BTreeMap;
use tilefab_core::generate::generate;
use tilefab_core::grid::{Direction, Tile, TilePos};
use tilefab_core::kind::{EntityKind, Item};
use tilefab_core::sim::Simulation;
use tilefab_core::test_utils::*;
use tilefab_core::transfer::{TransferEngine, TransferRequest};

// ===========================================================================
// Generators
// ===========================================================================

const SIDE: i32 = 6;

fn arb_item() -> impl Strategy<Value = Item> {
    prop_oneof![
        Just(Item::IronOre),
        Just(Item::Coal),
        Just(Item::Wood),
        Just(Item::IronPlate),
        Just(Item::Gear),
    ]
}

fn arb_pos() -> impl Strategy<Value = TilePos> {
    (0..SIDE, 0..SIDE).prop_map(|(x, y)| TilePos::new(x, y))
}

fn arb_dir() -> impl Strategy<Value = Direction> {
    prop_oneof![
        Just(Direction::North),
        Just(Direction::East),
        Just(Direction::South),
        Just(Direction::West),
    ]
}

/// A random item layer plus a random batch of requests over it, together
/// with a permutation of the batch.
fn arb_batch() -> impl Strategy<Value = (Vec<(TilePos, Item)>, Vec<TransferRequest>, Vec<usize>)> {
    (
        proptest::collection::vec((arb_pos(), arb_item()), 0..20),
        proptest::collection::vec((arb_pos(), arb_pos()), 0..30),
    )
        .prop_flat_map(|(items, pairs)| {
            let requests: Vec<TransferRequest> = pairs
                .into_iter()
                .map(|(from, to)| TransferRequest::new(from, to))
                .collect();
            let order: Vec<usize> = (0..requests.len()).collect();
            (Just(items), Just(requests), Just(order).prop_shuffle())
        })
}

fn run_batch(items: &[(TilePos, Item)], requests: &[TransferRequest]) -> (Vec<(TilePos, Item)>, Vec<String>) {
    let mut engine = TransferEngine::new(SIDE as u32, SIDE as u32);
    engine.load_items(items.iter().copied());
    let outcomes = engine.transfer_many(requests).unwrap();
    let mut described: Vec<String> = outcomes.iter().map(|o| format!("{o:?}")).collect();
    described.sort();
    (engine.items().collect(), described)
}

fn belt_world(layout: &[(TilePos, Direction, Option<Item>)]) -> Simulation {
    let mut sim = flat_sim(SIDE as u32, SIDE as u32);
    for &(pos, dir, item) in layout {
        if sim.add_entity(EntityKind::Belt, pos, dir).is_ok() {
            if let Some(item) = item {
                sim.put_item(pos, item);
            }
        }
    }
    sim
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #[test]
    fn generation_is_deterministic(w in 1_i64..80, h in 1_i64..80, seed in any::<i64>()) {
        let a = generate(w, h, seed).unwrap();
        let b = generate(w, h, seed).unwrap();
        prop_assert_eq!(a.width() as i64, w);
        prop_assert_eq!(a.height() as i64, h);
        let tiles_a: Vec<Tile> = a.cells().map(|(_, t)| t).collect();
        let tiles_b: Vec<Tile> = b.cells().map(|(_, t)| t).collect();
        prop_assert_eq!(tiles_a, tiles_b);
    }

    #[test]
    fn text_seeds_are_deterministic(seed in "[a-z ]{0,16}") {
        let a = generate(32, 24, seed.as_str()).unwrap();
        let b = generate(32, 24, seed.clone()).unwrap();
        prop_assert_eq!(a.seed(), b.seed());
        prop_assert!(a.cells().zip(b.cells()).all(|(x, y)| x == y));
    }

    #[test]
    fn spawn_rect_never_holds_resources(w in 1_i64..120, h in 1_i64..120, seed in any::<i64>()) {
        let grid = generate(w, h, seed).unwrap();
        let spawn = grid.spawn_rect();
        for (pos, tile) in grid.cells() {
            if spawn.contains(pos) {
                prop_assert_eq!(tile, Tile::Empty, "resource at {}", pos);
            }
        }
    }

    #[test]
    fn batch_outcome_ignores_request_order((items, requests, order) in arb_batch()) {
        let shuffled: Vec<TransferRequest> = order.iter().map(|&i| requests[i]).collect();
        let (layer_a, outcomes_a) = run_batch(&items, &requests);
        let (layer_b, outcomes_b) = run_batch(&items, &shuffled);
        prop_assert_eq!(layer_a, layer_b);
        prop_assert_eq!(outcomes_a, outcomes_b);
    }

    #[test]
    fn batch_conserves_items_and_fills_each_tile_once((items, requests, _order) in arb_batch()) {
        let mut engine = TransferEngine::new(SIDE as u32, SIDE as u32);
        engine.load_items(items.iter().copied());
        let before = engine.item_count();
        let outcomes = engine.transfer_many(&requests).unwrap();
        prop_assert_eq!(engine.item_count(), before);

        let mut arrivals: BTreeMap<TilePos, u32> = BTreeMap::new();
        for outcome in outcomes.iter().filter(|o| o.is_moved()) {
            *arrivals.entry(outcome.to()).or_default() += 1;
            // Destinations were empty at tick start.
            prop_assert_eq!(engine.item_at_tick_start(outcome.to()), None);
        }
        prop_assert!(arrivals.values().all(|&n| n == 1));
    }

    #[test]
    fn belt_worlds_step_identically(
        layout in proptest::collection::vec(
            (arb_pos(), arb_dir(), proptest::option::of(arb_item())),
            0..24,
        ),
        steps in 1_u64..30,
    ) {
        let mut a = belt_world(&layout);
        let mut b = belt_world(&layout);
        let items_before = a.items().count();
        a.run(steps);
        b.run(steps);
        prop_assert_eq!(a.to_save_state(), b.to_save_state());
        // Belts only move items, they never create or destroy them.
        prop_assert_eq!(a.items().count(), items_before);
    }

    #[test]
    fn belt_items_move_at_most_one_tile_per_step(
        layout in proptest::collection::vec(
            (arb_pos(), arb_dir(), proptest::option::of(arb_item())),
            0..24,
        ),
    ) {
        let mut sim = belt_world(&layout);
        let before: BTreeMap<TilePos, Item> = sim.items().collect();
        sim.step();
        for (pos, _) in sim.items().filter(|(pos, item)| before.get(pos) != Some(item)) {
            let fed = Direction::all().into_iter().any(|d| {
                let src = pos.step(d);
                before.contains_key(&src)
                    && sim.entity_at(src).is_some_and(|e| e.front() == pos)
            });
            prop_assert!(fed, "item at {} appeared without a neighbor feeding it", pos);
        }
    }
}
