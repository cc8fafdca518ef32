//! Tilefab Core -- the deterministic simulation behind a tile-grid factory
//! sandbox.
//!
//! This crate owns the procedural map generator, the world grid with its
//! occupancy rules, the entity registry and tick scheduler, the item transfer
//! engine, and the snapshot publisher that presentation layers read from.
//! Nothing here draws, plays sound, or reads input.
//!
//! # Four-Phase Tick Pipeline
//!
//! Each call to [`sim::Simulation::step`] advances the world by one fixed
//! step through the following phases:
//!
//! 1. **Begin** -- Freeze the tile item layer as the tick-start view.
//! 2. **Update** -- Every live entity runs its [`registry::Behavior`] once,
//!    in ascending id order, and files transfer requests.
//! 3. **Transfer** -- All requests are resolved together by
//!    [`transfer::TransferEngine::transfer_many`]. Each destination accepts at
//!    most one item per tick and the winner does not depend on request order.
//! 4. **Commit** -- Advance the clock and bump the revision.
//!
//! # Determinism
//!
//! Generation and stepping use only [`fixed::Fixed64`] arithmetic, a single
//! seeded [`rng::MapRng`] stream, and ordered collections. Identical inputs
//! produce identical worlds on every platform.
//!
//! # Key Types
//!
//! - [`grid::WorldGrid`] -- Tiles, resources, and single-occupancy placement.
//! - [`sim::Simulation`] -- Entity table, scheduler, and fixed-step clock.
//! - [`transfer::TransferEngine`] -- Contention-aware item movement.
//! - [`snapshot::SnapshotPublisher`] -- Immutable, shareable world views.
//! - [`save`] -- Versioned JSON and binary save files.

pub mod behavior;
pub mod config;
pub mod fixed;
pub mod generate;
pub mod grid;
pub mod id;
pub mod kind;
pub mod registry;
pub mod rng;
pub mod save;
pub mod sim;
pub mod snapshot;
pub mod transfer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
