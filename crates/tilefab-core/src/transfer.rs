//! Tile-to-tile item transfers with same-tick contention resolution.
//!
//! Every tile carries at most one loose item. The engine keeps two views of
//! that layer: `live`, which every winning transfer mutates immediately, and
//! `frozen`, a copy taken at the start of the tick. Eligibility is always
//! judged against both, so within one tick:
//!
//! - a source must have held its item at tick start and still hold it now;
//! - a destination must have been empty at tick start, still be empty now,
//!   and not have been claimed by an earlier winner.
//!
//! An item therefore moves at most one hop per tick; a chained hop only
//! becomes possible after the next [`TransferEngine::begin_tick`].
//!
//! Batches are resolved per destination in row-major destination order.
//! Inside a group, candidates are tried in row-major source order and the
//! first one with an eligible source wins, so the winner does not depend on
//! the order the requests were submitted in.

use crate::grid::{TilePos, WorldGrid};
use crate::kind::Item;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// A request to move the loose item on `from` onto `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: TilePos,
    pub to: TilePos,
}

impl TransferRequest {
    pub fn new(from: TilePos, to: TilePos) -> Self {
        Self { from, to }
    }
}

/// Why a transfer did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    EmptySource,
    OccupiedDestination,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::EmptySource => "empty-source",
            RejectReason::OccupiedDestination => "occupied-destination",
        }
    }
}

/// Result of resolving one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferOutcome {
    Moved {
        from: TilePos,
        to: TilePos,
        item: Item,
    },
    Rejected {
        from: TilePos,
        to: TilePos,
        reason: RejectReason,
    },
}

impl TransferOutcome {
    pub fn is_moved(&self) -> bool {
        matches!(self, TransferOutcome::Moved { .. })
    }

    pub fn from(&self) -> TilePos {
        match self {
            TransferOutcome::Moved { from, .. } | TransferOutcome::Rejected { from, .. } => *from,
        }
    }

    pub fn to(&self) -> TilePos {
        match self {
            TransferOutcome::Moved { to, .. } | TransferOutcome::Rejected { to, .. } => *to,
        }
    }

    /// The rejection reason, `None` for a successful move.
    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            TransferOutcome::Moved { .. } => None,
            TransferOutcome::Rejected { reason, .. } => Some(*reason),
        }
    }
}

/// Counts of outcomes, for step reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub moved: u32,
    pub empty_source: u32,
    pub occupied_destination: u32,
}

impl TransferStats {
    pub fn tally(outcomes: &[TransferOutcome]) -> Self {
        let mut stats = Self::default();
        for outcome in outcomes {
            match outcome.reason() {
                None => stats.moved += 1,
                Some(RejectReason::EmptySource) => stats.empty_source += 1,
                Some(RejectReason::OccupiedDestination) => stats.occupied_destination += 1,
            }
        }
        stats
    }
}

/// Programmer errors. Contention results are never errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("transfer endpoint {pos} is outside the {width}x{height} grid")]
    OutOfBounds { pos: TilePos, width: u32, height: u32 },
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Owns the loose-item layer and resolves transfers against it.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    width: u32,
    height: u32,
    live: BTreeMap<TilePos, Item>,
    frozen: BTreeMap<TilePos, Item>,
    claimed: BTreeSet<TilePos>,
    vacated: BTreeSet<TilePos>,
}

impl TransferEngine {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            live: BTreeMap::new(),
            frozen: BTreeMap::new(),
            claimed: BTreeSet::new(),
            vacated: BTreeSet::new(),
        }
    }

    /// An engine sized to `grid`.
    pub fn for_grid(grid: &WorldGrid) -> Self {
        Self::new(grid.width(), grid.height())
    }

    fn in_bounds(&self, pos: TilePos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }

    fn check_bounds(&self, pos: TilePos) -> Result<(), TransferError> {
        if self.in_bounds(pos) {
            Ok(())
        } else {
            Err(TransferError::OutOfBounds {
                pos,
                width: self.width,
                height: self.height,
            })
        }
    }

    /// Tick boundary: the current layer becomes the tick-start view and all
    /// per-tick claims are released.
    pub fn begin_tick(&mut self) {
        self.frozen.clone_from(&self.live);
        self.claimed.clear();
        self.vacated.clear();
    }

    // -- Reads --

    /// The loose item on `pos` right now.
    pub fn item_at(&self, pos: TilePos) -> Option<Item> {
        self.live.get(&pos).copied()
    }

    /// The loose item on `pos` at the start of the current tick.
    pub fn item_at_tick_start(&self, pos: TilePos) -> Option<Item> {
        self.frozen.get(&pos).copied()
    }

    /// Whether `pos` received a winning transfer this tick.
    pub fn is_claimed(&self, pos: TilePos) -> bool {
        self.claimed.contains(&pos)
    }

    /// All loose items, row-major.
    pub fn items(&self) -> impl Iterator<Item = (TilePos, Item)> + '_ {
        self.live.iter().map(|(&p, &i)| (p, i))
    }

    pub fn item_count(&self) -> usize {
        self.live.len()
    }

    fn source_eligible(&self, from: TilePos) -> bool {
        self.frozen.contains_key(&from)
            && self.live.contains_key(&from)
            && !self.vacated.contains(&from)
    }

    fn destination_available(&self, to: TilePos) -> bool {
        !self.frozen.contains_key(&to) && !self.live.contains_key(&to) && !self.claimed.contains(&to)
    }

    // -- Owner-local edits --

    /// Put an item on an empty tile. Used by the tile's owner (a miner
    /// extracting, a crafter emitting output). The item becomes movable at
    /// the next tick boundary.
    pub fn put_local(&mut self, pos: TilePos, item: Item) -> bool {
        if !self.in_bounds(pos) || self.live.contains_key(&pos) || self.claimed.contains(&pos) {
            return false;
        }
        self.live.insert(pos, item);
        true
    }

    /// Take the loose item off a tile (a crafter absorbing input).
    pub fn take_local(&mut self, pos: TilePos) -> Option<Item> {
        self.live.remove(&pos)
    }

    /// Drop whatever is on `pos` from both views (entity removal).
    pub fn clear(&mut self, pos: TilePos) -> Option<Item> {
        self.frozen.remove(&pos);
        self.live.remove(&pos)
    }

    /// Replace the whole layer (restoring a save). Out-of-bounds entries are
    /// skipped. Returns how many were skipped.
    pub fn load_items(&mut self, items: impl IntoIterator<Item = (TilePos, Item)>) -> usize {
        self.live.clear();
        let mut skipped = 0;
        for (pos, item) in items {
            if self.in_bounds(pos) {
                self.live.insert(pos, item);
            } else {
                log::warn!("ignoring {item:?} outside the map at {pos}");
                skipped += 1;
            }
        }
        self.begin_tick();
        skipped
    }

    // -- Resolution --

    fn apply(&mut self, from: TilePos, to: TilePos, dest_open: bool) -> TransferOutcome {
        if !self.source_eligible(from) {
            return TransferOutcome::Rejected {
                from,
                to,
                reason: RejectReason::EmptySource,
            };
        }
        let item = match self.live.get(&from) {
            Some(&item) if dest_open => item,
            _ => {
                return TransferOutcome::Rejected {
                    from,
                    to,
                    reason: RejectReason::OccupiedDestination,
                };
            }
        };
        self.live.remove(&from);
        self.live.insert(to, item);
        self.claimed.insert(to);
        self.vacated.insert(from);
        TransferOutcome::Moved { from, to, item }
    }

    /// Resolve a single request against the current tick.
    pub fn transfer(&mut self, from: TilePos, to: TilePos) -> Result<TransferOutcome, TransferError> {
        self.check_bounds(from)?;
        self.check_bounds(to)?;
        let open = self.destination_available(to);
        Ok(self.apply(from, to, open))
    }

    /// Resolve a batch of simultaneous requests. Outcomes are returned in
    /// input order. Bounds are checked for the whole batch before anything
    /// moves.
    pub fn transfer_many(
        &mut self,
        requests: &[TransferRequest],
    ) -> Result<Vec<TransferOutcome>, TransferError> {
        for r in requests {
            self.check_bounds(r.from)?;
            self.check_bounds(r.to)?;
        }

        let mut order: Vec<usize> = (0..requests.len()).collect();
        order.sort_by_key(|&i| (requests[i].to, requests[i].from, i));

        let mut outcomes: Vec<Option<TransferOutcome>> = vec![None; requests.len()];
        for group in order.chunk_by(|&a, &b| requests[a].to == requests[b].to) {
            let to = requests[group[0]].to;
            let mut open = self.destination_available(to);
            for &i in group {
                let outcome = self.apply(requests[i].from, to, open);
                if outcome.is_moved() {
                    open = false;
                }
                outcomes[i] = Some(outcome);
            }
        }

        Ok(outcomes.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: i32, y: i32) -> TilePos {
        TilePos::new(x, y)
    }

    fn engine_with(items: &[(TilePos, Item)]) -> TransferEngine {
        let mut e = TransferEngine::new(10, 10);
        e.load_items(items.iter().copied());
        e
    }

    // -----------------------------------------------------------------------
    // Single transfers
    // -----------------------------------------------------------------------

    #[test]
    fn simple_move() {
        let mut e = engine_with(&[(p(0, 0), Item::IronOre)]);
        let out = e.transfer(p(0, 0), p(1, 0)).unwrap();
        assert_eq!(
            out,
            TransferOutcome::Moved { from: p(0, 0), to: p(1, 0), item: Item::IronOre }
        );
        assert_eq!(e.item_at(p(0, 0)), None);
        assert_eq!(e.item_at(p(1, 0)), Some(Item::IronOre));
        // The tick-start view is untouched until the boundary.
        assert_eq!(e.item_at_tick_start(p(0, 0)), Some(Item::IronOre));
        assert!(e.is_claimed(p(1, 0)));
    }

    #[test]
    fn empty_source_rejected() {
        let mut e = engine_with(&[]);
        let out = e.transfer(p(0, 0), p(1, 0)).unwrap();
        assert_eq!(out.reason(), Some(RejectReason::EmptySource));
        assert_eq!(out.reason().unwrap().as_str(), "empty-source");
    }

    #[test]
    fn occupied_destination_rejected() {
        let mut e = engine_with(&[(p(0, 0), Item::Coal), (p(1, 0), Item::Wood)]);
        let out = e.transfer(p(0, 0), p(1, 0)).unwrap();
        assert_eq!(out.reason(), Some(RejectReason::OccupiedDestination));
        assert_eq!(e.item_at(p(0, 0)), Some(Item::Coal));
        assert_eq!(e.item_at(p(1, 0)), Some(Item::Wood));
    }

    #[test]
    fn out_of_bounds_is_an_error() {
        let mut e = engine_with(&[(p(0, 0), Item::Coal)]);
        assert!(matches!(
            e.transfer(p(0, 0), p(-1, 0)),
            Err(TransferError::OutOfBounds { .. })
        ));
        assert!(e.transfer(p(10, 0), p(0, 0)).is_err());
        assert_eq!(e.item_at(p(0, 0)), Some(Item::Coal));
    }

    #[test]
    fn batch_out_of_bounds_moves_nothing() {
        let mut e = engine_with(&[(p(0, 0), Item::Coal)]);
        let batch = [
            TransferRequest::new(p(0, 0), p(1, 0)),
            TransferRequest::new(p(3, 3), p(3, 99)),
        ];
        assert!(e.transfer_many(&batch).is_err());
        assert_eq!(e.item_at(p(0, 0)), Some(Item::Coal));
        assert_eq!(e.item_at(p(1, 0)), None);
    }

    // -----------------------------------------------------------------------
    // Contention
    // -----------------------------------------------------------------------

    #[test]
    fn one_winner_per_destination_independent_of_order() {
        let sources = [p(5, 4), p(4, 5), p(6, 5), p(5, 6)];
        let dest = p(5, 5);
        let items: Vec<_> = sources.iter().map(|&s| (s, Item::IronPlate)).collect();

        let forward: Vec<_> = sources.iter().map(|&s| TransferRequest::new(s, dest)).collect();
        let mut reversed = forward.clone();
        reversed.reverse();

        let mut winners = Vec::new();
        for batch in [forward, reversed] {
            let mut e = engine_with(&items);
            let outcomes = e.transfer_many(&batch).unwrap();
            let moved: Vec<_> = outcomes.iter().filter(|o| o.is_moved()).collect();
            assert_eq!(moved.len(), 1);
            winners.push(moved[0].from());
            for o in outcomes.iter().filter(|o| !o.is_moved()) {
                assert_eq!(o.reason(), Some(RejectReason::OccupiedDestination));
                assert_eq!(e.item_at(o.from()), Some(Item::IronPlate), "loser untouched");
            }
        }
        assert_eq!(winners[0], winners[1]);
        // Row-major first: (5, 4) sits on the earliest row.
        assert_eq!(winners[0], p(5, 4));
    }

    #[test]
    fn empty_candidate_does_not_block_others() {
        let mut e = engine_with(&[(p(2, 1), Item::Gear)]);
        let outcomes = e
            .transfer_many(&[
                TransferRequest::new(p(2, 1), p(2, 2)),
                TransferRequest::new(p(1, 1), p(2, 2)),
            ])
            .unwrap();
        assert_eq!(outcomes[0].reason(), None);
        assert_eq!(outcomes[1].reason(), Some(RejectReason::EmptySource));
    }

    #[test]
    fn outcomes_follow_input_order() {
        let mut e = engine_with(&[(p(0, 0), Item::Coal), (p(0, 5), Item::Wood)]);
        let batch = [
            TransferRequest::new(p(0, 5), p(1, 5)),
            TransferRequest::new(p(0, 0), p(1, 0)),
        ];
        let outcomes = e.transfer_many(&batch).unwrap();
        assert_eq!(outcomes[0].from(), p(0, 5));
        assert_eq!(outcomes[1].from(), p(0, 0));
        assert!(outcomes.iter().all(TransferOutcome::is_moved));
    }

    #[test]
    fn one_source_moves_once() {
        let mut e = engine_with(&[(p(3, 3), Item::IronOre)]);
        let outcomes = e
            .transfer_many(&[
                TransferRequest::new(p(3, 3), p(4, 3)),
                TransferRequest::new(p(3, 3), p(3, 2)),
            ])
            .unwrap();
        // (3, 2) comes first in row-major destination order.
        assert!(outcomes[1].is_moved());
        assert_eq!(outcomes[0].reason(), Some(RejectReason::EmptySource));
        assert_eq!(e.item_count(), 1);
    }

    // -----------------------------------------------------------------------
    // No same-tick cascading
    // -----------------------------------------------------------------------

    #[test]
    fn chained_hop_waits_for_tick_boundary() {
        let a = p(0, 0);
        let b = p(1, 0);
        let c = p(2, 0);
        let mut e = engine_with(&[(a, Item::IronOre)]);

        let outcomes = e
            .transfer_many(&[TransferRequest::new(a, b), TransferRequest::new(b, c)])
            .unwrap();
        assert!(outcomes[0].is_moved());
        assert_eq!(outcomes[1].reason(), Some(RejectReason::EmptySource));
        assert_eq!(e.item_at(b), Some(Item::IronOre));
        assert_eq!(e.item_at(c), None);

        e.begin_tick();
        let out = e.transfer(b, c).unwrap();
        assert!(out.is_moved());
        assert_eq!(e.item_at(c), Some(Item::IronOre));
    }

    #[test]
    fn chained_hop_fails_in_either_order() {
        let a = p(0, 0);
        let b = p(1, 0);
        let c = p(2, 0);
        let mut e = engine_with(&[(a, Item::IronOre)]);
        let outcomes = e
            .transfer_many(&[TransferRequest::new(b, c), TransferRequest::new(a, b)])
            .unwrap();
        assert_eq!(outcomes[0].reason(), Some(RejectReason::EmptySource));
        assert!(outcomes[1].is_moved());
    }

    #[test]
    fn vacated_tile_is_not_a_destination_this_tick() {
        let a = p(0, 0);
        let b = p(1, 0);
        let c = p(2, 0);
        let mut e = engine_with(&[(b, Item::Coal), (a, Item::Wood)]);
        // b moves on to c, a wants into b in the same pass.
        let outcomes = e
            .transfer_many(&[TransferRequest::new(a, b), TransferRequest::new(b, c)])
            .unwrap();
        assert_eq!(outcomes[0].reason(), Some(RejectReason::OccupiedDestination));
        assert!(outcomes[1].is_moved());
        assert_eq!(e.item_at(a), Some(Item::Wood));

        e.begin_tick();
        assert!(e.transfer(a, b).unwrap().is_moved());
    }

    #[test]
    fn sequential_singles_share_tick_claims() {
        let mut e = engine_with(&[(p(0, 1), Item::Coal), (p(2, 1), Item::Coal)]);
        assert!(e.transfer(p(0, 1), p(1, 1)).unwrap().is_moved());
        let second = e.transfer(p(2, 1), p(1, 1)).unwrap();
        assert_eq!(second.reason(), Some(RejectReason::OccupiedDestination));
    }

    // -----------------------------------------------------------------------
    // Local edits
    // -----------------------------------------------------------------------

    #[test]
    fn local_put_is_not_movable_until_boundary() {
        let mut e = engine_with(&[]);
        assert!(e.put_local(p(4, 4), Item::IronOre));
        assert!(!e.put_local(p(4, 4), Item::Coal));
        let out = e.transfer(p(4, 4), p(5, 4)).unwrap();
        assert_eq!(out.reason(), Some(RejectReason::EmptySource));
        e.begin_tick();
        assert!(e.transfer(p(4, 4), p(5, 4)).unwrap().is_moved());
    }

    #[test]
    fn locally_taken_item_cannot_leave() {
        let mut e = engine_with(&[(p(1, 1), Item::IronOre)]);
        assert_eq!(e.take_local(p(1, 1)), Some(Item::IronOre));
        let out = e.transfer(p(1, 1), p(2, 1)).unwrap();
        assert_eq!(out.reason(), Some(RejectReason::EmptySource));
    }

    #[test]
    fn stats_tally() {
        let outcomes = [
            TransferOutcome::Moved { from: p(0, 0), to: p(1, 0), item: Item::Coal },
            TransferOutcome::Rejected {
                from: p(0, 1),
                to: p(1, 1),
                reason: RejectReason::EmptySource,
            },
            TransferOutcome::Rejected {
                from: p(0, 2),
                to: p(1, 0),
                reason: RejectReason::OccupiedDestination,
            },
        ];
        let stats = TransferStats::tally(&outcomes);
        assert_eq!(stats.moved, 1);
        assert_eq!(stats.empty_source, 1);
        assert_eq!(stats.occupied_destination, 1);
    }
}
