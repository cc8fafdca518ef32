//! Procedural map generation.
//!
//! `generate(width, height, seed)` is a pure function: the same inputs always
//! yield the same tiles, on every platform. All geometry is done in
//! [`Fixed64`] and every random draw comes from one [`MapRng`] stream.
//!
//! Resources are scattered as irregular elliptical patches, one per
//! [`TILES_PER_PATCH`] tiles of map area. No patch paints inside the spawn
//! rectangle.

use crate::fixed::Fixed64;
use crate::grid::{GridError, Rect, Tile, TilePos, WorldGrid, spawn_rect, validate_dimensions};
use crate::rng::{MapRng, WorldSeed};

/// Map area covered per resource patch.
pub const TILES_PER_PATCH: u64 = 225;

/// Attempts at finding a patch center outside the spawn rectangle.
pub const CENTER_ATTEMPTS: u32 = 40;

/// Attempts at forcing a single resource tile onto a barren map.
pub const FALLBACK_ATTEMPTS: u32 = 1000;

fn min_radius() -> Fixed64 {
    Fixed64::from_num(2)
}

fn max_radius() -> Fixed64 {
    Fixed64::from_num(5)
}

fn edge_jitter() -> Fixed64 {
    Fixed64::from_num(0.25)
}

fn density() -> Fixed64 {
    Fixed64::from_num(0.85)
}

/// Generate a world grid.
pub fn generate(
    width: i64,
    height: i64,
    seed: impl Into<WorldSeed>,
) -> Result<WorldGrid, GridError> {
    generate_from_derived(width, height, seed.into().derive())
}

/// Generate a world grid from an already-derived 32-bit seed.
pub fn generate_from_derived(width: i64, height: i64, seed: u32) -> Result<WorldGrid, GridError> {
    let (w, h) = validate_dimensions(width, height)?;
    let mut painter = Painter {
        width: w,
        height: h,
        spawn: spawn_rect(w, h),
        tiles: vec![Tile::Empty; w as usize * h as usize],
        painted: 0,
        rng: MapRng::new(seed),
    };

    let patches = (w as u64 * h as u64 / TILES_PER_PATCH).max(1);
    for _ in 0..patches {
        painter.scatter_patch();
    }
    if painter.painted == 0 {
        painter.force_single_resource();
    }

    log::debug!(
        "generated {w}x{h} map from seed {seed:#010x}: {patches} patches, {} resource tiles",
        painter.painted
    );
    Ok(WorldGrid::from_tiles(w, h, seed, painter.tiles))
}

struct Painter {
    width: u32,
    height: u32,
    spawn: Rect,
    tiles: Vec<Tile>,
    painted: usize,
    rng: MapRng,
}

impl Painter {
    fn index(&self, pos: TilePos) -> Option<usize> {
        if pos.x < 0 || pos.y < 0 || pos.x as u32 >= self.width || pos.y as u32 >= self.height {
            return None;
        }
        Some(pos.y as usize * self.width as usize + pos.x as usize)
    }

    fn random_tile(&mut self) -> TilePos {
        let x = self.rng.range_i32(0, self.width as i32);
        let y = self.rng.range_i32(0, self.height as i32);
        TilePos::new(x, y)
    }

    fn pick_center(&mut self) -> Option<TilePos> {
        for _ in 0..CENTER_ATTEMPTS {
            let pos = self.random_tile();
            if !self.spawn.contains(pos) {
                return Some(pos);
            }
        }
        None
    }

    fn pick_resource(&mut self) -> Tile {
        match self.rng.range_i32(0, 10) {
            0..=4 => Tile::Ore,
            5..=7 => Tile::Coal,
            _ => Tile::Tree,
        }
    }

    fn scatter_patch(&mut self) {
        let Some(center) = self.pick_center() else {
            return;
        };
        let resource = self.pick_resource();
        let rx = self.rng.range_fixed(min_radius(), max_radius());
        let ry = self.rng.range_fixed(min_radius(), max_radius());
        let reach_x = rx.ceil().to_num::<i32>() + 1;
        let reach_y = ry.ceil().to_num::<i32>() + 1;
        let limit = Fixed64::from_num(1);

        for y in center.y - reach_y..=center.y + reach_y {
            for x in center.x - reach_x..=center.x + reach_x {
                let pos = TilePos::new(x, y);
                let Some(i) = self.index(pos) else {
                    continue;
                };
                if self.spawn.contains(pos) {
                    continue;
                }
                let dx = Fixed64::from_num(x - center.x) / rx;
                let dy = Fixed64::from_num(y - center.y) / ry;
                let dist = dx * dx + dy * dy;
                let jitter = self.rng.range_fixed(-edge_jitter(), edge_jitter());
                let dense = self.rng.chance(density());
                if dist <= limit + jitter && dense && self.tiles[i] == Tile::Empty {
                    self.tiles[i] = resource;
                    self.painted += 1;
                }
            }
        }
    }

    fn force_single_resource(&mut self) {
        if self.spawn.area() >= self.width as u64 * self.height as u64 {
            return;
        }
        for _ in 0..FALLBACK_ATTEMPTS {
            let pos = self.random_tile();
            if self.spawn.contains(pos) {
                continue;
            }
            if let Some(i) = self.index(pos) {
                self.tiles[i] = Tile::Ore;
                self.painted += 1;
                return;
            }
        }
    }
}
