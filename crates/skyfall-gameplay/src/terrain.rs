//! Tile-layer queries and the shared obstacle check.
//!
//! The tile layer belongs to the host engine. Gameplay only reads it through
//! [`TerrainQuery`], so a headless grid ([`TileMap`]) can stand in for it.

use std::collections::HashSet;

use skyfall_common::{Rect, Vec2};

/// Number of equal steps sampled along a line-of-sight segment.
///
/// The segment is sampled at `LOS_SAMPLES + 1` points, both ends included.
pub const LOS_SAMPLES: u32 = 10;

/// A single tile as seen by gameplay code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tile {
    /// Whether the tile blocks movement and sight.
    pub collides: bool,
}

impl Tile {
    /// A solid tile.
    pub const SOLID: Self = Self { collides: true };
    /// An empty tile.
    pub const EMPTY: Self = Self { collides: false };
}

/// Tile-layer query interface.
///
/// Implemented by the host engine's tile layer. Returns `None` outside the
/// layer, which callers treat as open space.
pub trait TerrainQuery {
    /// Returns the tile covering a world position.
    fn tile_at_world(&self, x: f32, y: f32) -> Option<Tile>;

    /// Returns true if the tile at a world position collides.
    fn collides_at(&self, x: f32, y: f32) -> bool {
        self.tile_at_world(x, y).is_some_and(|tile| tile.collides)
    }

    /// Returns true if any tile touched by the rectangle collides.
    fn rect_collides(&self, rect: &Rect) -> bool;
}

/// Returns true if the segment `from -> to` passes through a colliding tile.
///
/// Samples `LOS_SAMPLES + 1` evenly spaced points and stops at the first hit.
/// A missing tile layer means nothing can obstruct.
#[must_use]
pub fn line_obstructed(terrain: Option<&dyn TerrainQuery>, from: Vec2, to: Vec2) -> bool {
    let Some(terrain) = terrain else {
        return false;
    };

    (0..=LOS_SAMPLES).any(|i| {
        let point = from.lerp(to, i as f32 / LOS_SAMPLES as f32);
        terrain.collides_at(point.x, point.y)
    })
}

/// Sparse tile grid with a fixed tile size.
///
/// Tiles are addressed by integer tile coordinates; world positions map to
/// tiles by flooring `position / tile_size`.
#[derive(Debug, Clone)]
pub struct TileMap {
    tile_size: f32,
    solid: HashSet<(i32, i32)>,
    /// All tile rows at or below this index are solid.
    floor_row: Option<i32>,
}

impl Default for TileMap {
    fn default() -> Self {
        Self::new(16.0)
    }
}

impl TileMap {
    /// Creates an empty map with the given tile size.
    #[must_use]
    pub fn new(tile_size: f32) -> Self {
        Self {
            tile_size: tile_size.max(1.0),
            solid: HashSet::new(),
            floor_row: None,
        }
    }

    /// Returns the tile size in world units.
    #[must_use]
    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    /// Marks a tile as solid.
    pub fn set_solid(&mut self, tx: i32, ty: i32) {
        self.solid.insert((tx, ty));
    }

    /// Clears a tile.
    pub fn clear(&mut self, tx: i32, ty: i32) {
        self.solid.remove(&(tx, ty));
    }

    /// Marks the tile covering a world position as solid.
    pub fn set_solid_at_world(&mut self, x: f32, y: f32) {
        let (tx, ty) = self.world_to_tile(x, y);
        self.set_solid(tx, ty);
    }

    /// Makes every row at or below `row` solid.
    pub fn set_floor_row(&mut self, row: i32) {
        self.floor_row = Some(row);
    }

    /// Builder form of [`TileMap::set_floor_row`].
    #[must_use]
    pub fn with_floor_row(mut self, row: i32) -> Self {
        self.set_floor_row(row);
        self
    }

    /// Fills a vertical column of tiles, inclusive on both ends.
    pub fn fill_column(&mut self, tx: i32, from_ty: i32, to_ty: i32) {
        for ty in from_ty.min(to_ty)..=from_ty.max(to_ty) {
            self.set_solid(tx, ty);
        }
    }

    /// Converts a world position to tile coordinates.
    #[must_use]
    pub fn world_to_tile(&self, x: f32, y: f32) -> (i32, i32) {
        (
            (x / self.tile_size).floor() as i32,
            (y / self.tile_size).floor() as i32,
        )
    }

    /// World y coordinate of the top edge of the floor, if any.
    #[must_use]
    pub fn floor_top(&self) -> Option<f32> {
        self.floor_row.map(|row| row as f32 * self.tile_size)
    }

    fn is_solid_tile(&self, tx: i32, ty: i32) -> bool {
        if self.floor_row.is_some_and(|row| ty >= row) {
            return true;
        }
        self.solid.contains(&(tx, ty))
    }
}

impl TerrainQuery for TileMap {
    fn tile_at_world(&self, x: f32, y: f32) -> Option<Tile> {
        let (tx, ty) = self.world_to_tile(x, y);
        Some(if self.is_solid_tile(tx, ty) {
            Tile::SOLID
        } else {
            Tile::EMPTY
        })
    }

    fn rect_collides(&self, rect: &Rect) -> bool {
        // Shrink slightly so a rect resting exactly on a tile edge does not
        // count as touching the neighbouring tile.
        const EDGE: f32 = 0.001;
        let (min_x, min_y) = self.world_to_tile(rect.min_x + EDGE, rect.min_y + EDGE);
        let (max_x, max_y) = self.world_to_tile(rect.max_x - EDGE, rect.max_y - EDGE);

        for ty in min_y..=max_y {
            for tx in min_x..=max_x {
                if self.is_solid_tile(tx, ty) {
                    return true;
                }
            }
        }
        false
    }
}
