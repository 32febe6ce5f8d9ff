//! # Tile Maps and the Region Grid
//!
//! A [`WorldMap`] owns a rectangular tile array and the grid of [`Region`]
//! cells partitioning it. The grid is fixed at construction: maps never
//! resize, so regions live exactly as long as their map and a
//! [`RegionHandle`] can never dangle.
//!
//! Region assignment for entities goes through [`WorldMap::expected_region`],
//! which applies the hysteresis rule: keep the current region while the
//! entity stays within its border-expanded bounds, otherwise reassign by
//! plain grid arithmetic.
//!
//! Region lookups are infallible. World positions reach the grid through
//! [`WorldMap::region_coords`], which clamps off-map positions to the edge
//! cells, and handles are only minted for live regions, so an out-of-grid
//! lookup is a caller bug and panics instead of returning an error.

use crate::entity::Entity;
use crate::error::{WorldError, WorldResult};
use crate::region::Region;
use crate::types::{MapId, Rect, RegionHandle, Tile, TileUpdate, Vec2, REGION_SIZE};

/// A single map: tile data plus its region grid.
#[derive(Debug)]
pub struct WorldMap {
    pub id: MapId,
    pub name: String,
    /// Width in tiles.
    pub width: u16,
    /// Height in tiles.
    pub height: u16,
    /// Default spawn point for entities joining this map.
    pub spawn: Vec2,
    /// Region grid width.
    pub regions_x: u16,
    /// Region grid height.
    pub regions_y: u16,
    /// Row-major tile array, `width * height` long.
    tiles: Vec<Tile>,
    /// Row-major region grid, `regions_x * regions_y` long.
    regions: Vec<Region>,
}

impl WorldMap {
    /// Creates a map filled with the given tile. The region grid is sized by
    /// ceiling division, so maps whose dimensions are not region-aligned get
    /// partial edge regions.
    pub fn new(id: MapId, name: impl Into<String>, width: u16, height: u16, fill: Tile) -> Self {
        let size = REGION_SIZE as u16;
        let regions_x = width.div_ceil(size).max(1);
        let regions_y = height.div_ceil(size).max(1);
        let mut regions = Vec::with_capacity(regions_x as usize * regions_y as usize);
        for ry in 0..regions_y {
            for rx in 0..regions_x {
                regions.push(Region::new(RegionHandle { map: id, rx, ry }));
            }
        }
        Self {
            id,
            name: name.into(),
            width,
            height,
            spawn: Vec2::new(width as f32 / 2.0, height as f32 / 2.0),
            regions_x,
            regions_y,
            tiles: vec![fill; width as usize * height as usize],
            regions,
        }
    }

    /// Map bounds as a world-space rectangle.
    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width as f32, self.height as f32)
    }

    /// Whether a world position lies on the map.
    pub fn contains(&self, p: Vec2) -> bool {
        self.bounds().contains(p)
    }

    // ------------------------------------------------------------------
    // Tiles
    // ------------------------------------------------------------------

    /// Tile at the given coordinates, or [`Tile::Void`] outside the map.
    pub fn tile(&self, x: u16, y: u16) -> Tile {
        if x >= self.width || y >= self.height {
            return Tile::Void;
        }
        self.tiles[y as usize * self.width as usize + x as usize]
    }

    /// Replaces a tile and queues the change on the owning region's batch so
    /// subscribers see it at the next commit.
    pub fn set_tile(&mut self, x: u16, y: u16, tile: Tile) -> WorldResult<()> {
        if x >= self.width || y >= self.height {
            return Err(WorldError::TileOutOfBounds { map: self.id, x, y });
        }
        self.tiles[y as usize * self.width as usize + x as usize] = tile;
        let (rx, ry) = self.region_coords(Vec2::new(x as f32, y as f32));
        self.region_mut(rx, ry).push_tile(TileUpdate { x, y, tile });
        Ok(())
    }

    /// Writes a tile without queueing a broadcast. For map construction
    /// only; live mutation goes through [`WorldMap::set_tile`].
    pub fn fill_tile(&mut self, x: u16, y: u16, tile: Tile) {
        if x < self.width && y < self.height {
            self.tiles[y as usize * self.width as usize + x as usize] = tile;
        }
    }

    /// Whether the tile under a world position blocks standing entities.
    pub fn blocked(&self, p: Vec2) -> bool {
        if !self.contains(p) {
            return true;
        }
        !self.tile(p.x as u16, p.y as u16).is_walkable()
    }

    // ------------------------------------------------------------------
    // Region grid
    // ------------------------------------------------------------------

    /// Region grid coordinates covering a world position, clamped to the
    /// grid. Callers check map bounds separately when they care.
    pub fn region_coords(&self, p: Vec2) -> (u16, u16) {
        let size = REGION_SIZE as f32;
        let rx = (p.x.max(0.0) / size) as u16;
        let ry = (p.y.max(0.0) / size) as u16;
        (rx.min(self.regions_x - 1), ry.min(self.regions_y - 1))
    }

    /// Region at the given grid coordinates.
    ///
    /// # Panics
    ///
    /// Panics when the coordinates fall outside the grid.
    pub fn region(&self, rx: u16, ry: u16) -> &Region {
        assert!(
            rx < self.regions_x && ry < self.regions_y,
            "region ({rx}, {ry}) outside the {}x{} grid of map {}",
            self.regions_x,
            self.regions_y,
            self.id
        );
        &self.regions[ry as usize * self.regions_x as usize + rx as usize]
    }

    /// Mutable region at the given grid coordinates.
    ///
    /// # Panics
    ///
    /// Panics when the coordinates fall outside the grid.
    pub fn region_mut(&mut self, rx: u16, ry: u16) -> &mut Region {
        assert!(
            rx < self.regions_x && ry < self.regions_y,
            "region ({rx}, {ry}) outside the {}x{} grid of map {}",
            self.regions_x,
            self.regions_y,
            self.id
        );
        &mut self.regions[ry as usize * self.regions_x as usize + rx as usize]
    }

    /// Region behind a handle.
    ///
    /// # Panics
    ///
    /// Panics when the handle belongs to another map.
    pub fn region_by_handle(&self, handle: RegionHandle) -> &Region {
        assert_eq!(
            handle.map, self.id,
            "handle for map {} resolved against map {}",
            handle.map, self.id
        );
        self.region(handle.rx, handle.ry)
    }

    /// Mutable region behind a handle.
    ///
    /// # Panics
    ///
    /// Panics when the handle belongs to another map.
    pub fn region_by_handle_mut(&mut self, handle: RegionHandle) -> &mut Region {
        assert_eq!(
            handle.map, self.id,
            "handle for map {} resolved against map {}",
            handle.map, self.id
        );
        self.region_mut(handle.rx, handle.ry)
    }

    /// Iterates every region mutably, for the commit sweep.
    pub fn regions_mut(&mut self) -> impl Iterator<Item = &mut Region> {
        self.regions.iter_mut()
    }

    /// The region an entity should be assigned to.
    ///
    /// Keeps the entity's current region while its position stays inside
    /// that region's hysteresis boundary; otherwise reassigns by grid
    /// arithmetic. Entities off the map edge clamp to the nearest region.
    pub fn expected_region(&self, entity: &Entity) -> RegionHandle {
        if let Some(current) = entity.region {
            if self.region_by_handle(current).retains(entity.position) {
                return current;
            }
        }
        let (rx, ry) = self.region_coords(entity.position);
        RegionHandle {
            map: self.id,
            rx,
            ry,
        }
    }

    /// Inclusive region coordinate range covering a world-space rectangle,
    /// or `None` when the rectangle misses the map entirely.
    pub fn region_range(&self, rect: Rect) -> Option<(u16, u16, u16, u16)> {
        if !rect.intersects(&self.bounds()) {
            return None;
        }
        let (x0, y0) = self.region_coords(Vec2::new(rect.x, rect.y));
        let (x1, y1) = self.region_coords(Vec2::new(rect.right(), rect.bottom()));
        Some((x0, y0, x1, y1))
    }

    /// Copies the tiles under one region in row-major order, padding with
    /// [`Tile::Void`] where a partial edge region hangs past the map.
    pub fn region_tiles(&self, rx: u16, ry: u16) -> Vec<Tile> {
        let size = REGION_SIZE as u16;
        let base_x = rx * size;
        let base_y = ry * size;
        let mut out = Vec::with_capacity(REGION_SIZE as usize * REGION_SIZE as usize);
        for y in 0..size {
            for x in 0..size {
                out.push(self.tile(base_x + x, base_y + y));
            }
        }
        out
    }
}
