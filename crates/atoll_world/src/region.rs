//! # Region Cells
//!
//! A region is one fixed-size square cell of a map's spatial grid. It tracks
//! which entities stand inside it, which clients watch it, and the pending
//! [`UpdateBatch`] of changes to broadcast at the next tick boundary.
//!
//! Region membership uses hysteresis: each region also carries bounds grown
//! by [`REGION_BORDER`], and an entity only transfers to a neighboring
//! region once it leaves the expanded bounds of its current one. Without the
//! border, an entity walking along a cell edge would transfer every step.

use crate::batch::{EntityDelta, UpdateBatch};
use crate::types::{ClientId, EntityId, Rect, RegionHandle, TileUpdate, Vec2, REGION_BORDER, REGION_SIZE};

/// One cell of a map's region grid.
#[derive(Debug)]
pub struct Region {
    /// Grid position of this region.
    pub handle: RegionHandle,
    /// Exact tile-space bounds of the cell.
    pub bounds: Rect,
    /// Bounds grown by the hysteresis border.
    pub boundary: Rect,
    /// Entities currently assigned to this region.
    pub entities: Vec<EntityId>,
    /// Clients currently subscribed to this region.
    pub clients: Vec<ClientId>,
    /// Changes accumulated since the last commit.
    pub batch: UpdateBatch,
}

impl Region {
    /// Creates the region for the given grid cell.
    pub fn new(handle: RegionHandle) -> Self {
        let size = REGION_SIZE as f32;
        let bounds = Rect::new(
            handle.rx as f32 * size,
            handle.ry as f32 * size,
            size,
            size,
        );
        Self {
            handle,
            bounds,
            boundary: bounds.expand(REGION_BORDER),
            entities: Vec::new(),
            clients: Vec::new(),
            batch: UpdateBatch::new(),
        }
    }

    /// Whether the position is inside the exact cell bounds.
    pub fn contains(&self, p: Vec2) -> bool {
        self.bounds.contains(p)
    }

    /// Whether the position is still inside the hysteresis boundary. An
    /// entity assigned here keeps its assignment while this holds.
    pub fn retains(&self, p: Vec2) -> bool {
        self.boundary.contains(p)
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Records the entity as standing in this region. Queues a full add so
    /// subscribers learn about it at the next commit.
    pub fn add_entity(&mut self, entity: EntityId) {
        if !self.entities.contains(&entity) {
            self.entities.push(entity);
        }
        self.batch.push_add(entity);
    }

    /// Removes the entity from this region and queues the removal notice.
    pub fn remove_entity(&mut self, entity: EntityId) {
        if let Some(at) = self.entities.iter().position(|id| *id == entity) {
            self.entities.swap_remove(at);
        }
        self.batch.push_remove(entity);
    }

    /// Adds a client to the subscriber list. Returns false if it was
    /// already subscribed.
    pub fn subscribe(&mut self, client: ClientId) -> bool {
        if self.clients.contains(&client) {
            return false;
        }
        self.clients.push(client);
        true
    }

    /// Drops a client from the subscriber list. Returns false if it was not
    /// subscribed.
    pub fn unsubscribe(&mut self, client: ClientId) -> bool {
        match self.clients.iter().position(|id| *id == client) {
            Some(at) => {
                self.clients.swap_remove(at);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Batch pushes
    // ------------------------------------------------------------------

    /// Queues a partial entity update for broadcast.
    pub fn push_update(&mut self, delta: EntityDelta) {
        self.batch.push_update(delta);
    }

    /// Queues a tile mutation for broadcast.
    pub fn push_tile(&mut self, update: TileUpdate) {
        self.batch.push_tile(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MapId;

    fn region(rx: u16, ry: u16) -> Region {
        Region::new(RegionHandle {
            map: MapId(0),
            rx,
            ry,
        })
    }

    #[test]
    fn bounds_follow_grid_position() {
        let r = region(2, 3);
        assert_eq!(r.bounds, Rect::new(16.0, 24.0, 8.0, 8.0));
        assert!(r.contains(Vec2::new(16.0, 24.0)));
        assert!(!r.contains(Vec2::new(15.9, 24.0)));
    }

    #[test]
    fn boundary_retains_past_the_edge() {
        let r = region(1, 1);
        // Just left of the cell, still inside the border.
        let edge = Vec2::new(7.5, 10.0);
        assert!(!r.contains(edge));
        assert!(r.retains(edge));
        // Two tiles out is past the border.
        assert!(!r.retains(Vec2::new(6.0, 10.0)));
    }

    #[test]
    fn entity_membership_is_deduplicated() {
        let mut r = region(0, 0);
        r.add_entity(EntityId(1));
        r.add_entity(EntityId(1));
        assert_eq!(r.entities.len(), 1);

        r.remove_entity(EntityId(1));
        assert!(r.entities.is_empty());
    }

    #[test]
    fn subscribe_reports_duplicates() {
        let mut r = region(0, 0);
        let client = ClientId::new();
        assert!(r.subscribe(client));
        assert!(!r.subscribe(client));
        assert!(r.unsubscribe(client));
        assert!(!r.unsubscribe(client));
    }
}
