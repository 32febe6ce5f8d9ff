//! # Delta Batching
//!
//! Per-region accumulation of entity and tile changes within a tick. Each
//! region owns an [`UpdateBatch`]; world operations push records into it and
//! the commit phase drains it into one [`RegionPayload`] that is encoded
//! once and shared by reference with every subscribed client.
//!
//! ## Merge Rules
//!
//! - Multiple updates for one entity in one tick merge into a single record:
//!   dirty flags are ORed and only the fields flagged by the later push are
//!   overwritten, so a position push never clobbers an earlier action push.
//! - A removal cancels any pending update or add for that entity, but is
//!   always queued itself: a client holding an earlier snapshot still has
//!   to drop the entity, and everyone else treats it as a no-op. No later
//!   update for the entity is accepted within the tick.
//! - A full add supersedes field updates: the commit-time snapshot already
//!   carries the entity's final state for the tick.

use crate::entity::{Entity, EntityKind};
use crate::error::KickReason;
use crate::types::{
    DirtyFlags, EntityId, EntityOptions, EntityState, RegionHandle, Tile, TileUpdate, Vec2,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Wire records
// ============================================================================

/// A partial entity update. Only fields covered by `flags` are meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDelta {
    pub entity: EntityId,
    pub flags: DirtyFlags,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub state: EntityState,
    /// One-shot action id, replayed by clients on receipt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<u16>,
    /// Full replacement options bag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<EntityOptions>,
}

impl EntityDelta {
    /// An empty delta for the given entity with no flags set.
    pub fn new(entity: EntityId) -> Self {
        Self {
            entity,
            flags: DirtyFlags::NONE,
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            state: EntityState::NONE,
            action: None,
            options: None,
        }
    }

    /// A movement delta carrying the entity's position, velocity, and state.
    pub fn movement(entity: &Entity) -> Self {
        let mut delta = Self::new(entity.id);
        delta.flags = DirtyFlags::POSITION | DirtyFlags::VELOCITY | DirtyFlags::STATE;
        delta.x = entity.position.x;
        delta.y = entity.position.y;
        delta.vx = entity.velocity.x;
        delta.vy = entity.velocity.y;
        delta.state = entity.state;
        delta
    }

    /// A position-only delta, used by tick-driven velocity advancement.
    pub fn position(entity: &Entity) -> Self {
        let mut delta = Self::new(entity.id);
        delta.flags = DirtyFlags::POSITION;
        delta.x = entity.position.x;
        delta.y = entity.position.y;
        delta
    }

    /// A state-bits-only delta.
    pub fn state(entity: EntityId, state: EntityState) -> Self {
        let mut delta = Self::new(entity);
        delta.flags = DirtyFlags::STATE;
        delta.state = state;
        delta
    }

    /// A one-shot action delta.
    pub fn action(entity: EntityId, action: u16) -> Self {
        let mut delta = Self::new(entity);
        delta.flags = DirtyFlags::ACTION;
        delta.action = Some(action);
        delta
    }

    /// A full-options replacement delta.
    pub fn options(entity: EntityId, options: EntityOptions) -> Self {
        let mut delta = Self::new(entity);
        delta.flags = DirtyFlags::OPTIONS;
        delta.options = Some(options);
        delta
    }

    /// Folds a later delta into this one. Flags accumulate; each field is
    /// overwritten only when the later delta flagged it.
    pub fn merge_from(&mut self, other: &EntityDelta) {
        if other.flags.contains(DirtyFlags::POSITION) {
            self.x = other.x;
            self.y = other.y;
        }
        if other.flags.contains(DirtyFlags::VELOCITY) {
            self.vx = other.vx;
            self.vy = other.vy;
        }
        if other.flags.contains(DirtyFlags::STATE) {
            self.state = other.state;
        }
        if other.flags.contains(DirtyFlags::ACTION) {
            self.action = other.action;
        }
        if other.flags.contains(DirtyFlags::OPTIONS) {
            self.options = other.options.clone();
        }
        self.flags |= other.flags;
    }
}

/// A complete entity description, sent when an entity becomes visible to a
/// client either by entering a region or by the client subscribing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub state: EntityState,
    pub options: EntityOptions,
}

impl EntitySnapshot {
    pub fn of(entity: &Entity) -> Self {
        Self {
            id: entity.id,
            kind: entity.kind,
            name: entity.name.clone(),
            x: entity.position.x,
            y: entity.position.y,
            vx: entity.velocity.x,
            vy: entity.velocity.y,
            state: entity.state,
            options: entity.options.clone(),
        }
    }
}

/// Everything that changed in one region during one tick.
///
/// Built once at commit time and fanned out behind an [`Arc`], so the encode
/// cost is paid per region rather than per subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionPayload {
    pub region: RegionHandle,
    /// Entities that entered the region this tick, in full.
    pub adds: Vec<EntitySnapshot>,
    /// Field updates for entities already in the region.
    pub updates: Vec<EntityDelta>,
    /// Entities that left the region or despawned this tick.
    pub removes: Vec<EntityId>,
    /// Tile mutations inside the region this tick.
    pub tiles: Vec<TileUpdate>,
}

/// Full region contents, sent when a client first subscribes to a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSnapshot {
    pub region: RegionHandle,
    /// Region tiles in row-major order, `REGION_SIZE` per row.
    pub tiles: Vec<Tile>,
    /// Every entity currently inside the region.
    pub entities: Vec<EntitySnapshot>,
}

/// Per-client control message, queued alongside region traffic and flushed
/// in the same tick boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ClientNotice {
    /// The server rejected claimed movement; the client must snap to this
    /// position and acknowledge before further movement is trusted.
    FixPosition { x: f32, y: f32 },
    /// The client left a region's interest set and should drop its copy.
    Unsubscribed { region: RegionHandle },
    /// The client is being disconnected.
    Kicked { reason: KickReason },
}

impl ClientNotice {
    pub fn fix_position(position: Vec2) -> Self {
        Self::FixPosition {
            x: position.x,
            y: position.y,
        }
    }
}

// ============================================================================
// Per-region batch
// ============================================================================

/// Accumulates one tick's worth of changes for a single region.
#[derive(Debug, Default)]
pub struct UpdateBatch {
    /// Entity ids added this tick; snapshots are resolved at commit time so
    /// they carry the entity's end-of-tick state.
    adds: Vec<EntityId>,
    updates: Vec<EntityDelta>,
    /// Index into `updates` by entity, for merge-on-push.
    slots: HashMap<EntityId, usize>,
    removes: Vec<EntityId>,
    tiles: Vec<TileUpdate>,
}

impl UpdateBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a full add for an entity entering the region. Re-entry within
    /// the same tick cancels the earlier removal instead of double-adding.
    pub fn push_add(&mut self, entity: EntityId) {
        if let Some(at) = self.removes.iter().position(|id| *id == entity) {
            self.removes.swap_remove(at);
        }
        if !self.adds.contains(&entity) {
            self.adds.push(entity);
        }
    }

    /// Queues a partial update, merging with any update already pending for
    /// the same entity. Dropped when the entity is already being removed or
    /// added this tick.
    pub fn push_update(&mut self, delta: EntityDelta) {
        if self.removes.contains(&delta.entity) || self.adds.contains(&delta.entity) {
            return;
        }
        match self.slots.get(&delta.entity) {
            Some(&at) => self.updates[at].merge_from(&delta),
            None => {
                self.slots.insert(delta.entity, self.updates.len());
                self.updates.push(delta);
            }
        }
    }

    /// Queues a removal. Cancels any pending update or add for the entity,
    /// but the removal itself always goes out: clients that saw the entity
    /// in a snapshot have to drop it, the rest ignore an unknown id.
    pub fn push_remove(&mut self, entity: EntityId) {
        if let Some(at) = self.slots.remove(&entity) {
            self.updates.swap_remove(at);
            if let Some(moved) = self.updates.get(at) {
                self.slots.insert(moved.entity, at);
            }
        }
        if let Some(at) = self.adds.iter().position(|id| *id == entity) {
            self.adds.swap_remove(at);
        }
        if !self.removes.contains(&entity) {
            self.removes.push(entity);
        }
    }

    /// Queues a tile mutation. A later write to the same cell replaces the
    /// earlier one, so a cell flipped twice in a tick ships once.
    pub fn push_tile(&mut self, update: TileUpdate) {
        match self
            .tiles
            .iter_mut()
            .find(|t| t.x == update.x && t.y == update.y)
        {
            Some(existing) => existing.tile = update.tile,
            None => self.tiles.push(update),
        }
    }

    /// True when nothing has been pushed this tick.
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty()
            && self.updates.is_empty()
            && self.removes.is_empty()
            && self.tiles.is_empty()
    }

    /// Drops everything pushed this tick without building a payload. Commit
    /// uses this for regions with no subscribers, where encoding would be
    /// wasted work.
    pub fn clear(&mut self) {
        self.adds.clear();
        self.updates.clear();
        self.slots.clear();
        self.removes.clear();
        self.tiles.clear();
    }

    /// Drains the batch into a payload, resolving add snapshots through
    /// `lookup`. Returns `None` when the batch is empty, so quiet regions
    /// cost nothing at commit.
    pub fn take<'a, F>(&mut self, region: RegionHandle, mut lookup: F) -> Option<Arc<RegionPayload>>
    where
        F: FnMut(EntityId) -> Option<&'a Entity>,
    {
        if self.is_empty() {
            return None;
        }
        let adds = self
            .adds
            .drain(..)
            .filter_map(|id| lookup(id).map(EntitySnapshot::of))
            .collect();
        self.slots.clear();
        Some(Arc::new(RegionPayload {
            region,
            adds,
            updates: std::mem::take(&mut self.updates),
            removes: std::mem::take(&mut self.removes),
            tiles: std::mem::take(&mut self.tiles),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use crate::types::MapId;

    fn handle() -> RegionHandle {
        RegionHandle {
            map: MapId(0),
            rx: 0,
            ry: 0,
        }
    }

    fn sample_entity(id: u32) -> Entity {
        Entity::new(
            EntityId(id),
            EntityKind::Player,
            "test",
            MapId(0),
            Vec2::new(1.0, 2.0),
        )
    }

    #[test]
    fn updates_for_one_entity_merge_per_flag() {
        let mut batch = UpdateBatch::new();
        let id = EntityId(1);

        let mut first = EntityDelta::new(id);
        first.flags = DirtyFlags::POSITION;
        first.x = 3.0;
        first.y = 4.0;
        batch.push_update(first);

        batch.push_update(EntityDelta::action(id, 9));

        let mut third = EntityDelta::new(id);
        third.flags = DirtyFlags::POSITION;
        third.x = 5.0;
        third.y = 6.0;
        batch.push_update(third);

        let payload = batch.take(handle(), |_| None).unwrap();
        assert_eq!(payload.updates.len(), 1);
        let merged = &payload.updates[0];
        assert!(merged.flags.contains(DirtyFlags::POSITION | DirtyFlags::ACTION));
        // Later position wins, earlier action survives.
        assert_eq!((merged.x, merged.y), (5.0, 6.0));
        assert_eq!(merged.action, Some(9));
    }

    #[test]
    fn removal_wins_over_update_in_either_order() {
        let mut batch = UpdateBatch::new();
        let id = EntityId(2);

        batch.push_update(EntityDelta::state(id, EntityState::SITTING));
        batch.push_remove(id);
        batch.push_update(EntityDelta::action(id, 1));

        let payload = batch.take(handle(), |_| None).unwrap();
        assert!(payload.updates.is_empty());
        assert_eq!(payload.removes, vec![id]);
    }

    #[test]
    fn add_then_remove_still_delivers_the_removal() {
        let mut batch = UpdateBatch::new();
        let id = EntityId(3);

        batch.push_add(id);
        batch.push_remove(id);

        // Subscribers who saw the entity in a region snapshot only learn of
        // its departure from the removal; for everyone else it is a no-op.
        let payload = batch.take(handle(), |_| None).unwrap();
        assert!(payload.adds.is_empty());
        assert_eq!(payload.removes, vec![id]);
    }

    #[test]
    fn remove_then_re_add_keeps_only_the_add() {
        let mut batch = UpdateBatch::new();
        let entity = sample_entity(4);

        batch.push_remove(entity.id);
        batch.push_add(entity.id);

        let payload = batch.take(handle(), |id| (id == entity.id).then_some(&entity)).unwrap();
        assert!(payload.removes.is_empty());
        assert_eq!(payload.adds.len(), 1);
        assert_eq!(payload.adds[0].id, entity.id);
    }

    #[test]
    fn add_snapshot_carries_end_of_tick_state() {
        let mut batch = UpdateBatch::new();
        let mut entity = sample_entity(5);
        batch.push_add(entity.id);

        // State changes after the add was pushed but before commit.
        entity.position = Vec2::new(8.0, 9.0);
        entity.state.insert(EntityState::FLYING);

        let payload = batch.take(handle(), |id| (id == entity.id).then_some(&entity)).unwrap();
        assert_eq!(payload.adds[0].x, 8.0);
        assert!(payload.adds[0].state.has(EntityState::FLYING));
    }

    #[test]
    fn tile_writes_to_one_cell_keep_the_last() {
        let mut batch = UpdateBatch::new();
        batch.push_tile(TileUpdate { x: 2, y: 3, tile: Tile::Stone });
        batch.push_tile(TileUpdate { x: 4, y: 3, tile: Tile::Sand });
        batch.push_tile(TileUpdate { x: 2, y: 3, tile: Tile::Grass });

        let payload = batch.take(handle(), |_| None).unwrap();
        assert_eq!(payload.tiles.len(), 2);
        assert_eq!(payload.tiles[0].tile, Tile::Grass);
        assert_eq!(payload.tiles[1].tile, Tile::Sand);
    }

    #[test]
    fn clear_discards_pending_traffic() {
        let mut batch = UpdateBatch::new();
        batch.push_add(EntityId(7));
        batch.push_update(EntityDelta::state(EntityId(8), EntityState::SITTING));
        batch.clear();
        assert!(batch.is_empty());
        assert!(batch.take(handle(), |_| None).is_none());
    }

    #[test]
    fn take_drains_the_batch() {
        let mut batch = UpdateBatch::new();
        batch.push_tile(TileUpdate {
            x: 1,
            y: 1,
            tile: Tile::Stone,
        });
        assert!(batch.take(handle(), |_| None).is_some());
        assert!(batch.is_empty());
        assert!(batch.take(handle(), |_| None).is_none());
    }
}
