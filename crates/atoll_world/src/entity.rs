//! # Entity Model
//!
//! The per-entity simulation record. Entities live in the world's registry
//! and carry a weak [`RegionHandle`] back-reference into the region grid so
//! region maintenance never walks the whole registry.

use crate::types::{ClientId, EntityId, EntityOptions, EntityState, MapId, RegionHandle, Vec2};
use serde::{Deserialize, Serialize};

/// What kind of thing an entity is. Affects ownership and despawn rules,
/// not replication: all kinds flow through the same delta path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Controlled by a connected client.
    Player,
    /// Driven by a server-side controller.
    Npc,
    /// Static decoration; may still receive state or option updates.
    Prop,
}

/// A single simulated entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Registry id, unique for the process lifetime.
    pub id: EntityId,
    /// Entity kind.
    pub kind: EntityKind,
    /// Display name shown to nearby clients.
    pub name: String,
    /// Map the entity lives on.
    pub map: MapId,
    /// Authoritative position in world units.
    pub position: Vec2,
    /// Current velocity in world units per second.
    pub velocity: Vec2,
    /// Packed pose and expression bits.
    pub state: EntityState,
    /// Sparse display options.
    pub options: EntityOptions,
    /// Whether the tick loop advances this entity by its velocity and
    /// migrates it between regions. Off for props and other fixtures, which
    /// then skip the per-tick movement scan entirely.
    pub movable: bool,
    /// Whether the current expression overlay is cleared by an accepted
    /// movement report. Set alongside the overlay itself.
    pub expr_cancellable: bool,
    /// Region currently holding this entity, if it has been placed.
    pub region: Option<RegionHandle>,
    /// Owning client for player entities.
    pub owner: Option<ClientId>,
    /// Server time of the last authoritative position change, in
    /// milliseconds. Gates velocity advancement so replaying a tick with the
    /// same clock value is a no-op.
    pub last_update: u64,
    /// Last position accepted while free of collisions. Movement correction
    /// falls back here.
    pub safe_position: Vec2,
}

impl Entity {
    /// Creates an entity at the given position with no velocity and default
    /// state. Region placement happens separately when the entity is added
    /// to a world.
    pub fn new(id: EntityId, kind: EntityKind, name: impl Into<String>, map: MapId, position: Vec2) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            map,
            position,
            velocity: Vec2::zero(),
            state: EntityState::NONE,
            options: EntityOptions::default(),
            movable: true,
            expr_cancellable: false,
            region: None,
            owner: None,
            last_update: 0,
            safe_position: position,
        }
    }

    /// True for entities backed by a connected client.
    pub fn is_player(&self) -> bool {
        self.kind == EntityKind::Player
    }

    /// True when the entity has nonzero velocity.
    pub fn is_moving(&self) -> bool {
        self.velocity.x != 0.0 || self.velocity.y != 0.0
    }

    /// Updates the facing bit from the sign of horizontal velocity. Vertical
    /// or zero movement keeps the previous facing.
    pub fn update_facing(&mut self) {
        if self.velocity.x > 0.0 {
            self.state.insert(EntityState::FACING_RIGHT);
        } else if self.velocity.x < 0.0 {
            self.state.remove(EntityState::FACING_RIGHT);
        }
    }
}
