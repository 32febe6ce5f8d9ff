//! # World Controllers
//!
//! Server-side game logic plugs into the tick loop through the
//! [`Controller`] trait. Controllers are owned by the world and driven in
//! registration order: `initialize` once when the world starts, `update`
//! every tick, and `sparse_update` on a slower cadence for housekeeping
//! that does not need tick resolution.
//!
//! Controllers receive `&mut World` and may do anything a world operation
//! can: spawn and despawn entities, move them, flip tiles, or kick clients.

use crate::types::{EntityId, Vec2};
use crate::world::World;

/// How many ticks pass between `sparse_update` calls.
pub const SPARSE_UPDATE_INTERVAL_TICKS: u64 = 10;

/// A unit of server-side game logic attached to the world tick.
pub trait Controller: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Called once, before the first tick this controller sees.
    fn initialize(&mut self, world: &mut World, now_ms: u64);

    /// Called every tick with the elapsed time in seconds.
    fn update(&mut self, world: &mut World, dt: f32, now_ms: u64);

    /// Called every [`SPARSE_UPDATE_INTERVAL_TICKS`] ticks. Optional.
    fn sparse_update(&mut self, _world: &mut World, _now_ms: u64) {}
}

/// Drives an NPC back and forth along a horizontal patrol line.
///
/// The patrol is deterministic: direction flips at the endpoints, so two
/// worlds stepped with the same clock produce the same path.
pub struct PatrolController {
    name: String,
    npc_name: String,
    home: Vec2,
    half_width: f32,
    speed: f32,
    entity: Option<EntityId>,
    heading_right: bool,
}

impl PatrolController {
    pub fn new(
        name: impl Into<String>,
        npc_name: impl Into<String>,
        home: Vec2,
        half_width: f32,
        speed: f32,
    ) -> Self {
        Self {
            name: name.into(),
            npc_name: npc_name.into(),
            home,
            half_width,
            speed,
            entity: None,
            heading_right: true,
        }
    }

    /// The entity this controller spawned, once initialized.
    pub fn entity(&self) -> Option<EntityId> {
        self.entity
    }
}

impl Controller for PatrolController {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, world: &mut World, now_ms: u64) {
        let id = world.spawn_npc(self.npc_name.clone(), self.home, now_ms);
        world.set_entity_velocity(id, Vec2::new(self.speed, 0.0));
        self.entity = Some(id);
    }

    fn update(&mut self, world: &mut World, _dt: f32, _now_ms: u64) {
        let Some(id) = self.entity else {
            return;
        };
        let Some(position) = world.entity_position(id) else {
            // Despawned externally; stop driving it.
            self.entity = None;
            return;
        };
        let turn = if self.heading_right {
            position.x >= self.home.x + self.half_width
        } else {
            position.x <= self.home.x - self.half_width
        };
        if turn {
            self.heading_right = !self.heading_right;
            let vx = if self.heading_right {
                self.speed
            } else {
                -self.speed
            };
            world.set_entity_velocity(id, Vec2::new(vx, 0.0));
        }
    }
}
