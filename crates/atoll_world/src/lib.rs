//! # Atoll World Simulation Core
//!
//! Authoritative state management for a tile-based multiplayer world. The
//! crate is the single owner of all game state and exposes it through one
//! type, [`World`]; a host (see the `atoll_server` crate) drives it from a
//! single task and ships the per-tick output to connections.
//!
//! ## Subsystems
//!
//! - **Region grid** ([`map`], [`region`]) - every map is partitioned into
//!   fixed-size square regions with hysteresis borders, so entities near a
//!   cell edge do not bounce between regions
//! - **Delta batching** ([`batch`]) - changes accumulate per region per
//!   tick, merge per entity, and commit into one shared payload per region
//! - **Interest management** ([`subscription`], [`client`]) - clients
//!   subscribe to the regions under their camera plus a margin; entering a
//!   region's interest set delivers a full snapshot, leaving it a teardown
//!   notice
//! - **Movement validation** ([`movement`]) - client movement reports are
//!   screened for speed, lag, collisions, and map bounds before they touch
//!   authoritative state
//! - **Controllers** ([`controller`]) - server-side game logic hooks into
//!   the tick through trait objects
//!
//! ## Quick Start
//!
//! ```rust
//! use atoll_world::{ClientId, World, WorldConfig};
//!
//! let mut world = World::new(WorldConfig::default());
//! world.initialize(0);
//!
//! let client = ClientId::new();
//! world.add_client(client, "mara").unwrap();
//! // The join materializes at the next tick boundary, and the client's
//! // first frame carries snapshots of every region it can see.
//! let frames = world.update(0.05, 50);
//! assert!(frames.iter().any(|f| f.client == client));
//! ```
//!
//! ## Threading Model
//!
//! A [`World`] is deliberately not `Sync`: exactly one task owns it and
//! every mutation goes through `&mut self`. Anything asynchronous (sockets,
//! timers, persistence) lives outside and communicates through the owning
//! task. This keeps the tick loop free of locks and makes every tick
//! reproducible from its inputs.

pub mod batch;
pub mod client;
pub mod config;
pub mod controller;
pub mod entity;
pub mod error;
pub mod map;
pub mod movement;
pub mod region;
pub mod subscription;
pub mod templates;
pub mod types;
pub mod world;

#[cfg(test)]
mod tests;

pub use batch::{
    ClientNotice, EntityDelta, EntitySnapshot, RegionPayload, RegionSnapshot, UpdateBatch,
};
pub use client::{Client, ClientFrame};
pub use config::{LagPolicy, MovementConfig, TeleportPolicy, WorldConfig};
pub use controller::{Controller, PatrolController, SPARSE_UPDATE_INTERVAL_TICKS};
pub use entity::{Entity, EntityKind};
pub use error::{KickReason, WorldError, WorldResult};
pub use map::WorldMap;
pub use movement::{collides, validate_movement, MovementOutcome, MovementPacket};
pub use region::Region;
pub use subscription::{desired_regions, diff_interest, InterestDiff};
pub use templates::{MapTemplate, ATOLL_TEMPLATE};
pub use types::{
    ClientId, DirtyFlags, EntityId, EntityOptions, EntityState, MapId, Rect, RegionHandle, Tile,
    TileUpdate, Vec2, REGION_BORDER, REGION_SIZE,
};
pub use world::{World, WorldStats};

/// Crate version, for host banners and diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
