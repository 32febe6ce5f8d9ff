//! # Simulation Error Types
//!
//! Error types for the world core. Recoverable per-operation failures are
//! reported through [`WorldError`]; disconnect causes travel separately as
//! [`KickReason`] so they can be replicated to the client being removed.

use crate::types::{ClientId, EntityId, MapId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by world operations.
#[derive(Debug, Error)]
pub enum WorldError {
    /// An operation referenced an entity that is not in the registry.
    #[error("Entity {0} not found")]
    EntityNotFound(EntityId),

    /// An operation referenced a client that is not connected.
    #[error("Client {0} not found")]
    ClientNotFound(ClientId),

    /// A join reused an id that is already connected or queued.
    #[error("Client {0} already connected")]
    ClientAlreadyConnected(ClientId),

    /// An operation referenced a map index outside the world's map list.
    #[error("Map {0} not found")]
    MapNotFound(MapId),

    /// A client tried to act through an entity it does not own.
    #[error("Client {client} does not control entity {entity}")]
    NotOwner { client: ClientId, entity: EntityId },

    /// A tile mutation targeted coordinates outside the map.
    #[error("Tile ({x}, {y}) is outside map {map}")]
    TileOutOfBounds { map: MapId, x: u16, y: u16 },

    /// A server-side move targeted a position outside the map.
    #[error("Position ({x}, {y}) is outside map {map}")]
    PositionOutOfBounds { map: MapId, x: f32, y: f32 },

    /// A packet from a client failed structural validation.
    #[error("Invalid client packet: {0}")]
    InvalidPacket(String),

    /// A map template could not be built.
    #[error("Map template error: {0}")]
    Template(String),
}

impl WorldError {
    /// Creates an invalid-packet error from any message.
    pub fn invalid_packet<S: Into<String>>(msg: S) -> Self {
        Self::InvalidPacket(msg.into())
    }

    /// Creates a template error from any message.
    pub fn template<S: Into<String>>(msg: S) -> Self {
        Self::Template(msg.into())
    }
}

/// Result type alias for world operations.
pub type WorldResult<T> = Result<T, WorldError>;

/// Why a client is being disconnected by the server.
///
/// Serialized into the kick notice so the client can show a reason before
/// the connection is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum KickReason {
    /// Movement report placed the entity outside the map bounds.
    OutsideMap,
    /// The speed heuristic fired past the configured tolerance.
    Speeding,
    /// Movement reports fell too far behind the server clock.
    LaggingBehind,
    /// An operator or controller requested the disconnect.
    Requested(String),
}

impl std::fmt::Display for KickReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KickReason::OutsideMap => write!(f, "moved outside the map"),
            KickReason::Speeding => write!(f, "movement speed exceeded the allowed limit"),
            KickReason::LaggingBehind => write!(f, "movement reports fell too far behind"),
            KickReason::Requested(why) => write!(f, "disconnected: {why}"),
        }
    }
}
