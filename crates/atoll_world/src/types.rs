//! # Core Type Definitions
//!
//! Fundamental types shared across the Atoll simulation core: identifiers,
//! world-space geometry, tile data, and the bit-flag sets used by the delta
//! batching and entity state machinery.
//!
//! ## Key Types
//!
//! - [`EntityId`] / [`ClientId`] / [`MapId`] - identifier newtypes that keep
//!   the various id spaces from being confused with one another
//! - [`RegionHandle`] - an entity's weak back-reference into the region grid
//! - [`Vec2`] / [`Rect`] - world-unit geometry (one world unit is one tile)
//! - [`DirtyFlags`] - which fields of a pending entity update are meaningful
//! - [`EntityState`] - packed visual/pose state bits replicated to clients

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tiles per region edge. Regions are square and cover the whole map grid.
pub const REGION_SIZE: u32 = 8;

/// Width of the hysteresis border around a region, in tiles. An entity keeps
/// its region assignment while it stays inside the border-expanded bounds.
pub const REGION_BORDER: f32 = 1.0;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an entity in the world.
///
/// Entity ids are assigned sequentially by the server when an entity is added
/// and are never reused within a process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a connected client.
///
/// A wrapper around UUID in the same spirit as the server's other id types:
/// a client id can never be mistaken for an entity id at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Creates a new random client id using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a client id from its string representation.
    pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for ClientId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str(s)
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a map within the world's map list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapId(pub u16);

impl std::fmt::Display for MapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Weak back-reference from an entity to the region currently holding it.
///
/// This is an index into the region grid rather than any kind of owning
/// pointer: regions live exactly as long as their map, and an entity holding
/// a handle never extends that lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionHandle {
    /// Map the region belongs to.
    pub map: MapId,
    /// Region grid x coordinate.
    pub rx: u16,
    /// Region grid y coordinate.
    pub ry: u16,
}

// ============================================================================
// Geometry
// ============================================================================

/// A 2D point or vector in world units (tiles).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    /// Creates a new vector with the given components.
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: Vec2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// True when both components are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// An axis-aligned rectangle in world units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    /// Creates a rectangle from its top-left corner and extents.
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Right edge coordinate.
    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    /// Bottom edge coordinate.
    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    /// Whether the point lies inside the rectangle (edges inclusive on the
    /// top-left side, exclusive on the bottom-right side).
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    /// Whether this rectangle overlaps another.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Returns a copy grown by `margin` on every side.
    pub fn expand(&self, margin: f32) -> Rect {
        Rect::new(
            self.x - margin,
            self.y - margin,
            self.w + margin * 2.0,
            self.h + margin * 2.0,
        )
    }
}

// ============================================================================
// Flag sets
// ============================================================================

/// Which fields of an [`EntityDelta`](crate::batch::EntityDelta) carry
/// meaningful values.
///
/// Flags accumulate across merges within a tick: merging two deltas ORs their
/// flags and overwrites only the fields the later delta actually set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirtyFlags(pub u16);

impl DirtyFlags {
    pub const NONE: DirtyFlags = DirtyFlags(0);
    /// Position (x, y) fields are set.
    pub const POSITION: DirtyFlags = DirtyFlags(1 << 0);
    /// Velocity (vx, vy) fields are set.
    pub const VELOCITY: DirtyFlags = DirtyFlags(1 << 1);
    /// State bit field is set.
    pub const STATE: DirtyFlags = DirtyFlags(1 << 2);
    /// One-shot action field is set.
    pub const ACTION: DirtyFlags = DirtyFlags(1 << 3);
    /// Options bag is set.
    pub const OPTIONS: DirtyFlags = DirtyFlags(1 << 4);
    /// Every field is set; used for full adds on region entry.
    pub const ALL: DirtyFlags = DirtyFlags(0b1_1111);

    /// True when every flag in `other` is present in `self`.
    pub fn contains(&self, other: DirtyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when no flag is set.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for DirtyFlags {
    type Output = DirtyFlags;

    fn bitor(self, rhs: DirtyFlags) -> DirtyFlags {
        DirtyFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for DirtyFlags {
    fn bitor_assign(&mut self, rhs: DirtyFlags) {
        self.0 |= rhs.0;
    }
}

/// Packed pose and expression state bits replicated to clients.
///
/// The facing bit tracks the sign of horizontal velocity. Head-turned is a
/// one-shot overlay cleared by the next accepted movement. The remaining bits
/// are client-driven poses accepted through movement reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityState(pub u32);

impl EntityState {
    pub const NONE: EntityState = EntityState(0);
    pub const FACING_RIGHT: EntityState = EntityState(1 << 0);
    pub const HEAD_TURNED: EntityState = EntityState(1 << 1);
    pub const SITTING: EntityState = EntityState(1 << 2);
    pub const LYING: EntityState = EntityState(1 << 3);
    pub const FLYING: EntityState = EntityState(1 << 4);

    /// Bits a client is allowed to drive directly through movement reports.
    /// Head-turned is excluded: it is set server-side and cleared by movement.
    pub const CLIENT_DRIVEN: EntityState =
        EntityState(Self::FACING_RIGHT.0 | Self::SITTING.0 | Self::LYING.0 | Self::FLYING.0);

    /// True when every bit in `bits` is set.
    pub fn has(&self, bits: EntityState) -> bool {
        self.0 & bits.0 == bits.0
    }

    /// Sets the given bits.
    pub fn insert(&mut self, bits: EntityState) {
        self.0 |= bits.0;
    }

    /// Clears the given bits.
    pub fn remove(&mut self, bits: EntityState) {
        self.0 &= !bits.0;
    }

    /// Replaces only the bits covered by `mask` with the values from `from`,
    /// leaving server-managed bits untouched.
    pub fn apply_masked(&mut self, from: EntityState, mask: EntityState) {
        self.0 = (self.0 & !mask.0) | (from.0 & mask.0);
    }
}

// ============================================================================
// Tiles
// ============================================================================

/// Ground tile kind. Tile contents are mutable; map shape is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Tile {
    /// Outside the playable area.
    #[default]
    Void = 0,
    Grass = 1,
    Dirt = 2,
    Sand = 3,
    Water = 4,
    Stone = 5,
    /// Solid wall, never walkable.
    Wall = 6,
}

impl Tile {
    /// Whether entities may stand on this tile.
    pub fn is_walkable(&self) -> bool {
        !matches!(self, Tile::Void | Tile::Water | Tile::Wall)
    }
}

/// A single pending tile mutation, batched per region per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileUpdate {
    /// Tile x coordinate in map space.
    pub x: u16,
    /// Tile y coordinate in map space.
    pub y: u16,
    /// New tile kind.
    pub tile: Tile,
}

// ============================================================================
// Entity options
// ============================================================================

/// Sparse per-entity display options replicated alongside state bits.
///
/// Fields are optional so the serialized form stays small for the common case
/// of an entity with no overlays active.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityOptions {
    /// Active expression overlay id, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<u16>,
    /// Held item id, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold: Option<u16>,
}

impl EntityOptions {
    /// True when no option is active.
    pub fn is_empty(&self) -> bool {
        self.expression.is_none() && self.hold.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_contains_and_intersects() {
        let r = Rect::new(0.0, 0.0, 8.0, 8.0);
        assert!(r.contains(Vec2::new(0.0, 0.0)));
        assert!(r.contains(Vec2::new(7.9, 7.9)));
        assert!(!r.contains(Vec2::new(8.0, 4.0)));

        let other = Rect::new(7.0, 7.0, 4.0, 4.0);
        assert!(r.intersects(&other));
        let disjoint = Rect::new(8.0, 0.0, 4.0, 4.0);
        assert!(!r.intersects(&disjoint));
    }

    #[test]
    fn rect_expand_grows_every_side() {
        let r = Rect::new(2.0, 3.0, 4.0, 5.0).expand(1.0);
        assert_eq!(r, Rect::new(1.0, 2.0, 6.0, 7.0));
    }

    #[test]
    fn dirty_flags_combine() {
        let flags = DirtyFlags::POSITION | DirtyFlags::STATE;
        assert!(flags.contains(DirtyFlags::POSITION));
        assert!(flags.contains(DirtyFlags::STATE));
        assert!(!flags.contains(DirtyFlags::VELOCITY));
        assert!(DirtyFlags::ALL.contains(flags));
    }

    #[test]
    fn entity_state_masked_apply_preserves_server_bits() {
        let mut state = EntityState::HEAD_TURNED;
        let mut claimed = EntityState::NONE;
        claimed.insert(EntityState::SITTING);
        claimed.insert(EntityState::HEAD_TURNED); // client may not set this

        state.apply_masked(claimed, EntityState::CLIENT_DRIVEN);
        assert!(state.has(EntityState::SITTING));
        assert!(state.has(EntityState::HEAD_TURNED)); // untouched by the mask

        state.remove(EntityState::HEAD_TURNED);
        assert!(!state.has(EntityState::HEAD_TURNED));
    }

    #[test]
    fn tile_walkability() {
        assert!(Tile::Grass.is_walkable());
        assert!(Tile::Stone.is_walkable());
        assert!(!Tile::Water.is_walkable());
        assert!(!Tile::Wall.is_walkable());
        assert!(!Tile::Void.is_walkable());
    }
}
