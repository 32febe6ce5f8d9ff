//! # World State and Tick Loop
//!
//! The [`World`] owns everything: maps with their region grids, the entity
//! registry, connected clients, and the registered controllers. All
//! mutation happens through its methods, and all replication happens at the
//! tick boundary inside [`World::update`].
//!
//! ## Tick order
//!
//! 1. Advance moving entities by their velocity, gated on each entity's
//!    last-update stamp so a replayed tick is a no-op.
//! 2. Reassign movable entities to regions, with hysteresis.
//! 3. Run controllers (and their sparse pass on the slower cadence).
//! 4. Refresh client interest sets: tear down stale subscriptions, snapshot
//!    fresh ones.
//! 5. Commit every region's batch into one shared payload and fan it out to
//!    subscribers.
//! 6. Admit queued joins, so new clients appear only at a boundary and
//!    their first frame is pure snapshots.
//! 7. Flush per-client frames and tear down departing sessions.
//!
//! The world is single-owner by construction: nothing here is `Sync`, and a
//! host drives one world from one task, handing mutations in through its
//! own inbox.

use crate::batch::{ClientNotice, EntityDelta, EntitySnapshot, RegionSnapshot};
use crate::client::{Client, ClientFrame};
use crate::config::WorldConfig;
use crate::controller::{Controller, SPARSE_UPDATE_INTERVAL_TICKS};
use crate::entity::{Entity, EntityKind};
use crate::error::{KickReason, WorldError, WorldResult};
use crate::map::WorldMap;
use crate::movement::{validate_movement, MovementOutcome, MovementPacket};
use crate::subscription::{desired_regions, diff_interest};
use crate::templates::ATOLL_TEMPLATE;
use crate::types::{ClientId, EntityId, EntityState, MapId, Rect, Tile, Vec2};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default client viewport in world units, used until the first camera
/// report arrives.
const DEFAULT_CAMERA: (f32, f32) = (18.0, 12.0);

/// Counters accumulated over the world's lifetime.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorldStats {
    pub ticks: u64,
    pub joins: u64,
    pub leaves: u64,
    pub kicks: u64,
    pub payloads_committed: u64,
    pub frames_flushed: u64,
    pub subscribes: u64,
    pub unsubscribes: u64,
    pub movement_applied: u64,
    pub movement_rejected: u64,
}

/// A join waiting for the next tick boundary.
struct PendingJoin {
    client: ClientId,
    name: String,
    /// A kick that arrived before the join materialized. Applied right
    /// after admission, so the notice still goes out through the normal
    /// two-phase path.
    kicked: Option<KickReason>,
}

/// The authoritative simulation state.
pub struct World {
    config: WorldConfig,
    maps: Vec<WorldMap>,
    entities: HashMap<EntityId, Entity>,
    clients: HashMap<ClientId, Client>,
    controllers: Vec<Box<dyn Controller>>,
    pending_joins: Vec<PendingJoin>,
    next_entity: u32,
    tick: u64,
    now_ms: u64,
    initialized: bool,
    stats: WorldStats,
}

impl World {
    /// Creates a world with the default atoll map.
    pub fn new(config: WorldConfig) -> Self {
        Self::with_maps(config, vec![ATOLL_TEMPLATE.build(MapId(0))])
    }

    /// Creates a world over the given maps. Map ids must match their index
    /// in the list.
    pub fn with_maps(config: WorldConfig, maps: Vec<WorldMap>) -> Self {
        debug_assert!(!maps.is_empty());
        debug_assert!(maps.iter().enumerate().all(|(i, m)| m.id.0 as usize == i));
        Self {
            config,
            maps,
            entities: HashMap::new(),
            clients: HashMap::new(),
            controllers: Vec::new(),
            pending_joins: Vec::new(),
            next_entity: 1,
            tick: 0,
            now_ms: 0,
            initialized: false,
            stats: WorldStats::default(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn stats(&self) -> &WorldStats {
        &self.stats
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Iterates every entity in the registry, in unspecified order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn client(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn map(&self, id: MapId) -> Option<&WorldMap> {
        self.maps.get(id.0 as usize)
    }

    /// The map new clients join.
    pub fn primary_map(&self) -> &WorldMap {
        &self.maps[0]
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Controller helper: an entity's current position.
    pub fn entity_position(&self, id: EntityId) -> Option<Vec2> {
        self.entities.get(&id).map(|e| e.position)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// One-time startup: seeds the clock and initializes every controller
    /// registered so far. Safe to call once; later calls are no-ops.
    pub fn initialize(&mut self, now_ms: u64) {
        if self.initialized {
            return;
        }
        self.now_ms = now_ms;
        self.initialized = true;
        self.init_controllers(now_ms);
        info!(
            maps = self.maps.len(),
            controllers = self.controllers.len(),
            "🌊 world initialized"
        );
    }

    /// Rebuilds the world's content in place: every non-player entity is
    /// despawned and every controller re-runs its initialize pass. Player
    /// pawns, sessions, and tile edits survive; subscribers see the churn
    /// as ordinary removals and adds at the next commit.
    pub fn reset(&mut self, now_ms: u64) {
        if !self.initialized {
            self.initialize(now_ms);
            return;
        }
        let doomed: Vec<EntityId> = self
            .entities
            .values()
            .filter(|e| e.kind != EntityKind::Player)
            .map(|e| e.id)
            .collect();
        for id in doomed {
            self.despawn_entity_internal(id);
        }
        self.init_controllers(now_ms);
        info!(
            controllers = self.controllers.len(),
            "🔄 world content reset"
        );
    }

    fn init_controllers(&mut self, now_ms: u64) {
        let mut controllers = std::mem::take(&mut self.controllers);
        for controller in controllers.iter_mut() {
            debug!(controller = controller.name(), "initializing controller");
            controller.initialize(self, now_ms);
        }
        controllers.append(&mut self.controllers);
        self.controllers = controllers;
    }

    /// Registers a controller. When the world is already initialized the
    /// controller is initialized immediately, otherwise at
    /// [`World::initialize`].
    pub fn add_controller(&mut self, mut controller: Box<dyn Controller>) {
        if self.initialized {
            controller.initialize(self, self.now_ms);
        }
        self.controllers.push(controller);
    }

    // ------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------

    /// Queues a client join under a caller-minted id, so the transport can
    /// wire up its send path before the session exists. The session and its
    /// entity materialize at the end of the next tick, after that tick's
    /// commit, so the joiner's first frame is pure snapshots and mid-tick
    /// observers never see a partial join.
    pub fn add_client(&mut self, id: ClientId, name: impl Into<String>) -> WorldResult<()> {
        if self.clients.contains_key(&id) || self.pending_joins.iter().any(|j| j.client == id) {
            return Err(WorldError::ClientAlreadyConnected(id));
        }
        self.pending_joins.push(PendingJoin {
            client: id,
            name: name.into(),
            kicked: None,
        });
        debug!(client = %id, "join queued");
        Ok(())
    }

    /// Removes a client that disconnected on its own. Teardown is silent:
    /// no unsubscribe notices are produced for a connection that is gone.
    pub fn remove_client(&mut self, id: ClientId) -> WorldResult<()> {
        if !self.clients.contains_key(&id) {
            // The join may still be pending; cancel it quietly.
            if let Some(at) = self.pending_joins.iter().position(|j| j.client == id) {
                self.pending_joins.swap_remove(at);
                return Ok(());
            }
            return Err(WorldError::ClientNotFound(id));
        }
        self.teardown_client(id);
        self.stats.leaves += 1;
        info!(client = %id, "👋 client left");
        Ok(())
    }

    /// Starts a server-initiated disconnect. The client receives a
    /// [`ClientNotice::Kicked`] in its next frame and the session is torn
    /// down after that frame is flushed; the host closes the socket after
    /// its grace period.
    pub fn kick_client(&mut self, id: ClientId, reason: KickReason) -> WorldResult<()> {
        let Some(client) = self.clients.get_mut(&id) else {
            // A kick can race a queued join. Park it on the join so the
            // session is admitted, notified, and torn down in one tick.
            if let Some(join) = self.pending_joins.iter_mut().find(|j| j.client == id) {
                if join.kicked.is_none() {
                    join.kicked = Some(reason);
                }
                return Ok(());
            }
            return Err(WorldError::ClientNotFound(id));
        };
        if client.departing {
            return Ok(());
        }
        client.departing = true;
        client.queue_notice(ClientNotice::Kicked {
            reason: reason.clone(),
        });
        self.stats.kicks += 1;
        warn!(client = %id, %reason, "⛔ kicking client");
        Ok(())
    }

    /// Updates a client's viewport. Interest sets are refreshed at the next
    /// tick boundary.
    pub fn update_camera(&mut self, id: ClientId, camera: Rect) -> WorldResult<()> {
        if !(camera.x.is_finite()
            && camera.y.is_finite()
            && camera.w.is_finite()
            && camera.h.is_finite())
            || camera.w <= 0.0
            || camera.h <= 0.0
        {
            return Err(WorldError::invalid_packet("bad camera rect"));
        }
        let client = self
            .clients
            .get_mut(&id)
            .ok_or(WorldError::ClientNotFound(id))?;
        client.camera = camera;
        Ok(())
    }

    /// Clears the position-fix gate after the client confirmed the snap.
    /// The report baseline restarts so the frozen interval is not measured
    /// as movement time.
    pub fn acknowledge_position_fix(&mut self, id: ClientId) -> WorldResult<()> {
        let client = self
            .clients
            .get_mut(&id)
            .ok_or(WorldError::ClientNotFound(id))?;
        client.awaiting_fix_ack = false;
        client.last_report_server_ms = 0;
        client.last_report_client_ms = 0;
        Ok(())
    }

    /// Runs a movement report through validation and applies the verdict:
    /// accepted movement is queued for broadcast, a kick verdict starts the
    /// two-phase disconnect.
    ///
    /// Reports racing a queued join describe a world the client has not
    /// been shown yet; they are dropped as [`MovementOutcome::Ignored`]
    /// rather than treated as an error.
    pub fn handle_movement(
        &mut self,
        client_id: ClientId,
        packet: &MovementPacket,
        now_ms: u64,
    ) -> WorldResult<MovementOutcome> {
        let Some(client) = self.clients.get_mut(&client_id) else {
            if self.pending_joins.iter().any(|j| j.client == client_id) {
                debug!(client = %client_id, "movement before join materialized, dropped");
                return Ok(MovementOutcome::Ignored);
            }
            return Err(WorldError::ClientNotFound(client_id));
        };
        let entity_id = client.entity;
        let entity = self
            .entities
            .get_mut(&entity_id)
            .ok_or(WorldError::EntityNotFound(entity_id))?;
        let map = self
            .maps
            .get(entity.map.0 as usize)
            .ok_or(WorldError::MapNotFound(entity.map))?;
        let had_cancellable_expression =
            entity.expr_cancellable && entity.options.expression.is_some();

        let outcome =
            validate_movement(client, entity, map, &self.config.movement, packet, now_ms)?;
        let expression_cancelled =
            had_cancellable_expression && entity.options.expression.is_none();

        match &outcome {
            MovementOutcome::Applied | MovementOutcome::CorrectedToSafe => {
                self.stats.movement_applied += 1;
                self.push_entity_movement(entity_id);
                if expression_cancelled {
                    self.push_entity_options(entity_id);
                }
            }
            MovementOutcome::Fixed => {
                self.stats.movement_rejected += 1;
                // The fix takes effect for observers too.
                self.push_entity_movement(entity_id);
            }
            MovementOutcome::Ignored => {}
            MovementOutcome::Kicked(reason) => {
                self.stats.movement_rejected += 1;
                self.kick_client(client_id, reason.clone())?;
            }
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Spawns a controller-driven NPC on the primary map and places it in
    /// its region. Visible to subscribers at the next commit.
    pub fn spawn_npc(&mut self, name: impl Into<String>, position: Vec2, now_ms: u64) -> EntityId {
        self.spawn_entity(EntityKind::Npc, name.into(), position, now_ms, true)
    }

    /// Spawns a static prop on the primary map. Props sit out the per-tick
    /// movement and region scans; they still replicate state and option
    /// changes, and [`World::teleport_entity`] can relocate them.
    pub fn spawn_prop(&mut self, name: impl Into<String>, position: Vec2, now_ms: u64) -> EntityId {
        self.spawn_entity(EntityKind::Prop, name.into(), position, now_ms, false)
    }

    fn spawn_entity(
        &mut self,
        kind: EntityKind,
        name: String,
        position: Vec2,
        now_ms: u64,
        movable: bool,
    ) -> EntityId {
        let map_id = self.primary_map().id;
        let id = self.alloc_entity_id();
        let mut entity = Entity::new(id, kind, name, map_id, position);
        entity.movable = movable;
        entity.last_update = now_ms;
        self.entities.insert(id, entity);
        self.settle_entity_region(id);
        id
    }

    /// Removes an entity from the world. Player pawns are refused; remove
    /// the owning client instead.
    pub fn despawn_entity(&mut self, id: EntityId) -> WorldResult<()> {
        let entity = self
            .entities
            .get(&id)
            .ok_or(WorldError::EntityNotFound(id))?;
        if let Some(owner) = entity.owner {
            return Err(WorldError::NotOwner {
                client: owner,
                entity: id,
            });
        }
        self.despawn_entity_internal(id);
        Ok(())
    }

    /// Controller helper: sets an entity's velocity and broadcasts the
    /// change.
    pub fn set_entity_velocity(&mut self, id: EntityId, velocity: Vec2) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.velocity = velocity;
            entity.update_facing();
        }
        self.push_entity_movement(id);
    }

    /// Moves an entity to an exact position, server-side. Unlike client
    /// movement this is trusted, but it still refuses positions off the
    /// map.
    pub fn teleport_entity(&mut self, id: EntityId, position: Vec2, now_ms: u64) -> WorldResult<()> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(WorldError::EntityNotFound(id))?;
        let map = self
            .maps
            .get(entity.map.0 as usize)
            .ok_or(WorldError::MapNotFound(entity.map))?;
        if !map.contains(position) {
            return Err(WorldError::PositionOutOfBounds {
                map: map.id,
                x: position.x,
                y: position.y,
            });
        }
        entity.position = position;
        entity.last_update = now_ms;
        if !map.blocked(position) {
            entity.safe_position = position;
        }
        // Settle the region before queueing, so the delta lands where the
        // entity now is.
        self.settle_entity_region(id);
        self.push_entity_movement(id);
        Ok(())
    }

    /// Replaces an entity's expression overlay and broadcasts the new
    /// options bag. `None` clears it. A `cancellable` overlay is dropped
    /// again by the entity's next accepted movement report.
    pub fn set_entity_expression(
        &mut self,
        id: EntityId,
        expression: Option<u16>,
        cancellable: bool,
    ) -> WorldResult<()> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(WorldError::EntityNotFound(id))?;
        entity.options.expression = expression;
        entity.expr_cancellable = cancellable && expression.is_some();
        self.push_entity_options(id);
        Ok(())
    }

    /// Broadcasts a one-shot action (wave, boop, ...) without changing any
    /// persistent entity state.
    pub fn play_entity_action(&mut self, id: EntityId, action: u16) -> WorldResult<()> {
        if !self.entities.contains_key(&id) {
            return Err(WorldError::EntityNotFound(id));
        }
        self.push_to_entity_region(id, EntityDelta::action(id, action));
        Ok(())
    }

    /// Sets and clears state bits server-side, for overlays clients may
    /// not drive themselves (head-turn and the like).
    pub fn set_entity_state_bits(
        &mut self,
        id: EntityId,
        insert: EntityState,
        remove: EntityState,
    ) -> WorldResult<()> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(WorldError::EntityNotFound(id))?;
        entity.state.insert(insert);
        entity.state.remove(remove);
        let delta = EntityDelta::state(id, entity.state);
        self.push_to_entity_region(id, delta);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tiles
    // ------------------------------------------------------------------

    /// Mutates a tile; subscribers of the owning region see the change at
    /// the next commit.
    pub fn set_tile(&mut self, map: MapId, x: u16, y: u16, tile: Tile) -> WorldResult<()> {
        self.maps
            .get_mut(map.0 as usize)
            .ok_or(WorldError::MapNotFound(map))?
            .set_tile(x, y, tile)
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advances the world one tick and returns every client's frame for
    /// the boundary. `dt` is the nominal tick length in seconds; entity
    /// advancement uses each entity's own elapsed time so a replayed call
    /// with the same `now_ms` changes nothing.
    pub fn update(&mut self, dt: f32, now_ms: u64) -> Vec<ClientFrame> {
        if !self.initialized {
            self.initialize(now_ms);
        }

        self.advance_entities(now_ms);
        self.update_regions();
        self.run_controllers(dt, now_ms);
        self.update_interest();
        self.commit_regions();
        self.process_joins(now_ms);
        let frames = self.flush_clients();

        self.tick += 1;
        self.now_ms = now_ms;
        self.stats.ticks += 1;
        self.stats.frames_flushed += frames.len() as u64;
        frames
    }

    /// Admits every queued join in two phases: first all pawns spawn, then
    /// each joiner runs its first interest pass. The split means clients
    /// joining in the same tick appear in each other's snapshots.
    fn process_joins(&mut self, now_ms: u64) {
        if self.pending_joins.is_empty() {
            return;
        }
        let joins = std::mem::take(&mut self.pending_joins);
        let mut admitted = Vec::with_capacity(joins.len());
        for join in joins {
            let map = self.primary_map();
            let map_id = map.id;
            let spawn = map.spawn;
            let id = self.spawn_entity(EntityKind::Player, join.name, spawn, now_ms, true);
            if let Some(entity) = self.entities.get_mut(&id) {
                entity.owner = Some(join.client);
            }

            let (w, h) = DEFAULT_CAMERA;
            let camera = Rect::new(spawn.x - w / 2.0, spawn.y - h / 2.0, w, h);
            self.clients
                .insert(join.client, Client::new(join.client, id, map_id, camera));
            self.stats.joins += 1;
            admitted.push(join.client);
            info!(client = %join.client, entity = %id, "🧭 client joined");

            if let Some(reason) = join.kicked {
                // Kicked while the join was queued: the session exists just
                // long enough to hear why it is being closed.
                let _ = self.kick_client(join.client, reason);
            }
        }

        let maps = &mut self.maps;
        let entities = &self.entities;
        let margin = self.config.interest_margin;
        let stats = &mut self.stats;
        for id in admitted {
            let Some(client) = self.clients.get_mut(&id) else {
                continue;
            };
            if client.departing {
                continue;
            }
            let Some(map) = maps.get_mut(client.map.0 as usize) else {
                continue;
            };
            Self::refresh_interest(map, entities, client, margin, stats);
        }
    }

    fn run_controllers(&mut self, dt: f32, now_ms: u64) {
        let sparse = self.tick % SPARSE_UPDATE_INTERVAL_TICKS == 0;
        let mut controllers = std::mem::take(&mut self.controllers);
        for controller in controllers.iter_mut() {
            controller.update(self, dt, now_ms);
            if sparse {
                controller.sparse_update(self, now_ms);
            }
        }
        // Controllers registered during the pass land behind the existing
        // ones and first run next tick.
        controllers.append(&mut self.controllers);
        self.controllers = controllers;
    }

    fn advance_entities(&mut self, now_ms: u64) {
        let maps = &mut self.maps;
        for entity in self.entities.values_mut() {
            if !entity.movable || !entity.is_moving() || now_ms <= entity.last_update {
                continue;
            }
            let Some(map) = maps.get_mut(entity.map.0 as usize) else {
                continue;
            };
            let step = (now_ms - entity.last_update) as f32 / 1000.0;
            let candidate = Vec2::new(
                entity.position.x + entity.velocity.x * step,
                entity.position.y + entity.velocity.y * step,
            );
            if !map.contains(candidate) || crate::movement::collides(entity, candidate, map) {
                // Walked into a wall or the map edge: stop in place.
                entity.velocity = Vec2::zero();
                entity.last_update = now_ms;
                if let Some(handle) = entity.region {
                    map.region_by_handle_mut(handle)
                        .push_update(EntityDelta::movement(entity));
                }
                continue;
            }
            entity.position = candidate;
            entity.last_update = now_ms;
            if !map.blocked(candidate) {
                entity.safe_position = candidate;
            }
            if let Some(handle) = entity.region {
                map.region_by_handle_mut(handle)
                    .push_update(EntityDelta::position(entity));
            }
        }
    }

    fn update_regions(&mut self) {
        let maps = &mut self.maps;
        for entity in self.entities.values_mut() {
            if !entity.movable {
                continue;
            }
            let Some(map) = maps.get_mut(entity.map.0 as usize) else {
                continue;
            };
            let expected = map.expected_region(entity);
            if entity.region == Some(expected) {
                continue;
            }
            if let Some(old) = entity.region {
                map.region_by_handle_mut(old).remove_entity(entity.id);
            }
            map.region_by_handle_mut(expected).add_entity(entity.id);
            entity.region = Some(expected);
        }
    }

    fn update_interest(&mut self) {
        let maps = &mut self.maps;
        let entities = &self.entities;
        let margin = self.config.interest_margin;
        let stats = &mut self.stats;
        for client in self.clients.values_mut() {
            if client.departing {
                continue;
            }
            let Some(map) = maps.get_mut(client.map.0 as usize) else {
                continue;
            };
            Self::refresh_interest(map, entities, client, margin, stats);
        }
    }

    /// One client's interest pass: tears down subscriptions whose regions
    /// left the padded camera, subscribes and snapshots the ones that
    /// entered. The snapshot reflects entity state at call time, so payloads
    /// committed later this tick are suppressed for fresh subscribers.
    fn refresh_interest(
        map: &mut WorldMap,
        entities: &HashMap<EntityId, Entity>,
        client: &mut Client,
        margin: f32,
        stats: &mut WorldStats,
    ) {
        let desired = desired_regions(map, client.camera, margin);
        let diff = diff_interest(&client.subscriptions, &desired);
        for handle in diff.unsubscribe {
            map.region_by_handle_mut(handle).unsubscribe(client.id);
            client.subscriptions.remove(&handle);
            client.queue_unsubscribed(handle);
            stats.unsubscribes += 1;
        }
        for handle in diff.subscribe {
            let tiles = map.region_tiles(handle.rx, handle.ry);
            let region = map.region_by_handle_mut(handle);
            region.subscribe(client.id);
            let snapshot = RegionSnapshot {
                region: handle,
                tiles,
                entities: region
                    .entities
                    .iter()
                    .filter_map(|id| entities.get(id))
                    .map(EntitySnapshot::of)
                    .collect(),
            };
            client.subscriptions.insert(handle);
            client.fresh_subscriptions.insert(handle);
            client.queue_snapshot(snapshot);
            stats.subscribes += 1;
        }
    }

    fn commit_regions(&mut self) {
        let entities = &self.entities;
        let clients = &mut self.clients;
        let mut committed = 0u64;
        for map in self.maps.iter_mut() {
            for region in map.regions_mut() {
                if region.clients.is_empty() {
                    // Nobody is listening; drop the traffic unencoded.
                    region.batch.clear();
                    continue;
                }
                let handle = region.handle;
                let Some(payload) = region.batch.take(handle, |id| entities.get(&id)) else {
                    continue;
                };
                committed += 1;
                for client_id in &region.clients {
                    let Some(client) = clients.get_mut(client_id) else {
                        continue;
                    };
                    // Fresh subscribers already hold this state in their
                    // snapshot.
                    if client.fresh_subscriptions.contains(&handle) {
                        continue;
                    }
                    client.queue_payload(Arc::clone(&payload));
                }
            }
        }
        self.stats.payloads_committed += committed;
    }

    fn flush_clients(&mut self) -> Vec<ClientFrame> {
        let mut frames = Vec::new();
        let mut departed = Vec::new();
        for client in self.clients.values_mut() {
            client.fresh_subscriptions.clear();
            if let Some(frame) = client.take_frame() {
                frames.push(frame);
            }
            if client.departing {
                departed.push(client.id);
            }
        }
        for id in departed {
            self.teardown_client(id);
        }
        frames
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn alloc_entity_id(&mut self) -> EntityId {
        let id = EntityId(self.next_entity);
        self.next_entity += 1;
        id
    }

    /// Assigns an entity to the region covering its position, migrating it
    /// out of its current region when needed. Used at spawn and after
    /// server-side position changes; per-tick drift goes through the
    /// region scan instead.
    fn settle_entity_region(&mut self, id: EntityId) {
        let maps = &mut self.maps;
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        let Some(map) = maps.get_mut(entity.map.0 as usize) else {
            return;
        };
        let expected = map.expected_region(entity);
        if entity.region == Some(expected) {
            return;
        }
        if let Some(old) = entity.region {
            map.region_by_handle_mut(old).remove_entity(id);
        }
        map.region_by_handle_mut(expected).add_entity(id);
        entity.region = Some(expected);
    }

    /// Queues a full movement delta for the entity's current region.
    fn push_entity_movement(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        let delta = EntityDelta::movement(entity);
        self.push_to_entity_region(id, delta);
    }

    /// Queues a full options delta for the entity's current region.
    fn push_entity_options(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        let delta = EntityDelta::options(id, entity.options.clone());
        self.push_to_entity_region(id, delta);
    }

    fn push_to_entity_region(&mut self, id: EntityId, delta: EntityDelta) {
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        let Some(handle) = entity.region else {
            return;
        };
        let Some(map) = self.maps.get_mut(handle.map.0 as usize) else {
            return;
        };
        map.region_by_handle_mut(handle).push_update(delta);
    }

    fn despawn_entity_internal(&mut self, id: EntityId) {
        let Some(entity) = self.entities.remove(&id) else {
            return;
        };
        if let Some(handle) = entity.region {
            if let Some(map) = self.maps.get_mut(handle.map.0 as usize) {
                map.region_by_handle_mut(handle).remove_entity(id);
            }
        }
    }

    /// Drops a client record, its subscriptions, and its entity. Produces
    /// no notices; callers queue those first when the protocol calls for
    /// them.
    fn teardown_client(&mut self, id: ClientId) {
        let Some(client) = self.clients.remove(&id) else {
            return;
        };
        if let Some(map) = self.maps.get_mut(client.map.0 as usize) {
            for handle in &client.subscriptions {
                map.region_by_handle_mut(*handle).unsubscribe(id);
            }
        }
        self.despawn_entity_internal(client.entity);
    }
}
