//! # Movement Validation
//!
//! Server-authoritative screening of client movement reports. The server
//! never trusts a claimed position outright: every report passes through a
//! fixed sequence of checks before any entity state changes.
//!
//! ## Check order
//!
//! 1. Structural validation of the packet (finite numbers).
//! 2. Reports are ignored while the client owes a position-fix ack.
//! 3. Implied-speed heuristic feeding the rolling teleport counter.
//! 4. Teleport policy, fired at most once per threshold crossing.
//! 5. Lag check against the configured [`LagPolicy`].
//! 6. Outside-map check. Always fatal; positions are never clamped back
//!    onto the map, because a clamp would convert an exploit into a
//!    teleport-to-edge tool.
//! 7. Collision check with fallback to the last safe position.
//! 8. Apply: position, velocity, masked state bits, overlay cancellation,
//!    timestamps.
//!
//! The lag and teleport checks can each be switched off in
//! [`MovementConfig`]; a disabled check is skipped entirely and leaves its
//! counters untouched.
//!
//! Client timestamps are never used to advance the simulation. They feed
//! the speed heuristic only as a tamper signal; authoritative elapsed time
//! always comes from the server clock.

use crate::client::Client;
use crate::config::{LagPolicy, MovementConfig, TeleportPolicy};
use crate::entity::Entity;
use crate::error::{KickReason, WorldError, WorldResult};
use crate::map::WorldMap;
use crate::types::{EntityState, Vec2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A movement report as received from a client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementPacket {
    /// Claimed position.
    pub x: f32,
    pub y: f32,
    /// Claimed velocity in world units per second.
    pub vx: f32,
    pub vy: f32,
    /// Claimed pose bits. Only client-driven bits are honored.
    pub state: EntityState,
    /// The client's own clock at send time, in ms. Treated as untrusted.
    pub client_time_ms: u64,
}

impl MovementPacket {
    fn claimed_position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    fn claimed_velocity(&self) -> Vec2 {
        Vec2::new(self.vx, self.vy)
    }
}

/// What the validator decided about one report.
#[derive(Debug, Clone, PartialEq)]
pub enum MovementOutcome {
    /// Report accepted as claimed.
    Applied,
    /// Claimed position collided; the entity was moved to its last safe
    /// position instead.
    CorrectedToSafe,
    /// Report dropped because the client owes a position-fix ack.
    Ignored,
    /// The teleport policy pushed the client back; a fix notice is queued
    /// and further reports are ignored until acknowledged.
    Fixed,
    /// The client must be disconnected.
    Kicked(KickReason),
}

impl MovementOutcome {
    /// True when the entity's position or state changed.
    pub fn applied(&self) -> bool {
        matches!(self, MovementOutcome::Applied | MovementOutcome::CorrectedToSafe)
    }
}

/// Whether an entity standing at `at` would collide with the map. Flying
/// entities pass over blocking tiles but are still bound by map edges,
/// which the outside-map check enforces before this runs.
pub fn collides(entity: &Entity, at: Vec2, map: &WorldMap) -> bool {
    if entity.state.has(EntityState::FLYING) {
        return false;
    }
    map.blocked(at)
}

/// Runs one movement report through the validation sequence.
///
/// On success the entity and client records are already updated; the caller
/// is responsible for queueing the resulting movement delta and for acting
/// on a [`MovementOutcome::Kicked`] verdict.
pub fn validate_movement(
    client: &mut Client,
    entity: &mut Entity,
    map: &WorldMap,
    config: &MovementConfig,
    packet: &MovementPacket,
    now_ms: u64,
) -> WorldResult<MovementOutcome> {
    // 1. Structure. A non-finite number is a protocol violation, not a
    // gameplay event.
    if !packet.claimed_position().is_finite() || !packet.claimed_velocity().is_finite() {
        return Err(WorldError::invalid_packet("non-finite movement values"));
    }

    // 2. Everything is dropped until the client confirms the snap-back.
    if client.awaiting_fix_ack {
        debug!(client = %client.id, "movement ignored while awaiting position fix ack");
        return Ok(MovementOutcome::Ignored);
    }

    let claimed = packet.claimed_position();
    let first_report = client.last_report_server_ms == 0;
    let server_elapsed = now_ms.saturating_sub(client.last_report_server_ms);
    let client_elapsed = packet
        .client_time_ms
        .saturating_sub(client.last_report_client_ms);

    if !first_report {
        if config.detect_teleports {
            // 3. Implied speed over server-measured elapsed time. The
            // claimed elapsed only matters as a tamper signal: stretching it
            // is the classic way to smuggle a teleport past a speed check.
            let elapsed_ms = server_elapsed.max(config.min_elapsed_ms as u64);
            let speed = entity.position.distance(claimed) / (elapsed_ms as f32 / 1000.0);
            let limit = config.max_speed * config.speed_tolerance;
            let stretched_clock =
                client_elapsed > (server_elapsed as f32 * config.speed_tolerance) as u64 + 250;

            if speed > limit || stretched_clock {
                client.teleport_counter += 1;
            } else {
                client.teleport_counter =
                    client.teleport_counter.saturating_sub(config.teleport_decay);
                if client.teleport_counter < config.teleport_threshold {
                    client.teleport_fired = false;
                }
            }

            // 4. Single-fire policy. The latch stays set until the counter
            // decays back below the threshold.
            if client.teleport_counter >= config.teleport_threshold && !client.teleport_fired {
                client.teleport_fired = true;
                match config.teleport_policy {
                    TeleportPolicy::Report => {
                        warn!(
                            client = %client.id,
                            entity = %entity.id,
                            speed,
                            limit,
                            counter = client.teleport_counter,
                            "teleport heuristic fired, reporting only"
                        );
                    }
                    TeleportPolicy::Correct => {
                        warn!(
                            client = %client.id,
                            entity = %entity.id,
                            speed,
                            "teleport heuristic fired, snapping to safe position"
                        );
                        entity.position = entity.safe_position;
                        entity.velocity = Vec2::zero();
                        entity.last_update = now_ms;
                        client.awaiting_fix_ack = true;
                        client.queue_notice(crate::batch::ClientNotice::fix_position(
                            entity.safe_position,
                        ));
                        return Ok(MovementOutcome::Fixed);
                    }
                    TeleportPolicy::Kick => {
                        return Ok(MovementOutcome::Kicked(KickReason::Speeding));
                    }
                }
            }
        }

        // 5. A report arriving long after the previous accepted one means
        // the client has gone quiet: a stale stream, a frozen process, or
        // deliberate slow-play. Measured on the server clock alone.
        if config.detect_lag && server_elapsed > config.lag_threshold_ms as u64 {
            match config.lag_policy {
                LagPolicy::Log => {
                    debug!(client = %client.id, server_elapsed, client_elapsed, "movement report lagging");
                }
                LagPolicy::Warn => {
                    warn!(client = %client.id, server_elapsed, client_elapsed, "movement report lagging");
                }
                LagPolicy::Kick => return Ok(MovementOutcome::Kicked(KickReason::LaggingBehind)),
            }
        }
    }

    // 6. Off the map is fatal, never clamped.
    if !map.contains(claimed) {
        warn!(client = %client.id, entity = %entity.id, x = claimed.x, y = claimed.y, "movement outside map bounds");
        return Ok(MovementOutcome::Kicked(KickReason::OutsideMap));
    }

    // 7. Collision fallback. If the safe position is itself blocked (the
    // world changed underneath it), the claim is the better of two bad
    // options and is accepted.
    let mut applied = claimed;
    let mut corrected = false;
    if collides(entity, claimed, map) && !collides(entity, entity.safe_position, map) {
        applied = entity.safe_position;
        corrected = true;
    }

    // 8. Apply.
    entity.position = applied;
    entity.velocity = packet.claimed_velocity();
    entity
        .state
        .apply_masked(packet.state, EntityState::CLIENT_DRIVEN);
    // Any accepted movement cancels the head-turn overlay, and the
    // expression overlay when it was set as cancellable.
    entity.state.remove(EntityState::HEAD_TURNED);
    if entity.expr_cancellable && entity.options.expression.is_some() {
        entity.options.expression = None;
        entity.expr_cancellable = false;
    }
    entity.update_facing();
    entity.last_update = now_ms;
    if !collides(entity, applied, map) {
        entity.safe_position = applied;
    }

    client.last_report_server_ms = now_ms;
    client.last_report_client_ms = packet.client_time_ms;

    Ok(if corrected {
        MovementOutcome::CorrectedToSafe
    } else {
        MovementOutcome::Applied
    })
}
