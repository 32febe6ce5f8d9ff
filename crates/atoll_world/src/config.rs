//! Simulation configuration types and defaults.
//!
//! This module contains the tuning knobs for the world core: interest
//! management margins and the movement validator's thresholds and policies.

use serde::{Deserialize, Serialize};

/// Configuration for the world simulation core.
///
/// All distances are in world units (tiles) and all durations in
/// milliseconds, matching the units the simulation itself runs in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Extra distance past the camera rect that still counts as visible.
    /// Keeps subscriptions stable while the camera drifts within a region.
    pub interest_margin: f32,

    /// Movement validation thresholds and policies.
    pub movement: MovementConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            interest_margin: 4.0,
            movement: MovementConfig::default(),
        }
    }
}

/// Configuration for the movement validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementConfig {
    /// Whether the teleport heuristic runs at all. With it off, reports
    /// skip the speed check and the counter never moves.
    pub detect_teleports: bool,

    /// Whether the lag check runs at all.
    pub detect_lag: bool,

    /// Highest legitimate speed in tiles per second.
    pub max_speed: f32,

    /// Multiplier applied to `max_speed` before the teleport heuristic
    /// fires, absorbing jitter from clock skew and packet coalescing.
    pub speed_tolerance: f32,

    /// Shortest elapsed interval used for the implied-speed division, in
    /// milliseconds. Reports arriving closer together than this are measured
    /// against the floor instead of the raw gap.
    pub min_elapsed_ms: u32,

    /// Number of over-speed reports before the teleport policy fires.
    pub teleport_threshold: u32,

    /// How much the teleport counter decays per clean report.
    pub teleport_decay: u32,

    /// Longest server-measured gap between accepted reports before the lag
    /// policy applies, in milliseconds.
    pub lag_threshold_ms: u32,

    /// What to do when the teleport counter crosses its threshold.
    pub teleport_policy: TeleportPolicy,

    /// What to do when a client's reported time lags too far behind.
    pub lag_policy: LagPolicy,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            detect_teleports: true,
            detect_lag: true,
            max_speed: 12.0,
            speed_tolerance: 1.5,
            min_elapsed_ms: 16,
            teleport_threshold: 4,
            teleport_decay: 1,
            lag_threshold_ms: 1_000,
            teleport_policy: TeleportPolicy::Report,
            lag_policy: LagPolicy::Log,
        }
    }
}

/// Action taken when the teleport counter crosses its threshold.
///
/// Whichever policy is configured fires at most once per client per
/// threshold crossing; the counter must decay below the threshold before it
/// can fire again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeleportPolicy {
    /// Log the violation and keep playing. The movement is still accepted.
    Report,
    /// Push the entity back to its last safe position and tell the client.
    Correct,
    /// Disconnect the client.
    Kick,
}

/// Action taken when a client's movement reports fall behind the lag limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LagPolicy {
    /// Record at debug level only.
    Log,
    /// Record at warn level.
    Warn,
    /// Disconnect the client.
    Kick,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_permissive() {
        let config = WorldConfig::default();
        assert!(config.movement.detect_teleports);
        assert!(config.movement.detect_lag);
        assert_eq!(config.movement.teleport_policy, TeleportPolicy::Report);
        assert_eq!(config.movement.lag_policy, LagPolicy::Log);
        assert!(config.movement.speed_tolerance > 1.0);
        assert!(config.interest_margin > 0.0);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = WorldConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: WorldConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.movement.max_speed, config.movement.max_speed);
        assert_eq!(back.movement.teleport_policy, config.movement.teleport_policy);
    }
}
