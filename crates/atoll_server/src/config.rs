//! Host configuration types and defaults.
//!
//! This module contains the host configuration structure and default values
//! used to drive the tick loop and client lifecycle handling.

use atoll_world::WorldConfig;
use serde::{Deserialize, Serialize};

/// Configuration for the world host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Tick interval in milliseconds.
    pub tick_interval_ms: u64,

    /// How long a kicked client keeps its connection open after the kick
    /// notice is sent, in milliseconds. Gives the notice time to flush
    /// before the socket closes.
    pub kick_grace_ms: u64,

    /// Capacity of the command inbox feeding the world task.
    pub command_buffer: usize,

    /// Simulation configuration handed to the world.
    pub world: WorldConfig,

    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50, // 20 ticks per second by default
            kick_grace_ms: 500,
            command_buffer: 256,
            world: WorldConfig::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Logging configuration for the host process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default log level when `RUST_LOG` is not set.
    pub level: String,

    /// Emit JSON log lines instead of human-readable output.
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_tick_at_twenty_hz() {
        let config = HostConfig::default();
        assert_eq!(config.tick_interval_ms, 50);
        assert!(config.kick_grace_ms > 0);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = HostConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: HostConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tick_interval_ms, config.tick_interval_ms);
        assert_eq!(back.logging.level, config.logging.level);
    }
}
