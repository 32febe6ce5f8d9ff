//! Logging system setup and configuration.
//!
//! Initializes the tracing-based logging stack for a host process, with
//! human-readable output for development and JSON lines for ingestion.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the logging system with the specified configuration.
///
/// `RUST_LOG` takes precedence when set; otherwise the configured level
/// becomes the global filter. Call once at startup, before the host runs.
pub fn setup_logging(config: &LoggingSettings) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let base = fmt::layer().with_target(true).with_thread_ids(true);

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_format {
        registry.with(base.json()).init();
    } else {
        registry.with(base.with_ansi(true)).init();
    }

    info!("🔧 Logging initialized with level: {}", config.level);
    Ok(())
}

/// Logs the startup banner with version information.
pub fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║            🏝️  ATOLL SERVER  🏝️           ║");
    info!("║                 v{}                    ║", version);
    info!("║                                          ║");
    info!("║  Authoritative Tile World Simulation     ║");
    info!("║  🗺️  Region-Partitioned Replication       ║");
    info!("║  📦 Batched Delta Broadcasts             ║");
    info!("║  🛡️  Server-Side Movement Validation      ║");
    info!("╚══════════════════════════════════════════╝");
}
