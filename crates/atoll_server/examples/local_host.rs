//! Runs a world host in-process with one scripted client: banner and
//! logging setup, a short eastward walk, then a clean shutdown.
//!
//! ```sh
//! cargo run -p atoll_server --example local_host
//! ```

use atoll_server::{
    display_banner, setup_logging, ChannelSink, HostConfig, ServerMessage, WorldHost,
};
use atoll_world::{ClientId, EntityState, MovementPacket};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = HostConfig::default();
    setup_logging(&config.logging)?;
    display_banner();

    let sink = Arc::new(ChannelSink::new());
    let (host, handle) = WorldHost::new(config, sink.clone());
    let world_task = tokio::spawn(host.run());

    let client = ClientId::new();
    let mut incoming = sink.register(client);
    handle.join(client, "mara").await?;
    info!(%client, "client joined");

    // Report a slow walk east from the atoll spawn, the way a real client
    // would stream its position.
    for step in 1..=10u64 {
        let packet = MovementPacket {
            x: 12.5 + step as f32 * 0.2,
            y: 6.5,
            vx: 2.0,
            vy: 0.0,
            state: EntityState::NONE,
            client_time_ms: step * 100,
        };
        handle.movement(client, packet).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let mut snapshots = 0usize;
    let mut updates = 0usize;
    let mut notices = 0usize;
    while let Ok(bytes) = incoming.try_recv() {
        match serde_json::from_slice::<ServerMessage>(&bytes)? {
            ServerMessage::Snapshot(_) => snapshots += 1,
            ServerMessage::Update(_) => updates += 1,
            ServerMessage::Notice(_) => notices += 1,
        }
    }
    info!(snapshots, updates, notices, "traffic received");

    let stats = handle.stats().await?;
    info!(
        ticks = stats.ticks,
        frames = stats.frames_flushed,
        movement_applied = stats.movement_applied,
        "world stats"
    );

    handle.leave(client).await?;
    handle.shutdown().await?;
    let _ = world_task.await;
    Ok(())
}
