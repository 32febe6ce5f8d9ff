//! # World Host
//!
//! Owns a [`World`] on a single task and drives it with a fixed-interval
//! tick. Everything else in the process talks to the world through a
//! [`WorldHandle`], which feeds typed commands into the task's inbox; the
//! task applies them between ticks, so the simulation itself never needs a
//! lock.
//!
//! Per tick the world returns one frame per client with traffic, and the
//! host encodes and fans the frames out through the configured
//! [`ClientSink`]. Kicked clients get their transport closed after the
//! configured grace period, giving the kick notice time to arrive.

use crate::config::HostConfig;
use crate::error::{HostError, HostResult};
use crate::sink::{ClientSink, ServerMessage};
use atoll_world::{
    ClientFrame, ClientId, ClientNotice, KickReason, MapId, MovementPacket, Rect, Tile, World,
    WorldError, WorldStats,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

/// A request for the world task.
#[derive(Debug)]
pub enum WorldCommand {
    /// Connect a new client under a transport-minted id.
    Join { client: ClientId, name: String },
    /// Voluntary disconnect.
    Leave { client: ClientId },
    /// A movement report from a client.
    Movement {
        client: ClientId,
        packet: MovementPacket,
    },
    /// Viewport change.
    Camera { client: ClientId, camera: Rect },
    /// Client confirmed a position fix.
    FixAck { client: ClientId },
    /// Expression overlay change for the client's own pawn.
    Expression {
        client: ClientId,
        expression: Option<u16>,
    },
    /// One-shot action from the client's own pawn.
    Action { client: ClientId, action: u16 },
    /// Operator-initiated kick.
    Kick {
        client: ClientId,
        reason: KickReason,
    },
    /// Tile mutation.
    SetTile {
        map: MapId,
        x: u16,
        y: u16,
        tile: Tile,
    },
    /// Despawn non-player content and re-run controller initialization.
    Reset,
    /// Snapshot of the world's counters.
    Stats {
        reply: oneshot::Sender<WorldStats>,
    },
    /// Stop the world task.
    Shutdown,
}

/// Cloneable handle for talking to a running [`WorldHost`].
#[derive(Debug, Clone)]
pub struct WorldHandle {
    tx: mpsc::Sender<WorldCommand>,
}

impl WorldHandle {
    async fn send(&self, cmd: WorldCommand) -> HostResult<()> {
        self.tx.send(cmd).await.map_err(|_| HostError::Stopped)
    }

    /// Connects a client under an id the transport minted when it accepted
    /// the connection. Register the id with the sink first; the session
    /// materializes at the next tick boundary and its first frame goes out
    /// immediately after.
    pub async fn join(&self, client: ClientId, name: impl Into<String>) -> HostResult<()> {
        self.send(WorldCommand::Join {
            client,
            name: name.into(),
        })
        .await
    }

    pub async fn leave(&self, client: ClientId) -> HostResult<()> {
        self.send(WorldCommand::Leave { client }).await
    }

    pub async fn movement(&self, client: ClientId, packet: MovementPacket) -> HostResult<()> {
        self.send(WorldCommand::Movement { client, packet }).await
    }

    pub async fn camera(&self, client: ClientId, camera: Rect) -> HostResult<()> {
        self.send(WorldCommand::Camera { client, camera }).await
    }

    pub async fn fix_ack(&self, client: ClientId) -> HostResult<()> {
        self.send(WorldCommand::FixAck { client }).await
    }

    pub async fn expression(&self, client: ClientId, expression: Option<u16>) -> HostResult<()> {
        self.send(WorldCommand::Expression { client, expression })
            .await
    }

    pub async fn action(&self, client: ClientId, action: u16) -> HostResult<()> {
        self.send(WorldCommand::Action { client, action }).await
    }

    pub async fn kick(&self, client: ClientId, reason: KickReason) -> HostResult<()> {
        self.send(WorldCommand::Kick { client, reason }).await
    }

    pub async fn set_tile(&self, map: MapId, x: u16, y: u16, tile: Tile) -> HostResult<()> {
        self.send(WorldCommand::SetTile { map, x, y, tile }).await
    }

    pub async fn reset(&self) -> HostResult<()> {
        self.send(WorldCommand::Reset).await
    }

    pub async fn stats(&self) -> HostResult<WorldStats> {
        let (reply, rx) = oneshot::channel();
        self.send(WorldCommand::Stats { reply }).await?;
        rx.await.map_err(|_| HostError::Stopped)
    }

    pub async fn shutdown(&self) -> HostResult<()> {
        self.send(WorldCommand::Shutdown).await
    }
}

/// The task-owned side: a world, its inbox, and the delivery sink.
pub struct WorldHost {
    world: World,
    config: HostConfig,
    sink: Arc<dyn ClientSink>,
    rx: mpsc::Receiver<WorldCommand>,
    epoch: Instant,
}

impl WorldHost {
    /// Creates a host around a fresh world built from the config.
    pub fn new(config: HostConfig, sink: Arc<dyn ClientSink>) -> (Self, WorldHandle) {
        let world = World::new(config.world.clone());
        Self::with_world(config, world, sink)
    }

    /// Creates a host around an existing world (custom maps, controllers).
    pub fn with_world(
        config: HostConfig,
        world: World,
        sink: Arc<dyn ClientSink>,
    ) -> (Self, WorldHandle) {
        let (tx, rx) = mpsc::channel(config.command_buffer);
        (
            Self {
                world,
                config,
                sink,
                rx,
                epoch: Instant::now(),
            },
            WorldHandle { tx },
        )
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Runs the tick loop until a shutdown command arrives or every handle
    /// is dropped.
    pub async fn run(mut self) {
        let tick = Duration::from_millis(self.config.tick_interval_ms.max(1));
        let dt = tick.as_secs_f32();
        let mut ticker = interval(tick);

        self.world.initialize(self.now_ms());
        info!(
            tick_ms = self.config.tick_interval_ms,
            "🚀 world host running"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = self.now_ms();
                    let frames = self.world.update(dt, now);
                    self.dispatch(frames).await;
                }
                cmd = self.rx.recv() => {
                    match cmd {
                        None | Some(WorldCommand::Shutdown) => break,
                        Some(cmd) => self.apply(cmd).await,
                    }
                }
            }
        }

        info!("🛑 world host stopped");
    }

    /// Encodes and delivers one tick's frames. A client whose transport is
    /// gone is removed from the world silently, the same as a voluntary
    /// disconnect.
    async fn dispatch(&mut self, frames: Vec<ClientFrame>) {
        for frame in frames {
            let client = frame.client;
            let kicked = frame.notices.iter().find_map(|n| match n {
                ClientNotice::Kicked { reason } => Some(reason.clone()),
                _ => None,
            });

            for message in ServerMessage::from_frame(frame) {
                let bytes = match serde_json::to_vec(&message) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(client = %client, error = %e, "failed to encode message");
                        continue;
                    }
                };
                if let Err(e) = self.sink.send(client, bytes).await {
                    debug!(client = %client, error = %e, "send failed");
                    if !self.sink.is_active(client).await {
                        let _ = self.world.remove_client(client);
                        self.sink.close(client, None).await;
                    }
                    break;
                }
            }

            if let Some(reason) = kicked {
                let sink = Arc::clone(&self.sink);
                let grace = Duration::from_millis(self.config.kick_grace_ms);
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    sink.close(client, Some(reason.to_string())).await;
                });
            }
        }
    }

    async fn apply(&mut self, cmd: WorldCommand) {
        let now = self.now_ms();
        match cmd {
            WorldCommand::Join { client, name } => {
                if let Err(e) = self.world.add_client(client, name) {
                    warn!(client = %client, error = %e, "join refused");
                }
            }
            WorldCommand::Leave { client } => {
                if self.world.remove_client(client).is_ok() {
                    self.sink.close(client, None).await;
                }
            }
            WorldCommand::Movement { client, packet } => {
                match self.world.handle_movement(client, &packet, now) {
                    Ok(outcome) => debug!(client = %client, ?outcome, "movement handled"),
                    Err(e @ WorldError::InvalidPacket(_)) => {
                        warn!(client = %client, error = %e, "malformed movement report");
                        let _ = self.world.kick_client(
                            client,
                            KickReason::Requested("malformed movement packet".into()),
                        );
                    }
                    // A report for a session that no longer exists is stale
                    // traffic, not an offense.
                    Err(e) => debug!(client = %client, error = %e, "movement dropped"),
                }
            }
            WorldCommand::Camera { client, camera } => {
                if let Err(e) = self.world.update_camera(client, camera) {
                    warn!(client = %client, error = %e, "camera update rejected");
                }
            }
            WorldCommand::FixAck { client } => {
                if let Err(e) = self.world.acknowledge_position_fix(client) {
                    debug!(client = %client, error = %e, "fix ack for unknown client");
                }
            }
            WorldCommand::Expression { client, expression } => {
                let Some(pawn) = self.world.client(client).map(|c| c.entity) else {
                    return;
                };
                // Client-set overlays yield to the next accepted movement.
                if let Err(e) = self.world.set_entity_expression(pawn, expression, true) {
                    debug!(client = %client, error = %e, "expression rejected");
                }
            }
            WorldCommand::Action { client, action } => {
                let Some(pawn) = self.world.client(client).map(|c| c.entity) else {
                    return;
                };
                if let Err(e) = self.world.play_entity_action(pawn, action) {
                    debug!(client = %client, error = %e, "action rejected");
                }
            }
            WorldCommand::Kick { client, reason } => {
                if let Err(e) = self.world.kick_client(client, reason) {
                    debug!(client = %client, error = %e, "kick for unknown client");
                }
            }
            WorldCommand::SetTile { map, x, y, tile } => {
                if let Err(e) = self.world.set_tile(map, x, y, tile) {
                    warn!(%map, x, y, error = %e, "tile mutation rejected");
                }
            }
            WorldCommand::Reset => self.world.reset(now),
            WorldCommand::Stats { reply } => {
                let _ = reply.send(self.world.stats().clone());
            }
            WorldCommand::Shutdown => {}
        }
    }
}
