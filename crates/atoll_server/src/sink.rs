//! # Client Delivery Boundary
//!
//! The host does not know what carries bytes to a client; it talks to a
//! [`ClientSink`] trait object. Production sinks wrap sockets; tests and
//! in-process tools use [`ChannelSink`], which hands each client an
//! unbounded channel of encoded messages.
//!
//! [`ServerMessage`] is the wire envelope. One [`ClientFrame`] from the
//! world expands into an ordered message sequence: region teardowns, then
//! snapshots, then shared payloads, then control notices.

use crate::error::HostError;
use async_trait::async_trait;
use atoll_world::{ClientFrame, ClientId, ClientNotice, RegionPayload, RegionSnapshot};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// One server-to-client protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ServerMessage {
    /// Full contents of a region the client just subscribed to.
    Snapshot(RegionSnapshot),
    /// One region's batched changes for one tick. Shared: the same
    /// allocation is serialized for every subscriber.
    Update(Arc<RegionPayload>),
    /// A control notice: position fix, region teardown, or kick.
    Notice(ClientNotice),
}

impl ServerMessage {
    /// Expands a world frame into its ordered message sequence.
    pub fn from_frame(frame: ClientFrame) -> Vec<ServerMessage> {
        let mut out = Vec::with_capacity(
            frame.unsubscribed.len()
                + frame.snapshots.len()
                + frame.payloads.len()
                + frame.notices.len(),
        );
        for region in frame.unsubscribed {
            out.push(ServerMessage::Notice(ClientNotice::Unsubscribed { region }));
        }
        for snapshot in frame.snapshots {
            out.push(ServerMessage::Snapshot(snapshot));
        }
        for payload in frame.payloads {
            out.push(ServerMessage::Update(payload));
        }
        for notice in frame.notices {
            out.push(ServerMessage::Notice(notice));
        }
        out
    }
}

/// Transport abstraction for delivering encoded messages to clients.
#[async_trait]
pub trait ClientSink: Send + Sync + std::fmt::Debug {
    /// Delivers one encoded message to a client.
    async fn send(&self, client: ClientId, bytes: Vec<u8>) -> Result<(), HostError>;

    /// Whether the client's transport is still usable.
    async fn is_active(&self, client: ClientId) -> bool;

    /// Closes the client's transport, optionally with a reason.
    async fn close(&self, client: ClientId, reason: Option<String>);
}

/// In-process sink backed by per-client unbounded channels.
#[derive(Debug, Default)]
pub struct ChannelSink {
    channels: DashMap<ClientId, mpsc::UnboundedSender<Vec<u8>>>,
}

impl ChannelSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client and returns the receiving end of its channel.
    /// Re-registering replaces the previous channel.
    pub fn register(&self, client: ClientId) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.insert(client, tx);
        rx
    }
}

#[async_trait]
impl ClientSink for ChannelSink {
    async fn send(&self, client: ClientId, bytes: Vec<u8>) -> Result<(), HostError> {
        let Some(tx) = self.channels.get(&client) else {
            return Err(HostError::channel(format!("client {client} not registered")));
        };
        tx.send(bytes)
            .map_err(|_| HostError::channel(format!("client {client} receiver dropped")))
    }

    async fn is_active(&self, client: ClientId) -> bool {
        self.channels
            .get(&client)
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    async fn close(&self, client: ClientId, reason: Option<String>) {
        if self.channels.remove(&client).is_some() {
            debug!(client = %client, reason = reason.as_deref().unwrap_or("-"), "channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atoll_world::{KickReason, MapId, RegionHandle};

    fn handle() -> RegionHandle {
        RegionHandle {
            map: MapId(0),
            rx: 1,
            ry: 2,
        }
    }

    #[test]
    fn frame_expansion_preserves_protocol_order() {
        let frame = ClientFrame {
            client: ClientId::new(),
            unsubscribed: vec![handle()],
            snapshots: vec![RegionSnapshot {
                region: handle(),
                tiles: Vec::new(),
                entities: Vec::new(),
            }],
            payloads: vec![Arc::new(RegionPayload {
                region: handle(),
                adds: Vec::new(),
                updates: Vec::new(),
                removes: Vec::new(),
                tiles: Vec::new(),
            })],
            notices: vec![ClientNotice::Kicked {
                reason: KickReason::Speeding,
            }],
        };

        let messages = ServerMessage::from_frame(frame);
        assert_eq!(messages.len(), 4);
        assert!(matches!(
            messages[0],
            ServerMessage::Notice(ClientNotice::Unsubscribed { .. })
        ));
        assert!(matches!(messages[1], ServerMessage::Snapshot(_)));
        assert!(matches!(messages[2], ServerMessage::Update(_)));
        assert!(matches!(
            messages[3],
            ServerMessage::Notice(ClientNotice::Kicked { .. })
        ));
    }

    #[test]
    fn server_message_tags_its_type() {
        let msg = ServerMessage::Notice(ClientNotice::FixPosition { x: 1.0, y: 2.0 });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"notice\""));
        assert!(json.contains("\"kind\":\"fix_position\""));

        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[tokio::test]
    async fn channel_sink_delivers_and_closes() {
        let sink = ChannelSink::new();
        let client = ClientId::new();

        assert!(!sink.is_active(client).await);
        assert!(sink.send(client, b"x".to_vec()).await.is_err());

        let mut rx = sink.register(client);
        assert!(sink.is_active(client).await);
        sink.send(client, b"hello".to_vec()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"hello");

        sink.close(client, Some("done".into())).await;
        assert!(!sink.is_active(client).await);
        assert!(rx.recv().await.is_none());
    }
}
