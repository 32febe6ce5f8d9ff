//! # Client Sessions
//!
//! The per-connection record inside the world: which entity the client
//! drives, which regions it watches, its movement-validation counters, and
//! the outgoing queues drained into one [`ClientFrame`] per tick.

use crate::batch::{ClientNotice, RegionPayload, RegionSnapshot};
use crate::types::{ClientId, EntityId, MapId, Rect, RegionHandle};
use std::collections::HashSet;
use std::sync::Arc;

/// A connected client and its server-side session state.
#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    /// The entity this client controls.
    pub entity: EntityId,
    /// Map the client is currently on.
    pub map: MapId,
    /// Client viewport in world units, reported by the client and used only
    /// for interest management.
    pub camera: Rect,
    /// Regions the client is subscribed to.
    pub subscriptions: HashSet<RegionHandle>,
    /// Regions first subscribed during the current tick. Their snapshot
    /// already carries end-of-tick state, so the tick's payload is skipped.
    pub fresh_subscriptions: HashSet<RegionHandle>,
    /// Set once a kick notice is queued; the session is torn down after the
    /// notice has been flushed.
    pub departing: bool,

    // Outgoing queues, drained at the tick boundary.
    unsubscribed: Vec<RegionHandle>,
    snapshots: Vec<RegionSnapshot>,
    payloads: Vec<Arc<RegionPayload>>,
    notices: Vec<ClientNotice>,

    // Movement validation state.
    /// Server time of the last accepted movement report, in ms. Zero until
    /// the first report.
    pub last_report_server_ms: u64,
    /// Client-claimed timestamp of the last report, in the client's clock.
    pub last_report_client_ms: u64,
    /// Rolling count of over-speed reports; decays on clean ones.
    pub teleport_counter: u32,
    /// Latch ensuring the teleport policy fires once per threshold crossing.
    pub teleport_fired: bool,
    /// Movement reports are ignored while the client owes a position-fix
    /// acknowledgment.
    pub awaiting_fix_ack: bool,
}

impl Client {
    pub fn new(id: ClientId, entity: EntityId, map: MapId, camera: Rect) -> Self {
        Self {
            id,
            entity,
            map,
            camera,
            subscriptions: HashSet::new(),
            fresh_subscriptions: HashSet::new(),
            departing: false,
            unsubscribed: Vec::new(),
            snapshots: Vec::new(),
            payloads: Vec::new(),
            notices: Vec::new(),
            last_report_server_ms: 0,
            last_report_client_ms: 0,
            teleport_counter: 0,
            teleport_fired: false,
            awaiting_fix_ack: false,
        }
    }

    // ------------------------------------------------------------------
    // Outgoing queues
    // ------------------------------------------------------------------

    pub fn queue_unsubscribed(&mut self, region: RegionHandle) {
        self.unsubscribed.push(region);
    }

    pub fn queue_snapshot(&mut self, snapshot: RegionSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn queue_payload(&mut self, payload: Arc<RegionPayload>) {
        self.payloads.push(payload);
    }

    pub fn queue_notice(&mut self, notice: ClientNotice) {
        self.notices.push(notice);
    }

    /// Drains everything queued this tick into one frame, or `None` when
    /// the client has nothing to hear about.
    pub fn take_frame(&mut self) -> Option<ClientFrame> {
        if self.unsubscribed.is_empty()
            && self.snapshots.is_empty()
            && self.payloads.is_empty()
            && self.notices.is_empty()
        {
            return None;
        }
        Some(ClientFrame {
            client: self.id,
            unsubscribed: std::mem::take(&mut self.unsubscribed),
            snapshots: std::mem::take(&mut self.snapshots),
            payloads: std::mem::take(&mut self.payloads),
            notices: std::mem::take(&mut self.notices),
        })
    }
}

/// Everything one client receives for one tick, in application order:
/// region teardowns first, then new region snapshots, then shared region
/// payloads, then control notices.
#[derive(Debug, Clone)]
pub struct ClientFrame {
    pub client: ClientId,
    pub unsubscribed: Vec<RegionHandle>,
    pub snapshots: Vec<RegionSnapshot>,
    pub payloads: Vec<Arc<RegionPayload>>,
    pub notices: Vec<ClientNotice>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MapId;

    fn client() -> Client {
        Client::new(
            ClientId::new(),
            EntityId(1),
            MapId(0),
            Rect::new(0.0, 0.0, 16.0, 12.0),
        )
    }

    #[test]
    fn take_frame_returns_none_when_quiet() {
        let mut c = client();
        assert!(c.take_frame().is_none());
    }

    #[test]
    fn take_frame_drains_all_queues() {
        let mut c = client();
        c.queue_unsubscribed(RegionHandle {
            map: MapId(0),
            rx: 1,
            ry: 1,
        });
        c.queue_notice(ClientNotice::FixPosition { x: 1.0, y: 2.0 });

        let frame = c.take_frame().unwrap();
        assert_eq!(frame.unsubscribed.len(), 1);
        assert_eq!(frame.notices.len(), 1);
        assert!(c.take_frame().is_none());
    }
}
