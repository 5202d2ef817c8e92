//! HTTP platform bridge.
//!
//! An external OpenFlow stack forwards switch events as JSON and periodically
//! drains the commands the controller queued for each switch.

use crate::platform::events::{BridgeEvent, PlatformEvent};
use crate::platform::messages::{DeviceId, OfpMessage};
use crate::platform::session::QueuedSession;
use std::collections::HashMap;
use std::sync::Arc;
use log::debug;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

/// Queue of commands waiting to be collected for one device
struct Outbox {
    tx: UnboundedSender<OfpMessage>,
    rx: UnboundedReceiver<OfpMessage>,
}

/// Outbound queues of devices connected through the bridge
#[derive(Default)]
pub struct PlatformBridge {
    outboxes: Mutex<HashMap<DeviceId, Outbox>>,
}

impl PlatformBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn a bridge event into a platform event, creating a queue-backed
    /// session for joining devices. A repeated join without a leave keeps the
    /// existing queue, so sessions already handed out stay connected.
    pub async fn accept(&self, event: BridgeEvent) -> PlatformEvent {
        match event {
            BridgeEvent::DeviceJoined { device_id } => {
                let mut outboxes = self.outboxes.lock().await;
                let tx = match outboxes.get(&device_id) {
                    Some(outbox) => {
                        debug!("Device {:016x} re-joined, keeping its outbox", device_id);
                        outbox.tx.clone()
                    }
                    None => {
                        let (tx, rx) = mpsc::unbounded_channel();
                        outboxes.insert(device_id, Outbox { tx: tx.clone(), rx });
                        tx
                    }
                };
                PlatformEvent::DeviceJoined {
                    device_id,
                    session: Arc::new(QueuedSession::new(device_id, tx)),
                }
            }
            BridgeEvent::DeviceLeft { device_id } => PlatformEvent::DeviceLeft { device_id },
            BridgeEvent::PacketIn { device_id, packet } => {
                PlatformEvent::PacketIn { device_id, packet }
            }
            BridgeEvent::PortStatsReply { device_id, stats } => {
                PlatformEvent::PortStatsReply { device_id, stats }
            }
        }
    }

    /// Drain every queued message for a device; `None` if it never joined
    pub async fn drain(&self, device_id: DeviceId) -> Option<Vec<OfpMessage>> {
        let mut outboxes = self.outboxes.lock().await;
        let outbox = outboxes.get_mut(&device_id)?;
        let mut messages = Vec::new();
        while let Ok(message) = outbox.rx.try_recv() {
            messages.push(message);
        }
        Some(messages)
    }

    /// Forget a device's queue once the bridge has collected it
    pub async fn forget(&self, device_id: DeviceId) {
        self.outboxes.lock().await.remove(&device_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::messages::PseudoPort;

    #[tokio::test]
    async fn test_joined_device_gets_queue() {
        let bridge = PlatformBridge::new();
        let event = bridge.accept(BridgeEvent::DeviceJoined { device_id: 3 }).await;

        let session = match event {
            PlatformEvent::DeviceJoined { session, .. } => session,
            other => panic!("unexpected event {:?}", other),
        };
        session.send(OfpMessage::PortStatsRequest { port: PseudoPort::Any }).unwrap();

        let drained = bridge.drain(3).await.unwrap();
        assert_eq!(drained.len(), 1);
        assert!(bridge.drain(3).await.unwrap().is_empty());
        assert!(bridge.drain(4).await.is_none());
    }

    #[tokio::test]
    async fn test_rejoin_keeps_existing_session_connected() {
        let bridge = PlatformBridge::new();
        let first = match bridge.accept(BridgeEvent::DeviceJoined { device_id: 1 }).await {
            PlatformEvent::DeviceJoined { session, .. } => session,
            other => panic!("unexpected event {:?}", other),
        };
        let second = match bridge.accept(BridgeEvent::DeviceJoined { device_id: 1 }).await {
            PlatformEvent::DeviceJoined { session, .. } => session,
            other => panic!("unexpected event {:?}", other),
        };

        first.send(OfpMessage::PortStatsRequest { port: PseudoPort::Any }).unwrap();
        second.send(OfpMessage::PortStatsRequest { port: PseudoPort::Physical(2) }).unwrap();

        assert_eq!(
            bridge.drain(1).await.unwrap(),
            vec![
                OfpMessage::PortStatsRequest { port: PseudoPort::Any },
                OfpMessage::PortStatsRequest { port: PseudoPort::Physical(2) },
            ]
        );
    }

    #[tokio::test]
    async fn test_forget_then_join_opens_fresh_queue() {
        let bridge = PlatformBridge::new();
        let old = match bridge.accept(BridgeEvent::DeviceJoined { device_id: 1 }).await {
            PlatformEvent::DeviceJoined { session, .. } => session,
            other => panic!("unexpected event {:?}", other),
        };
        bridge.forget(1).await;
        bridge.accept(BridgeEvent::DeviceJoined { device_id: 1 }).await;

        assert!(old.send(OfpMessage::PortStatsRequest { port: PseudoPort::Any }).is_err());
        assert!(bridge.drain(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bridge_event_json() {
        let json = r#"{"type":"port_stats_reply","device_id":1,"stats":[{"port_no":2,"rx_bytes":10,"tx_bytes":20}]}"#;
        let event: BridgeEvent = serde_json::from_str(json).unwrap();

        let bridge = PlatformBridge::new();
        match bridge.accept(event).await {
            PlatformEvent::PortStatsReply { device_id, stats } => {
                assert_eq!(device_id, 1);
                assert_eq!(stats[0].rx_bytes, 10);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
