//! Inbound notifications delivered by the controller platform.

use crate::platform::messages::{DeviceId, PacketIn, PortCounters};
use crate::platform::session::DeviceSession;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of a platform event, used as the dispatch key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DeviceJoined,
    DeviceLeft,
    PacketIn,
    PortStatsReply,
}

/// Event raised by the platform for the controller core
#[derive(Clone)]
pub enum PlatformEvent {
    DeviceJoined {
        device_id: DeviceId,
        session: Arc<dyn DeviceSession>,
    },
    DeviceLeft {
        device_id: DeviceId,
    },
    PacketIn {
        device_id: DeviceId,
        packet: PacketIn,
    },
    PortStatsReply {
        device_id: DeviceId,
        stats: Vec<PortCounters>,
    },
}

impl PlatformEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PlatformEvent::DeviceJoined { .. } => EventKind::DeviceJoined,
            PlatformEvent::DeviceLeft { .. } => EventKind::DeviceLeft,
            PlatformEvent::PacketIn { .. } => EventKind::PacketIn,
            PlatformEvent::PortStatsReply { .. } => EventKind::PortStatsReply,
        }
    }

    pub fn device_id(&self) -> DeviceId {
        match self {
            PlatformEvent::DeviceJoined { device_id, .. }
            | PlatformEvent::DeviceLeft { device_id }
            | PlatformEvent::PacketIn { device_id, .. }
            | PlatformEvent::PortStatsReply { device_id, .. } => *device_id,
        }
    }
}

impl fmt::Debug for PlatformEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformEvent::DeviceJoined { device_id, .. } => f
                .debug_struct("DeviceJoined")
                .field("device_id", device_id)
                .finish_non_exhaustive(),
            PlatformEvent::DeviceLeft { device_id } => f
                .debug_struct("DeviceLeft")
                .field("device_id", device_id)
                .finish(),
            PlatformEvent::PacketIn { device_id, packet } => f
                .debug_struct("PacketIn")
                .field("device_id", device_id)
                .field("in_port", &packet.in_port)
                .field("len", &packet.data.len())
                .finish(),
            PlatformEvent::PortStatsReply { device_id, stats } => f
                .debug_struct("PortStatsReply")
                .field("device_id", device_id)
                .field("ports", &stats.len())
                .finish(),
        }
    }
}

/// JSON form of a platform event, posted by an external OpenFlow stack
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    DeviceJoined { device_id: DeviceId },
    DeviceLeft { device_id: DeviceId },
    PacketIn { device_id: DeviceId, packet: PacketIn },
    PortStatsReply { device_id: DeviceId, stats: Vec<PortCounters> },
}
