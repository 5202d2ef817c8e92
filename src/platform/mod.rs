//! Boundary with the OpenFlow controller platform.
//!
//! Everything the core needs from the platform lives here: the decoded
//! message model, inbound events, session handles and the HTTP bridge used
//! when the platform runs out of process.

pub mod bridge;
pub mod events;
pub mod frame;
pub mod messages;
pub mod session;

pub use bridge::PlatformBridge;
pub use events::{BridgeEvent, EventKind, PlatformEvent};
pub use frame::{EthernetHeader, FrameError};
pub use messages::{
    Action, DeviceId, FlowMatch, FlowMod, FlowModCommand, MacAddr, OfpMessage, PacketIn,
    PacketOut, PortCounters, PortNo, PseudoPort,
};
pub use session::{DeviceSession, PlatformError, QueuedSession};

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Session that records every message it is asked to send
    #[derive(Default)]
    pub struct RecordingSession {
        sent: Mutex<Vec<OfpMessage>>,
    }

    impl RecordingSession {
        pub fn sent(&self) -> Vec<OfpMessage> {
            self.sent.lock().unwrap().clone()
        }

        pub fn clear(&self) {
            self.sent.lock().unwrap().clear();
        }

        pub fn flow_mods(&self) -> Vec<FlowMod> {
            self.sent()
                .into_iter()
                .filter_map(|m| match m {
                    OfpMessage::FlowMod(fm) => Some(fm),
                    _ => None,
                })
                .collect()
        }

        pub fn packet_outs(&self) -> Vec<PacketOut> {
            self.sent()
                .into_iter()
                .filter_map(|m| match m {
                    OfpMessage::PacketOut(po) => Some(po),
                    _ => None,
                })
                .collect()
        }
    }

    impl DeviceSession for RecordingSession {
        fn send(&self, message: OfpMessage) -> Result<(), PlatformError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }
}
