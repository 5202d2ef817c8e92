//! Session handles through which the core talks to a connected switch.

use crate::platform::messages::{DeviceId, OfpMessage};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

/// Errors reported by the controller platform
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    #[error("device {0:016x} is disconnected")]
    Disconnected(DeviceId),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// Opaque handle to a switch session owned by the platform.
///
/// `send` only hands the message to the platform's outbound queue; it never
/// waits for the switch.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceSession: Send + Sync {
    fn send(&self, message: OfpMessage) -> Result<(), PlatformError>;
}

/// Session backed by an in-process queue, drained by the HTTP platform bridge
pub struct QueuedSession {
    device_id: DeviceId,
    outbox: UnboundedSender<OfpMessage>,
}

impl QueuedSession {
    pub fn new(device_id: DeviceId, outbox: UnboundedSender<OfpMessage>) -> Self {
        Self { device_id, outbox }
    }
}

impl DeviceSession for QueuedSession {
    fn send(&self, message: OfpMessage) -> Result<(), PlatformError> {
        self.outbox
            .send(message)
            .map_err(|_| PlatformError::Disconnected(self.device_id))
    }
}
