use thiserror::Error;
use crate::platform::{DeviceId, FrameError, PlatformError};

/// Errors that can occur while handling controller events and cycles
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Unknown device {0:016x}")]
    UnknownDevice(DeviceId),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
