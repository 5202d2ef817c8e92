//! Registry of connected switches and their session handles.

use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use tokio::sync::RwLock;
use crate::platform::{DeviceId, DeviceSession, OfpMessage, PlatformError};

/// A connected switch
pub struct Device {
    id: DeviceId,
    session: Arc<dyn DeviceSession>,
    connected_at: DateTime<Utc>,
}

impl Device {
    pub fn new(id: DeviceId, session: Arc<dyn DeviceSession>, connected_at: DateTime<Utc>) -> Self {
        Self {
            id,
            session,
            connected_at,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Hand a message to the platform for this device
    pub fn send(&self, message: OfpMessage) -> Result<(), PlatformError> {
        self.session.send(message)
    }
}

/// Device summary exposed over the API
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub device_id: DeviceId,
    pub connected_at: DateTime<Utc>,
}

/// Registry of connected devices
#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<DeviceId, Arc<Device>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device; returns `None` if it was already known
    pub async fn register(
        &self,
        id: DeviceId,
        session: Arc<dyn DeviceSession>,
        now: DateTime<Utc>,
    ) -> Option<Arc<Device>> {
        let mut devices = self.devices.write().await;
        if devices.contains_key(&id) {
            debug!("Device {:016x} already registered", id);
            return None;
        }
        let device = Arc::new(Device::new(id, session, now));
        devices.insert(id, device.clone());
        Some(device)
    }

    /// Remove a device; returns `None` if it was unknown
    pub async fn unregister(&self, id: DeviceId) -> Option<Arc<Device>> {
        self.devices.write().await.remove(&id)
    }

    pub async fn get(&self, id: DeviceId) -> Option<Arc<Device>> {
        self.devices.read().await.get(&id).cloned()
    }

    /// Current devices, in no particular order
    pub async fn snapshot(&self) -> Vec<Arc<Device>> {
        self.devices.read().await.values().cloned().collect()
    }

    pub async fn list(&self) -> Vec<DeviceInfo> {
        let mut infos: Vec<DeviceInfo> = self
            .devices
            .read()
            .await
            .values()
            .map(|d| DeviceInfo {
                device_id: d.id(),
                connected_at: d.connected_at(),
            })
            .collect();
        infos.sort_by_key(|d| d.device_id);
        infos
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::RecordingSession;

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = DeviceRegistry::new();
        let session = Arc::new(RecordingSession::default());

        assert!(registry.register(1, session.clone(), Utc::now()).await.is_some());
        assert!(registry.register(1, session, Utc::now()).await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_unregister() {
        let registry = DeviceRegistry::new();
        registry
            .register(2, Arc::new(RecordingSession::default()), Utc::now())
            .await;

        assert!(registry.unregister(2).await.is_some());
        assert!(registry.unregister(2).await.is_none());
        assert!(registry.get(2).await.is_none());
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let registry = DeviceRegistry::new();
        for id in [3, 1, 2] {
            registry
                .register(id, Arc::new(RecordingSession::default()), Utc::now())
                .await;
        }
        let ids: Vec<DeviceId> = registry.list().await.iter().map(|d| d.device_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
