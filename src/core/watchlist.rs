//! Ports whose throughput crossed the static alarm threshold.

use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use crate::platform::{DeviceId, PortNo};

/// Suspect ports per device
#[derive(Default)]
pub struct Watchlist {
    ports: RwLock<HashMap<DeviceId, BTreeSet<PortNo>>>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the port was not already watched
    pub async fn insert(&self, device_id: DeviceId, port_no: PortNo) -> bool {
        let inserted = self
            .ports
            .write()
            .await
            .entry(device_id)
            .or_default()
            .insert(port_no);
        if inserted {
            metrics::increment_gauge!("sdn_watchlist_ports", 1.0);
        }
        inserted
    }

    /// Returns `true` if the port was watched
    pub async fn remove(&self, device_id: DeviceId, port_no: PortNo) -> bool {
        let mut ports = self.ports.write().await;
        let removed = match ports.get_mut(&device_id) {
            Some(set) => {
                let removed = set.remove(&port_no);
                if set.is_empty() {
                    ports.remove(&device_id);
                }
                removed
            }
            None => false,
        };
        if removed {
            metrics::decrement_gauge!("sdn_watchlist_ports", 1.0);
        }
        removed
    }

    pub async fn contains(&self, device_id: DeviceId, port_no: PortNo) -> bool {
        self.ports
            .read()
            .await
            .get(&device_id)
            .map(|set| set.contains(&port_no))
            .unwrap_or(false)
    }

    /// Watched ports grouped by device, ordered
    pub async fn snapshot(&self) -> Vec<(DeviceId, Vec<PortNo>)> {
        let mut entries: Vec<(DeviceId, Vec<PortNo>)> = self
            .ports
            .read()
            .await
            .iter()
            .map(|(device_id, set)| (*device_id, set.iter().copied().collect()))
            .collect();
        entries.sort_by_key(|(device_id, _)| *device_id);
        entries
    }

    pub async fn len(&self) -> usize {
        self.ports.read().await.values().map(|set| set.len()).sum()
    }

    pub async fn purge_device(&self, device_id: DeviceId) {
        if let Some(set) = self.ports.write().await.remove(&device_id) {
            metrics::decrement_gauge!("sdn_watchlist_ports", set.len() as f64);
        }
    }
}
