//! Shared controller state and the core event handlers.

use std::sync::Arc;
use chrono::{DateTime, Utc};
use log::{info, warn};
use crate::core::device_registry::DeviceRegistry;
use crate::core::error::ControllerError;
use crate::core::flow_installer::FlowInstaller;
use crate::core::forwarding::{ForwardingDecision, ForwardingTable, LearningSwitch};
use crate::core::mitigation::BlockTable;
use crate::core::port_stats::{PortStatsStore, SampleUpdate};
use crate::core::throughput::ThroughputCalculator;
use crate::core::watchlist::Watchlist;
use crate::models::Config;
use crate::platform::{DeviceId, DeviceSession, PacketIn, PortCounters, PortNo};
use crate::utils::config_duration;

/// Everything the event loop, the stats poller and the mitigation engine share.
/// Each store carries its own lock.
pub struct ControllerState {
    pub registry: Arc<DeviceRegistry>,
    pub forwarding: Arc<ForwardingTable>,
    pub stats: Arc<PortStatsStore>,
    pub watchlist: Arc<Watchlist>,
    pub blocks: Arc<BlockTable>,
    pub installer: FlowInstaller,
    switch: LearningSwitch,
    calculator: ThroughputCalculator,
}

impl ControllerState {
    pub fn new(config: &Config) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let max_age = match config.forwarding.mac_aging_seconds {
            0 => None,
            secs => Some(config_duration(secs)),
        };
        let forwarding = Arc::new(ForwardingTable::new(max_age));
        let stats = Arc::new(PortStatsStore::new(config.monitoring.max_port_no));
        let watchlist = Arc::new(Watchlist::new());
        let blocks = Arc::new(BlockTable::new());
        let installer = FlowInstaller::new();

        Self {
            switch: LearningSwitch::new(forwarding.clone(), installer.clone(), config.forwarding.clone()),
            calculator: ThroughputCalculator::new(
                stats.clone(),
                watchlist.clone(),
                config.mitigation.static_threshold,
            ),
            registry,
            forwarding,
            stats,
            watchlist,
            blocks,
            installer,
        }
    }

    /// Register a switch and install its table-miss rule
    pub async fn on_device_joined(
        &self,
        device_id: DeviceId,
        session: Arc<dyn DeviceSession>,
        now: DateTime<Utc>,
    ) -> Result<(), ControllerError> {
        let Some(device) = self.registry.register(device_id, session, now).await else {
            return Ok(());
        };
        info!("Switch {:016x} connected", device_id);
        metrics::increment_gauge!("sdn_devices", 1.0);
        self.installer.install_table_miss(&device)?;
        Ok(())
    }

    /// Unregister a switch and drop everything known about it
    pub async fn on_device_left(&self, device_id: DeviceId) -> Result<(), ControllerError> {
        if self.registry.unregister(device_id).await.is_none() {
            warn!("Unknown switch {:016x} disconnected", device_id);
            return Ok(());
        }
        self.forwarding.purge_device(device_id).await;
        self.stats.purge_device(device_id).await;
        self.watchlist.purge_device(device_id).await;
        self.blocks.purge_device(device_id).await;
        metrics::decrement_gauge!("sdn_devices", 1.0);
        info!("Switch {:016x} disconnected, state purged", device_id);
        Ok(())
    }

    pub async fn on_packet_in(
        &self,
        device_id: DeviceId,
        packet: &PacketIn,
        now: DateTime<Utc>,
    ) -> Result<ForwardingDecision, ControllerError> {
        let device = self
            .registry
            .get(device_id)
            .await
            .ok_or(ControllerError::UnknownDevice(device_id))?;
        self.switch.handle_packet_in(&device, packet, now).await
    }

    pub async fn on_port_stats_reply(
        &self,
        device_id: DeviceId,
        stats: &[PortCounters],
        now: DateTime<Utc>,
    ) -> Result<Vec<(PortNo, SampleUpdate)>, ControllerError> {
        if self.registry.get(device_id).await.is_none() {
            return Err(ControllerError::UnknownDevice(device_id));
        }
        Ok(self.calculator.on_stats_reply(device_id, stats, now).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::platform::testing::RecordingSession;
    use crate::platform::{FlowMatch, MacAddr};

    #[tokio::test]
    async fn test_join_installs_table_miss_once() {
        let state = ControllerState::new(&Config::default());
        let session = Arc::new(RecordingSession::default());

        state.on_device_joined(1, session.clone(), Utc::now()).await.unwrap();
        state.on_device_joined(1, session.clone(), Utc::now()).await.unwrap();

        let mods = session.flow_mods();
        assert_eq!(mods.len(), 1);
        assert_eq!(mods[0].priority, 0);
        assert_eq!(mods[0].matcher, FlowMatch::any());
    }

    #[tokio::test]
    async fn test_departure_purges_device_state() {
        let state = ControllerState::new(&Config::default());
        let t0 = Utc::now();
        state
            .on_device_joined(1, Arc::new(RecordingSession::default()), t0)
            .await
            .unwrap();

        state.forwarding.learn(1, MacAddr([0, 0, 0, 0, 0, 1]), 1, t0).await;
        let counters = |rx| PortCounters { port_no: 1, rx_bytes: rx, tx_bytes: 0 };
        state.on_port_stats_reply(1, &[counters(0)], t0).await.unwrap();
        state
            .on_port_stats_reply(1, &[counters(100_000_000)], t0 + Duration::seconds(1))
            .await
            .unwrap();
        assert!(state.watchlist.contains(1, 1).await);

        state.on_device_left(1).await.unwrap();

        assert!(state.registry.get(1).await.is_none());
        assert_eq!(state.forwarding.len(1).await, 0);
        assert!(state.stats.snapshot().await.is_empty());
        assert_eq!(state.watchlist.len().await, 0);
    }

    #[tokio::test]
    async fn test_huge_aging_config_is_accepted() {
        let mut config = Config::default();
        config.forwarding.mac_aging_seconds = u64::MAX;
        let state = ControllerState::new(&config);
        let t0 = Utc::now();
        let mac = MacAddr([0, 0, 0, 0, 0, 1]);

        state.forwarding.learn(1, mac, 3, t0).await;
        assert_eq!(state.forwarding.lookup(1, mac, t0 + Duration::days(365)).await, Some(3));
    }

    #[tokio::test]
    async fn test_events_for_unknown_devices_are_rejected() {
        let state = ControllerState::new(&Config::default());
        let result = state.on_port_stats_reply(5, &[], Utc::now()).await;
        assert!(matches!(result, Err(ControllerError::UnknownDevice(5))));
        assert!(state.on_device_left(5).await.is_ok());
    }
}
