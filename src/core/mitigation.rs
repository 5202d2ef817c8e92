//! Mitigation engine.
//!
//! Ports move through three states:
//!
//! * **Normal** - not watched, not blocked.
//! * **Suspect** - on the watchlist because a sample crossed the static
//!   alarm threshold. Entering and leaving this state is driven by the
//!   [`ThroughputCalculator`](crate::core::throughput::ThroughputCalculator).
//! * **Blocked** - a drop rule is installed and a grace counter runs.
//!
//! Every cycle the engine first ages existing blocks (restoring those whose
//! grace period ran out) and then compares each suspect port against a
//! fair-share threshold: the static threshold, with some headroom, split
//! across the ports of the device that are actually carrying traffic and are
//! not already blocked. With at most one such port nothing is blocked, so a
//! single heavy but legitimate flow is never throttled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::time;
use uuid::Uuid;
use crate::core::device_registry::{Device, DeviceRegistry};
use crate::core::flow_installer::FlowInstaller;
use crate::core::port_stats::PortStatsStore;
use crate::core::watchlist::Watchlist;
use crate::models::MitigationConfig;
use crate::platform::{DeviceId, PortNo};

/// Threshold used when blocking is disabled for a device
pub const DISABLED_THRESHOLD: f64 = f64::INFINITY;

/// Fair-share threshold for a device.
///
/// `active_ports` counts ports carrying meaningful traffic, `blocked_ports`
/// those already dropped. Only the difference competes for the share.
pub fn dynamic_threshold(
    static_threshold: f64,
    fair_share_factor: f64,
    active_ports: usize,
    blocked_ports: usize,
) -> f64 {
    let eligible = active_ports as i64 - blocked_ports as i64;
    if eligible > 1 {
        static_threshold * fair_share_factor / eligible as f64
    } else {
        DISABLED_THRESHOLD
    }
}

/// Port currently dropped by the controller
#[derive(Debug, Clone, Serialize)]
pub struct BlockState {
    pub id: Uuid,
    pub grace_ticks: u32,
    pub blocked_at: DateTime<Utc>,
    /// Throughput and threshold at the time of the block
    pub rx_throughput: f64,
    pub dynamic_threshold: f64,
}

/// Mitigation state of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PortState {
    Normal,
    Suspect,
    Blocked { grace_ticks: u32 },
}

/// Block state of one port, flattened for reporting
#[derive(Debug, Clone, Serialize)]
pub struct BlockRecord {
    pub device_id: DeviceId,
    pub port_no: PortNo,
    #[serde(flatten)]
    pub state: BlockState,
}

/// Blocked ports and their grace counters
#[derive(Default)]
pub struct BlockTable {
    entries: RwLock<HashMap<(DeviceId, PortNo), BlockState>>,
}

impl BlockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, device_id: DeviceId, port_no: PortNo, state: BlockState) {
        self.entries.write().await.insert((device_id, port_no), state);
    }

    pub async fn remove(&self, device_id: DeviceId, port_no: PortNo) -> Option<BlockState> {
        self.entries.write().await.remove(&(device_id, port_no))
    }

    pub async fn get(&self, device_id: DeviceId, port_no: PortNo) -> Option<BlockState> {
        self.entries.read().await.get(&(device_id, port_no)).cloned()
    }

    pub async fn contains(&self, device_id: DeviceId, port_no: PortNo) -> bool {
        self.entries.read().await.contains_key(&(device_id, port_no))
    }

    pub async fn blocked_count(&self, device_id: DeviceId) -> usize {
        self.entries
            .read()
            .await
            .keys()
            .filter(|(d, _)| *d == device_id)
            .count()
    }

    /// Advance every grace counter by one; entries reaching `unblock_after`
    /// are removed and returned
    pub async fn tick(&self, unblock_after: u32) -> Vec<(DeviceId, PortNo, BlockState)> {
        let mut entries = self.entries.write().await;
        for state in entries.values_mut() {
            state.grace_ticks += 1;
        }
        let expired: Vec<(DeviceId, PortNo)> = entries
            .iter()
            .filter(|(_, state)| state.grace_ticks >= unblock_after)
            .map(|(key, _)| *key)
            .collect();

        let mut released = Vec::with_capacity(expired.len());
        for key in expired {
            if let Some(state) = entries.remove(&key) {
                released.push((key.0, key.1, state));
            }
        }
        released.sort_by_key(|(d, p, _)| (*d, *p));
        released
    }

    pub async fn snapshot(&self) -> Vec<BlockRecord> {
        let mut records: Vec<BlockRecord> = self
            .entries
            .read()
            .await
            .iter()
            .map(|((device_id, port_no), state)| BlockRecord {
                device_id: *device_id,
                port_no: *port_no,
                state: state.clone(),
            })
            .collect();
        records.sort_by_key(|r| (r.device_id, r.port_no));
        records
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Forget blocks of a departed device; its flow table went with it
    pub async fn purge_device(&self, device_id: DeviceId) {
        self.entries.write().await.retain(|(d, _), _| *d != device_id);
    }
}

/// Transitions performed by one cycle
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    pub blocked: Vec<(DeviceId, PortNo)>,
    pub unblocked: Vec<(DeviceId, PortNo)>,
}

impl CycleReport {
    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty() && self.unblocked.is_empty()
    }
}

/// Periodic mitigation engine
pub struct MitigationEngine {
    registry: Arc<DeviceRegistry>,
    stats: Arc<PortStatsStore>,
    watchlist: Arc<Watchlist>,
    blocks: Arc<BlockTable>,
    installer: FlowInstaller,
    config: MitigationConfig,
}

impl MitigationEngine {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        stats: Arc<PortStatsStore>,
        watchlist: Arc<Watchlist>,
        blocks: Arc<BlockTable>,
        installer: FlowInstaller,
        config: MitigationConfig,
    ) -> Self {
        Self {
            registry,
            stats,
            watchlist,
            blocks,
            installer,
            config,
        }
    }

    /// Run cycles on a fixed interval until `shutdown` fires
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting mitigation engine...");
        let mut interval = time::interval(Duration::from_secs(self.config.interval_seconds.max(1)));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.run_cycle(Utc::now()).await;
                    if !report.is_empty() {
                        info!(
                            "Mitigation cycle completed: blocked={:?} unblocked={:?}",
                            report.blocked, report.unblocked
                        );
                    }
                }
                _ = shutdown.recv() => {
                    info!("Mitigation engine received shutdown signal, stopping...");
                    break;
                }
            }
        }
    }

    pub async fn port_state(&self, device_id: DeviceId, port_no: PortNo) -> PortState {
        if let Some(block) = self.blocks.get(device_id, port_no).await {
            PortState::Blocked {
                grace_ticks: block.grace_ticks,
            }
        } else if self.watchlist.contains(device_id, port_no).await {
            PortState::Suspect
        } else {
            PortState::Normal
        }
    }

    /// One mitigation cycle: age blocks, restore expired ones, block suspects
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();

        for (device_id, port_no, state) in self.blocks.tick(self.config.unblock_after_cycles).await {
            self.restore_port(device_id, port_no, &state).await;
            report.unblocked.push((device_id, port_no));
        }

        for (device_id, ports) in self.watchlist.snapshot().await {
            let rx_by_port = self.stats.rx_throughputs(device_id).await;
            let active_floor = self.config.static_threshold * self.config.active_fraction;
            let active_ports = rx_by_port.values().filter(|rx| **rx > active_floor).count();
            let blocked_ports = self.blocks.blocked_count(device_id).await;
            let threshold = dynamic_threshold(
                self.config.static_threshold,
                self.config.fair_share_factor,
                active_ports,
                blocked_ports,
            );
            debug!(
                "Switch {:016x}: active={} blocked={} dynamic threshold={:.1}",
                device_id, active_ports, blocked_ports, threshold
            );

            for port_no in ports {
                if self.blocks.contains(device_id, port_no).await {
                    continue;
                }
                let rx = rx_by_port.get(&port_no).copied().unwrap_or(0.0);
                if rx <= threshold {
                    continue;
                }
                if !self.config.enforces_on(device_id) {
                    debug!(
                        "Switch {:016x}, port {} over fair share ({:.1} > {:.1}) but switch does not enforce",
                        device_id, port_no, rx, threshold
                    );
                    continue;
                }
                if self.block_port(device_id, port_no, rx, threshold, now).await {
                    report.blocked.push((device_id, port_no));
                }
            }
        }

        metrics::gauge!("sdn_blocked_ports", self.blocks.len().await as f64);
        report
    }

    async fn block_port(
        &self,
        device_id: DeviceId,
        port_no: PortNo,
        rx: f64,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(device) = self.registry.get(device_id).await else {
            warn!("Cannot block port {} on unregistered switch {:016x}", port_no, device_id);
            return false;
        };

        if let Err(e) = self.installer.block_port(&device, port_no, self.config.drop_priority) {
            error!("Failed to block port {} on switch {:016x}: {}", port_no, device_id, e);
            return false;
        }

        let state = BlockState {
            id: Uuid::new_v4(),
            grace_ticks: 0,
            blocked_at: now,
            rx_throughput: rx,
            dynamic_threshold: threshold,
        };
        warn!(
            "Blocking switch {:016x}, port {}: RX {:.1} bytes/sec over fair share {:.1} (block {})",
            device_id, port_no, rx, threshold, state.id
        );
        if !self.record_block(&device, port_no, state).await {
            return false;
        }
        metrics::increment_counter!("sdn_ports_blocked_total");
        true
    }

    /// Store a block for `device`, then drop it again if the device left (or
    /// was replaced) meanwhile. A departure purges blocks after unregistering,
    /// so either the purge or this check removes the entry.
    async fn record_block(&self, device: &Arc<Device>, port_no: PortNo, state: BlockState) -> bool {
        let device_id = device.id();
        self.blocks.insert(device_id, port_no, state).await;

        let still_registered = self
            .registry
            .get(device_id)
            .await
            .map_or(false, |current| Arc::ptr_eq(&current, device));
        if !still_registered {
            self.blocks.remove(device_id, port_no).await;
            warn!(
                "Switch {:016x} left while port {} was being blocked, block discarded",
                device_id, port_no
            );
        }
        still_registered
    }

    async fn restore_port(&self, device_id: DeviceId, port_no: PortNo, state: &BlockState) {
        let Some(device) = self.registry.get(device_id).await else {
            warn!(
                "Skipping unblock of port {} on switch {:016x}: switch no longer registered",
                port_no, device_id
            );
            return;
        };

        match self.installer.unblock_port(
            &device,
            port_no,
            self.config.drop_priority,
            self.config.restore_priority,
        ) {
            Ok(()) => {
                info!(
                    "Unblocked switch {:016x}, port {} after {} cycles (block {})",
                    device_id, port_no, state.grace_ticks, state.id
                );
                metrics::increment_counter!("sdn_ports_unblocked_total");
            }
            Err(e) => error!(
                "Failed to unblock port {} on switch {:016x}: {}",
                port_no, device_id, e
            ),
        }
    }
}
