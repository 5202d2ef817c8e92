//! Learning switch.
//!
//! Each device learns which port a source MAC lives behind. Frames to a known
//! destination get a flow rule so the switch forwards the rest of the
//! conversation on its own; frames to unknown destinations are flooded
//! without caching anything.

use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use tokio::sync::RwLock;
use crate::core::device_registry::Device;
use crate::core::error::ControllerError;
use crate::core::flow_installer::FlowInstaller;
use crate::models::ForwardingConfig;
use crate::platform::{Action, DeviceId, EthernetHeader, FlowMatch, MacAddr, PacketIn, PortNo, PseudoPort};

#[derive(Debug, Clone, Copy, PartialEq)]
struct ForwardingEntry {
    port: PortNo,
    learned_at: DateTime<Utc>,
}

/// Outcome of handling one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardingDecision {
    /// Discovery traffic, neither learned nor forwarded
    Ignored,
    Forward(PortNo),
    Flood,
}

/// Per-device MAC → port table with optional aging
pub struct ForwardingTable {
    entries: RwLock<HashMap<DeviceId, HashMap<MacAddr, ForwardingEntry>>>,
    max_age: Option<Duration>,
}

impl ForwardingTable {
    pub fn new(max_age: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_age,
        }
    }

    fn is_expired(&self, entry: &ForwardingEntry, now: DateTime<Utc>) -> bool {
        match self.max_age {
            Some(max_age) => now - entry.learned_at > max_age,
            None => false,
        }
    }

    /// Record `mac` behind `port`, replacing any previous entry
    pub async fn learn(&self, device_id: DeviceId, mac: MacAddr, port: PortNo, now: DateTime<Utc>) {
        self.entries
            .write()
            .await
            .entry(device_id)
            .or_default()
            .insert(mac, ForwardingEntry { port, learned_at: now });
    }

    /// Port recorded for `mac`, ignoring expired entries
    pub async fn lookup(&self, device_id: DeviceId, mac: MacAddr, now: DateTime<Utc>) -> Option<PortNo> {
        let entries = self.entries.read().await;
        let entry = entries.get(&device_id)?.get(&mac)?;
        if self.is_expired(entry, now) {
            None
        } else {
            Some(entry.port)
        }
    }

    /// Drop expired entries; returns how many were removed
    pub async fn expire(&self, now: DateTime<Utc>) -> usize {
        if self.max_age.is_none() {
            return 0;
        }
        let mut entries = self.entries.write().await;
        let mut removed = 0;
        for table in entries.values_mut() {
            let before = table.len();
            table.retain(|_, entry| !self.is_expired(entry, now));
            removed += before - table.len();
        }
        entries.retain(|_, table| !table.is_empty());
        removed
    }

    pub async fn purge_device(&self, device_id: DeviceId) {
        self.entries.write().await.remove(&device_id);
    }

    pub async fn len(&self, device_id: DeviceId) -> usize {
        self.entries
            .read()
            .await
            .get(&device_id)
            .map(|t| t.len())
            .unwrap_or(0)
    }
}

/// Packet-in handler implementing MAC learning and forwarding
pub struct LearningSwitch {
    table: Arc<ForwardingTable>,
    installer: FlowInstaller,
    config: ForwardingConfig,
}

impl LearningSwitch {
    pub fn new(table: Arc<ForwardingTable>, installer: FlowInstaller, config: ForwardingConfig) -> Self {
        Self {
            table,
            installer,
            config,
        }
    }

    pub fn table(&self) -> &Arc<ForwardingTable> {
        &self.table
    }

    pub async fn handle_packet_in(
        &self,
        device: &Device,
        packet: &PacketIn,
        now: DateTime<Utc>,
    ) -> Result<ForwardingDecision, ControllerError> {
        if packet.is_truncated() {
            debug!(
                "packet truncated: only {} of {} bytes",
                packet.data.len(),
                packet.total_len
            );
        }

        let header = EthernetHeader::parse(&packet.data)?;
        if header.is_lldp() {
            return Ok(ForwardingDecision::Ignored);
        }

        let device_id = device.id();
        info!("packet in {:016x} {} {} {}", device_id, header.src, header.dst, packet.in_port);
        metrics::increment_counter!("sdn_packet_in_total");

        self.table.learn(device_id, header.src, packet.in_port, now).await;

        let decision = match self.table.lookup(device_id, header.dst, now).await {
            Some(port) => ForwardingDecision::Forward(port),
            None => ForwardingDecision::Flood,
        };

        match decision {
            ForwardingDecision::Forward(out_port) => {
                let actions = vec![Action::output(PseudoPort::Physical(out_port))];
                let matcher = FlowMatch {
                    in_port: Some(packet.in_port),
                    eth_src: Some(header.src),
                    eth_dst: Some(header.dst),
                };
                self.installer.add_flow(
                    device,
                    self.config.flow_priority,
                    matcher,
                    actions.clone(),
                    packet.buffer_id,
                    self.config.flow_idle_timeout,
                )?;
                metrics::increment_counter!("sdn_flows_learned_total");

                // The flow-mod already releases a buffered frame
                if packet.buffer_id.is_none() {
                    self.installer.packet_out(
                        device,
                        packet.in_port,
                        actions,
                        None,
                        Some(packet.data.clone()),
                    )?;
                }
            }
            ForwardingDecision::Flood => {
                let data = match packet.buffer_id {
                    Some(_) => None,
                    None => Some(packet.data.clone()),
                };
                self.installer.packet_out(
                    device,
                    packet.in_port,
                    vec![Action::output(PseudoPort::Flood)],
                    packet.buffer_id,
                    data,
                )?;
                metrics::increment_counter!("sdn_floods_total");
            }
            ForwardingDecision::Ignored => {}
        }

        Ok(decision)
    }
}
