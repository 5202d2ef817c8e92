//! Per-device, per-port counter samples and derived throughput.

use std::collections::HashMap;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use crate::core::throughput::compute_throughput;
use crate::platform::{DeviceId, PortCounters, PortNo};
use crate::utils::seconds_between;

/// Last known counters of a port
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortSample {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub timestamp: DateTime<Utc>,
    /// Bytes per second; `None` until two consecutive samples exist
    pub rx_throughput: Option<f64>,
    pub tx_throughput: Option<f64>,
}

/// Sample of one port, flattened for reporting
#[derive(Debug, Clone, Serialize)]
pub struct PortSampleRecord {
    pub device_id: DeviceId,
    pub port_no: PortNo,
    #[serde(flatten)]
    pub sample: PortSample,
}

/// What a stats reply did to a stored sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleUpdate {
    /// Reserved port number, not stored
    Ignored,
    /// First sample for the port, throughput not yet known
    Initial,
    Computed { rx: f64, tx: f64 },
    /// Non-positive elapsed time, sample discarded
    Duplicate,
    /// Counters went backwards; new counters taken as baseline
    Resync,
}

/// Port statistics store
pub struct PortStatsStore {
    samples: RwLock<HashMap<DeviceId, HashMap<PortNo, PortSample>>>,
    max_port_no: PortNo,
}

impl PortStatsStore {
    pub fn new(max_port_no: PortNo) -> Self {
        Self {
            samples: RwLock::new(HashMap::new()),
            max_port_no,
        }
    }

    pub fn is_reserved_port(&self, port_no: PortNo) -> bool {
        port_no > self.max_port_no
    }

    /// Fold one port's counters into the store
    pub async fn update(
        &self,
        device_id: DeviceId,
        counters: &PortCounters,
        now: DateTime<Utc>,
    ) -> SampleUpdate {
        if self.is_reserved_port(counters.port_no) {
            return SampleUpdate::Ignored;
        }

        let mut samples = self.samples.write().await;
        let ports = samples.entry(device_id).or_default();

        let Some(prev) = ports.get_mut(&counters.port_no) else {
            ports.insert(
                counters.port_no,
                PortSample {
                    rx_bytes: counters.rx_bytes,
                    tx_bytes: counters.tx_bytes,
                    timestamp: now,
                    rx_throughput: None,
                    tx_throughput: None,
                },
            );
            return SampleUpdate::Initial;
        };

        let elapsed = seconds_between(prev.timestamp, now);
        if elapsed <= 0.0 {
            return SampleUpdate::Duplicate;
        }

        let rx = compute_throughput(prev.rx_bytes, counters.rx_bytes, elapsed);
        let tx = compute_throughput(prev.tx_bytes, counters.tx_bytes, elapsed);

        prev.rx_bytes = counters.rx_bytes;
        prev.tx_bytes = counters.tx_bytes;
        prev.timestamp = now;

        match (rx, tx) {
            (Some(rx), Some(tx)) => {
                prev.rx_throughput = Some(rx);
                prev.tx_throughput = Some(tx);
                SampleUpdate::Computed { rx, tx }
            }
            _ => {
                prev.rx_throughput = None;
                prev.tx_throughput = None;
                SampleUpdate::Resync
            }
        }
    }

    pub async fn get(&self, device_id: DeviceId, port_no: PortNo) -> Option<PortSample> {
        self.samples
            .read()
            .await
            .get(&device_id)?
            .get(&port_no)
            .cloned()
    }

    /// Last rx throughput of every port of a device; unknown throughput counts as zero
    pub async fn rx_throughputs(&self, device_id: DeviceId) -> HashMap<PortNo, f64> {
        self.samples
            .read()
            .await
            .get(&device_id)
            .map(|ports| {
                ports
                    .iter()
                    .map(|(port, s)| (*port, s.rx_throughput.unwrap_or(0.0)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All samples ordered by device then port
    pub async fn snapshot(&self) -> Vec<PortSampleRecord> {
        let samples = self.samples.read().await;
        let mut records: Vec<PortSampleRecord> = samples
            .iter()
            .flat_map(|(device_id, ports)| {
                ports.iter().map(move |(port_no, sample)| PortSampleRecord {
                    device_id: *device_id,
                    port_no: *port_no,
                    sample: sample.clone(),
                })
            })
            .collect();
        records.sort_by_key(|r| (r.device_id, r.port_no));
        records
    }

    /// Ports whose last sample is older than `max_age`, with the age in seconds
    pub async fn stale_ports(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<(DeviceId, PortNo, f64)> {
        let mut stale: Vec<(DeviceId, PortNo, f64)> = self
            .samples
            .read()
            .await
            .iter()
            .flat_map(|(device_id, ports)| {
                ports
                    .iter()
                    .filter(move |(_, s)| now - s.timestamp > max_age)
                    .map(move |(port_no, s)| (*device_id, *port_no, seconds_between(s.timestamp, now)))
            })
            .collect();
        stale.sort_by_key(|(d, p, _)| (*d, *p));
        stale
    }

    pub async fn purge_device(&self, device_id: DeviceId) {
        self.samples.write().await.remove(&device_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(port_no: PortNo, rx_bytes: u64, tx_bytes: u64) -> PortCounters {
        PortCounters {
            port_no,
            rx_bytes,
            tx_bytes,
        }
    }

    #[tokio::test]
    async fn test_first_sample_has_no_throughput() {
        let store = PortStatsStore::new(0xffff_ff00);
        let now = Utc::now();

        assert_eq!(store.update(1, &counters(2, 100, 50), now).await, SampleUpdate::Initial);
        let sample = store.get(1, 2).await.unwrap();
        assert_eq!(sample.rx_bytes, 100);
        assert!(sample.rx_throughput.is_none());
    }

    #[tokio::test]
    async fn test_second_sample_computes_throughput() {
        let store = PortStatsStore::new(0xffff_ff00);
        let t0 = Utc::now();
        store.update(1, &counters(2, 0, 0), t0).await;

        let update = store
            .update(1, &counters(2, 1_000_000, 500_000), t0 + Duration::seconds(5))
            .await;
        assert_eq!(update, SampleUpdate::Computed { rx: 200_000.0, tx: 100_000.0 });
        assert_eq!(store.get(1, 2).await.unwrap().rx_throughput, Some(200_000.0));
    }

    #[tokio::test]
    async fn test_reserved_ports_are_ignored() {
        let store = PortStatsStore::new(0xffff_ff00);
        let update = store.update(1, &counters(0xffff_fffe, 10, 10), Utc::now()).await;

        assert_eq!(update, SampleUpdate::Ignored);
        assert!(store.get(1, 0xffff_fffe).await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_sample_is_discarded() {
        let store = PortStatsStore::new(0xffff_ff00);
        let t0 = Utc::now();
        store.update(1, &counters(2, 100, 100), t0).await;

        assert_eq!(store.update(1, &counters(2, 900, 900), t0).await, SampleUpdate::Duplicate);
        assert_eq!(store.get(1, 2).await.unwrap().rx_bytes, 100);
    }

    #[tokio::test]
    async fn test_counter_reset_resyncs() {
        let store = PortStatsStore::new(0xffff_ff00);
        let t0 = Utc::now();
        store.update(1, &counters(2, 0, 0), t0).await;
        store.update(1, &counters(2, 5_000, 5_000), t0 + Duration::seconds(1)).await;

        let update = store.update(1, &counters(2, 10, 5_100), t0 + Duration::seconds(2)).await;
        assert_eq!(update, SampleUpdate::Resync);
        let sample = store.get(1, 2).await.unwrap();
        assert_eq!(sample.rx_bytes, 10);
        assert!(sample.rx_throughput.is_none());

        let update = store.update(1, &counters(2, 110, 5_200), t0 + Duration::seconds(3)).await;
        assert_eq!(update, SampleUpdate::Computed { rx: 100.0, tx: 100.0 });
    }

    #[tokio::test]
    async fn test_stale_ports() {
        let store = PortStatsStore::new(0xffff_ff00);
        let t0 = Utc::now();
        store.update(1, &counters(1, 0, 0), t0).await;
        store.update(1, &counters(2, 0, 0), t0 + Duration::seconds(20)).await;

        let stale = store.stale_ports(t0 + Duration::seconds(40), Duration::seconds(30)).await;
        assert_eq!(stale, vec![(1, 1, 40.0)]);
    }

    #[tokio::test]
    async fn test_purge_device() {
        let store = PortStatsStore::new(0xffff_ff00);
        store.update(1, &counters(1, 0, 0), Utc::now()).await;
        store.purge_device(1).await;
        assert!(store.snapshot().await.is_empty());
    }
}
