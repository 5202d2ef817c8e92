//! Throughput calculation on incoming stats replies.
//!
//! Each reply is folded into the [`PortStatsStore`]; ports whose throughput
//! goes above the static alarm threshold are put on the [`Watchlist`] and
//! taken off again once both directions fall back to or below it.

use std::sync::Arc;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use crate::core::port_stats::{PortStatsStore, SampleUpdate};
use crate::core::watchlist::Watchlist;
use crate::platform::{DeviceId, PortCounters, PortNo};

/// Bytes per second between two counter readings.
///
/// Returns `None` when the counter went backwards or no time elapsed.
pub fn compute_throughput(previous: u64, current: u64, elapsed_seconds: f64) -> Option<f64> {
    if current < previous || elapsed_seconds <= 0.0 {
        return None;
    }
    Some((current - previous) as f64 / elapsed_seconds)
}

/// Whether a sample crosses the static alarm threshold (exclusive)
pub fn exceeds_threshold(rx: f64, tx: f64, threshold: f64) -> bool {
    rx > threshold || tx > threshold
}

/// Feeds stats replies into the store and keeps the watchlist current
pub struct ThroughputCalculator {
    stats: Arc<PortStatsStore>,
    watchlist: Arc<Watchlist>,
    static_threshold: f64,
}

impl ThroughputCalculator {
    pub fn new(stats: Arc<PortStatsStore>, watchlist: Arc<Watchlist>, static_threshold: f64) -> Self {
        Self {
            stats,
            watchlist,
            static_threshold,
        }
    }

    pub async fn on_stats_reply(
        &self,
        device_id: DeviceId,
        counters: &[PortCounters],
        now: DateTime<Utc>,
    ) -> Vec<(PortNo, SampleUpdate)> {
        let mut updates = Vec::with_capacity(counters.len());

        for port in counters {
            let update = self.stats.update(device_id, port, now).await;
            match update {
                SampleUpdate::Computed { rx, tx } => {
                    metrics::increment_counter!("sdn_port_samples_total");
                    info!(
                        "Switch {:016x}, port {} - RX throughput: {:.1} bytes/sec, TX throughput: {:.1} bytes/sec",
                        device_id, port.port_no, rx, tx
                    );
                    if exceeds_threshold(rx, tx, self.static_threshold) {
                        warn!(
                            "Alarm! Switch {:016x}, port {} exceeded the threshold: RX={:.1}, TX={:.1}",
                            device_id, port.port_no, rx, tx
                        );
                        self.watchlist.insert(device_id, port.port_no).await;
                    } else if self.watchlist.remove(device_id, port.port_no).await {
                        info!(
                            "Switch {:016x}, port {} back under the threshold",
                            device_id, port.port_no
                        );
                    }
                }
                SampleUpdate::Duplicate | SampleUpdate::Resync => {
                    metrics::increment_counter!("sdn_port_samples_discarded_total");
                    debug!(
                        "Switch {:016x}, port {}: {:?}, sample not evaluated",
                        device_id, port.port_no, update
                    );
                }
                SampleUpdate::Initial | SampleUpdate::Ignored => {}
            }
            updates.push((port.port_no, update));
        }

        updates
    }
}
