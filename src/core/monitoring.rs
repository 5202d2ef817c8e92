//! Port statistics monitoring.
//!
//! The stats poller asks every registered switch for its port counters once
//! per cycle. Replies arrive later through the event loop and are handled by
//! the throughput calculator. Each cycle also appends the current samples to
//! the sample log, reports ports whose samples went stale and sweeps expired
//! MAC entries.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Mutex};
use tokio::time;
use crate::core::device_registry::DeviceRegistry;
use crate::core::error::ControllerError;
use crate::core::flow_installer::FlowInstaller;
use crate::core::forwarding::ForwardingTable;
use crate::core::port_stats::{PortSampleRecord, PortStatsStore};
use crate::models::MonitoringConfig;
use crate::platform::{DeviceId, PortNo};
use crate::utils::config_duration;

const SAMPLE_LOG_HEADER: &str =
    "timestamp,device_id,port_no,rx_bytes,tx_bytes,rx_throughput,tx_throughput\n";

/// Append-only log of port samples, recreated at startup
pub struct SampleLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl SampleLog {
    /// Create (or truncate) the log at `path`
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, ControllerError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::create(&path).await?;
        file.write_all(SAMPLE_LOG_HEADER.as_bytes()).await?;
        file.flush().await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line per sample, stamped with `now`
    pub async fn append(&self, now: DateTime<Utc>, records: &[PortSampleRecord]) -> Result<(), ControllerError> {
        if records.is_empty() {
            return Ok(());
        }
        let stamp = now.to_rfc3339();
        let mut block = String::new();
        for r in records {
            block.push_str(&format!(
                "{},{:016x},{},{},{},{},{}\n",
                stamp,
                r.device_id,
                r.port_no,
                r.sample.rx_bytes,
                r.sample.tx_bytes,
                format_rate(r.sample.rx_throughput),
                format_rate(r.sample.tx_throughput),
            ));
        }
        let mut file = self.file.lock().await;
        file.write_all(block.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

fn format_rate(rate: Option<f64>) -> String {
    rate.map(|r| format!("{:.3}", r)).unwrap_or_default()
}

/// What one polling cycle did
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PollReport {
    pub requested: usize,
    pub failed: usize,
    pub stale: Vec<(DeviceId, PortNo, f64)>,
    pub expired_macs: usize,
}

/// Stats poller
pub struct Monitoring {
    registry: Arc<DeviceRegistry>,
    stats: Arc<PortStatsStore>,
    forwarding: Arc<ForwardingTable>,
    installer: FlowInstaller,
    sample_log: Option<SampleLog>,
    config: MonitoringConfig,
}

impl Monitoring {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        stats: Arc<PortStatsStore>,
        forwarding: Arc<ForwardingTable>,
        installer: FlowInstaller,
        sample_log: Option<SampleLog>,
        config: MonitoringConfig,
    ) -> Self {
        Self {
            registry,
            stats,
            forwarding,
            installer,
            sample_log,
            config,
        }
    }

    /// Poll on a fixed interval until `shutdown` fires
    pub async fn start_monitoring(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting monitoring service...");
        let mut interval = time::interval(Duration::from_secs(self.config.poll_interval_seconds.max(1)));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.poll_once(Utc::now()).await;
                    if report.failed > 0 {
                        warn!(
                            "Stats poll: {} of {} requests failed",
                            report.failed,
                            report.requested + report.failed
                        );
                    }
                }
                _ = shutdown.recv() => {
                    info!("Monitoring service received shutdown signal, stopping...");
                    break;
                }
            }
        }
    }

    /// One monitoring cycle
    pub async fn poll_once(&self, now: DateTime<Utc>) -> PollReport {
        let mut report = PollReport::default();

        // Fire and forget: replies come back as events
        for device in self.registry.snapshot().await {
            match self.installer.request_port_stats(&device) {
                Ok(()) => report.requested += 1,
                Err(e) => {
                    report.failed += 1;
                    error!("Stats request to switch {:016x} failed: {}", device.id(), e);
                }
            }
        }

        if let Some(log) = &self.sample_log {
            let records = self.stats.snapshot().await;
            if let Err(e) = log.append(now, &records).await {
                error!("Failed to write sample log {}: {}", log.path().display(), e);
            }
        }

        let max_age = config_duration(self.config.stale_after_seconds);
        report.stale = self.stats.stale_ports(now, max_age).await;
        for (device_id, port_no, age) in &report.stale {
            warn!(
                "Switch {:016x}, port {}: last sample is {:.0}s old",
                device_id, port_no, age
            );
        }
        metrics::gauge!("sdn_stale_ports", report.stale.len() as f64);

        report.expired_macs = self.forwarding.expire(now).await;
        if report.expired_macs > 0 {
            info!("Expired {} learned MAC entries", report.expired_macs);
        }

        report
    }
}
