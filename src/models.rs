use serde::{Deserialize, Serialize};
use crate::platform::messages::{DeviceId, PortNo, OFPP_MAX};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

/// Port statistics polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Stats polling interval in seconds
    pub poll_interval_seconds: u64,
    /// Sample log file, truncated at startup
    pub sample_log_path: String,
    /// Age after which a port sample is reported as stale
    pub stale_after_seconds: u64,
    /// Highest port number treated as a real interface
    pub max_port_no: PortNo,
}

/// Mitigation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigationConfig {
    /// Mitigation cycle interval in seconds
    pub interval_seconds: u64,
    /// Static alarm threshold (bytes per second)
    pub static_threshold: f64,
    /// Fraction of the static threshold above which a port counts as active
    pub active_fraction: f64,
    /// Headroom factor applied to the fair share
    pub fair_share_factor: f64,
    /// Cycles a port stays blocked before it is restored
    pub unblock_after_cycles: u32,
    /// Priority of drop rules
    pub drop_priority: u16,
    /// Priority of the rule restoring normal output after a block
    pub restore_priority: u16,
    /// Devices allowed to enforce blocks; empty means all devices
    #[serde(default)]
    pub enforcement_devices: Vec<DeviceId>,
}

impl MitigationConfig {
    pub fn enforces_on(&self, device_id: DeviceId) -> bool {
        self.enforcement_devices.is_empty() || self.enforcement_devices.contains(&device_id)
    }
}

/// Learning switch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardingConfig {
    /// Priority of learned flows
    pub flow_priority: u16,
    /// Idle timeout of learned flows in seconds, 0 for permanent
    pub flow_idle_timeout: u16,
    /// Seconds after which a learned MAC is forgotten, 0 for never
    pub mac_aging_seconds: u64,
}

/// Application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Monitoring configuration
    pub monitoring: MonitoringConfig,
    /// Mitigation configuration
    pub mitigation: MitigationConfig,
    /// Forwarding configuration
    pub forwarding: ForwardingConfig,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 10,
            sample_log_path: "port_stats.log".to_string(),
            stale_after_seconds: 30,
            max_port_no: OFPP_MAX,
        }
    }
}

impl Default for MitigationConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 5,
            static_threshold: 2_000_000.0,
            active_fraction: 0.1,
            fair_share_factor: 1.1,
            unblock_after_cycles: 3,
            drop_priority: 100,
            restore_priority: 1,
            enforcement_devices: Vec::new(),
        }
    }
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            flow_priority: 1,
            flow_idle_timeout: 0,
            mac_aging_seconds: 300,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            monitoring: MonitoringConfig::default(),
            mitigation: MitigationConfig::default(),
            forwarding: ForwardingConfig::default(),
        }
    }
}
