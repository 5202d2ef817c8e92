//! Configuration management for the SDN mitigation controller.
//!
//! This module handles loading and managing application configuration
//! from configuration files and environment variables.

use std::env;
use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use crate::models::Config;

pub use crate::models::{ForwardingConfig, MitigationConfig, MonitoringConfig, ServerConfig};

/// Load configuration from an optional file and `SDN__`-prefixed environment variables
pub fn load_config() -> Result<Config, ConfigError> {
    let config_file = env::var("CONFIG_FILE").unwrap_or_else(|_| "config/default.toml".to_string());
    let defaults = Config::default();

    let config = ConfigBuilder::builder()
        .set_default("server.host", defaults.server.host.clone())?
        .set_default("server.port", defaults.server.port as i64)?
        .set_default("monitoring.poll_interval_seconds", defaults.monitoring.poll_interval_seconds as i64)?
        .set_default("monitoring.sample_log_path", defaults.monitoring.sample_log_path.clone())?
        .set_default("monitoring.stale_after_seconds", defaults.monitoring.stale_after_seconds as i64)?
        .set_default("monitoring.max_port_no", defaults.monitoring.max_port_no as i64)?
        .set_default("mitigation.interval_seconds", defaults.mitigation.interval_seconds as i64)?
        .set_default("mitigation.static_threshold", defaults.mitigation.static_threshold)?
        .set_default("mitigation.active_fraction", defaults.mitigation.active_fraction)?
        .set_default("mitigation.fair_share_factor", defaults.mitigation.fair_share_factor)?
        .set_default("mitigation.unblock_after_cycles", defaults.mitigation.unblock_after_cycles as i64)?
        .set_default("mitigation.drop_priority", defaults.mitigation.drop_priority as i64)?
        .set_default("mitigation.restore_priority", defaults.mitigation.restore_priority as i64)?
        .set_default("forwarding.flow_priority", defaults.forwarding.flow_priority as i64)?
        .set_default("forwarding.flow_idle_timeout", defaults.forwarding.flow_idle_timeout as i64)?
        .set_default("forwarding.mac_aging_seconds", defaults.forwarding.mac_aging_seconds as i64)?
        .add_source(File::with_name(&config_file).required(false))
        .add_source(Environment::with_prefix("SDN").separator("__").try_parsing(true))
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_defaults() {
        env::set_var("CONFIG_FILE", "config/does-not-exist.toml");
        let config = load_config().unwrap();

        assert_eq!(config.monitoring.max_port_no, 0xffff_ff00);
        assert_eq!(config.mitigation.unblock_after_cycles, 3);
        assert!(config.mitigation.enforcement_devices.is_empty());
        assert_eq!(config.forwarding.flow_priority, 1);
    }
}
