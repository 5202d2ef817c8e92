//! SDN mitigation controller
//!
//! Control-plane logic for an OpenFlow switch fabric: a learning switch,
//! per-port throughput monitoring and a fair-share mitigation engine that
//! temporarily drops traffic on ports flooding a switch.

pub mod api;
pub mod config;
pub mod core;
pub mod models;
pub mod platform;
pub mod utils;
