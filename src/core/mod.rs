//! Core functionality of the SDN mitigation controller.
//!
//! This module contains the learning switch, the port statistics pipeline,
//! the mitigation engine and the controller lifecycle that ties them together.

pub mod controller;
pub mod device_registry;
pub mod dispatcher;
pub mod error;
pub mod flow_installer;
pub mod forwarding;
pub mod mitigation;
pub mod monitoring;
pub mod port_stats;
pub mod state;
pub mod throughput;
pub mod watchlist;

pub use controller::Controller;
pub use device_registry::{Device, DeviceInfo, DeviceRegistry};
pub use dispatcher::{EventDispatcher, EventHandler};
pub use error::ControllerError;
pub use flow_installer::FlowInstaller;
pub use forwarding::{ForwardingDecision, ForwardingTable, LearningSwitch};
pub use mitigation::{dynamic_threshold, BlockState, BlockTable, CycleReport, MitigationEngine, PortState};
pub use monitoring::{Monitoring, PollReport, SampleLog};
pub use port_stats::{PortSample, PortSampleRecord, PortStatsStore, SampleUpdate};
pub use state::ControllerState;
pub use throughput::{compute_throughput, ThroughputCalculator};
pub use watchlist::Watchlist;
