//! Builders for the flow-table and packet commands the controller sends.

use log::debug;
use crate::core::device_registry::Device;
use crate::platform::{
    Action, FlowMatch, FlowMod, FlowModCommand, OfpMessage, PacketOut, PlatformError, PortNo,
    PseudoPort,
};

/// Sends flow rules and packet actions to devices. No retries: a failed send
/// is returned to the caller.
#[derive(Debug, Clone, Default)]
pub struct FlowInstaller;

impl FlowInstaller {
    pub fn new() -> Self {
        Self
    }

    /// Insert a flow; `buffer_id` applies the rule to a packet already buffered on the device
    pub fn add_flow(
        &self,
        device: &Device,
        priority: u16,
        matcher: FlowMatch,
        actions: Vec<Action>,
        buffer_id: Option<u32>,
        idle_timeout: u16,
    ) -> Result<(), PlatformError> {
        debug!(
            "Add flow on {:016x}: priority={} match={:?} actions={:?}",
            device.id(),
            priority,
            matcher,
            actions
        );
        device.send(OfpMessage::FlowMod(FlowMod {
            command: FlowModCommand::Add,
            priority,
            matcher,
            actions,
            buffer_id,
            idle_timeout,
            hard_timeout: 0,
            out_port: None,
        }))
    }

    /// Delete flows; strict deletes only remove the rule with exactly this match and priority
    pub fn delete_flow(
        &self,
        device: &Device,
        matcher: FlowMatch,
        priority: u16,
        strict: bool,
        out_port: Option<PseudoPort>,
    ) -> Result<(), PlatformError> {
        let command = if strict {
            FlowModCommand::DeleteStrict
        } else {
            FlowModCommand::Delete
        };
        debug!("Delete flow on {:016x}: {:?} match={:?}", device.id(), command, matcher);
        device.send(OfpMessage::FlowMod(FlowMod {
            command,
            priority,
            matcher,
            actions: Vec::new(),
            buffer_id: None,
            idle_timeout: 0,
            hard_timeout: 0,
            out_port,
        }))
    }

    /// Send a packet immediately; either `buffer_id` or `data` identifies the payload
    pub fn packet_out(
        &self,
        device: &Device,
        in_port: PortNo,
        actions: Vec<Action>,
        buffer_id: Option<u32>,
        data: Option<Vec<u8>>,
    ) -> Result<(), PlatformError> {
        device.send(OfpMessage::PacketOut(PacketOut {
            buffer_id,
            in_port,
            actions,
            data,
        }))
    }

    /// Ask the device for counters of all its ports
    pub fn request_port_stats(&self, device: &Device) -> Result<(), PlatformError> {
        debug!("Requesting port stats from {:016x}", device.id());
        device.send(OfpMessage::PortStatsRequest { port: PseudoPort::Any })
    }

    /// Priority-0 catch-all sending unmatched frames to the controller unbuffered
    pub fn install_table_miss(&self, device: &Device) -> Result<(), PlatformError> {
        self.add_flow(
            device,
            0,
            FlowMatch::any(),
            vec![Action::Output {
                port: PseudoPort::Controller,
                max_len: Some(u16::MAX),
            }],
            None,
            0,
        )
    }

    /// Drop everything arriving on `port`
    pub fn block_port(&self, device: &Device, port: PortNo, priority: u16) -> Result<(), PlatformError> {
        self.add_flow(device, priority, FlowMatch::in_port(port), Vec::new(), None, 0)
    }

    /// Remove the drop rule on `port` and restore normal output for it
    pub fn unblock_port(
        &self,
        device: &Device,
        port: PortNo,
        drop_priority: u16,
        restore_priority: u16,
    ) -> Result<(), PlatformError> {
        self.delete_flow(device, FlowMatch::in_port(port), drop_priority, true, None)?;
        self.add_flow(
            device,
            restore_priority,
            FlowMatch::in_port(port),
            vec![Action::output(PseudoPort::Normal)],
            None,
            0,
        )
    }
}
