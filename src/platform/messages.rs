//! OpenFlow 1.3 message model used between the controller core and the platform.
//!
//! These are the already-decoded forms of the messages the core exchanges with
//! switches. Wire encoding is the platform's job; the core only builds and
//! inspects these values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Datapath identifier of a switch
pub type DeviceId = u64;

/// Port number on a switch
pub type PortNo = u32;

/// Highest port number that refers to a real interface (`OFPP_MAX`)
pub const OFPP_MAX: PortNo = 0xffff_ff00;

/// EtherType for link-layer discovery frames
pub const ETH_TYPE_LLDP: u16 = 0x88cc;

/// EtherType for 802.1Q VLAN tags
pub const ETH_TYPE_VLAN: u16 = 0x8100;

/// Errors raised when handling MAC addresses
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MacParseError {
    #[error("invalid MAC address: {0}")]
    Invalid(String),
}

/// 48-bit Ethernet hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(MacParseError::Invalid(s.to_string()));
        }
        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(parts) {
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| MacParseError::Invalid(s.to_string()))?;
        }
        Ok(MacAddr(octets))
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

impl TryFrom<String> for MacAddr {
    type Error = MacParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Output port, physical or reserved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PseudoPort {
    Physical(PortNo),
    InPort,
    Normal,
    Flood,
    All,
    Controller,
    Local,
    Any,
}

/// Actions applied to matching packets. An empty action list drops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Output to a port; `max_len` bounds the bytes sent to the controller
    Output { port: PseudoPort, max_len: Option<u16> },
}

impl Action {
    pub fn output(port: PseudoPort) -> Self {
        Action::Output { port, max_len: None }
    }
}

/// Match fields used by this controller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowMatch {
    pub in_port: Option<PortNo>,
    pub eth_src: Option<MacAddr>,
    pub eth_dst: Option<MacAddr>,
}

impl FlowMatch {
    /// Wildcard match covering every packet
    pub fn any() -> Self {
        Self::default()
    }

    pub fn in_port(port: PortNo) -> Self {
        Self {
            in_port: Some(port),
            ..Self::default()
        }
    }
}

/// Flow table modification command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowModCommand {
    Add,
    Delete,
    DeleteStrict,
}

/// Flow table modification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowMod {
    pub command: FlowModCommand,
    pub priority: u16,
    pub matcher: FlowMatch,
    pub actions: Vec<Action>,
    pub buffer_id: Option<u32>,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    /// Restricts deletes to flows that output to this port
    pub out_port: Option<PseudoPort>,
}

/// Packet injected by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketOut {
    pub buffer_id: Option<u32>,
    pub in_port: PortNo,
    pub actions: Vec<Action>,
    pub data: Option<Vec<u8>>,
}

/// Message sent from the controller to a switch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OfpMessage {
    FlowMod(FlowMod),
    PacketOut(PacketOut),
    PortStatsRequest { port: PseudoPort },
}

/// Per-port byte counters from a stats reply
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortCounters {
    pub port_no: PortNo,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Frame handed to the controller by a switch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketIn {
    pub in_port: PortNo,
    /// `None` when the switch did not buffer the frame
    pub buffer_id: Option<u32>,
    pub total_len: u16,
    pub data: Vec<u8>,
}

impl PacketIn {
    pub fn is_truncated(&self) -> bool {
        self.data.len() < self.total_len as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_display_and_parse() {
        let mac: MacAddr = "00:00:00:00:00:0a".parse().unwrap();
        assert_eq!(mac, MacAddr([0, 0, 0, 0, 0, 0x0a]));
        assert_eq!(mac.to_string(), "00:00:00:00:00:0a");
        assert!("00:00:00:00:0a".parse::<MacAddr>().is_err());
        assert!("zz:00:00:00:00:0a".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_message_serializes_with_tag() {
        let msg = OfpMessage::PortStatsRequest { port: PseudoPort::Any };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "port_stats_request");
        assert_eq!(json["port"], "any");
    }

    #[test]
    fn test_truncated_packet_in() {
        let pkt = PacketIn {
            in_port: 1,
            buffer_id: None,
            total_len: 128,
            data: vec![0; 64],
        };
        assert!(pkt.is_truncated());
    }
}
