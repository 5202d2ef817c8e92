//! Minimal Ethernet header parsing for packet-in payloads.

use crate::platform::messages::{MacAddr, ETH_TYPE_LLDP, ETH_TYPE_VLAN};
use thiserror::Error;

const ETH_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;

/// Errors that can occur while parsing a frame
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
}

/// Parsed Ethernet II header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: MacAddr,
    pub src: MacAddr,
    /// EtherType of the payload, after any 802.1Q tag
    pub ethertype: u16,
}

impl EthernetHeader {
    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < ETH_HEADER_LEN {
            return Err(FrameError::TooShort(data.len()));
        }

        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&data[0..6]);
        src.copy_from_slice(&data[6..12]);
        let mut ethertype = u16::from_be_bytes([data[12], data[13]]);

        if ethertype == ETH_TYPE_VLAN {
            if data.len() < ETH_HEADER_LEN + VLAN_TAG_LEN {
                return Err(FrameError::TooShort(data.len()));
            }
            ethertype = u16::from_be_bytes([data[16], data[17]]);
        }

        Ok(Self {
            dst: MacAddr(dst),
            src: MacAddr(src),
            ethertype,
        })
    }

    pub fn is_lldp(&self) -> bool {
        self.ethertype == ETH_TYPE_LLDP
    }
}

/// Build a bare Ethernet frame; used by tests and the bench
pub fn build_frame(dst: MacAddr, src: MacAddr, ethertype: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(ETH_HEADER_LEN + payload.len());
    frame.extend_from_slice(&dst.octets());
    frame.extend_from_slice(&src.octets());
    frame.extend_from_slice(&ethertype.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}
