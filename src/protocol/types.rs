use serde::{Deserialize, Serialize};
use std::fmt;

pub const PROTOCOL_VERSION: u8 = 2;
pub const PACKET_HEADER_LEN: usize = 16;
pub const LSA_HEADER_LEN: usize = 20;
pub const LINK_RECORD_LEN: usize = 16;

/// Seconds after which an LSA is considered expired and is flushed.
pub const MAX_AGE: u16 = 3600;
/// Age difference below which two otherwise identical instances are equal.
pub const MAX_AGE_DIFF: u16 = 900;

pub const INITIAL_SEQUENCE_NUMBER: i32 = 0x8000_0001_u32 as i32;
pub const MAX_SEQUENCE_NUMBER: i32 = 0x7fff_ffff;

pub const OPTION_E: u8 = 0x02;
pub const DEFAULT_PRIORITY: u8 = 1;

/// Database description flag bits.
pub const DD_FLAG_MS: u8 = 0x01;
pub const DD_FLAG_M: u8 = 0x02;
pub const DD_FLAG_I: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Plain link-state routing: one next hop per destination.
    #[default]
    Ospf,
    /// Backup paths, congestion colors and the forwarding arbiter.
    TrafficLight,
}

impl Variant {
    pub fn computes_backup(self) -> bool {
        matches!(self, Variant::TrafficLight)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Ospf => write!(f, "ospf"),
            Variant::TrafficLight => write!(f, "traffic-light"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Hello = 1,
    DatabaseDescription = 2,
    LinkStateRequest = 3,
    LinkStateUpdate = 4,
    LinkStateAck = 5,
    Color = 6,
    Data = 7,
}

impl PacketType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(PacketType::Hello),
            2 => Some(PacketType::DatabaseDescription),
            3 => Some(PacketType::LinkStateRequest),
            4 => Some(PacketType::LinkStateUpdate),
            5 => Some(PacketType::LinkStateAck),
            6 => Some(PacketType::Color),
            7 => Some(PacketType::Data),
            _ => None,
        }
    }
}

/// Role negotiated in ExStart; the larger router id is master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Master,
    Slave,
}
