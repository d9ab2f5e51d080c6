use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use super::lsa::{Lsa, LsaHeader, LsaKey, LsaType};
use super::types::*;
use crate::RouterId;
use crate::forwarding::Color;

/// A protocol packet: the common header fields plus one message body.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub router_id: RouterId,
    pub area_id: u32,
    pub message: ProtocolMessage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolMessage {
    Hello(HelloMessage),
    DatabaseDescription(DatabaseDescription),
    LinkStateRequest(LinkStateRequest),
    LinkStateUpdate(LinkStateUpdate),
    LinkStateAck(LinkStateAck),
    Color(ColorNotification),
    Data(DataPacket),
}

impl ProtocolMessage {
    pub fn packet_type(&self) -> PacketType {
        match self {
            ProtocolMessage::Hello(_) => PacketType::Hello,
            ProtocolMessage::DatabaseDescription(_) => PacketType::DatabaseDescription,
            ProtocolMessage::LinkStateRequest(_) => PacketType::LinkStateRequest,
            ProtocolMessage::LinkStateUpdate(_) => PacketType::LinkStateUpdate,
            ProtocolMessage::LinkStateAck(_) => PacketType::LinkStateAck,
            ProtocolMessage::Color(_) => PacketType::Color,
            ProtocolMessage::Data(_) => PacketType::Data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloMessage {
    pub network_mask: Ipv4Addr,
    pub hello_interval: u16,
    pub options: u8,
    pub priority: u8,
    pub dead_interval: u32,
    /// Unused on point-to-point links; carried for wire compatibility.
    pub designated_router: Ipv4Addr,
    pub backup_designated_router: Ipv4Addr,
    pub neighbors: Vec<RouterId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseDescription {
    pub interface_mtu: u16,
    pub options: u8,
    pub flags: u8,
    pub sequence: u32,
    pub headers: Vec<LsaHeader>,
}

impl DatabaseDescription {
    pub fn is_init(&self) -> bool {
        self.flags & DD_FLAG_I != 0
    }

    pub fn has_more(&self) -> bool {
        self.flags & DD_FLAG_M != 0
    }

    pub fn is_master(&self) -> bool {
        self.flags & DD_FLAG_MS != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LsRequestEntry {
    pub ls_type: LsaType,
    pub link_state_id: RouterId,
    pub advertising_router: RouterId,
}

impl LsRequestEntry {
    pub fn key(&self) -> LsaKey {
        LsaKey {
            ls_type: self.ls_type,
            advertising_router: self.advertising_router,
        }
    }
}

impl From<&LsaHeader> for LsRequestEntry {
    fn from(header: &LsaHeader) -> Self {
        Self {
            ls_type: header.ls_type,
            link_state_id: header.link_state_id,
            advertising_router: header.advertising_router,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStateRequest {
    pub entries: Vec<LsRequestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStateUpdate {
    pub lsas: Vec<Lsa>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStateAck {
    pub headers: Vec<LsaHeader>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorNotification {
    pub origin: RouterId,
    pub color: Color,
}

/// Forwarded traffic. `trace` lists every router that has forwarded the
/// packet so far; `handed_back` lists routers the packet was returned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPacket {
    pub source: RouterId,
    pub destination: RouterId,
    pub id: u64,
    pub ttl: u8,
    pub trace: Vec<RouterId>,
    pub handed_back: Vec<RouterId>,
    pub payload: Vec<u8>,
}

impl DataPacket {
    pub fn new(source: RouterId, destination: RouterId, id: u64, ttl: u8, payload: Vec<u8>) -> Self {
        Self {
            source,
            destination,
            id,
            ttl,
            trace: Vec::new(),
            handed_back: Vec::new(),
            payload,
        }
    }

    pub fn has_visited(&self, router: RouterId) -> bool {
        self.trace.contains(&router)
    }
}
