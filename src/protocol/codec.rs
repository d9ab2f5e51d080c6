//! Big-endian wire encoding of protocol packets.
//!
//! Every packet starts with a 16-byte common header:
//! version(1) type(1) length(2) router-id(4) area-id(4) checksum(2) reserved(2).
//! The checksum is the ones-complement sum of the whole packet with the
//! checksum field zeroed. LSAs carry their own Fletcher checksum computed
//! over everything except the age field.

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use std::io::{Cursor, Read};
use std::net::Ipv4Addr;

use super::lsa::{LinkRecord, Lsa, LsaHeader, LsaType};
use super::messages::*;
use super::types::*;
use crate::error::{Error, Result};
use crate::forwarding::Color;

const CHECKSUM_OFFSET: usize = 12;
const DD_FIXED_LEN: usize = 8 + 2;

/// Number of LSA headers that fit in one database description on `mtu`.
pub fn dd_headers_per_packet(mtu: u16) -> usize {
    let room = (mtu as usize).saturating_sub(PACKET_HEADER_LEN + DD_FIXED_LEN);
    (room / LSA_HEADER_LEN).max(1)
}

pub fn encode(packet: &Packet) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128);
    buf.push(PROTOCOL_VERSION);
    buf.push(packet.message.packet_type() as u8);
    buf.extend_from_slice(&[0, 0]); // length, patched below
    put_addr(&mut buf, packet.router_id);
    buf.extend_from_slice(&packet.area_id.to_be_bytes());
    buf.extend_from_slice(&[0, 0, 0, 0]); // checksum + reserved

    match &packet.message {
        ProtocolMessage::Hello(hello) => {
            put_addr(&mut buf, hello.network_mask);
            buf.extend_from_slice(&hello.hello_interval.to_be_bytes());
            buf.push(hello.options);
            buf.push(hello.priority);
            buf.extend_from_slice(&hello.dead_interval.to_be_bytes());
            put_addr(&mut buf, hello.designated_router);
            put_addr(&mut buf, hello.backup_designated_router);
            buf.extend_from_slice(&(hello.neighbors.len() as u16).to_be_bytes());
            for neighbor in &hello.neighbors {
                put_addr(&mut buf, *neighbor);
            }
        }
        ProtocolMessage::DatabaseDescription(dd) => {
            buf.extend_from_slice(&dd.interface_mtu.to_be_bytes());
            buf.push(dd.options);
            buf.push(dd.flags & (DD_FLAG_I | DD_FLAG_M | DD_FLAG_MS));
            buf.extend_from_slice(&dd.sequence.to_be_bytes());
            buf.extend_from_slice(&(dd.headers.len() as u16).to_be_bytes());
            for header in &dd.headers {
                write_lsa_header(&mut buf, header);
            }
        }
        ProtocolMessage::LinkStateRequest(request) => {
            buf.extend_from_slice(&(request.entries.len() as u16).to_be_bytes());
            for entry in &request.entries {
                buf.extend_from_slice(&(entry.ls_type as u32).to_be_bytes());
                put_addr(&mut buf, entry.link_state_id);
                put_addr(&mut buf, entry.advertising_router);
            }
        }
        ProtocolMessage::LinkStateUpdate(update) => {
            buf.extend_from_slice(&(update.lsas.len() as u32).to_be_bytes());
            for lsa in &update.lsas {
                write_lsa(&mut buf, lsa);
            }
        }
        ProtocolMessage::LinkStateAck(ack) => {
            buf.extend_from_slice(&(ack.headers.len() as u16).to_be_bytes());
            for header in &ack.headers {
                write_lsa_header(&mut buf, header);
            }
        }
        ProtocolMessage::Color(notification) => {
            put_addr(&mut buf, notification.origin);
            buf.push(notification.color as u8);
        }
        ProtocolMessage::Data(data) => {
            put_addr(&mut buf, data.source);
            put_addr(&mut buf, data.destination);
            buf.extend_from_slice(&data.id.to_be_bytes());
            buf.push(data.ttl);
            put_router_list(&mut buf, &data.trace);
            put_router_list(&mut buf, &data.handed_back);
            buf.extend_from_slice(&(data.payload.len() as u16).to_be_bytes());
            buf.extend_from_slice(&data.payload);
        }
    }

    let length = buf.len() as u16;
    BigEndian::write_u16(&mut buf[2..4], length);
    let checksum = internet_checksum(&buf);
    BigEndian::write_u16(&mut buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2], checksum);
    buf
}

pub fn decode(bytes: &[u8]) -> Result<Packet> {
    if bytes.len() < PACKET_HEADER_LEN {
        return Err(Error::Truncated {
            needed: PACKET_HEADER_LEN,
            available: bytes.len(),
        });
    }
    let mut r = Reader::new(bytes);
    let version = r.u8()?;
    if version != PROTOCOL_VERSION {
        return Err(Error::BadVersion(version));
    }
    let raw_type = r.u8()?;
    let packet_type = PacketType::from_u8(raw_type).ok_or(Error::UnknownPacketType(raw_type))?;
    let length = r.u16()? as usize;
    if length != bytes.len() {
        return Err(Error::LengthMismatch {
            declared: length,
            actual: bytes.len(),
        });
    }
    let router_id = r.addr()?;
    let area_id = r.u32()?;
    let carried = r.u16()?;
    let _reserved = r.u16()?;

    let mut zeroed = bytes.to_vec();
    BigEndian::write_u16(&mut zeroed[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2], 0);
    let computed = internet_checksum(&zeroed);
    if computed != carried {
        return Err(Error::BadChecksum { carried, computed });
    }

    let message = match packet_type {
        PacketType::Hello => {
            let network_mask = r.addr()?;
            let hello_interval = r.u16()?;
            let options = r.u8()?;
            let priority = r.u8()?;
            let dead_interval = r.u32()?;
            let designated_router = r.addr()?;
            let backup_designated_router = r.addr()?;
            let count = r.u16()? as usize;
            let mut neighbors = Vec::with_capacity(count);
            for _ in 0..count {
                neighbors.push(r.addr()?);
            }
            ProtocolMessage::Hello(HelloMessage {
                network_mask,
                hello_interval,
                options,
                priority,
                dead_interval,
                designated_router,
                backup_designated_router,
                neighbors,
            })
        }
        PacketType::DatabaseDescription => {
            let interface_mtu = r.u16()?;
            let options = r.u8()?;
            let flags = r.u8()?;
            let sequence = r.u32()?;
            let count = r.u16()? as usize;
            let mut headers = Vec::with_capacity(count);
            for _ in 0..count {
                headers.push(read_lsa_header(&mut r)?);
            }
            ProtocolMessage::DatabaseDescription(DatabaseDescription {
                interface_mtu,
                options,
                flags,
                sequence,
                headers,
            })
        }
        PacketType::LinkStateRequest => {
            let count = r.u16()? as usize;
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                let raw = r.u32()?;
                let ls_type = u8::try_from(raw)
                    .ok()
                    .and_then(LsaType::from_u8)
                    .ok_or(Error::UnknownLsaType(raw as u8))?;
                entries.push(LsRequestEntry {
                    ls_type,
                    link_state_id: r.addr()?,
                    advertising_router: r.addr()?,
                });
            }
            ProtocolMessage::LinkStateRequest(LinkStateRequest { entries })
        }
        PacketType::LinkStateUpdate => {
            let count = r.u32()? as usize;
            let mut lsas = Vec::with_capacity(count.min(256));
            for _ in 0..count {
                lsas.push(read_lsa(&mut r)?);
            }
            ProtocolMessage::LinkStateUpdate(LinkStateUpdate { lsas })
        }
        PacketType::LinkStateAck => {
            let count = r.u16()? as usize;
            let mut headers = Vec::with_capacity(count);
            for _ in 0..count {
                headers.push(read_lsa_header(&mut r)?);
            }
            ProtocolMessage::LinkStateAck(LinkStateAck { headers })
        }
        PacketType::Color => {
            let origin = r.addr()?;
            let raw = r.u8()?;
            let color = Color::from_u8(raw).ok_or(Error::UnknownColor(raw))?;
            ProtocolMessage::Color(ColorNotification { origin, color })
        }
        PacketType::Data => {
            let source = r.addr()?;
            let destination = r.addr()?;
            let id = r.u64()?;
            let ttl = r.u8()?;
            let trace = read_router_list(&mut r)?;
            let handed_back = read_router_list(&mut r)?;
            let len = r.u16()? as usize;
            let payload = r.bytes(len)?;
            ProtocolMessage::Data(DataPacket {
                source,
                destination,
                id,
                ttl,
                trace,
                handed_back,
                payload,
            })
        }
    };

    if r.remaining() != 0 {
        return Err(Error::LengthMismatch {
            declared: length - r.remaining(),
            actual: length,
        });
    }

    Ok(Packet {
        router_id,
        area_id,
        message,
    })
}

pub fn write_lsa_header(buf: &mut Vec<u8>, header: &LsaHeader) {
    buf.extend_from_slice(&header.age.to_be_bytes());
    buf.push(header.options);
    buf.push(header.ls_type as u8);
    put_addr(buf, header.link_state_id);
    put_addr(buf, header.advertising_router);
    buf.extend_from_slice(&header.sequence.to_be_bytes());
    buf.extend_from_slice(&header.checksum.to_be_bytes());
    buf.extend_from_slice(&header.length.to_be_bytes());
}

pub fn write_lsa(buf: &mut Vec<u8>, lsa: &Lsa) {
    write_lsa_header(buf, &lsa.header);
    buf.extend_from_slice(&(lsa.links.len() as u16).to_be_bytes());
    for link in &lsa.links {
        put_addr(buf, link.neighbor_id);
        put_addr(buf, link.local_addr);
        put_addr(buf, link.remote_addr);
        buf.extend_from_slice(&link.cost.to_be_bytes());
    }
}

fn read_lsa_header(r: &mut Reader<'_>) -> Result<LsaHeader> {
    let age = r.u16()?;
    let options = r.u8()?;
    let raw_type = r.u8()?;
    let ls_type = LsaType::from_u8(raw_type).ok_or(Error::UnknownLsaType(raw_type))?;
    Ok(LsaHeader {
        age,
        options,
        ls_type,
        link_state_id: r.addr()?,
        advertising_router: r.addr()?,
        sequence: r.i32()?,
        checksum: r.u16()?,
        length: r.u16()?,
    })
}

fn read_lsa(r: &mut Reader<'_>) -> Result<Lsa> {
    let header = read_lsa_header(r)?;
    let count = r.u16()? as usize;
    let expected = LSA_HEADER_LEN + 2 + count * LINK_RECORD_LEN;
    if header.length as usize != expected {
        return Err(Error::LengthMismatch {
            declared: header.length as usize,
            actual: expected,
        });
    }
    let mut links = Vec::with_capacity(count);
    for _ in 0..count {
        links.push(LinkRecord {
            neighbor_id: r.addr()?,
            local_addr: r.addr()?,
            remote_addr: r.addr()?,
            cost: r.u32()?,
        });
    }
    let lsa = Lsa { header, links };
    if !lsa.has_valid_checksum() {
        return Err(Error::BadLsaChecksum {
            advertising_router: lsa.header.advertising_router,
            sequence: lsa.header.sequence,
        });
    }
    Ok(lsa)
}

fn put_addr(buf: &mut Vec<u8>, addr: Ipv4Addr) {
    buf.extend_from_slice(&addr.octets());
}

fn put_router_list(buf: &mut Vec<u8>, routers: &[Ipv4Addr]) {
    let count = routers.len().min(u8::MAX as usize);
    buf.push(count as u8);
    for router in &routers[..count] {
        put_addr(buf, *router);
    }
}

fn read_router_list(r: &mut Reader<'_>) -> Result<Vec<Ipv4Addr>> {
    let count = r.u8()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(r.addr()?);
    }
    Ok(out)
}

/// RFC 1071 ones-complement checksum.
pub fn internet_checksum(bytes: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = bytes.chunks_exact(2);
    for chunk in &mut chunks {
        sum += BigEndian::read_u16(chunk) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// ISO 8473 Fletcher checksum with the check bytes placed at `offset`.
/// The two bytes at `offset` are zeroed before summing.
pub fn fletcher_checksum(bytes: &mut [u8], offset: usize) -> u16 {
    bytes[offset] = 0;
    bytes[offset + 1] = 0;

    let mut c0: i64 = 0;
    let mut c1: i64 = 0;
    for chunk in bytes.chunks(4102) {
        for b in chunk {
            c0 += *b as i64;
            c1 += c0;
        }
        c0 %= 255;
        c1 %= 255;
    }

    let mut x = ((bytes.len() - offset - 1) as i64 * c0 - c1) % 255;
    if x <= 0 {
        x += 255;
    }
    let mut y = 510 - c0 - x;
    if y > 255 {
        y -= 255;
    }
    ((x as u16) << 8) | (y as u16 & 0xff)
}

struct Reader<'a> {
    cur: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            cur: Cursor::new(bytes),
        }
    }

    fn remaining(&self) -> usize {
        self.cur.get_ref().len() - self.cur.position() as usize
    }

    fn need(&self, n: usize) -> Result<()> {
        let available = self.remaining();
        if available < n {
            return Err(Error::Truncated { needed: n, available });
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.cur.read_u8()?)
    }

    fn u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.cur.read_u16::<BigEndian>()?)
    }

    fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.cur.read_u32::<BigEndian>()?)
    }

    fn i32(&mut self) -> Result<i32> {
        self.need(4)?;
        Ok(self.cur.read_i32::<BigEndian>()?)
    }

    fn u64(&mut self) -> Result<u64> {
        self.need(8)?;
        Ok(self.cur.read_u64::<BigEndian>()?)
    }

    fn addr(&mut self) -> Result<Ipv4Addr> {
        Ok(Ipv4Addr::from(self.u32()?))
    }

    fn bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.need(n)?;
        let mut out = vec![0u8; n];
        self.cur.read_exact(&mut out)?;
        Ok(out)
    }
}
