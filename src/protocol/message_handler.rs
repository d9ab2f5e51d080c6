use log::{debug, warn};
use std::net::Ipv4Addr;

use super::{Router, codec, flooding, neighbor_manager, route_manager};
use super::messages::*;
use crate::RouterId;
use crate::error::{Error, Result};

/// Decodes one packet and dispatches it by message kind.
pub(super) fn handle_packet(router: &mut Router, iface: &str, source: Ipv4Addr, bytes: &[u8]) -> Result<()> {
    if router.config.interface(iface).is_none() {
        router.stats.rejected_packets += 1;
        return Err(Error::UnknownInterface(iface.to_string()));
    }

    let packet = match codec::decode(bytes) {
        Ok(packet) => packet,
        Err(e) => {
            router.stats.decode_errors += 1;
            return Err(e);
        }
    };

    if packet.router_id == router.id() {
        debug!("Router {}: ignoring own packet looped back on {}", router.id(), iface);
        return Ok(());
    }
    if packet.area_id != router.config.area_id {
        router.stats.rejected_packets += 1;
        warn!(
            "Router {}: {:?} from {} carries area {}, expected {}",
            router.id(),
            packet.message.packet_type(),
            packet.router_id,
            packet.area_id,
            router.config.area_id
        );
        return Ok(());
    }

    debug!(
        "Router {} ← {:?} from {} on {}",
        router.id(),
        packet.message.packet_type(),
        packet.router_id,
        iface
    );

    let sender = packet.router_id;
    match packet.message {
        ProtocolMessage::Hello(hello) => neighbor_manager::handle_hello(router, iface, source, sender, hello),
        ProtocolMessage::Data(data) => {
            route_manager::forward_data(router, data);
            Ok(())
        }
        message => {
            check_known_neighbor(router, iface, sender)?;
            match message {
                ProtocolMessage::DatabaseDescription(dd) => neighbor_manager::handle_database_description(router, iface, dd),
                ProtocolMessage::LinkStateRequest(request) => neighbor_manager::handle_ls_request(router, iface, request),
                ProtocolMessage::LinkStateUpdate(update) => flooding::handle_update(router, iface, update),
                ProtocolMessage::LinkStateAck(ack) => flooding::handle_ack(router, iface, ack),
                ProtocolMessage::Color(notification) => {
                    neighbor_manager::handle_color(router, iface, notification);
                    Ok(())
                }
                ProtocolMessage::Hello(_) | ProtocolMessage::Data(_) => Ok(()),
            }
        }
    }
}

/// Everything but greetings and data must come from the neighbor already
/// known on this interface; adjacencies are never created implicitly.
fn check_known_neighbor(router: &mut Router, iface: &str, sender: RouterId) -> Result<()> {
    match router.adjacencies.get(iface) {
        Some(adj) if adj.neighbor_id == sender => Ok(()),
        _ => {
            router.stats.rejected_packets += 1;
            Err(Error::UnknownNeighbor {
                iface: iface.to_string(),
                router: sender,
            })
        }
    }
}
