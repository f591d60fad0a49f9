//! BMP message builders.

use std::net::{IpAddr, Ipv4Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::IntoPrimitive;

use crate::bmp::open::synthetic_open;
use crate::error::MrtError;
use crate::models::{Afi, PeerKey, RecordTime};
use crate::parser::ReadUtils;

pub const BMP_VERSION: u8 = 3;

const COMMON_HEADER_LEN: usize = 6;

/// BMP message type (RFC 7854 section 4.1).
#[derive(Debug, IntoPrimitive, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum BmpMsgType {
    RouteMonitoring = 0,
    StatisticsReport = 1,
    PeerDownNotification = 2,
    PeerUpNotification = 3,
    InitiationMessage = 4,
    TerminationMessage = 5,
    RouteMirroringMessage = 6,
}

// Per-peer header flags (RFC 7854 section 4.2). The V flag marks an IPv6
// peer address; RFC 7854 defines no timestamp flag, the timestamp fields are
// simply always filled with the MRT record time.
const PEER_FLAG_IPV6: u8 = 0b1000_0000;

// Initiation / termination TLV types.
const TLV_SYS_DESCR: u16 = 1;
const TLV_SYS_NAME: u16 = 2;
const TLV_TERMINATION_REASON: u16 = 1;
const TERMINATION_ADMIN_CLOSE: u16 = 0;

// Peer-Down reason (RFC 7854 section 4.9): remote system closed the session
// without a notification message.
const PEER_DOWN_REMOTE_NO_NOTIFICATION: u8 = 4;

const REMOTE_BGP_PORT: u16 = 179;

// BGP UPDATE framing.
const BGP_HEADER_LEN: usize = 19;
const BGP_MSG_TYPE_UPDATE: u8 = 2;
const ATTR_MP_REACH_NLRI: u8 = 14;
const ATTR_FLAG_OPTIONAL: u8 = 0x80;
const ATTR_FLAG_EXTENDED: u8 = 0x10;

/// Prepend the BMP common header to a finished message body.
///
/// ```text
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+
/// |    Version    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        Message Length                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Msg. Type   |
/// +---------------+
/// ```
fn finish_message(msg_type: BmpMsgType, body: &[u8]) -> Bytes {
    let mut msg = BytesMut::with_capacity(COMMON_HEADER_LEN + body.len());
    msg.put_u8(BMP_VERSION);
    msg.put_u32((COMMON_HEADER_LEN + body.len()) as u32);
    msg.put_u8(msg_type.into());
    msg.put_slice(body);
    msg.freeze()
}

/// The 42-byte per-peer header. IPv4 peer addresses are right-aligned in the
/// 16-byte address field; the timestamp is the MRT record time, which is
/// load-bearing for downstream analytics.
fn put_per_peer_header(buf: &mut BytesMut, peer: &PeerKey, time: RecordTime) {
    buf.put_u8(0); // peer type: global instance
    buf.put_u8(if peer.is_ipv6() { PEER_FLAG_IPV6 } else { 0 });
    buf.put_u64(0); // peer distinguisher
    match peer.address {
        IpAddr::V4(v4) => {
            buf.put_slice(&[0u8; 12]);
            buf.put_slice(&v4.octets());
        }
        IpAddr::V6(v6) => buf.put_slice(&v6.octets()),
    }
    buf.put_u32(peer.asn);
    buf.put_slice(&peer.bgp_id.octets());
    buf.put_u32(time.sec);
    buf.put_u32(time.usec);
}

fn put_info_tlv(buf: &mut BytesMut, tlv_type: u16, value: &[u8]) {
    buf.put_u16(tlv_type);
    buf.put_u16(value.len() as u16);
    buf.put_slice(value);
}

/// Initiation message: sysDescr and sysName identify the replay to the
/// collector.
pub fn initiation(router_name: &str) -> Bytes {
    let mut body = BytesMut::new();
    let descr = format!("openbmp-mrt2bmp/{router_name}");
    put_info_tlv(&mut body, TLV_SYS_DESCR, descr.as_bytes());
    put_info_tlv(&mut body, TLV_SYS_NAME, router_name.as_bytes());
    finish_message(BmpMsgType::InitiationMessage, &body)
}

/// Peer-Up notification with synthetic OPEN messages on both sides.
///
/// The local (sent) OPEN carries the router's derived BGP identifier, the
/// received OPEN the peer's own; the archives expose no local AS, so both
/// OPENs carry the peer's AS. Local address and port are zero, the remote
/// port is the canonical BGP port.
pub fn peer_up(peer: &PeerKey, local_bgp_id: Ipv4Addr, time: RecordTime) -> Bytes {
    let mut body = BytesMut::new();
    put_per_peer_header(&mut body, peer, time);
    body.put_slice(&[0u8; 16]); // local address
    body.put_u16(0); // local port
    body.put_u16(REMOTE_BGP_PORT);
    body.put_slice(&synthetic_open(peer.asn, local_bgp_id));
    body.put_slice(&synthetic_open(peer.asn, peer.bgp_id));
    finish_message(BmpMsgType::PeerUpNotification, &body)
}

/// Route-Monitoring wrapping a BGP PDU taken verbatim from a BGP4MP record.
pub fn route_monitoring(peer: &PeerKey, time: RecordTime, bgp_message: &[u8]) -> Bytes {
    let mut body = BytesMut::with_capacity(42 + bgp_message.len());
    put_per_peer_header(&mut body, peer, time);
    body.put_slice(bgp_message);
    finish_message(BmpMsgType::RouteMonitoring, &body)
}

/// Route-Monitoring synthesized from one RIB entry.
///
/// IPv4 prefixes ride in the UPDATE's NLRI field with the entry's attributes
/// verbatim. IPv6 prefixes are spliced into a rebuilt MP_REACH_NLRI: RFC 6396
/// truncates that attribute in RIB entries down to the next hop, so the full
/// AFI/SAFI/next-hop/NLRI form is reconstructed around the stored prefix.
pub fn route_monitoring_rib(
    peer: &PeerKey,
    time: RecordTime,
    afi: Afi,
    prefix_len: u8,
    prefix: &[u8],
    attributes: &Bytes,
) -> Result<Bytes, MrtError> {
    let update = match afi {
        Afi::Ipv4 => {
            let mut nlri = BytesMut::with_capacity(1 + prefix.len());
            nlri.put_u8(prefix_len);
            nlri.put_slice(prefix);
            bgp_update(attributes, &nlri)
        }
        Afi::Ipv6 => {
            let spliced = splice_mp_reach(attributes, prefix_len, prefix)?;
            bgp_update(&spliced, &[])
        }
    };

    let mut body = BytesMut::with_capacity(42 + update.len());
    put_per_peer_header(&mut body, peer, time);
    body.put_slice(&update);
    Ok(finish_message(BmpMsgType::RouteMonitoring, &body))
}

/// Peer-Down notification for a BGP4MP state change away from Established.
pub fn peer_down(peer: &PeerKey, time: RecordTime) -> Bytes {
    let mut body = BytesMut::new();
    put_per_peer_header(&mut body, peer, time);
    body.put_u8(PEER_DOWN_REMOTE_NO_NOTIFICATION);
    finish_message(BmpMsgType::PeerDownNotification, &body)
}

/// Termination message for graceful shutdown.
pub fn termination() -> Bytes {
    let mut body = BytesMut::new();
    body.put_u16(TLV_TERMINATION_REASON);
    body.put_u16(2);
    body.put_u16(TERMINATION_ADMIN_CLOSE);
    finish_message(BmpMsgType::TerminationMessage, &body)
}

/// Frame a BGP UPDATE: zero withdrawn routes, the given path attributes,
/// then the NLRI bytes.
fn bgp_update(path_attributes: &[u8], nlri: &[u8]) -> Bytes {
    let total = BGP_HEADER_LEN + 2 + 2 + path_attributes.len() + nlri.len();
    let mut msg = BytesMut::with_capacity(total);
    msg.put_slice(&[0xff; 16]);
    msg.put_u16(total as u16);
    msg.put_u8(BGP_MSG_TYPE_UPDATE);
    msg.put_u16(0); // withdrawn routes length
    msg.put_u16(path_attributes.len() as u16);
    msg.put_slice(path_attributes);
    msg.put_slice(nlri);
    msg.freeze()
}

/// Rewrite a RIB entry's attribute block for IPv6: all attributes except
/// MP_REACH_NLRI are copied byte for byte; the truncated MP_REACH (next hop
/// only, RFC 6396 section 4.3.4) is replaced by a full one carrying the
/// prefix.
fn splice_mp_reach(attributes: &Bytes, prefix_len: u8, prefix: &[u8]) -> Result<Bytes, MrtError> {
    let mut input = attributes.clone();
    let mut out = BytesMut::with_capacity(attributes.len() + prefix.len() + 8);
    let mut next_hop = Bytes::new();

    while input.has_remaining() {
        let flags = input.read_u8()?;
        let attr_type = input.read_u8()?;
        let length = if flags & ATTR_FLAG_EXTENDED != 0 {
            input.read_u16()? as usize
        } else {
            input.read_u8()? as usize
        };
        let value = input.read_n_bytes(length, "attribute value")?;

        if attr_type == ATTR_MP_REACH_NLRI {
            let mut reach = value;
            let nh_len = reach.read_u8()? as usize;
            next_hop = reach.read_n_bytes(nh_len, "MP_REACH next hop")?;
        } else {
            out.put_u8(flags);
            out.put_u8(attr_type);
            if flags & ATTR_FLAG_EXTENDED != 0 {
                out.put_u16(length as u16);
            } else {
                out.put_u8(length as u8);
            }
            out.put_slice(&value);
        }
    }

    // AFI + SAFI + next hop length + next hop + reserved + prefix
    let reach_len = 2 + 1 + 1 + next_hop.len() + 1 + 1 + prefix.len();
    if reach_len > 255 {
        out.put_u8(ATTR_FLAG_OPTIONAL | ATTR_FLAG_EXTENDED);
        out.put_u8(ATTR_MP_REACH_NLRI);
        out.put_u16(reach_len as u16);
    } else {
        out.put_u8(ATTR_FLAG_OPTIONAL);
        out.put_u8(ATTR_MP_REACH_NLRI);
        out.put_u8(reach_len as u8);
    }
    out.put_u16(u16::from(Afi::Ipv6));
    out.put_u8(1); // SAFI unicast
    out.put_u8(next_hop.len() as u8);
    out.put_slice(&next_hop);
    out.put_u8(0); // reserved
    out.put_u8(prefix_len);
    out.put_slice(prefix);

    Ok(out.freeze())
}
