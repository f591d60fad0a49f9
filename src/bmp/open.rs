//! Synthetic BGP OPEN messages for Peer-Up notifications.

use std::net::Ipv4Addr;

use bytes::{BufMut, Bytes, BytesMut};

/// Placeholder AS for the 2-byte OPEN field when the real AS needs 4 bytes
/// (RFC 6793).
const AS_TRANS: u16 = 23456;

const BGP_MSG_TYPE_OPEN: u8 = 1;
const BGP_VERSION: u8 = 4;
const HOLD_TIME: u16 = 180;

const PARAM_CAPABILITY: u8 = 2;
const CAP_MULTIPROTOCOL: u8 = 1;
const CAP_FOUR_OCTET_AS: u8 = 65;

/// Build a complete BGP OPEN PDU for the given AS and BGP identifier.
///
/// The archives carry no OPEN messages, so both sides of a Peer-Up are
/// synthesized. Capabilities always advertise multiprotocol IPv4/unicast and
/// IPv6/unicast plus 4-octet AS: a collector fed a v6 RIB must not reject
/// the session because the OPEN only announced v4.
pub fn synthetic_open(asn: u32, bgp_id: Ipv4Addr) -> Bytes {
    let mut params = BytesMut::new();
    put_capability(&mut params, CAP_MULTIPROTOCOL, &[0x00, 0x01, 0x00, 0x01]); // IPv4 unicast
    put_capability(&mut params, CAP_MULTIPROTOCOL, &[0x00, 0x02, 0x00, 0x01]); // IPv6 unicast
    put_capability(&mut params, CAP_FOUR_OCTET_AS, &asn.to_be_bytes());

    let my_as = u16::try_from(asn).unwrap_or(AS_TRANS);

    // marker + length + type + version + my AS + hold time + BGP id + opt len
    let total_len = 16 + 2 + 1 + 1 + 2 + 2 + 4 + 1 + params.len();
    let mut msg = BytesMut::with_capacity(total_len);
    msg.put_slice(&[0xff; 16]);
    msg.put_u16(total_len as u16);
    msg.put_u8(BGP_MSG_TYPE_OPEN);
    msg.put_u8(BGP_VERSION);
    msg.put_u16(my_as);
    msg.put_u16(HOLD_TIME);
    msg.put_slice(&bgp_id.octets());
    msg.put_u8(params.len() as u8);
    msg.put_slice(&params);
    msg.freeze()
}

/// One capability wrapped in its own optional parameter.
fn put_capability(buf: &mut BytesMut, code: u8, value: &[u8]) {
    buf.put_u8(PARAM_CAPABILITY);
    buf.put_u8((value.len() + 2) as u8);
    buf.put_u8(code);
    buf.put_u8(value.len() as u8);
    buf.put_slice(value);
}
