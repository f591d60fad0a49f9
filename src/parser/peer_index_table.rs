//! PEER_INDEX_TABLE decoding.

use std::net::Ipv4Addr;

use bytes::Bytes;

use crate::error::MrtError;
use crate::models::{Afi, AsnLength, IndexedPeer, PeerIndexFlags, PeerIndexTable};
use crate::parser::ReadUtils;

/// Parse a PEER_INDEX_TABLE record body.
///
/// RFC: <https://www.rfc-editor.org/rfc/rfc6396#section-4.3.1>
pub fn parse_peer_index_table(mut data: Bytes) -> Result<PeerIndexTable, MrtError> {
    let collector_bgp_id = Ipv4Addr::from(data.read_u32()?);

    let view_name_length = data.read_u16()? as usize;
    let view_name_bytes = data.read_n_bytes(view_name_length, "view name")?;
    let view_name = String::from_utf8_lossy(&view_name_bytes).into_owned();

    let peer_count = data.read_u16()?;
    let mut peers = Vec::with_capacity(peer_count as usize);
    for _ in 0..peer_count {
        let flags = PeerIndexFlags::from_bits_retain(data.read_u8()?);
        let afi = match flags.contains(PeerIndexFlags::ADDRESS_FAMILY_IPV6) {
            true => Afi::Ipv6,
            false => Afi::Ipv4,
        };
        let asn_len = match flags.contains(PeerIndexFlags::AS_SIZE_32BIT) {
            true => AsnLength::Bits32,
            false => AsnLength::Bits16,
        };

        let bgp_id = Ipv4Addr::from(data.read_u32()?);
        let address = data.read_address(afi)?;
        let asn = data.read_asn(asn_len)?;
        peers.push(IndexedPeer {
            bgp_id,
            address,
            asn,
        });
    }

    Ok(PeerIndexTable {
        collector_bgp_id,
        view_name,
        peers,
    })
}
