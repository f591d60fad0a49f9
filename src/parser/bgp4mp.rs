//! BGP4MP message and state-change decoding.

use bytes::{Buf, Bytes};

use crate::error::MrtError;
use crate::models::{AsnLength, Bgp4MpMessage, Bgp4MpStateChange, BgpState};
use crate::parser::ReadUtils;

// Smallest valid BGP PDU: 16-byte marker + length + type.
const BGP_HEADER_LEN: usize = 19;

/// Parse a BGP4MP_MESSAGE / BGP4MP_MESSAGE_AS4 record body.
///
/// RFC: <https://www.rfc-editor.org/rfc/rfc6396#section-4.4>
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |         Peer AS Number        |        Local AS Number        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |        Interface Index        |        Address Family         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      Peer IP Address (variable)               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      Local IP Address (variable)              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                    BGP Message... (variable)
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// (AS4 subtypes widen the AS fields to 32 bits.) The BGP message is kept
/// verbatim: it goes onto the BMP stream byte for byte.
pub fn parse_bgp4mp_message(
    mut data: Bytes,
    asn_len: AsnLength,
) -> Result<Bgp4MpMessage, MrtError> {
    let peer_asn = data.read_asn(asn_len)?;
    let local_asn = data.read_asn(asn_len)?;
    let interface_index = data.read_u16()?;
    let afi = data.read_afi()?;
    let peer_address = data.read_address(afi)?;
    let local_address = data.read_address(afi)?;

    if data.remaining() < BGP_HEADER_LEN {
        return Err(MrtError::eof("BGP message", BGP_HEADER_LEN, data.remaining()));
    }
    let bgp_message = data;

    Ok(Bgp4MpMessage {
        peer_asn,
        local_asn,
        interface_index,
        afi,
        peer_address,
        local_address,
        bgp_message,
    })
}

/// Parse a BGP4MP_STATE_CHANGE / BGP4MP_STATE_CHANGE_AS4 record body.
pub fn parse_bgp4mp_state_change(
    mut data: Bytes,
    asn_len: AsnLength,
) -> Result<Bgp4MpStateChange, MrtError> {
    let peer_asn = data.read_asn(asn_len)?;
    let local_asn = data.read_asn(asn_len)?;
    let interface_index = data.read_u16()?;
    let afi = data.read_afi()?;
    let peer_address = data.read_address(afi)?;
    let local_address = data.read_address(afi)?;
    let old_state = read_state(&mut data)?;
    let new_state = read_state(&mut data)?;

    Ok(Bgp4MpStateChange {
        peer_asn,
        local_asn,
        interface_index,
        afi,
        peer_address,
        local_address,
        old_state,
        new_state,
    })
}

fn read_state(data: &mut Bytes) -> Result<BgpState, MrtError> {
    let raw = data.read_u16()?;
    BgpState::try_from(raw).map_err(|_| MrtError::InvalidBgpState(raw))
}
