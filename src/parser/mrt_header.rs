//! MRT common header parsing.

use std::io::Read;

use crate::error::MrtError;
use crate::models::{CommonHeader, EntryType};

/// Parse an MRT common header ([RFC6396 section 4.1][header]).
///
/// [header]: https://tools.ietf.org/html/rfc6396#section-4.1
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |             Type              |            Subtype            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             Length                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// `BGP4MP_ET` records append a 32-bit microsecond timestamp; its four bytes
/// are counted in the on-wire length, so the stored `length` is adjusted to
/// cover the message body only.
///
/// Returns `Ok(None)` on a clean end of file (no header byte read at all);
/// a partially read header is a truncation error.
pub fn parse_common_header<R: Read>(input: &mut R) -> Result<Option<CommonHeader>, MrtError> {
    let mut base = [0u8; 12];
    let mut filled = 0;
    while filled < base.len() {
        let n = input.read(&mut base[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(MrtError::eof("MRT common header", 12, filled));
        }
        filled += n;
    }

    let timestamp = u32::from_be_bytes(base[0..4].try_into().unwrap());
    let entry_type = EntryType::from(u16::from_be_bytes(base[4..6].try_into().unwrap()));
    let entry_subtype = u16::from_be_bytes(base[6..8].try_into().unwrap());
    // the length field does not include the common header itself
    let mut length = u32::from_be_bytes(base[8..12].try_into().unwrap());

    let microsecond_timestamp = match entry_type {
        EntryType::BGP4MP_ET => {
            if length < 4 {
                return Err(MrtError::InvalidEtLength);
            }
            length -= 4;
            let mut usec = [0u8; 4];
            input.read_exact(&mut usec)?;
            Some(u32::from_be_bytes(usec))
        }
        _ => None,
    };

    Ok(Some(CommonHeader {
        timestamp,
        microsecond_timestamp,
        entry_type,
        entry_subtype,
        length,
    }))
}
