//! RIB_IPV4_UNICAST / RIB_IPV6_UNICAST decoding.

use bytes::Bytes;

use crate::error::MrtError;
use crate::models::{Afi, RibEntry, RibPrefixEntries, TableDumpV2Type};
use crate::parser::ReadUtils;

/// Parse an AFI-specific RIB record body.
///
/// RFC: <https://tools.ietf.org/html/rfc6396#section-4.3.2>
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Sequence Number                       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Prefix Length |         Prefix (variable)                     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |         Entry Count           |  RIB Entries (variable)
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The prefix occupies the rounded-up number of bytes for its bit length and
/// is kept verbatim. Per-entry path attributes are likewise kept as raw
/// bytes; AddPath subtypes carry an extra path identifier per entry which is
/// read and discarded.
pub fn parse_rib_entries(
    mut data: Bytes,
    rib_type: TableDumpV2Type,
) -> Result<RibPrefixEntries, MrtError> {
    let afi = rib_type
        .afi()
        .ok_or_else(|| MrtError::Malformed(format!("not a RIB subtype: {rib_type:?}")))?;
    let add_path = rib_type.is_add_path();

    let sequence_number = data.read_u32()?;

    let prefix_len = data.read_u8()?;
    let max_len = match afi {
        Afi::Ipv4 => 32,
        Afi::Ipv6 => 128,
    };
    if prefix_len > max_len {
        return Err(MrtError::InvalidPrefixLength(prefix_len, afi));
    }
    let prefix = data.read_n_bytes((prefix_len as usize + 7) / 8, "prefix")?;

    let entry_count = data.read_u16()?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let peer_index = data.read_u16()?;
        let originated_time = data.read_u32()?;
        if add_path {
            let _path_id = data.read_u32()?;
        }
        let attribute_length = data.read_u16()? as usize;
        let attributes = data.read_n_bytes(attribute_length, "RIB entry attributes")?;
        entries.push(RibEntry {
            peer_index,
            originated_time,
            attributes,
        });
    }

    Ok(RibPrefixEntries {
        afi,
        sequence_number,
        prefix_len,
        prefix,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn v4_record(add_path: bool) -> Bytes {
        let mut body = BytesMut::new();
        body.put_u32(7); // sequence number
        body.put_u8(24);
        body.put_slice(&[10, 0, 0]); // 10.0.0.0/24, 3 prefix bytes
        body.put_u16(1); // entry count
        body.put_u16(0); // peer index
        body.put_u32(1_600_000_000); // originated time
        if add_path {
            body.put_u32(42);
        }
        body.put_u16(4); // attribute length
        body.put_slice(&[0x40, 0x01, 0x01, 0x00]); // ORIGIN IGP
        body.freeze()
    }

    #[test]
    fn test_parse_v4_rib() {
        let rib = parse_rib_entries(v4_record(false), TableDumpV2Type::RibIpv4Unicast).unwrap();
        assert_eq!(rib.afi, Afi::Ipv4);
        assert_eq!(rib.sequence_number, 7);
        assert_eq!(rib.prefix_len, 24);
        assert_eq!(rib.prefix.as_ref(), &[10, 0, 0]);
        assert_eq!(rib.entries.len(), 1);
        assert_eq!(rib.entries[0].peer_index, 0);
        assert_eq!(rib.entries[0].originated_time, 1_600_000_000);
        assert_eq!(rib.entries[0].attributes.as_ref(), &[0x40, 0x01, 0x01, 0x00]);
    }

    #[test]
    fn test_parse_v4_rib_add_path() {
        let rib = parse_rib_entries(v4_record(true), TableDumpV2Type::RibIpv4UnicastAddPath)
            .unwrap();
        // the path identifier is consumed, the rest is unchanged
        assert_eq!(rib.entries[0].attributes.as_ref(), &[0x40, 0x01, 0x01, 0x00]);
    }

    #[test]
    fn test_parse_v6_rib() {
        let mut body = BytesMut::new();
        body.put_u32(0);
        body.put_u8(32);
        body.put_slice(&[0x20, 0x01, 0x0d, 0xb8]); // 2001:db8::/32, 4 prefix bytes
        body.put_u16(1);
        body.put_u16(3);
        body.put_u32(1_600_000_000);
        body.put_u16(0);

        let rib =
            parse_rib_entries(body.freeze(), TableDumpV2Type::RibIpv6Unicast).unwrap();
        assert_eq!(rib.afi, Afi::Ipv6);
        assert_eq!(rib.prefix.as_ref(), &[0x20, 0x01, 0x0d, 0xb8]);
        assert_eq!(rib.entries[0].peer_index, 3);
    }

    #[test]
    fn test_invalid_prefix_length() {
        let mut body = BytesMut::new();
        body.put_u32(0);
        body.put_u8(33); // out of range for IPv4
        assert!(matches!(
            parse_rib_entries(body.freeze(), TableDumpV2Type::RibIpv4Unicast),
            Err(MrtError::InvalidPrefixLength(33, Afi::Ipv4))
        ));
    }

    #[test]
    fn test_truncated_attributes() {
        let mut body = BytesMut::new();
        body.put_u32(0);
        body.put_u8(8);
        body.put_u8(10);
        body.put_u16(1);
        body.put_u16(0);
        body.put_u32(0);
        body.put_u16(10); // claims 10 attribute bytes, provides none
        assert!(parse_rib_entries(body.freeze(), TableDumpV2Type::RibIpv4Unicast).is_err());
    }
}
