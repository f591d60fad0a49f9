//! Record-at-a-time MRT reader.

use std::io::Read;

use bytes::Bytes;

use crate::error::MrtError;
use crate::models::{
    AsnLength, Bgp4MpType, CommonHeader, EntryType, MrtBody, MrtRecord, TableDumpV2Type,
};
use crate::parser::bgp4mp::{parse_bgp4mp_message, parse_bgp4mp_state_change};
use crate::parser::mrt_header::parse_common_header;
use crate::parser::peer_index_table::parse_peer_index_table;
use crate::parser::rib_entries::parse_rib_entries;

// Upper bound against unreasonable allocations from corrupt headers.
const MAX_MRT_MESSAGE_LEN: u32 = 16 * 1024 * 1024;

/// Lazily yields MRT records from a `Read` source.
///
/// The reader never buffers more than one record. Types and subtypes the
/// pipeline has no use for are consumed using the declared length and
/// surfaced as [`MrtBody::Unsupported`].
pub struct MrtReader<R> {
    input: R,
    done: bool,
}

impl<R: Read> MrtReader<R> {
    pub fn new(input: R) -> Self {
        MrtReader { input, done: false }
    }

    /// Read the next record. `Ok(None)` marks a clean end of file; any error
    /// means the file is malformed from this point on.
    pub fn next_record(&mut self) -> Result<Option<MrtRecord>, MrtError> {
        let header = match parse_common_header(&mut self.input)? {
            Some(header) => header,
            None => return Ok(None),
        };

        if header.length > MAX_MRT_MESSAGE_LEN {
            return Err(MrtError::MessageTooLarge(header.length));
        }

        let mut buffer = vec![0u8; header.length as usize];
        self.input.read_exact(&mut buffer).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                MrtError::eof("MRT message body", header.length as usize, 0)
            } else {
                MrtError::Io(e)
            }
        })?;

        let body = parse_body(&header, Bytes::from(buffer))?;
        Ok(Some(MrtRecord { header, body }))
    }
}

impl<R: Read> Iterator for MrtReader<R> {
    type Item = Result<MrtRecord, MrtError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn parse_body(header: &CommonHeader, data: Bytes) -> Result<MrtBody, MrtError> {
    let body = match header.entry_type {
        EntryType::TABLE_DUMP_V2 => match TableDumpV2Type::try_from(header.entry_subtype) {
            Ok(TableDumpV2Type::PeerIndexTable) => {
                MrtBody::PeerIndexTable(parse_peer_index_table(data)?)
            }
            Ok(rib_type) => MrtBody::RibEntries(parse_rib_entries(data, rib_type)?),
            Err(_) => MrtBody::Unsupported,
        },
        EntryType::BGP4MP | EntryType::BGP4MP_ET => {
            match Bgp4MpType::try_from(header.entry_subtype) {
                Ok(Bgp4MpType::Message) => {
                    MrtBody::Bgp4MpMessage(parse_bgp4mp_message(data, AsnLength::Bits16)?)
                }
                Ok(Bgp4MpType::MessageAs4) => {
                    MrtBody::Bgp4MpMessage(parse_bgp4mp_message(data, AsnLength::Bits32)?)
                }
                Ok(Bgp4MpType::StateChange) => {
                    MrtBody::Bgp4MpStateChange(parse_bgp4mp_state_change(data, AsnLength::Bits16)?)
                }
                Ok(Bgp4MpType::StateChangeAs4) => {
                    MrtBody::Bgp4MpStateChange(parse_bgp4mp_state_change(data, AsnLength::Bits32)?)
                }
                Err(_) => MrtBody::Unsupported,
            }
        }
        EntryType::TABLE_DUMP | EntryType::Unknown(_) => MrtBody::Unsupported,
    };
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn record(entry_type: u16, subtype: u16, body: &[u8]) -> Vec<u8> {
        let mut bytes = BytesMut::new();
        bytes.put_u32(1_600_000_000);
        bytes.put_u16(entry_type);
        bytes.put_u16(subtype);
        bytes.put_u32(body.len() as u32);
        bytes.put_slice(body);
        bytes.to_vec()
    }

    fn bgp4mp_message_body() -> Vec<u8> {
        let mut body = BytesMut::new();
        body.put_u32(65001);
        body.put_u32(65002);
        body.put_u16(0);
        body.put_u16(1);
        body.put_u32(u32::from(std::net::Ipv4Addr::new(192, 0, 2, 1)));
        body.put_u32(u32::from(std::net::Ipv4Addr::new(192, 0, 2, 2)));
        body.put_slice(&[0xff; 16]);
        body.put_u16(19);
        body.put_u8(4); // KEEPALIVE
        body.to_vec()
    }

    #[test]
    fn test_iterate_records() {
        let mut file = record(16, 4, &bgp4mp_message_body());
        file.extend(record(16, 4, &bgp4mp_message_body()));

        let reader = MrtReader::new(&file[..]);
        let records: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0].body, MrtBody::Bgp4MpMessage(_)));
    }

    #[test]
    fn test_unknown_type_skipped() {
        let mut file = record(32, 0, &[1, 2, 3, 4]); // ISIS
        file.extend(record(16, 4, &bgp4mp_message_body()));

        let mut reader = MrtReader::new(&file[..]);
        let first = reader.next_record().unwrap().unwrap();
        assert_eq!(first.body, MrtBody::Unsupported);
        let second = reader.next_record().unwrap().unwrap();
        assert!(matches!(second.body, MrtBody::Bgp4MpMessage(_)));
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_unknown_subtype_skipped() {
        let file = record(13, 3, &[0, 0, 0, 0]); // RIB_IPV4_MULTICAST
        let mut reader = MrtReader::new(&file[..]);
        assert_eq!(
            reader.next_record().unwrap().unwrap().body,
            MrtBody::Unsupported
        );
    }

    #[test]
    fn test_length_overrun_is_error() {
        let mut file = record(16, 4, &bgp4mp_message_body());
        // second record claims far more bytes than remain
        let mut second = BytesMut::new();
        second.put_u32(1_600_000_000);
        second.put_u16(16);
        second.put_u16(4);
        second.put_u32(10_000);
        second.put_slice(&[0u8; 8]);
        file.extend_from_slice(&second);

        let mut reader = MrtReader::new(&file[..]);
        assert!(reader.next_record().unwrap().is_some());
        assert!(reader.next_record().is_err());
    }

    #[test]
    fn test_oversized_record_rejected() {
        let mut header = BytesMut::new();
        header.put_u32(0);
        header.put_u16(16);
        header.put_u16(4);
        header.put_u32(MAX_MRT_MESSAGE_LEN + 1);

        let mut reader = MrtReader::new(&header[..]);
        assert!(matches!(
            reader.next_record(),
            Err(MrtError::MessageTooLarge(_))
        ));
    }

    #[test]
    fn test_et_record_timestamp() {
        let mut body = BytesMut::new();
        body.put_u32(250_000); // microseconds, part of on-wire length
        body.put_slice(&bgp4mp_message_body());

        let file = record(17, 4, &body);
        let mut reader = MrtReader::new(&file[..]);
        let rec = reader.next_record().unwrap().unwrap();
        assert_eq!(rec.header.microsecond_timestamp, Some(250_000));
        assert!(matches!(rec.body, MrtBody::Bgp4MpMessage(_)));
    }
}
