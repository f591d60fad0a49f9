//! MRT record structs.
//!
//! Only the record families this replay pipeline consumes are modeled. BGP
//! message bytes and RIB entry attributes are kept verbatim as [`Bytes`]: the
//! BMP stream forwards them untouched, so parsing them any further would only
//! risk re-encoding drift.

use std::net::{IpAddr, Ipv4Addr};

use bytes::Bytes;
use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};

use crate::models::{Afi, RecordTime};

/// MRT common header ([RFC6396 section 2][header]).
///
/// [header]: https://datatracker.ietf.org/doc/html/rfc6396#section-2
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
/// `BGP4MP_ET` records carry a fourth 32-bit word with the microsecond part
/// of the timestamp; on the wire its four bytes are counted in `length`, but
/// the stored `length` here is always the message body length only.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CommonHeader {
    pub timestamp: u32,
    pub microsecond_timestamp: Option<u32>,
    pub entry_type: EntryType,
    pub entry_subtype: u16,
    pub length: u32,
}

impl CommonHeader {
    pub fn record_time(&self) -> RecordTime {
        RecordTime::new(self.timestamp, self.microsecond_timestamp.unwrap_or(0))
    }
}

/// MRT entry type. Types not listed here fold into `Unknown` and are skipped
/// by the reader using the declared record length.
#[derive(Debug, FromPrimitive, IntoPrimitive, Copy, Clone, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
#[repr(u16)]
pub enum EntryType {
    TABLE_DUMP = 12,
    TABLE_DUMP_V2 = 13,
    BGP4MP = 16,
    BGP4MP_ET = 17,
    #[num_enum(catch_all)]
    Unknown(u16),
}

/// TABLE_DUMP_V2 subtypes ([RFC6396 section 4.3]).
///
/// [RFC6396 section 4.3]: https://datatracker.ietf.org/doc/html/rfc6396#section-4.3
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TableDumpV2Type {
    PeerIndexTable = 1,
    RibIpv4Unicast = 2,
    RibIpv6Unicast = 4,
    RibIpv4UnicastAddPath = 8,
    RibIpv6UnicastAddPath = 10,
}

impl TableDumpV2Type {
    pub const fn afi(&self) -> Option<Afi> {
        match self {
            TableDumpV2Type::RibIpv4Unicast | TableDumpV2Type::RibIpv4UnicastAddPath => {
                Some(Afi::Ipv4)
            }
            TableDumpV2Type::RibIpv6Unicast | TableDumpV2Type::RibIpv6UnicastAddPath => {
                Some(Afi::Ipv6)
            }
            TableDumpV2Type::PeerIndexTable => None,
        }
    }

    pub const fn is_add_path(&self) -> bool {
        matches!(
            self,
            TableDumpV2Type::RibIpv4UnicastAddPath | TableDumpV2Type::RibIpv6UnicastAddPath
        )
    }
}

/// BGP4MP subtypes ([RFC6396 section 4.4]).
///
/// [RFC6396 section 4.4]: https://datatracker.ietf.org/doc/html/rfc6396#section-4.4
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Bgp4MpType {
    StateChange = 0,
    Message = 1,
    MessageAs4 = 4,
    StateChangeAs4 = 5,
}

/// BGP finite-state-machine states as encoded in BGP4MP_STATE_CHANGE records.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum BgpState {
    Idle = 1,
    Connect = 2,
    Active = 3,
    OpenSent = 4,
    OpenConfirm = 5,
    Established = 6,
}

/// One decoded MRT record: header plus typed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MrtRecord {
    pub header: CommonHeader,
    pub body: MrtBody,
}

/// Typed MRT record bodies.
///
/// `Unsupported` covers every type/subtype the pipeline has no use for; the
/// reader consumes the declared length and moves on, so unknown records never
/// stall a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MrtBody {
    PeerIndexTable(PeerIndexTable),
    RibEntries(RibPrefixEntries),
    Bgp4MpMessage(Bgp4MpMessage),
    Bgp4MpStateChange(Bgp4MpStateChange),
    Unsupported,
}

/// PEER_INDEX_TABLE: maps small integers to peer identities for the RIB
/// records that follow it ([RFC6396 section 4.3.1]).
///
/// [RFC6396 section 4.3.1]: https://datatracker.ietf.org/doc/html/rfc6396#section-4.3.1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIndexTable {
    pub collector_bgp_id: Ipv4Addr,
    pub view_name: String,
    pub peers: Vec<IndexedPeer>,
}

impl Default for PeerIndexTable {
    fn default() -> Self {
        Self {
            collector_bgp_id: Ipv4Addr::new(0, 0, 0, 0),
            view_name: String::new(),
            peers: Vec::new(),
        }
    }
}

impl PeerIndexTable {
    pub fn get(&self, index: u16) -> Option<&IndexedPeer> {
        self.peers.get(index as usize)
    }
}

/// One entry of a PEER_INDEX_TABLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexedPeer {
    pub bgp_id: Ipv4Addr,
    pub address: IpAddr,
    pub asn: u32,
}

/// A RIB_IPV4_UNICAST / RIB_IPV6_UNICAST record: one prefix, many per-peer
/// entries ([RFC6396 section 4.3.2]).
///
/// The prefix is stored exactly as found on the wire: a bit length plus the
/// rounded-up number of prefix bytes. The replay path re-emits those bytes
/// inside NLRI / MP_REACH_NLRI fields without reinterpretation.
///
/// [RFC6396 section 4.3.2]: https://datatracker.ietf.org/doc/html/rfc6396#section-4.3.2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RibPrefixEntries {
    pub afi: Afi,
    pub sequence_number: u32,
    pub prefix_len: u8,
    pub prefix: Bytes,
    pub entries: Vec<RibEntry>,
}

/// One RIB entry: peer index, originated time, raw path attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RibEntry {
    pub peer_index: u16,
    pub originated_time: u32,
    pub attributes: Bytes,
}

/// BGP4MP_MESSAGE / BGP4MP_MESSAGE_AS4: a raw BGP message exchanged with a
/// peer. `bgp_message` is the complete BGP PDU including marker and length,
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bgp4MpMessage {
    pub peer_asn: u32,
    pub local_asn: u32,
    pub interface_index: u16,
    pub afi: Afi,
    pub peer_address: IpAddr,
    pub local_address: IpAddr,
    pub bgp_message: Bytes,
}

/// BGP4MP_STATE_CHANGE / BGP4MP_STATE_CHANGE_AS4: a peer FSM transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bgp4MpStateChange {
    pub peer_asn: u32,
    pub local_asn: u32,
    pub interface_index: u16,
    pub afi: Afi,
    pub peer_address: IpAddr,
    pub local_address: IpAddr,
    pub old_state: BgpState,
    pub new_state: BgpState,
}
