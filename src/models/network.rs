use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Address family identifier as carried in MRT and BGP structures.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Afi {
    Ipv4 = 1,
    Ipv6 = 2,
}

/// Width of AS number fields in a record.
///
/// PEER_INDEX_TABLE entries and the deprecated BGP4MP subtypes still carry
/// 2-byte AS numbers; everything is widened to `u32` once decoded.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AsnLength {
    Bits16,
    Bits32,
}

/// Second/microsecond timestamp pair taken from an MRT common header.
///
/// This is the timestamp that ends up in BMP per-peer headers. It is the
/// archive's record time, never wall-clock time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct RecordTime {
    pub sec: u32,
    pub usec: u32,
}

impl RecordTime {
    pub fn new(sec: u32, usec: u32) -> Self {
        RecordTime { sec, usec }
    }

    pub fn from_secs(sec: u32) -> Self {
        RecordTime { sec, usec: 0 }
    }
}
