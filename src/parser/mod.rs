//! MRT binary format decoding.
//!
//! [`MrtReader`] drives a `Read` source one record at a time; the submodules
//! decode the record families the replay pipeline consumes. Everything the
//! pipeline forwards verbatim (BGP PDUs, RIB path attributes) stays as raw
//! bytes.

pub mod bgp4mp;
pub mod mrt_header;
pub mod mrt_record;
pub mod peer_index_table;
pub mod rib_entries;

pub use mrt_record::MrtReader;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, Bytes};

use crate::error::MrtError;
use crate::models::{Afi, AsnLength};

/// Cursor primitives over a record's payload bytes.
pub(crate) trait ReadUtils {
    fn require(&self, n: usize, name: &'static str) -> Result<(), MrtError>;
    fn read_u8(&mut self) -> Result<u8, MrtError>;
    fn read_u16(&mut self) -> Result<u16, MrtError>;
    fn read_u32(&mut self) -> Result<u32, MrtError>;
    fn read_n_bytes(&mut self, n: usize, name: &'static str) -> Result<Bytes, MrtError>;
    fn read_ipv4_address(&mut self) -> Result<Ipv4Addr, MrtError>;
    fn read_ipv6_address(&mut self) -> Result<Ipv6Addr, MrtError>;

    fn read_address(&mut self, afi: Afi) -> Result<IpAddr, MrtError> {
        match afi {
            Afi::Ipv4 => self.read_ipv4_address().map(IpAddr::V4),
            Afi::Ipv6 => self.read_ipv6_address().map(IpAddr::V6),
        }
    }

    fn read_asn(&mut self, asn_len: AsnLength) -> Result<u32, MrtError> {
        match asn_len {
            AsnLength::Bits16 => self.read_u16().map(u32::from),
            AsnLength::Bits32 => self.read_u32(),
        }
    }

    fn read_afi(&mut self) -> Result<Afi, MrtError> {
        let raw = self.read_u16()?;
        Afi::try_from(raw).map_err(|_| MrtError::InvalidAfi(raw))
    }
}

impl ReadUtils for Bytes {
    #[inline]
    fn require(&self, n: usize, name: &'static str) -> Result<(), MrtError> {
        if self.remaining() >= n {
            return Ok(());
        }
        Err(MrtError::eof(name, n, self.remaining()))
    }

    #[inline]
    fn read_u8(&mut self) -> Result<u8, MrtError> {
        self.require(1, "u8")?;
        Ok(self.get_u8())
    }

    #[inline]
    fn read_u16(&mut self) -> Result<u16, MrtError> {
        self.require(2, "u16")?;
        Ok(self.get_u16())
    }

    #[inline]
    fn read_u32(&mut self) -> Result<u32, MrtError> {
        self.require(4, "u32")?;
        Ok(self.get_u32())
    }

    fn read_n_bytes(&mut self, n: usize, name: &'static str) -> Result<Bytes, MrtError> {
        self.require(n, name)?;
        Ok(self.split_to(n))
    }

    fn read_ipv4_address(&mut self) -> Result<Ipv4Addr, MrtError> {
        self.require(4, "IPv4 address")?;
        Ok(Ipv4Addr::from(self.get_u32()))
    }

    fn read_ipv6_address(&mut self) -> Result<Ipv6Addr, MrtError> {
        self.require(16, "IPv6 address")?;
        let mut buffer = [0u8; 16];
        self.copy_to_slice(&mut buffer);
        Ok(Ipv6Addr::from(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_primitives() {
        let mut data = Bytes::from_static(&[0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x03]);
        assert_eq!(data.read_u8().unwrap(), 1);
        assert_eq!(data.read_u16().unwrap(), 2);
        assert_eq!(data.read_u32().unwrap(), 3);
        assert!(matches!(
            data.read_u8(),
            Err(MrtError::Truncated { found: 0, .. })
        ));
    }

    #[test]
    fn test_read_addresses() {
        let mut data = Bytes::from_static(&[192, 0, 2, 1]);
        assert_eq!(
            data.read_address(Afi::Ipv4).unwrap(),
            "192.0.2.1".parse::<IpAddr>().unwrap()
        );

        let mut data = Bytes::from_static(&[
            0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1,
        ]);
        assert_eq!(
            data.read_address(Afi::Ipv6).unwrap(),
            "2001:db8::1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_read_asn_widening() {
        let mut data = Bytes::from_static(&[0xfd, 0xe8]);
        assert_eq!(data.read_asn(AsnLength::Bits16).unwrap(), 65000);

        let mut data = Bytes::from_static(&[0x00, 0x03, 0x0d, 0x40]);
        assert_eq!(data.read_asn(AsnLength::Bits32).unwrap(), 200_000);
    }

    #[test]
    fn test_read_afi_invalid() {
        let mut data = Bytes::from_static(&[0x00, 0x07]);
        assert!(matches!(data.read_afi(), Err(MrtError::InvalidAfi(7))));
    }
}
