//! Peer identity and per-session peer state.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use bitflags::bitflags;

use crate::models::{Bgp4MpMessage, Bgp4MpStateChange, IndexedPeer};

bitflags! {
    /// Flags of a PEER_INDEX_TABLE entry.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct PeerIndexFlags: u8 {
        const ADDRESS_FAMILY_IPV6 = 0x1;
        const AS_SIZE_32BIT = 0x2;
    }
}

/// Identity of a monitored peer as carried in BMP per-peer headers.
///
/// Peer type is always "global instance" and the distinguisher always zero
/// for this replay, so the identity reduces to address, AS, and BGP
/// identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerKey {
    pub address: IpAddr,
    pub asn: u32,
    pub bgp_id: Ipv4Addr,
}

impl PeerKey {
    pub fn is_ipv6(&self) -> bool {
        self.address.is_ipv6()
    }

    pub fn from_indexed(peer: &IndexedPeer) -> Self {
        PeerKey {
            address: peer.address,
            asn: peer.asn,
            bgp_id: peer.bgp_id,
        }
    }

    /// BGP4MP records carry no peer BGP identifier. An IPv4 peer address
    /// doubles as the identifier; IPv6 peers get 0.0.0.0. When the peer was
    /// already seen in a PEER_INDEX_TABLE, [`PeerRegistry::canonical`]
    /// restores its real identifier.
    pub fn from_bgp4mp(msg: &Bgp4MpMessage) -> Self {
        Self::synthesize(msg.peer_address, msg.peer_asn)
    }

    pub fn from_state_change(msg: &Bgp4MpStateChange) -> Self {
        Self::synthesize(msg.peer_address, msg.peer_asn)
    }

    fn synthesize(address: IpAddr, asn: u32) -> Self {
        let bgp_id = match address {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
        };
        PeerKey {
            address,
            asn,
            bgp_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PeerState {
    announced: bool,
    last_timestamp: u32,
}

#[derive(Debug, Clone, Copy)]
struct PeerEntry {
    key: PeerKey,
    state: PeerState,
}

/// The set of peers observed in this replay session.
///
/// RIB dumps and BGP4MP records name the same peer with different amounts of
/// detail, so peers are tracked by `(address, AS)` and the registry keeps
/// the richest known identity: a peer announced from the PEER_INDEX_TABLE
/// keeps its real BGP identifier even when later records omit it.
///
/// Written by one processor at a time: the RIB processor builds it, then
/// hands it to the UPDATE processor by value. No locking involved.
#[derive(Debug)]
pub struct PeerRegistry {
    local_bgp_id: Ipv4Addr,
    peers: HashMap<(IpAddr, u32), PeerEntry>,
}

impl PeerRegistry {
    pub fn new(local_bgp_id: Ipv4Addr) -> Self {
        PeerRegistry {
            local_bgp_id,
            peers: HashMap::new(),
        }
    }

    /// The synthetic local BGP identifier used in sent-OPEN messages.
    pub fn local_bgp_id(&self) -> Ipv4Addr {
        self.local_bgp_id
    }

    /// The identity this session knows the peer by: the stored key when the
    /// peer has been seen before, the given one otherwise.
    pub fn canonical(&self, key: PeerKey) -> PeerKey {
        self.entry(&key).map(|e| e.key).unwrap_or(key)
    }

    pub fn is_announced(&self, key: &PeerKey) -> bool {
        self.entry(key).map(|e| e.state.announced).unwrap_or(false)
    }

    /// True if the peer was announced earlier in this session and has since
    /// been taken down by a state change.
    pub fn is_downed(&self, key: &PeerKey) -> bool {
        self.entry(key).map(|e| !e.state.announced).unwrap_or(false)
    }

    pub fn mark_announced(&mut self, key: PeerKey) {
        self.peers
            .entry((key.address, key.asn))
            .or_insert(PeerEntry {
                key,
                state: PeerState::default(),
            })
            .state
            .announced = true;
    }

    pub fn mark_down(&mut self, key: &PeerKey) {
        if let Some(entry) = self.peers.get_mut(&(key.address, key.asn)) {
            entry.state.announced = false;
        }
    }

    pub fn record_forwarded(&mut self, key: &PeerKey, timestamp: u32) {
        if let Some(entry) = self.peers.get_mut(&(key.address, key.asn)) {
            entry.state.last_timestamp = timestamp;
        }
    }

    pub fn last_forwarded(&self, key: &PeerKey) -> Option<u32> {
        self.entry(key).map(|e| e.state.last_timestamp)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    fn entry(&self, key: &PeerKey) -> Option<&PeerEntry> {
        self.peers.get(&(key.address, key.asn))
    }
}
