//! UPDATE archive replay.

use std::fs::File;
use std::io::BufReader;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::bmp;
use crate::error::ReplayError;
use crate::models::{BgpState, MrtBody, PeerKey, PeerRegistry};
use crate::parser::MrtReader;
use crate::replay::{malformed, Emitter, MessageKind};
use crate::sync::StagedFile;

/// Replay one UPDATES archive in file order.
///
/// Peers seen for the first time are announced with a Peer-Up before their
/// first Route-Monitoring message; BGP4MP state changes away from
/// Established become Peer-Down notifications (when enabled) and a later
/// return to Established re-announces the peer.
pub(crate) fn process(
    file: &StagedFile,
    registry: &mut PeerRegistry,
    emitter: &Emitter,
    emit_peer_down: bool,
    token: &CancellationToken,
) -> Result<(), ReplayError> {
    info!("replaying updates {}", file.meta);
    let mut reader = MrtReader::new(BufReader::new(File::open(&file.path)?));

    let mut forwarded = 0u64;
    loop {
        if token.is_cancelled() {
            return Ok(());
        }
        let record = match reader.next_record().map_err(|e| malformed(file, e))? {
            Some(record) => record,
            None => break,
        };
        let time = record.header.record_time();

        match record.body {
            MrtBody::Bgp4MpMessage(msg) => {
                let key = registry.canonical(PeerKey::from_bgp4mp(&msg));
                if !registry.is_announced(&key) {
                    emitter.send(
                        MessageKind::PeerUp(key),
                        bmp::peer_up(&key, registry.local_bgp_id(), time),
                    )?;
                    registry.mark_announced(key);
                }
                emitter.send(
                    MessageKind::RouteMonitoring,
                    bmp::route_monitoring(&key, time, &msg.bgp_message),
                )?;
                registry.record_forwarded(&key, record.header.timestamp);
                forwarded += 1;
            }
            MrtBody::Bgp4MpStateChange(change) => {
                let key = registry.canonical(PeerKey::from_state_change(&change));
                debug!(
                    "peer {} transitioned {:?} -> {:?}",
                    change.peer_address, change.old_state, change.new_state
                );
                if change.new_state == BgpState::Established {
                    if registry.is_downed(&key) {
                        emitter.send(
                            MessageKind::PeerUp(key),
                            bmp::peer_up(&key, registry.local_bgp_id(), time),
                        )?;
                        registry.mark_announced(key);
                    }
                } else if emit_peer_down && registry.is_announced(&key) {
                    emitter.send(MessageKind::PeerDown(key), bmp::peer_down(&key, time))?;
                    registry.mark_down(&key);
                }
            }
            MrtBody::PeerIndexTable(_) | MrtBody::RibEntries(_) => {
                trace!("ignoring table dump record inside updates {}", file.meta);
            }
            MrtBody::Unsupported => {
                trace!("skipping unsupported record in {}", file.meta);
            }
        }
    }

    info!("replayed {} messages from {}", forwarded, file.meta);
    Ok(())
}
