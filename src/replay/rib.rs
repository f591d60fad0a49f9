//! RIB dump replay: Peer-Ups, then the full table.

use std::fs::File;
use std::io::BufReader;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bmp;
use crate::error::ReplayError;
use crate::models::{MrtBody, PeerKey, PeerRegistry, RecordTime};
use crate::parser::MrtReader;
use crate::replay::{malformed, Emitter, MessageKind};
use crate::sync::StagedFile;

/// Replay one RIB dump.
///
/// The PEER_INDEX_TABLE must be the first record of the file (RFC 6396).
/// After the Peer-Up burst the processor pauses briefly so the collector
/// can register the peers before the Route-Monitoring flood.
pub(crate) fn process(
    file: &StagedFile,
    registry: &mut PeerRegistry,
    emitter: &Emitter,
    peer_up_delay: Duration,
    token: &CancellationToken,
) -> Result<(), ReplayError> {
    info!("replaying RIB dump {}", file.meta);
    let mut reader = MrtReader::new(BufReader::new(File::open(&file.path)?));

    let (header, table) = match reader.next_record().map_err(|e| malformed(file, e))? {
        Some(record) => match record.body {
            MrtBody::PeerIndexTable(table) => (record.header, table),
            _ => {
                return Err(malformed(
                    file,
                    crate::error::MrtError::Malformed(
                        "RIB dump does not start with a PEER_INDEX_TABLE".to_string(),
                    ),
                ))
            }
        },
        None => {
            return Err(malformed(
                file,
                crate::error::MrtError::Malformed("empty RIB dump".to_string()),
            ))
        }
    };

    let table_time = header.record_time();
    for peer in &table.peers {
        let key = PeerKey::from_indexed(peer);
        emitter.send(
            MessageKind::PeerUp(key),
            bmp::peer_up(&key, registry.local_bgp_id(), table_time),
        )?;
        registry.mark_announced(key);
    }
    info!("announced {} peers from {}", table.peers.len(), file.meta);

    sleep_cancellable(peer_up_delay, token);

    let mut forwarded = 0u64;
    loop {
        if token.is_cancelled() {
            return Ok(());
        }
        let record = match reader.next_record().map_err(|e| malformed(file, e))? {
            Some(record) => record,
            None => break,
        };
        let MrtBody::RibEntries(rib) = record.body else {
            continue;
        };

        for entry in &rib.entries {
            let Some(peer) = table.get(entry.peer_index) else {
                warn!(
                    "RIB entry references unknown peer index {} in {}",
                    entry.peer_index, file.meta
                );
                continue;
            };
            let key = PeerKey::from_indexed(peer);
            let time = RecordTime::from_secs(entry.originated_time);
            let message = match bmp::route_monitoring_rib(
                &key,
                time,
                rib.afi,
                rib.prefix_len,
                &rib.prefix,
                &entry.attributes,
            ) {
                Ok(message) => message,
                // one unusable entry does not discard the rest of the file
                Err(e) => {
                    warn!("skipping RIB entry in {}: {}", file.meta, e);
                    continue;
                }
            };
            emitter.send(MessageKind::RouteMonitoring, message)?;
            registry.record_forwarded(&key, entry.originated_time);
            forwarded += 1;
        }
    }

    info!("replayed {} routes from {}", forwarded, file.meta);
    Ok(())
}

/// Sleep in short slices so shutdown is observed within a second.
fn sleep_cancellable(total: Duration, token: &CancellationToken) {
    let slice = Duration::from_millis(250);
    let mut remaining = total;
    while !remaining.is_zero() && !token.is_cancelled() {
        let step = remaining.min(slice);
        std::thread::sleep(step);
        remaining -= step;
    }
}
