//! Replay processors: staged MRT files in, BMP messages out.
//!
//! The processors run on a blocking thread (file decoding is synchronous
//! I/O) and bridge into the async world through the bounded tokio channels:
//! `blocking_recv` on the file channel, `blocking_send` on the message queue.
//! A full queue therefore blocks the decoder, which is exactly the
//! backpressure the session writer needs.

pub mod rib;
pub mod updates;

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bmp::router_bgp_id;
use crate::error::{MrtError, ReplayError};
use crate::models::{MrtFileKind, PeerKey, PeerRegistry};
use crate::sync::StagedFile;

/// Tag carried next to the encoded bytes so the session writer can cache
/// what it must re-announce after a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Initiation,
    PeerUp(PeerKey),
    RouteMonitoring,
    PeerDown(PeerKey),
}

/// One wire-ready BMP message on its way to the writer.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub kind: MessageKind,
    pub bytes: Bytes,
}

/// Sending half of the bounded message queue.
pub(crate) struct Emitter {
    out: mpsc::Sender<OutboundMessage>,
}

impl Emitter {
    pub(crate) fn send(&self, kind: MessageKind, bytes: Bytes) -> Result<(), ReplayError> {
        self.out
            .blocking_send(OutboundMessage { kind, bytes })
            .map_err(|_| ReplayError::QueueClosed)
    }
}

/// Drives the RIB processor once, then the UPDATE processor for every
/// subsequent file.
pub struct Replay {
    files: mpsc::Receiver<StagedFile>,
    emitter: Emitter,
    router: String,
    processed_dir: PathBuf,
    peer_up_delay: Duration,
    emit_peer_down: bool,
    token: CancellationToken,
}

impl Replay {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        files: mpsc::Receiver<StagedFile>,
        out: mpsc::Sender<OutboundMessage>,
        router: &str,
        processed_dir: PathBuf,
        peer_up_delay: Duration,
        emit_peer_down: bool,
        token: CancellationToken,
    ) -> Self {
        Replay {
            files,
            emitter: Emitter { out },
            router: router.to_string(),
            processed_dir,
            peer_up_delay,
            emit_peer_down,
            token,
        }
    }

    /// Blocking entry point; run this under `spawn_blocking`.
    pub fn run(mut self) -> Result<(), ReplayError> {
        std::fs::create_dir_all(&self.processed_dir)?;

        // UPDATES files can arrive ahead of the dump on a freshly scanned
        // master directory; hold them until the RIB has been replayed.
        let mut held_back: Vec<StagedFile> = vec![];
        let rib_file = loop {
            match self.files.blocking_recv() {
                None => return Ok(()),
                Some(file) if file.meta.kind == MrtFileKind::Rib => break file,
                Some(file) => {
                    info!("holding {} until a RIB dump arrives", file.meta);
                    held_back.push(file);
                }
            }
        };

        // Initiation goes out first, before anything names a peer, even if
        // the dump later turns out to be malformed
        let mut registry = PeerRegistry::new(router_bgp_id(&self.router));
        if self
            .emitter
            .send(MessageKind::Initiation, crate::bmp::initiation(&self.router))
            .is_err()
        {
            return Ok(());
        }

        let result = rib::process(
            &rib_file,
            &mut registry,
            &self.emitter,
            self.peer_up_delay,
            &self.token,
        );
        if !self.finish_file(&rib_file, result)? {
            return Ok(());
        }

        held_back.sort_by(|a, b| a.meta.cmp(&b.meta));
        for file in held_back {
            // leftovers predating the dump would replay out of order
            if file.meta < rib_file.meta {
                info!("skipping {}, older than the replayed RIB dump", file.meta);
                self.move_to_processed(&file, false)?;
                continue;
            }
            if !self.replay_updates(&file, &mut registry)? {
                return Ok(());
            }
        }

        while let Some(file) = self.files.blocking_recv() {
            if !self.replay_updates(&file, &mut registry)? {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Returns false when the pipeline is shutting down.
    fn replay_updates(
        &self,
        file: &StagedFile,
        registry: &mut PeerRegistry,
    ) -> Result<bool, ReplayError> {
        if self.token.is_cancelled() {
            return Ok(false);
        }
        if file.meta.kind != MrtFileKind::Updates {
            warn!("ignoring unexpected extra RIB dump {}", file.meta);
            self.move_to_processed(file, false)?;
            return Ok(true);
        }
        let result = updates::process(file, registry, &self.emitter, self.emit_peer_down, &self.token);
        self.finish_file(file, result)
    }

    /// Consume a processor result: move the file to the processed directory
    /// (with a `.bad` suffix when it was malformed) and decide whether the
    /// pipeline continues. Returns false on shutdown.
    fn finish_file(
        &self,
        file: &StagedFile,
        result: Result<(), ReplayError>,
    ) -> Result<bool, ReplayError> {
        match result {
            Ok(()) => {
                if self.token.is_cancelled() {
                    // interrupted mid-file: leave it in master for the next run
                    return Ok(false);
                }
                self.move_to_processed(file, false)?;
                Ok(true)
            }
            Err(ReplayError::Malformed { path, source }) => {
                warn!("malformed MRT data in {}: {}", path.display(), source);
                self.move_to_processed(file, true)?;
                Ok(true)
            }
            Err(ReplayError::QueueClosed) => {
                debug!("message queue closed, stopping replay");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn move_to_processed(&self, file: &StagedFile, bad: bool) -> Result<(), ReplayError> {
        let name = match bad {
            true => format!("{}.bad", file.meta.staged_name()),
            false => file.meta.staged_name().to_string(),
        };
        let dest = self.processed_dir.join(name);
        std::fs::rename(&file.path, &dest)?;
        debug!("moved {} to {}", file.path.display(), dest.display());
        Ok(())
    }
}

pub(crate) fn malformed(file: &StagedFile, source: MrtError) -> ReplayError {
    ReplayError::Malformed {
        path: file.path.clone(),
        source,
    }
}
