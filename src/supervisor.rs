//! Pipeline supervision: startup order, shutdown propagation.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::replay::Replay;
use crate::sync::{SyncSource, Synchronizer};
use crate::writer::SessionWriter;

/// Staged-file handoff capacity. Small on purpose: the synchronizer has no
/// reason to run far ahead of the replay.
const FILE_CHANNEL_CAPACITY: usize = 16;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Run the full pipeline for one router until ctrl-c or a fatal worker
/// failure.
///
/// Startup order is writer, synchronizer, replay processors; they are tied
/// together by two bounded channels (staged files, outbound messages) and
/// one cancellation token. Workers observe the token at loop boundaries and
/// are woken out of blocking channel operations by the closure cascade:
/// cancelling stops the synchronizer, which closes the file channel, which
/// unwinds the replay, which closes the message queue, which releases the
/// writer.
pub async fn run(config: Config, router: &str, source: SyncSource) {
    let token = CancellationToken::new();
    let (message_tx, message_rx) = mpsc::channel(config.router_data.max_queue_size);
    let (file_tx, file_rx) = mpsc::channel(FILE_CHANNEL_CAPACITY);

    let writer = SessionWriter::new(config.collector(), message_rx, token.clone());
    let writer_handle = tokio::spawn(writer.run());

    let synchronizer = Synchronizer::new(source, router, &config.router_data, file_tx);
    let sync_token = token.clone();
    let sync_handle = tokio::spawn(async move {
        if let Err(e) = synchronizer.run(sync_token).await {
            error!("synchronizer stopped: {}", e);
        }
    });

    let replay = Replay::new(
        file_rx,
        message_tx,
        router,
        config.router_data.processed_dir(router),
        config.collector().peer_up_delay(),
        config.router_data.emit_peer_down,
        token.clone(),
    );
    let mut replay_handle = tokio::task::spawn_blocking(move || {
        if let Err(e) = replay.run() {
            error!("replay stopped: {}", e);
        }
    });

    let mut replay_done = false;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
        _ = &mut replay_handle => {
            replay_done = true;
            warn!("replay worker exited, shutting down");
        }
    }

    token.cancel();

    if let Err(e) = sync_handle.await {
        warn!("synchronizer task panicked: {}", e);
    }
    if !replay_done {
        if let Err(e) = replay_handle.await {
            warn!("replay task panicked: {}", e);
        }
    }
    // the writer drains the queue briefly and emits Termination
    match tokio::time::timeout(SHUTDOWN_GRACE, writer_handle).await {
        Ok(Err(e)) => warn!("session writer task panicked: {}", e),
        Err(_) => warn!("session writer did not stop within the grace period"),
        Ok(Ok(())) => {}
    }
    info!("pipeline stopped");
}
