//! BMP session writer: owns the collector connection.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bmp;
use crate::config::CollectorConfig;
use crate::models::PeerKey;
use crate::replay::{MessageKind, OutboundMessage};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// How long shutdown waits for the queue to drain before Termination.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Drains the bounded message queue into the collector socket.
///
/// Connection loss is survivable: the writer caches the Initiation message
/// and every transmitted Peer-Up, reconnects with bounded backoff, replays
/// the cached session state, and resumes from the next queued message. The
/// message in flight during a failed write is discarded, per-peer ordering
/// is preserved.
pub struct SessionWriter {
    host: String,
    port: u16,
    rx: mpsc::Receiver<OutboundMessage>,
    token: CancellationToken,
    initiation: Option<Bytes>,
    announced: Vec<(PeerKey, Bytes)>,
}

impl SessionWriter {
    pub fn new(
        collector: &CollectorConfig,
        rx: mpsc::Receiver<OutboundMessage>,
        token: CancellationToken,
    ) -> Self {
        SessionWriter {
            host: collector.host.clone(),
            port: collector.port,
            rx,
            token,
            initiation: None,
            announced: vec![],
        }
    }

    pub async fn run(mut self) {
        'session: loop {
            let Some(mut stream) = self.connect().await else {
                // cancelled while connecting
                return;
            };

            if let Err(e) = self.announce(&mut stream).await {
                warn!("collector write failed while re-announcing: {}", e);
                continue 'session;
            }

            loop {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => {
                        self.drain_and_terminate(&mut stream).await;
                        return;
                    }
                    message = self.rx.recv() => match message {
                        Some(message) => {
                            if let Err(e) = stream.write_all(&message.bytes).await {
                                // the in-flight message is discarded
                                warn!("collector write failed: {}; reconnecting", e);
                                continue 'session;
                            }
                            self.remember(&message);
                        }
                        None => {
                            debug!("all producers finished");
                            let _ = stream.write_all(&bmp::termination()).await;
                            let _ = stream.shutdown().await;
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Block until the collector accepts, with exponential backoff bounded
    /// at one minute. Returns `None` when cancelled.
    async fn connect(&self) -> Option<TcpStream> {
        let addr = format!("{}:{}", self.host, self.port);
        let mut backoff = INITIAL_BACKOFF;
        loop {
            let attempt = tokio::select! {
                _ = self.token.cancelled() => return None,
                result = TcpStream::connect(&addr) => result,
            };
            match attempt {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    info!("connected to collector {}", addr);
                    return Some(stream);
                }
                Err(e) => {
                    warn!(
                        "cannot connect to collector {}: {}; retrying in {:?}",
                        addr, e, backoff
                    );
                    tokio::select! {
                        _ = self.token.cancelled() => return None,
                        _ = sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    /// A freshly connected collector knows nothing about this session:
    /// replay Initiation and every Peer-Up transmitted so far before
    /// touching the queue again. On the very first connection the cache is
    /// empty and the Initiation arrives through the queue instead.
    async fn announce(&mut self, stream: &mut TcpStream) -> io::Result<()> {
        let Some(initiation) = &self.initiation else {
            return Ok(());
        };
        stream.write_all(initiation).await?;
        for (_, peer_up) in &self.announced {
            stream.write_all(peer_up).await?;
        }
        info!(
            "re-announced session state ({} peers) after reconnect",
            self.announced.len()
        );
        Ok(())
    }

    fn remember(&mut self, message: &OutboundMessage) {
        match message.kind {
            MessageKind::Initiation => self.initiation = Some(message.bytes.clone()),
            MessageKind::PeerUp(key) => {
                match self.announced.iter_mut().find(|(k, _)| *k == key) {
                    Some(slot) => slot.1 = message.bytes.clone(),
                    None => self.announced.push((key, message.bytes.clone())),
                }
            }
            MessageKind::PeerDown(key) => self.announced.retain(|(k, _)| *k != key),
            MessageKind::RouteMonitoring => {}
        }
    }

    /// Give producers a short grace period to flush, then close the session
    /// with a Termination message.
    async fn drain_and_terminate(&mut self, stream: &mut TcpStream) {
        let deadline = Instant::now() + DRAIN_GRACE;
        loop {
            match timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(message)) => {
                    if stream.write_all(&message.bytes).await.is_err() {
                        return;
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
        let _ = stream.write_all(&bmp::termination()).await;
        let _ = stream.shutdown().await;
        info!("session terminated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordTime;
    use std::net::Ipv4Addr;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn test_peer() -> PeerKey {
        PeerKey {
            address: "192.0.2.1".parse().unwrap(),
            asn: 65001,
            bgp_id: Ipv4Addr::new(10, 0, 0, 2),
        }
    }

    fn collector_config(port: u16) -> CollectorConfig {
        CollectorConfig {
            host: "127.0.0.1".to_string(),
            port,
            delay_after_init_and_peer_ups: 0,
        }
    }

    async fn read_bmp_message(stream: &mut TcpStream) -> Vec<u8> {
        let mut header = [0u8; 6];
        stream.read_exact(&mut header).await.unwrap();
        let total = u32::from_be_bytes(header[1..5].try_into().unwrap()) as usize;
        let mut message = header.to_vec();
        message.resize(total, 0);
        stream.read_exact(&mut message[6..]).await.unwrap();
        message
    }

    #[tokio::test]
    async fn test_messages_written_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (tx, rx) = mpsc::channel(16);
        let token = CancellationToken::new();
        let writer = SessionWriter::new(&collector_config(port), rx, token.clone());
        let handle = tokio::spawn(writer.run());

        let init = bmp::initiation("test-router");
        let peer_up = bmp::peer_up(&test_peer(), Ipv4Addr::new(1, 1, 1, 1), RecordTime::from_secs(1));
        let monitoring = bmp::route_monitoring(&test_peer(), RecordTime::from_secs(2), &[0xaa; 19]);

        tx.send(OutboundMessage {
            kind: MessageKind::Initiation,
            bytes: init.clone(),
        })
        .await
        .unwrap();
        tx.send(OutboundMessage {
            kind: MessageKind::PeerUp(test_peer()),
            bytes: peer_up.clone(),
        })
        .await
        .unwrap();
        tx.send(OutboundMessage {
            kind: MessageKind::RouteMonitoring,
            bytes: monitoring.clone(),
        })
        .await
        .unwrap();

        let (mut socket, _) = listener.accept().await.unwrap();
        assert_eq!(read_bmp_message(&mut socket).await, init.to_vec());
        assert_eq!(read_bmp_message(&mut socket).await, peer_up.to_vec());
        assert_eq!(read_bmp_message(&mut socket).await, monitoring.to_vec());

        // graceful shutdown sends a Termination message
        token.cancel();
        let termination = read_bmp_message(&mut socket).await;
        assert_eq!(termination[5], 5);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_replays_session_state() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (tx, rx) = mpsc::channel(64);
        let token = CancellationToken::new();
        let writer = SessionWriter::new(&collector_config(port), rx, token.clone());
        let handle = tokio::spawn(writer.run());

        let init = bmp::initiation("test-router");
        let peer_up = bmp::peer_up(&test_peer(), Ipv4Addr::new(1, 1, 1, 1), RecordTime::from_secs(1));

        tx.send(OutboundMessage {
            kind: MessageKind::Initiation,
            bytes: init.clone(),
        })
        .await
        .unwrap();
        tx.send(OutboundMessage {
            kind: MessageKind::PeerUp(test_peer()),
            bytes: peer_up.clone(),
        })
        .await
        .unwrap();

        let (mut socket, _) = listener.accept().await.unwrap();
        assert_eq!(read_bmp_message(&mut socket).await, init.to_vec());
        assert_eq!(read_bmp_message(&mut socket).await, peer_up.to_vec());

        // kill the connection mid-stream
        drop(socket);

        // keep feeding until the writer notices the dead socket and redials
        let monitoring = bmp::route_monitoring(&test_peer(), RecordTime::from_secs(3), &[0xbb; 19]);
        let feeder_tx = tx.clone();
        let feeder = tokio::spawn(async move {
            loop {
                if feeder_tx
                    .send(OutboundMessage {
                        kind: MessageKind::RouteMonitoring,
                        bytes: monitoring.clone(),
                    })
                    .await
                    .is_err()
                {
                    break;
                }
                sleep(Duration::from_millis(10)).await;
            }
        });

        // second connection must start with Initiation, then the Peer-Up
        let (mut socket, _) = listener.accept().await.unwrap();
        assert_eq!(read_bmp_message(&mut socket).await, init.to_vec());
        assert_eq!(read_bmp_message(&mut socket).await, peer_up.to_vec());

        token.cancel();
        feeder.abort();
        handle.await.unwrap();
    }
}
