//! Error types shared across the pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while decoding MRT records.
///
/// A record-level error never discards the rest of the pipeline: the replay
/// processors move the offending file aside with a `.bad` suffix and keep
/// going with the next file.
#[derive(Error, Debug)]
pub enum MrtError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("truncated {name}: expected {expected} bytes, found {found}")]
    Truncated {
        name: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("MRT message too large: {0} bytes")]
    MessageTooLarge(u32),

    #[error("invalid MRT header length for extended-timestamp record")]
    InvalidEtLength,

    #[error("invalid prefix length {0} for {1:?}")]
    InvalidPrefixLength(u8, crate::models::Afi),

    #[error("invalid address family {0}")]
    InvalidAfi(u16),

    #[error("invalid BGP state {0}")]
    InvalidBgpState(u16),

    #[error("{0}")]
    Malformed(String),
}

impl MrtError {
    #[cold]
    pub(crate) fn eof(name: &'static str, expected: usize, found: usize) -> Self {
        MrtError::Truncated {
            name,
            expected,
            found,
        }
    }
}

/// Errors raised by the archive synchronizer.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "timestamp continuity anomaly: {gap_minutes} minute gap between \
         {previous} and {next} exceeds the configured limit"
    )]
    ContinuityAnomaly {
        previous: String,
        next: String,
        gap_minutes: i64,
    },

    #[error("no routers found at {0}")]
    EmptyIndex(String),

    #[error("file channel closed")]
    ChannelClosed,
}

/// Errors raised by the replay processors.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("malformed MRT data in {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: MrtError,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("outbound message queue closed")]
    QueueClosed,
}

/// Configuration errors are fatal at startup and map to exit code 2.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("missing `collector` section in configuration")]
    MissingCollector,

    #[error("missing `collector.host` in configuration")]
    MissingCollectorHost,
}
