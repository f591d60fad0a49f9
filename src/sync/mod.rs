//! Archive synchronization.
//!
//! Discovers per-router MRT files on a mirror (or in a local directory),
//! downloads and decompresses them into the master directory, and hands
//! fully staged files to the replay processors over a channel. The channel
//! replaces the cross-process lock of classic replay setups: a path is only
//! ever sent after the atomic rename, so the receiver can never observe a
//! file that is still being extended.

pub mod common;
pub mod riperis;
pub mod routeviews;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RouterDataConfig;
use crate::error::SyncError;
use crate::models::{MrtFileKind, MrtFileName};
use crate::sync::common::{decompress, download_with_retry, Compression};

const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// At most this many monthly indexes are listed per poll.
const MAX_MONTHS_PER_POLL: usize = 3;

/// Where MRT files for the configured router come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSource {
    /// Operator-provided files in the master directory, no network.
    Local,
    /// A remote archive mirror.
    Mirror(MirrorBackend),
}

/// The two supported mirror projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorBackend {
    RouteViews,
    RipeRis,
}

impl MirrorBackend {
    pub async fn list_routers(&self) -> Result<Vec<String>, SyncError> {
        match self {
            MirrorBackend::RouteViews => routeviews::list_routers().await,
            MirrorBackend::RipeRis => riperis::list_routers().await,
        }
    }

    async fn list_month(
        &self,
        router: &str,
        month: NaiveDate,
    ) -> Result<Vec<RemoteFile>, SyncError> {
        match self {
            MirrorBackend::RouteViews => routeviews::list_month(router, month).await,
            MirrorBackend::RipeRis => riperis::list_month(router, month).await,
        }
    }
}

/// One file visible on a mirror.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub meta: MrtFileName,
    pub url: String,
}

/// One fully staged file, ready to be decoded.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub path: PathBuf,
    pub meta: MrtFileName,
}

/// Continuously stages archive files for one router in chronological order.
pub struct Synchronizer {
    source: SyncSource,
    router: String,
    master_dir: PathBuf,
    ignore_abnormality: bool,
    interval_limit: i64,
    file_tx: mpsc::Sender<StagedFile>,
    last_staged: Option<MrtFileName>,
}

impl Synchronizer {
    pub fn new(
        source: SyncSource,
        router: &str,
        config: &RouterDataConfig,
        file_tx: mpsc::Sender<StagedFile>,
    ) -> Self {
        Synchronizer {
            source,
            router: router.to_string(),
            master_dir: config.master_dir(router),
            ignore_abnormality: config.ignore_timestamp_interval_abnormality,
            interval_limit: config.timestamp_interval_limit,
            file_tx,
            last_staged: None,
        }
    }

    pub async fn run(mut self, token: CancellationToken) -> Result<(), SyncError> {
        tokio::fs::create_dir_all(&self.master_dir).await?;
        info!(
            "synchronizing {} into {}",
            self.router,
            self.master_dir.display()
        );

        loop {
            if token.is_cancelled() {
                return Ok(());
            }

            let result = self.poll_once(&token).await;
            match result {
                Ok(()) => {}
                Err(SyncError::ChannelClosed) => return Ok(()),
                // transport and io errors are retried forever at poll cadence
                Err(e) => warn!("synchronizer poll failed: {}", e),
            }

            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                _ = sleep(POLL_INTERVAL) => {}
            }
        }
    }

    async fn poll_once(&mut self, token: &CancellationToken) -> Result<(), SyncError> {
        // files staged by a previous run, or dropped in by the operator
        self.emit_staged(token).await?;
        if let SyncSource::Mirror(backend) = self.source {
            self.poll_mirror(backend, token).await?;
        }
        Ok(())
    }

    /// Emit master-directory files not yet handed to the processors.
    async fn emit_staged(&mut self, token: &CancellationToken) -> Result<(), SyncError> {
        let mut staged = scan_master_dir(&self.master_dir)?;
        staged.sort();

        for meta in staged {
            if token.is_cancelled() {
                return Ok(());
            }
            if let Some(last) = &self.last_staged {
                if meta <= *last {
                    continue;
                }
            }
            if !self.continuity_admits(&meta) {
                return Ok(());
            }
            let path = self.master_dir.join(meta.staged_name());
            self.send(StagedFile { path, meta }).await?;
        }
        Ok(())
    }

    async fn poll_mirror(
        &mut self,
        backend: MirrorBackend,
        token: &CancellationToken,
    ) -> Result<(), SyncError> {
        let today = Utc::now().date_naive();
        let from = match &self.last_staged {
            Some(last) => last.timestamp.date(),
            None => previous_month(today),
        };

        let mut remote = vec![];
        let months = months_between(from, today);
        let skip = months.len().saturating_sub(MAX_MONTHS_PER_POLL);
        for month in months.into_iter().skip(skip) {
            remote.extend(backend.list_month(&self.router, month).await?);
        }
        remote.sort_by(|a, b| a.meta.cmp(&b.meta));
        remote.dedup_by(|a, b| a.meta == b.meta);

        let candidates: Vec<RemoteFile> = match &self.last_staged {
            // bootstrap: start from the most recent full dump available
            None => bootstrap_selection(remote),
            Some(last) => {
                let last = last.clone();
                remote.into_iter().filter(|f| f.meta > last).collect()
            }
        };

        for file in candidates {
            if token.is_cancelled() {
                return Ok(());
            }
            if !self.continuity_admits(&file.meta) {
                return Ok(());
            }
            let path = tokio::select! {
                result = self.stage(&file) => result?,
                _ = token.cancelled() => return Ok(()),
            };
            self.send(StagedFile {
                path,
                meta: file.meta,
            })
            .await?;
        }
        Ok(())
    }

    /// Enforce the timestamp continuity limit between consecutive UPDATES
    /// files. Returns false when the file must be withheld.
    fn continuity_admits(&self, next: &MrtFileName) -> bool {
        let Some(last) = &self.last_staged else {
            return true;
        };
        if last.kind != MrtFileKind::Updates || next.kind != MrtFileKind::Updates {
            return true;
        }
        let gap = last.gap_minutes(next);
        if gap <= self.interval_limit {
            return true;
        }

        let anomaly = SyncError::ContinuityAnomaly {
            previous: last.to_string(),
            next: next.to_string(),
            gap_minutes: gap,
        };
        if self.ignore_abnormality {
            warn!("{}; staging anyway", anomaly);
            return true;
        }
        error!("{}; withholding {} until an operator intervenes", anomaly, next);
        false
    }

    /// Download and decompress one remote file. The content is only visible
    /// under its final name after the rename, so a crash mid-write never
    /// leaves a half file for the processors.
    async fn stage(&self, file: &RemoteFile) -> Result<PathBuf, SyncError> {
        let staged_name = file.meta.staged_name();
        let final_path = self.master_dir.join(staged_name);
        let download_path = self.master_dir.join(format!("{staged_name}.download"));
        let partial_path = self.master_dir.join(format!("{staged_name}.partial"));

        info!("fetching {}", file.url);
        download_with_retry(&file.url, &download_path).await?;

        let compression = Compression::from_url(&file.url);
        let src = download_path.clone();
        let dst = partial_path.clone();
        let written = tokio::task::spawn_blocking(move || decompress(&src, &dst, compression))
            .await
            .expect("decompression task panicked")?;

        tokio::fs::remove_file(&download_path).await?;
        tokio::fs::rename(&partial_path, &final_path).await?;
        debug!("staged {} ({} bytes)", final_path.display(), written);
        Ok(final_path)
    }

    async fn send(&mut self, file: StagedFile) -> Result<(), SyncError> {
        self.last_staged = Some(file.meta.clone());
        self.file_tx
            .send(file)
            .await
            .map_err(|_| SyncError::ChannelClosed)
    }
}

/// Staged MRT files present in the master directory. `.partial` and
/// `.download` leftovers do not parse as archive names and are skipped.
fn scan_master_dir(dir: &Path) -> Result<Vec<MrtFileName>, SyncError> {
    let mut files = vec![];
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(meta) = name.to_str().and_then(MrtFileName::parse) {
            files.push(meta);
        }
    }
    Ok(files)
}

/// Pick the initial set of files: the most recent RIB dump plus every
/// UPDATES file from its capture time onward. Empty until a dump shows up.
fn bootstrap_selection(remote: Vec<RemoteFile>) -> Vec<RemoteFile> {
    let Some(rib) = remote
        .iter()
        .filter(|f| f.meta.kind == MrtFileKind::Rib)
        .max_by(|a, b| a.meta.cmp(&b.meta))
        .cloned()
    else {
        info!("no RIB dump visible on the mirror yet, waiting");
        return vec![];
    };

    let rib_meta = rib.meta.clone();
    let mut selection = vec![rib];
    selection.extend(
        remote
            .into_iter()
            .filter(|f| f.meta.kind == MrtFileKind::Updates && f.meta > rib_meta),
    );
    selection
}

fn months_between(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut months = vec![];
    let mut cursor = NaiveDate::from_ymd_opt(from.year(), from.month(), 1).unwrap();
    let end = NaiveDate::from_ymd_opt(to.year(), to.month(), 1).unwrap();
    while cursor <= end {
        months.push(cursor);
        cursor = match cursor.month() {
            12 => NaiveDate::from_ymd_opt(cursor.year() + 1, 1, 1).unwrap(),
            m => NaiveDate::from_ymd_opt(cursor.year(), m + 1, 1).unwrap(),
        };
    }
    months
}

fn previous_month(date: NaiveDate) -> NaiveDate {
    match date.month() {
        1 => NaiveDate::from_ymd_opt(date.year() - 1, 12, 1).unwrap(),
        m => NaiveDate::from_ymd_opt(date.year(), m - 1, 1).unwrap(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(name: &str) -> RemoteFile {
        RemoteFile {
            meta: MrtFileName::parse(name).unwrap(),
            url: format!("https://mirror.example.net/{name}"),
        }
    }

    fn synchronizer_with(
        limit: i64,
        ignore: bool,
        last: Option<&str>,
    ) -> (Synchronizer, mpsc::Receiver<StagedFile>) {
        let (tx, rx) = mpsc::channel(8);
        let config = RouterDataConfig {
            timestamp_interval_limit: limit,
            ignore_timestamp_interval_abnormality: ignore,
            ..Default::default()
        };
        let mut sync = Synchronizer::new(SyncSource::Local, "test-router", &config, tx);
        sync.last_staged = last.map(|name| MrtFileName::parse(name).unwrap());
        (sync, rx)
    }

    #[test]
    fn test_continuity_within_limit() {
        let (sync, _rx) = synchronizer_with(20, false, Some("updates.20221001.1200.bz2"));
        assert!(sync.continuity_admits(&MrtFileName::parse("updates.20221001.1215.bz2").unwrap()));
    }

    #[test]
    fn test_continuity_gap_withholds() {
        let (sync, _rx) = synchronizer_with(20, false, Some("updates.20221001.1215.bz2"));
        assert!(!sync.continuity_admits(&MrtFileName::parse("updates.20221001.1300.bz2").unwrap()));
    }

    #[test]
    fn test_continuity_gap_ignored_with_flag() {
        let (sync, _rx) = synchronizer_with(20, true, Some("updates.20221001.1215.bz2"));
        assert!(sync.continuity_admits(&MrtFileName::parse("updates.20221001.1300.bz2").unwrap()));
    }

    #[test]
    fn test_continuity_not_applied_after_rib() {
        let (sync, _rx) = synchronizer_with(20, false, Some("rib.20221001.1000.bz2"));
        assert!(sync.continuity_admits(&MrtFileName::parse("updates.20221001.1200.bz2").unwrap()));
    }

    #[test]
    fn test_bootstrap_selection() {
        let selection = bootstrap_selection(vec![
            remote("updates.20221001.0545.bz2"),
            remote("rib.20221001.0400.bz2"),
            remote("rib.20221001.0600.bz2"),
            remote("updates.20221001.0600.bz2"),
            remote("updates.20221001.0615.bz2"),
        ]);
        let names: Vec<String> = selection.iter().map(|f| f.meta.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "rib.20221001.0600",
                "updates.20221001.0600",
                "updates.20221001.0615"
            ]
        );
    }

    #[test]
    fn test_bootstrap_without_rib_waits() {
        assert!(bootstrap_selection(vec![remote("updates.20221001.0545.bz2")]).is_empty());
    }

    #[tokio::test]
    async fn test_emit_staged_sorted_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let config = RouterDataConfig {
            master_directory_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let router_dir = config.master_dir("test-router");
        std::fs::create_dir_all(&router_dir).unwrap();
        for name in [
            "updates.20221001.0015",
            "rib.20221001.0000",
            "updates.20221001.0000",
            "rib.20221001.0000.partial",
        ] {
            std::fs::write(router_dir.join(name), b"").unwrap();
        }

        let (tx, mut rx) = mpsc::channel(8);
        let mut sync = Synchronizer::new(SyncSource::Local, "test-router", &config, tx);
        let token = CancellationToken::new();
        sync.emit_staged(&token).await.unwrap();
        // a second scan must not re-emit anything
        sync.emit_staged(&token).await.unwrap();
        drop(sync);

        let mut received = vec![];
        while let Some(file) = rx.recv().await {
            received.push(file.meta.to_string());
        }
        assert_eq!(
            received,
            vec![
                "rib.20221001.0000",
                "updates.20221001.0000",
                "updates.20221001.0015"
            ]
        );
    }

    #[test]
    fn test_months_between() {
        let from = NaiveDate::from_ymd_opt(2022, 11, 20).unwrap();
        let to = NaiveDate::from_ymd_opt(2023, 1, 5).unwrap();
        let months = months_between(from, to);
        assert_eq!(
            months,
            vec![
                NaiveDate::from_ymd_opt(2022, 11, 1).unwrap(),
                NaiveDate::from_ymd_opt(2022, 12, 1).unwrap(),
                NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            ]
        );
    }

    #[test]
    fn test_previous_month_year_boundary() {
        let jan = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();
        assert_eq!(
            previous_month(jan),
            NaiveDate::from_ymd_opt(2022, 12, 1).unwrap()
        );
    }
}
