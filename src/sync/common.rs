//! HTTP fetching, index-page link extraction, and archive decompression.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use futures::StreamExt;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::SyncError;

/// How a remote archive is compressed, derived from its URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Bzip2,
    None,
}

impl Compression {
    pub fn from_url(url: &str) -> Compression {
        if url.ends_with(".gz") {
            Compression::Gzip
        } else if url.ends_with(".bz2") {
            Compression::Bzip2
        } else {
            Compression::None
        }
    }
}

/// Fetch a directory index page; a missing directory (404) is not an error,
/// mirrors simply have no data for that month yet.
pub async fn fetch_index(url: &str) -> Result<Option<String>, SyncError> {
    debug!("fetching index {}", url);
    let response = reqwest::get(url).await?;
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let body = response.error_for_status()?.text().await?;
    Ok(Some(body))
}

/// Extract the `href` targets of all anchors on an index page. Works for
/// both the table-style and the pre-style listings the mirrors serve.
pub fn extract_links(body: &str) -> Vec<String> {
    let fragment = Html::parse_document(body);
    let link_selector = Selector::parse("a").expect("invalid selector");
    fragment
        .select(&link_selector)
        .filter_map(|elem| elem.value().attr("href"))
        .map(|href| href.to_string())
        .collect()
}

/// Download a remote file to disk, retrying once on transport error.
pub async fn download_with_retry(url: &str, dest: &Path) -> Result<(), SyncError> {
    match download(url, dest).await {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!("download of {} failed ({}), retrying once", url, e);
            download(url, dest).await
        }
    }
}

async fn download(url: &str, dest: &Path) -> Result<(), SyncError> {
    let response = reqwest::get(url).await?.error_for_status()?;
    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}

/// Decompress a downloaded archive into `dest`. Returns the number of bytes
/// written.
pub fn decompress(src: &Path, dest: &Path, compression: Compression) -> Result<u64, SyncError> {
    let input = BufReader::new(File::open(src)?);
    let mut output = BufWriter::new(File::create(dest)?);
    let written = match compression {
        Compression::Gzip => io::copy(&mut GzDecoder::new(input), &mut output)?,
        Compression::Bzip2 => io::copy(&mut BzDecoder::new(input), &mut output)?,
        Compression::None => io::copy(&mut { input }, &mut output)?,
    };
    Ok(written)
}
