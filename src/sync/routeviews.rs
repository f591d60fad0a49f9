//! RouteViews mirror backend.
//!
//! Layout: <https://archive.routeviews.org/> has one directory per collector
//! (`route-views.amsix/`, ...; the historical `route-views2` collector lives
//! directly under `bgpdata/`). Each collector has monthly `YYYY.MM/RIBS/`
//! and `YYYY.MM/UPDATES/` subdirectories with `rib.YYYYMMDD.HHMM.bz2` and
//! `updates.YYYYMMDD.HHMM.bz2` files.

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use crate::error::SyncError;
use crate::models::MrtFileName;
use crate::sync::common::{extract_links, fetch_index};
use crate::sync::RemoteFile;

pub const ROOT_URL: &str = "https://archive.routeviews.org";

/// The collector reachable at the bare `bgpdata/` directory.
const DEFAULT_COLLECTOR: &str = "route-views2";

/// List the collectors available on the mirror.
pub async fn list_routers() -> Result<Vec<String>, SyncError> {
    let body = fetch_index(ROOT_URL)
        .await?
        .ok_or_else(|| SyncError::EmptyIndex(ROOT_URL.to_string()))?;

    let name_pattern = Regex::new(r"^(route-views[A-Za-z0-9.\-]*)/$").expect("invalid pattern");
    let mut routers: Vec<String> = extract_links(&body)
        .iter()
        .filter_map(|link| name_pattern.captures(link))
        .map(|caps| caps[1].to_string())
        .collect();
    routers.push(DEFAULT_COLLECTOR.to_string());
    routers.sort();
    routers.dedup();

    if routers.is_empty() {
        return Err(SyncError::EmptyIndex(ROOT_URL.to_string()));
    }
    Ok(routers)
}

fn base_url(router: &str) -> String {
    match router == DEFAULT_COLLECTOR {
        true => format!("{ROOT_URL}/bgpdata"),
        false => format!("{ROOT_URL}/{router}/bgpdata"),
    }
}

/// List the MRT files a collector published in one month.
pub async fn list_month(router: &str, month: NaiveDate) -> Result<Vec<RemoteFile>, SyncError> {
    let mut files = vec![];
    for subdir in ["RIBS", "UPDATES"] {
        let url = format!("{}/{}/{}", base_url(router), month.format("%Y.%m"), subdir);
        let Some(body) = fetch_index(&url).await? else {
            debug!("no {} listing for {} {}", subdir, router, month.format("%Y.%m"));
            continue;
        };
        for link in extract_links(&body) {
            if let Some(meta) = MrtFileName::parse(&link) {
                files.push(RemoteFile {
                    url: format!("{url}/{link}"),
                    meta,
                });
            }
        }
    }
    Ok(files)
}
