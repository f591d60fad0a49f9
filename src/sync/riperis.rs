//! RIPE RIS mirror backend.
//!
//! Layout: <https://data.ris.ripe.net/> has one directory per collector
//! (`rrc00/` ... `rrc26/`); each collector has monthly `YYYY.MM/`
//! directories holding `bview.YYYYMMDD.HHMM.gz` full dumps and
//! `updates.YYYYMMDD.HHMM.gz` incremental archives.

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use crate::error::SyncError;
use crate::models::MrtFileName;
use crate::sync::common::{extract_links, fetch_index};
use crate::sync::RemoteFile;

pub const ROOT_URL: &str = "https://data.ris.ripe.net";

/// List the collectors available on the mirror.
pub async fn list_routers() -> Result<Vec<String>, SyncError> {
    let body = fetch_index(ROOT_URL)
        .await?
        .ok_or_else(|| SyncError::EmptyIndex(ROOT_URL.to_string()))?;

    let name_pattern = Regex::new(r"^(rrc\d{2})/$").expect("invalid pattern");
    let mut routers: Vec<String> = extract_links(&body)
        .iter()
        .filter_map(|link| name_pattern.captures(link))
        .map(|caps| caps[1].to_string())
        .collect();
    routers.sort();
    routers.dedup();

    if routers.is_empty() {
        return Err(SyncError::EmptyIndex(ROOT_URL.to_string()));
    }
    Ok(routers)
}

/// List the MRT files a collector published in one month.
pub async fn list_month(router: &str, month: NaiveDate) -> Result<Vec<RemoteFile>, SyncError> {
    let url = format!("{}/{}/{}", ROOT_URL, router, month.format("%Y.%m"));
    let Some(body) = fetch_index(&url).await? else {
        debug!("no listing for {} {}", router, month.format("%Y.%m"));
        return Ok(vec![]);
    };

    Ok(extract_links(&body)
        .iter()
        .filter_map(|link| {
            let meta = MrtFileName::parse(link)?;
            Some(RemoteFile {
                url: format!("{url}/{link}"),
                meta,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_name_pattern() {
        let pattern = Regex::new(r"^(rrc\d{2})/$").unwrap();
        assert_eq!(&pattern.captures("rrc00/").unwrap()[1], "rrc00");
        assert_eq!(&pattern.captures("rrc26/").unwrap()[1], "rrc26");
        assert!(pattern.captures("../").is_none());
        assert!(pattern.captures("rrc00.old/").is_none());
    }
}
