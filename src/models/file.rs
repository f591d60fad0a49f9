//! Archive file names and their embedded timestamps.

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDateTime;
use regex::Regex;

/// What a staged MRT file contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MrtFileKind {
    /// A full table dump (`rib.*` on RouteViews, `bview.*` on RIPE RIS).
    Rib,
    /// An incremental update archive (`updates.*`).
    Updates,
}

/// An MRT archive file identified by its name.
///
/// Mirrors publish on fixed cadences with the capture time embedded in the
/// name (`updates.20221001.0015.bz2`). The compression suffix is dropped for
/// the staged name since files are decompressed while staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MrtFileName {
    pub kind: MrtFileKind,
    pub timestamp: NaiveDateTime,
    name: String,
}

impl MrtFileName {
    /// Parse a mirror or staged file name. Returns `None` for anything that
    /// is not an MRT archive (parent links, checksums, HTML noise).
    pub fn parse(file_name: &str) -> Option<MrtFileName> {
        let pattern = Regex::new(r"^(rib|bview|updates)\.(\d{8})\.(\d{4})(?:\.(gz|bz2))?$")
            .expect("invalid file name pattern");
        let caps = pattern.captures(file_name)?;

        let kind = match &caps[1] {
            "updates" => MrtFileKind::Updates,
            _ => MrtFileKind::Rib,
        };
        let time_str = format!("{}.{}", &caps[2], &caps[3]);
        let timestamp = NaiveDateTime::parse_from_str(&time_str, "%Y%m%d.%H%M").ok()?;

        let name = match caps.get(4) {
            Some(suffix) => file_name[..file_name.len() - suffix.as_str().len() - 1].to_string(),
            None => file_name.to_string(),
        };

        Some(MrtFileName {
            kind,
            timestamp,
            name,
        })
    }

    /// The name the file is staged under in the master directory, without
    /// any compression suffix.
    pub fn staged_name(&self) -> &str {
        &self.name
    }

    /// Minutes between this file and a later one.
    pub fn gap_minutes(&self, later: &MrtFileName) -> i64 {
        (later.timestamp - self.timestamp).num_minutes()
    }
}

impl fmt::Display for MrtFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl PartialOrd for MrtFileName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MrtFileName {
    /// Chronological order; at equal timestamps the RIB sorts before the
    /// UPDATES file so a dump is always replayed before the interval it
    /// opens.
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.kind.cmp(&other.kind))
            .then_with(|| self.name.cmp(&other.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_remote_names() {
        let rib = MrtFileName::parse("rib.20221001.0000.bz2").unwrap();
        assert_eq!(rib.kind, MrtFileKind::Rib);
        assert_eq!(rib.staged_name(), "rib.20221001.0000");

        let bview = MrtFileName::parse("bview.20221102.0800.gz").unwrap();
        assert_eq!(bview.kind, MrtFileKind::Rib);
        assert_eq!(bview.staged_name(), "bview.20221102.0800");

        let updates = MrtFileName::parse("updates.20221001.0015.bz2").unwrap();
        assert_eq!(updates.kind, MrtFileKind::Updates);
        assert_eq!(
            updates.timestamp,
            NaiveDateTime::parse_from_str("20221001.0015", "%Y%m%d.%H%M").unwrap()
        );
    }

    #[test]
    fn test_parse_staged_names() {
        let staged = MrtFileName::parse("updates.20221001.0015").unwrap();
        assert_eq!(staged.kind, MrtFileKind::Updates);
        assert_eq!(staged.staged_name(), "updates.20221001.0015");
    }

    #[test]
    fn test_parse_rejects_noise() {
        assert!(MrtFileName::parse("Parent Directory").is_none());
        assert!(MrtFileName::parse("updates.20221001.0015.bz2.md5").is_none());
        assert!(MrtFileName::parse("rib.2022.0000.bz2").is_none());
    }

    #[test]
    fn test_ordering_rib_before_updates() {
        let rib = MrtFileName::parse("rib.20221001.0000.bz2").unwrap();
        let updates = MrtFileName::parse("updates.20221001.0000.bz2").unwrap();
        let later = MrtFileName::parse("updates.20221001.0015.bz2").unwrap();

        let mut files = vec![later.clone(), updates.clone(), rib.clone()];
        files.sort();
        assert_eq!(files, vec![rib, updates, later]);
    }

    #[test]
    fn test_gap_minutes() {
        let first = MrtFileName::parse("updates.20221001.1215.bz2").unwrap();
        let second = MrtFileName::parse("updates.20221001.1300.bz2").unwrap();
        assert_eq!(first.gap_minutes(&second), 45);
    }
}
