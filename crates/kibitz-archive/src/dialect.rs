use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Comment grammar used by an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveDialect {
    /// `<score>/<depth> <time>s, n=…, pv="<coordinate moves>"`
    Ccc,
    /// `d=…, wv=…, pv=<san moves>, …`
    Tcec,
}

impl ArchiveDialect {
    /// One check per game: a `Site` header mentioning TCEC selects the
    /// comma-separated key/value dialect.
    pub fn detect(headers: &BTreeMap<String, String>) -> Self {
        match headers.get("Site") {
            Some(site) if site.to_ascii_lowercase().contains("tcec") => ArchiveDialect::Tcec,
            _ => ArchiveDialect::Ccc,
        }
    }
}

pub(crate) fn segments(comment: &str) -> Vec<&str> {
    comment
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

pub(crate) fn is_book(segments: &[&str]) -> bool {
    segments
        .first()
        .map(|s| s.eq_ignore_ascii_case("book"))
        .unwrap_or(false)
}

pub(crate) fn field<'a>(segments: &[&'a str], key: &str) -> Option<&'a str> {
    segments.iter().find_map(|segment| {
        let (name, value) = segment.split_once('=')?;
        (name.trim() == key).then(|| value.trim())
    })
}

pub(crate) fn number<T: std::str::FromStr>(segments: &[&str], key: &str) -> Option<T> {
    field(segments, key).and_then(|v| v.parse().ok())
}

/// Archive counters use `null` or `-` for "not reported".
pub(crate) fn counter(segments: &[&str], key: &str) -> Option<u64> {
    match field(segments, key)? {
        "null" | "-" => None,
        value => value.parse().ok(),
    }
}

pub(crate) fn move_list(raw: &str) -> Vec<String> {
    raw.trim_matches('"')
        .split_whitespace()
        .map(String::from)
        .collect()
}
