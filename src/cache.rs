//! On-disk cache of the last raw search API fetch.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::snapshot::write_atomic;

pub const DEFAULT_MAX_AGE_DAYS: i64 = 7;

/// File format: `{ "timestamp": <ISO-8601>, "arxiv_id": <id>, "papers": [...] }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub timestamp: String,
    /// Paper the records were fetched for. Entries without one are never used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,
    pub papers: Vec<Value>,
}

pub struct Cache {
    path: PathBuf,
    max_age: TimeDelta,
}

impl Cache {
    pub fn new(path: impl Into<PathBuf>, max_age_days: i64) -> Self {
        Cache {
            path: path.into(),
            max_age: TimeDelta::try_days(max_age_days).unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached records if the file exists, parses, was fetched for
    /// `arxiv_id`, and is younger than the freshness window at `now`. Any
    /// problem reads as "no cache".
    pub fn load(&self, arxiv_id: &str, now: DateTime<Utc>) -> Option<Vec<Value>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no cache file");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable cache, ignoring");
                return None;
            }
        };
        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt cache, ignoring");
                return None;
            }
        };
        if entry.arxiv_id.as_deref() != Some(arxiv_id) {
            info!(
                cached = ?entry.arxiv_id,
                wanted = arxiv_id,
                "cache belongs to another paper, ignoring"
            );
            return None;
        }
        let Some(stamp) = parse_timestamp(&entry.timestamp) else {
            warn!(timestamp = %entry.timestamp, "cache timestamp unreadable, ignoring");
            return None;
        };

        let age = now.signed_duration_since(stamp);
        if age < self.max_age {
            info!(
                records = entry.papers.len(),
                age_hours = age.num_hours(),
                "using cached search results"
            );
            Some(entry.papers)
        } else {
            info!(age_days = age.num_days(), "cache expired");
            None
        }
    }

    pub fn save(&self, arxiv_id: &str, records: &[Value], now: DateTime<Utc>) -> anyhow::Result<()> {
        let entry = CacheEntry {
            timestamp: now.to_rfc3339(),
            arxiv_id: Some(arxiv_id.to_string()),
            papers: records.to_vec(),
        };
        let json = serde_json::to_string_pretty(&entry)?;
        write_atomic(&self.path, json.as_bytes())
            .with_context(|| format!("failed to write cache {}", self.path.display()))?;
        debug!(path = %self.path.display(), records = records.len(), "cache saved");
        Ok(())
    }
}

/// RFC 3339, or a naive ISO-8601 timestamp taken as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const ID: &str = "2502.13138";

    fn at(days: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + TimeDelta::days(days)
    }

    #[test]
    fn honoured_within_window_and_bypassed_after() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(dir.path().join("cache.json"), DEFAULT_MAX_AGE_DAYS);
        let records = vec![json!({"title": "A"}), json!({"title": "B"})];
        cache.save(ID, &records, at(0)).unwrap();

        assert_eq!(cache.load(ID, at(6)), Some(records));
        assert_eq!(cache.load(ID, at(8)), None);
    }

    #[test]
    fn missing_and_corrupt_files_are_no_cache() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(dir.path().join("cache.json"), 7);
        assert_eq!(cache.load(ID, at(0)), None);

        fs::write(cache.path(), "{not json").unwrap();
        assert_eq!(cache.load(ID, at(0)), None);

        fs::write(cache.path(), r#"{"papers": []}"#).unwrap();
        assert_eq!(cache.load(ID, at(0)), None);

        fs::write(cache.path(), r#"{"timestamp": "yesterday", "arxiv_id": "2502.13138", "papers": []}"#).unwrap();
        assert_eq!(cache.load(ID, at(0)), None);
    }

    #[test]
    fn naive_timestamps_are_read_as_utc() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(dir.path().join("cache.json"), 7);
        fs::write(
            cache.path(),
            r#"{"timestamp": "2025-03-01T10:30:00.123456", "arxiv_id": "2502.13138", "papers": [{"title": "x"}]}"#,
        )
        .unwrap();
        assert_eq!(cache.load(ID, at(1)).map(|p| p.len()), Some(1));
    }

    #[test]
    fn entries_for_another_paper_are_ignored() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(dir.path().join("cache.json"), 7);
        cache.save(ID, &[json!({"title": "A"})], at(0)).unwrap();
        assert_eq!(cache.load("1810.04805", at(1)), None);
        assert!(cache.load(ID, at(1)).is_some());

        // Files written before the paper was recorded can't be trusted either.
        fs::write(
            cache.path(),
            r#"{"timestamp": "2025-03-01T12:00:00Z", "papers": [{"title": "A"}]}"#,
        )
        .unwrap();
        assert_eq!(cache.load(ID, at(1)), None);
    }
}
