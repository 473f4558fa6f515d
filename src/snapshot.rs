//! The JSON document the dashboard reads.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::paper::Paper;
use crate::stats::{Statistics, TimelinePoint};
use crate::target::Target;

pub const FALLBACK_ERROR: &str =
    "Unable to fetch citation data. Please check API key and try again.";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub last_updated: String,
    pub target_paper: String,
    pub arxiv_id: String,
    pub total_citations: usize,
    pub h_index: usize,
    pub recent_citations: usize,
    #[serde(with = "rate")]
    pub avg_citations_per_month: f64,
    pub timeline: Vec<TimelinePoint>,
    /// Newest first.
    pub papers: Vec<Paper>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Snapshot {
    pub fn new(target: &Target, stats: &Statistics, papers: Vec<Paper>, now: DateTime<Utc>) -> Self {
        Snapshot {
            last_updated: now.format(TIMESTAMP_FORMAT).to_string(),
            target_paper: target.url.clone(),
            arxiv_id: target.arxiv_id.clone(),
            total_citations: stats.total,
            h_index: stats.h_index,
            recent_citations: stats.recent,
            avg_citations_per_month: stats.avg_per_month,
            timeline: stats.timeline.clone(),
            papers,
            error: None,
        }
    }

    /// Zeroed statistics, no papers, and an explanation in `error`.
    pub fn fallback(target: &Target, reason: Option<&str>, now: DateTime<Utc>) -> Self {
        Snapshot {
            error: Some(reason.unwrap_or(FALLBACK_ERROR).to_string()),
            ..Snapshot::new(target, &Statistics::default(), Vec::new(), now)
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }

    /// Recover the statistics block, e.g. to check it against the papers.
    pub fn statistics(&self) -> Statistics {
        Statistics {
            total: self.total_citations,
            h_index: self.h_index,
            recent: self.recent_citations,
            avg_per_month: self.avg_citations_per_month,
            timeline: self.timeline.clone(),
        }
    }

    /// Day the snapshot was taken, from `last_updated`.
    pub fn run_date(&self) -> Option<NaiveDate> {
        NaiveDateTime::parse_from_str(&self.last_updated, TIMESTAMP_FORMAT)
            .ok()
            .map(|t| t.date())
    }

    /// Replace `path` in one step. On failure the previous file is untouched.
    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize snapshot")?;
        write_atomic(path, json.as_bytes())
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        info!(
            path = %path.display(),
            papers = self.papers.len(),
            fallback = self.is_fallback(),
            "snapshot written"
        );
        Ok(())
    }

    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a valid snapshot", path.display()))
    }
}

/// Write through a temp file in the destination directory, then rename.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("cannot create temp file in {}", dir.display()))?;
    tmp.write_all(contents)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// `avg_citations_per_month` is a two-decimal string on the wire; older
/// files may carry a plain number.
mod rate {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    use crate::stats::format_rate;

    pub fn serialize<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_rate(*value))
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Number(n) => Ok(n),
            Raw::Text(s) => s.trim().parse().map_err(D::Error::custom),
        }
    }
}
