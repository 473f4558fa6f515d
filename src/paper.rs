use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Sort key given to papers whose publication date could not be recovered.
pub const SENTINEL_DATE: &str = "1900-01-01";

pub fn sentinel_date() -> NaiveDate {
    NaiveDate::parse_from_str(SENTINEL_DATE, "%Y-%m-%d").unwrap_or(NaiveDate::MIN)
}

/// One normalised citing paper.
///
/// Field names on the wire follow the snapshot format consumed by the
/// dashboard, hence `journal` and `citations`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    pub title: String,
    pub authors: String,
    #[serde(rename = "journal")]
    pub venue: String,
    pub snippet: String,
    pub link: String,
    /// Human-readable date, or "Unknown".
    pub published_date: String,
    /// Ordering key; `SENTINEL_DATE` when unknown.
    pub published_date_sort: NaiveDate,
    /// How often this citing paper is itself cited.
    #[serde(rename = "citations")]
    pub citation_count: u64,
    /// Comma-joined affiliations, or "Unknown".
    pub institutions: String,
}

impl Paper {
    /// Deduplication key: two papers with the same identity are the same entity.
    pub fn identity(&self) -> String {
        normalize_title(&self.title)
    }

    pub fn has_known_date(&self) -> bool {
        self.published_date_sort != sentinel_date()
    }
}

/// Lowercase the title and collapse runs of whitespace to a single space.
pub fn normalize_title(title: &str) -> String {
    normalize_ws(title).to_lowercase()
}

pub fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

/// Most recent first. The sort is stable so equal dates keep their input order.
pub fn sort_newest_first(papers: &mut [Paper]) {
    papers.sort_by(|a, b| b.published_date_sort.cmp(&a.published_date_sort));
}

#[cfg(test)]
pub(crate) fn sample(title: &str, date: &str, citations: u64) -> Paper {
    Paper {
        title: title.to_string(),
        authors: "A Author".to_string(),
        venue: "arXiv".to_string(),
        snippet: String::new(),
        link: format!("https://example.org/{}", title.len()),
        published_date: date.to_string(),
        published_date_sort: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        citation_count: citations,
        institutions: "Unknown".to_string(),
    }
}
