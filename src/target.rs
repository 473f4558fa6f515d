use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::paper::Paper;

/// Tracked when no usable identifier is given.
pub const DEFAULT_ARXIV_ID: &str = "2502.13138";

/// The paper whose citations are being tracked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    /// URL recorded in the snapshot as `target_paper`.
    pub url: String,
    /// Canonical arXiv ID without version (e.g. "2502.13138").
    pub arxiv_id: String,
    /// Extra string that also counts as a mention, e.g. a project name.
    pub alias: Option<String>,
}

impl Target {
    /// Resolve a URL or identifier, falling back to the default paper when it
    /// can't be understood.
    pub fn resolve(input: &str, alias: Option<String>) -> Self {
        let alias = alias.map(|a| a.trim().to_string()).filter(|a| !a.is_empty());
        let input = input.trim();
        match parse_arxiv_id(input) {
            Some(id) => {
                debug!(id = id.canonical, version = ?id.version, "resolved target");
                let url = if input.starts_with("http://") || input.starts_with("https://") {
                    input.to_string()
                } else {
                    format!("https://arxiv.org/abs/{}", id.canonical)
                };
                Target {
                    url,
                    arxiv_id: id.canonical.to_string(),
                    alias,
                }
            }
            None => {
                warn!(input, fallback = DEFAULT_ARXIV_ID, "unrecognised target, using default");
                Target {
                    url: format!("https://arxiv.org/abs/{DEFAULT_ARXIV_ID}"),
                    arxiv_id: DEFAULT_ARXIV_ID.to_string(),
                    alias,
                }
            }
        }
    }

    /// Case-insensitive search for the identifier or alias in `text`.
    pub fn mentioned_in(&self, text: &str) -> bool {
        let haystack = text.to_lowercase();
        haystack.contains(&self.arxiv_id.to_lowercase())
            || self
                .alias
                .as_deref()
                .is_some_and(|a| haystack.contains(&a.to_lowercase()))
    }

    /// Whether `paper` is the tracked paper itself rather than a citer.
    pub fn is_self(&self, paper: &Paper) -> bool {
        paper.title.to_lowercase().contains(&self.arxiv_id) || paper.link.contains(&self.arxiv_id)
    }
}

/// An arXiv identifier split into its canonical ID and optional version.
#[derive(Debug, PartialEq, Eq)]
pub struct ArxivId<'a> {
    pub canonical: &'a str,
    pub version: Option<&'a str>,
}

/// Accepts bare IDs (new-style or legacy), `arXiv:` prefixed IDs, and
/// abs/pdf/html URLs on arxiv.org.
pub fn parse_arxiv_id(identifier: &str) -> Option<ArxivId<'_>> {
    let mut s = identifier.trim();

    if let Some(rest) = s
        .strip_prefix("arXiv:")
        .or_else(|| s.strip_prefix("arxiv:"))
    {
        s = rest.trim_start();
    }

    if let Some((host, path)) = s
        .strip_prefix("http://")
        .or_else(|| s.strip_prefix("https://"))
        .and_then(|rest| rest.split_once('/'))
    {
        if !host.to_ascii_lowercase().ends_with("arxiv.org") {
            return None;
        }
        let mut path = path.split(['?', '#']).next().unwrap_or(path);
        path = ["abs/", "pdf/", "html/"]
            .iter()
            .find_map(|p| path.strip_prefix(*p))?;
        s = path.strip_suffix(".pdf").unwrap_or(path);
    }

    static NEWSTYLE_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^(?P<core>\d{4}\.[0-9]{4,5})(?:v(?P<v>\d+))?$").unwrap());
    static LEGACY_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^(?P<core>[A-Za-z-]+(?:\.[A-Za-z-]+)?/[0-9]{7})(?:v(?P<v>\d+))?$").unwrap()
    });

    let s = s.trim_matches('/');
    let caps = NEWSTYLE_RE.captures(s).or_else(|| LEGACY_RE.captures(s))?;
    Some(ArxivId {
        canonical: caps.name("core")?.as_str(),
        version: caps.name("v").map(|m| m.as_str()),
    })
}
