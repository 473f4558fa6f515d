use std::thread;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use indicatif::{ProgressBar, ProgressStyle};
use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use tracing::{debug, info, warn};
use url::Url;

use crate::http::HttpClient;
use crate::source::Source;
use crate::target::Target;

pub const FEED_ENDPOINT: &str = "https://export.arxiv.org/api/query";
pub const FULLTEXT_BASE: &str = "https://arxiv.org/html/";

/// One `<entry>` of the Atom feed, before normalisation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArxivEntry {
    /// Abstract page URL, e.g. `http://arxiv.org/abs/2503.01234v1`.
    pub id: String,
    pub title: String,
    pub summary: String,
    /// ISO-8601 timestamp.
    pub published: String,
    pub authors: Vec<ArxivAuthor>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArxivAuthor {
    pub name: String,
    pub affiliations: Vec<String>,
}

impl ArxivEntry {
    /// Versioned ID taken from the abstract URL.
    pub fn short_id(&self) -> &str {
        self.id
            .rsplit_once("/abs/")
            .map_or(self.id.as_str(), |(_, id)| id)
    }

    pub fn published_date(&self) -> Option<NaiveDate> {
        self.published
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    }
}

#[derive(Clone, Debug)]
pub struct ArxivSettings {
    pub categories: Vec<String>,
    /// How far back the feed query reaches.
    pub lookback_days: u64,
    /// Entries at most this old get a full-text check.
    pub fulltext_days: u64,
    pub max_results: usize,
    /// Pause between consecutive requests to the same host.
    pub request_delay: Duration,
}

impl Default for ArxivSettings {
    fn default() -> Self {
        ArxivSettings {
            categories: vec!["cs.AI".into(), "cs.LG".into()],
            lookback_days: 30,
            fulltext_days: 7,
            max_results: 200,
            request_delay: Duration::from_secs(3),
        }
    }
}

/// Category and date filtered query against the public preprint API.
pub struct ArxivSource {
    http: HttpClient,
    settings: ArxivSettings,
    today: NaiveDate,
}

impl ArxivSource {
    pub fn new(http: HttpClient, settings: ArxivSettings, today: NaiveDate) -> Self {
        ArxivSource {
            http,
            settings,
            today,
        }
    }

    fn fulltext_mentions(&self, entry: &ArxivEntry, target: &Target) -> bool {
        let url = match Url::parse(FULLTEXT_BASE).and_then(|b| b.join(entry.short_id())) {
            Ok(u) => u,
            Err(e) => {
                warn!(id = entry.short_id(), error = %e, "bad full-text URL");
                return false;
            }
        };
        match self.http.get_text(&url) {
            Ok(body) => target.mentioned_in(&body),
            Err(e) => {
                debug!(id = entry.short_id(), error = %e, "full text unavailable");
                false
            }
        }
    }
}

impl Source for ArxivSource {
    type Record = ArxivEntry;

    fn name(&self) -> &'static str {
        "arxiv"
    }

    fn fetch(&self, target: &Target) -> Vec<ArxivEntry> {
        let from = self
            .today
            .checked_sub_days(Days::new(self.settings.lookback_days))
            .unwrap_or(self.today);
        let url = match feed_url(&self.settings.categories, from, self.today, self.settings.max_results)
        {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "could not build feed query");
                return Vec::new();
            }
        };

        info!(%from, to = %self.today, categories = ?self.settings.categories, "querying arXiv feed");
        let entries = match self.http.get_text(&url) {
            Ok(xml) => match parse_feed(&xml) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(error = %e, "unreadable arXiv feed");
                    return Vec::new();
                }
            },
            Err(e) => {
                warn!(error = %e, "arXiv feed request failed");
                return Vec::new();
            }
        };
        info!(count = entries.len(), "arXiv feed entries");

        let cutoff = self
            .today
            .checked_sub_days(Days::new(self.settings.fulltext_days))
            .unwrap_or(self.today);
        let bar = ProgressBar::new(0).with_style(
            ProgressStyle::with_template("{spinner} checking full text {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        let mut checked = 0;
        let citers = select_citers(entries, target, cutoff, |entry| {
            if checked > 0 {
                thread::sleep(self.settings.request_delay);
            }
            checked += 1;
            bar.inc_length(1);
            let hit = self.fulltext_mentions(entry, target);
            bar.inc(1);
            hit
        });
        bar.finish_and_clear();
        info!(citers = citers.len(), fulltext_checks = checked, "arXiv citers selected");
        citers
    }
}

pub fn feed_url(
    categories: &[String],
    from: NaiveDate,
    to: NaiveDate,
    max_results: usize,
) -> Result<Url, url::ParseError> {
    let window = format!(
        "submittedDate:[{}0000 TO {}2359]",
        from.format("%Y%m%d"),
        to.format("%Y%m%d")
    );
    let query = if categories.is_empty() {
        window
    } else {
        let cats = categories
            .iter()
            .map(|c| format!("cat:{c}"))
            .collect::<Vec<_>>()
            .join(" OR ");
        format!("({cats}) AND {window}")
    };

    let mut url = Url::parse(FEED_ENDPOINT)?;
    url.query_pairs_mut()
        .append_pair("search_query", &query)
        .append_pair("start", "0")
        .append_pair("max_results", &max_results.to_string())
        .append_pair("sortBy", "submittedDate")
        .append_pair("sortOrder", "descending");
    Ok(url)
}

/// Keep entries whose title or abstract mention the target. Entries
/// published on or after `fulltext_cutoff` that don't are handed to
/// `fulltext` for a deeper look.
pub fn select_citers(
    entries: Vec<ArxivEntry>,
    target: &Target,
    fulltext_cutoff: NaiveDate,
    mut fulltext: impl FnMut(&ArxivEntry) -> bool,
) -> Vec<ArxivEntry> {
    entries
        .into_iter()
        .filter(|e| {
            if target.mentioned_in(&e.title) || target.mentioned_in(&e.summary) {
                return true;
            }
            e.published_date().is_some_and(|d| d >= fulltext_cutoff) && fulltext(e)
        })
        .collect()
}

fn is_local(name: &[u8], target: &str) -> bool {
    // Compare local name ignoring namespace prefixes.
    match name.iter().rposition(|&b| b == b':') {
        Some(pos) => &name[pos + 1..] == target.as_bytes(),
        None => name == target.as_bytes(),
    }
}

/// Parse every `<entry>` of an Atom feed.
pub fn parse_feed(xml: &str) -> anyhow::Result<Vec<ArxivEntry>> {
    let mut reader = Reader::from_str(xml);

    let mut entries = Vec::new();
    let mut current: Option<ArxivEntry> = None;
    let mut author: Option<ArxivAuthor> = None;
    let mut text = String::new();

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let name = e.name();
                if is_local(name.as_ref(), "entry") {
                    current = Some(ArxivEntry::default());
                } else if current.is_some() && is_local(name.as_ref(), "author") {
                    author = Some(ArxivAuthor::default());
                }
                text.clear();
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                let name = name.as_ref();
                let value = text.trim().to_string();
                if is_local(name, "entry") {
                    entries.extend(current.take());
                } else if let Some(entry) = current.as_mut() {
                    if is_local(name, "author") {
                        entry.authors.extend(author.take());
                    } else if let Some(a) = author.as_mut() {
                        if is_local(name, "name") {
                            a.name = value;
                        } else if is_local(name, "affiliation") && !value.is_empty() {
                            a.affiliations.push(value);
                        }
                    } else if is_local(name, "id") {
                        entry.id = value;
                    } else if is_local(name, "title") {
                        entry.title = value;
                    } else if is_local(name, "summary") {
                        entry.summary = value;
                    } else if is_local(name, "published") {
                        entry.published = value;
                    }
                }
                text.clear();
            }
            Ok(Event::Text(t)) => {
                text.push_str(&String::from_utf8_lossy(t.as_ref()));
            }
            Ok(Event::CData(t)) => {
                text.push_str(&String::from_utf8_lossy(t.as_ref()));
            }
            Ok(Event::GeneralRef(r)) => {
                let name = String::from_utf8_lossy(r.as_ref()).to_string();
                match resolve_reference(&name) {
                    Some(resolved) => text.push_str(&resolved),
                    None => {
                        text.push('&');
                        text.push_str(&name);
                        text.push(';');
                    }
                }
            }
            Err(e) => return Err(anyhow::anyhow!("XML parse error: {e}")),
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

fn resolve_reference(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    resolve_predefined_entity(name).map(str::to_string)
}
