use std::thread;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::FetchError;
use crate::http::HttpClient;
use crate::source::Source;
use crate::target::Target;

pub const SEARCH_ENDPOINT: &str = "https://serpapi.com/search";

#[derive(Clone, Debug)]
pub struct ScholarSettings {
    pub max_results: usize,
    pub page_size: usize,
    /// Pause between page requests.
    pub page_delay: Duration,
    /// Latest publication year to include (`as_yhi`).
    pub year_ceiling: i32,
}

/// What one page request told us.
#[derive(Debug, PartialEq)]
pub enum Page {
    Results(Vec<Value>),
    Exhausted,
    Error(String),
}

/// How the citing papers are enumerated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Query {
    /// Everything the index links to the target's cited-by handle.
    Cites(String),
    /// Keyword search for papers mentioning the target.
    Mentions(String),
}

/// Client for the scholarly search API.
pub struct ScholarSource {
    http: HttpClient,
    api_key: String,
    settings: ScholarSettings,
}

impl ScholarSource {
    pub fn new(http: HttpClient, api_key: String, settings: ScholarSettings) -> Self {
        ScholarSource {
            http,
            api_key,
            settings,
        }
    }

    fn base_url(&self) -> Result<Url, FetchError> {
        let mut url =
            Url::parse(SEARCH_ENDPOINT).map_err(|e| FetchError::Request(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("engine", "google_scholar")
            .append_pair("api_key", &self.api_key)
            .append_pair("hl", "en");
        Ok(url)
    }

    pub(crate) fn lookup_url(&self, target: &Target) -> Result<Url, FetchError> {
        let mut url = self.base_url()?;
        url.query_pairs_mut()
            .append_pair("q", &format!("arxiv:{}", target.arxiv_id))
            .append_pair("num", "1");
        Ok(url)
    }

    pub(crate) fn page_url(&self, query: &Query, start: usize) -> Result<Url, FetchError> {
        let mut url = self.base_url()?;
        {
            let mut pairs = url.query_pairs_mut();
            match query {
                Query::Cites(id) => pairs.append_pair("cites", id),
                Query::Mentions(q) => pairs.append_pair("q", q),
            };
            pairs
                .append_pair("start", &start.to_string())
                .append_pair("num", &self.settings.page_size.to_string())
                .append_pair("as_sdt", "0,5")
                .append_pair("as_yhi", &self.settings.year_ceiling.to_string());
        }
        Ok(url)
    }

    /// Step one: find the target's cited-by handle.
    fn resolve_cites_id(&self, target: &Target) -> Option<String> {
        let response = self
            .lookup_url(target)
            .and_then(|url| self.http.get_json(&url));
        match response {
            Ok(v) => cites_id_from(&v),
            Err(e) => {
                warn!(error = %e, "could not look up cited-by handle");
                None
            }
        }
    }

    /// Step two: page through results until exhausted, an error, or the budget.
    fn paginate(&self, query: &Query, keep: impl Fn(&Value) -> bool) -> Vec<Value> {
        paginate(
            &self.settings,
            query,
            |q, start| self.page_url(q, start).and_then(|u| self.http.get_json(&u)),
            keep,
        )
    }
}

/// Walk result pages from `start=0` until a page comes back empty, the API
/// reports an error, a request fails, or `max_results` records are kept.
pub(crate) fn paginate(
    settings: &ScholarSettings,
    query: &Query,
    mut fetch_page: impl FnMut(&Query, usize) -> Result<Value, FetchError>,
    keep: impl Fn(&Value) -> bool,
) -> Vec<Value> {
    let page_size = settings.page_size.max(1);
    let mut records = Vec::new();
    let mut start = 0;

    while records.len() < settings.max_results {
        if start > 0 {
            thread::sleep(settings.page_delay);
        }
        info!(
            page = start / page_size + 1,
            start,
            end = start + page_size,
            "fetching citing papers"
        );

        let response = match fetch_page(query, start) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "failed to fetch data from the search API");
                break;
            }
        };
        let results = match read_page(response) {
            Page::Results(r) => r,
            Page::Exhausted => {
                info!("no more citing papers");
                break;
            }
            Page::Error(msg) => {
                error!(error = %FetchError::Api(msg), "search API refused the request");
                break;
            }
        };

        for r in results {
            if records.len() >= settings.max_results {
                break;
            }
            if keep(&r) {
                records.push(r);
            } else {
                debug!(title = ?r.get("title"), "dropped search result");
            }
        }
        start += page_size;
    }
    records
}

impl Source for ScholarSource {
    type Record = Value;

    fn name(&self) -> &'static str {
        "scholar"
    }

    fn fetch(&self, target: &Target) -> Vec<Value> {
        info!(
            arxiv_id = %target.arxiv_id,
            max = self.settings.max_results,
            "fetching citations"
        );
        match self.resolve_cites_id(target) {
            Some(id) => {
                info!(cites_id = %id, "found cited-by handle");
                self.paginate(&Query::Cites(id), |_| true)
            }
            None => {
                info!("no cited-by handle, falling back to keyword search");
                let q = format!("\"{0}\" OR \"arxiv:{0}\"", target.arxiv_id);
                self.paginate(&Query::Mentions(q), |r| mentions_target(r, target))
            }
        }
    }
}

/// `organic_results[0].inline_links.cited_by.cites_id`, as a string.
pub fn cites_id_from(response: &Value) -> Option<String> {
    match response.pointer("/organic_results/0/inline_links/cited_by/cites_id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn read_page(response: Value) -> Page {
    if let Some(err) = response.get("error") {
        return Page::Error(err.as_str().map_or_else(|| err.to_string(), str::to_string));
    }
    match response.get("organic_results").and_then(Value::as_array) {
        Some(results) if !results.is_empty() => Page::Results(results.clone()),
        _ => Page::Exhausted,
    }
}

/// The stricter filter used for keyword-search results: the result must
/// mention the ID and arXiv, and must not be the target's own page.
pub fn mentions_target(result: &Value, target: &Target) -> bool {
    let field = |k: &str| result.get(k).and_then(Value::as_str).unwrap_or_default();
    let text = format!("{} {}", field("title"), field("snippet")).to_lowercase();
    let own_page = field("link").ends_with(&format!("/{}", target.arxiv_id));
    text.contains(&target.arxiv_id.to_lowercase()) && text.contains("arxiv") && !own_page
}
