//! Resolved run settings for `track`.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};

use crate::cli::{SourceKind, TrackArgs};
use crate::http::RetryPolicy;
use crate::source::arxiv::ArxivSettings;
use crate::source::scholar::ScholarSettings;
use crate::stats::Granularity;
use crate::target::Target;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_DELAY: Duration = Duration::from_secs(1);
const ARXIV_REQUEST_DELAY: Duration = Duration::from_secs(3);

#[derive(Clone, Debug)]
pub struct Config {
    pub target: Target,
    /// Empty or whitespace-only keys count as missing.
    pub api_key: Option<String>,
    pub output: PathBuf,
    /// `None` when caching is disabled.
    pub cache: Option<CacheConfig>,
    pub sources: Vec<SourceKind>,
    pub scholar: ScholarSettings,
    pub arxiv: ArxivSettings,
    pub granularity: Granularity,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub path: PathBuf,
    pub max_age_days: i64,
}

impl Config {
    pub fn from_args(args: TrackArgs, today: NaiveDate) -> Self {
        let mut sources = args.sources;
        sources.dedup();
        Config {
            target: Target::resolve(&args.target.target, args.alias),
            api_key: args
                .api_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            output: args.target.output,
            cache: (!args.no_cache).then_some(CacheConfig {
                path: args.cache,
                max_age_days: args.cache_days,
            }),
            sources,
            scholar: ScholarSettings {
                max_results: args.max_results,
                page_size: args.page_size.max(1),
                page_delay: PAGE_DELAY,
                year_ceiling: today.year(),
            },
            arxiv: ArxivSettings {
                categories: args.arxiv_categories,
                lookback_days: args.arxiv_days,
                fulltext_days: args.fulltext_days,
                request_delay: ARXIV_REQUEST_DELAY,
                ..ArxivSettings::default()
            },
            granularity: args.granularity,
            timeout: REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    pub fn uses(&self, kind: SourceKind) -> bool {
        self.sources.contains(&kind)
    }
}
