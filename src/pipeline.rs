//! Fetch, parse, merge, measure, write.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::cache::Cache;
use crate::cli::SourceKind;
use crate::config::Config;
use crate::dedup;
use crate::http::HttpClient;
use crate::paper::{Paper, sort_newest_first};
use crate::parse::{self, from_arxiv_entry, from_scholar_result};
use crate::snapshot::Snapshot;
use crate::source::Source;
use crate::source::arxiv::{ArxivEntry, ArxivSource};
use crate::source::scholar::ScholarSource;
use crate::stats::{self, Granularity};
use crate::target::Target;

thread_local! {
    /// Where the last panic on this thread happened, as seen by the hook.
    static PANIC_SITE: RefCell<Option<String>> = const { RefCell::new(None) };
}

type ScholarBox<'a> = Box<dyn Source<Record = Value> + 'a>;
type ArxivBox<'a> = Box<dyn Source<Record = ArxivEntry> + 'a>;

/// Result of one run: the snapshot and how many records made it.
#[derive(Debug)]
pub struct Outcome {
    pub snapshot: Snapshot,
    /// Papers in the snapshot.
    pub kept: usize,
    /// Records that could not be parsed.
    pub skipped: usize,
}

impl Outcome {
    fn fallback(snapshot: Snapshot) -> Self {
        Outcome {
            snapshot,
            kept: 0,
            skipped: 0,
        }
    }
}

pub struct Pipeline<'a> {
    target: Target,
    scholar: Option<ScholarBox<'a>>,
    arxiv: Option<ArxivBox<'a>>,
    cache: Option<Cache>,
    granularity: Granularity,
}

impl<'a> Pipeline<'a> {
    pub fn new(target: Target) -> Self {
        Pipeline {
            target,
            scholar: None,
            arxiv: None,
            cache: None,
            granularity: Granularity::default(),
        }
    }

    pub fn with_scholar(mut self, source: impl Source<Record = Value> + 'a) -> Self {
        self.scholar = Some(Box::new(source));
        self
    }

    pub fn with_arxiv(mut self, source: impl Source<Record = ArxivEntry> + 'a) -> Self {
        self.arxiv = Some(Box::new(source));
        self
    }

    /// Cache the raw search API records between runs.
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn run(&self, now: DateTime<Utc>) -> Outcome {
        let scholar_records = self.scholar_records(now);
        let (scholar, scholar_skipped) =
            parse::parse_all(&scholar_records, "scholar", from_scholar_result);

        let arxiv_records = match &self.arxiv {
            Some(source) => {
                info!(source = source.name(), "fetching");
                source.fetch(&self.target)
            }
            None => Vec::new(),
        };
        let (arxiv, arxiv_skipped) = parse::parse_all(&arxiv_records, "arxiv", from_arxiv_entry);

        info!(
            scholar = scholar.len(),
            arxiv = arxiv.len(),
            "parsed citing records"
        );

        let batches = [scholar, arxiv].map(|batch| self.drop_self(batch));
        let mut papers = dedup::merge(batches);
        sort_newest_first(&mut papers);

        let stats = stats::compute(&papers, now.date_naive(), self.granularity);
        info!(
            total = stats.total,
            h_index = stats.h_index,
            recent = stats.recent,
            avg_per_month = %stats::format_rate(stats.avg_per_month),
            "citation statistics"
        );

        Outcome {
            kept: papers.len(),
            skipped: scholar_skipped + arxiv_skipped,
            snapshot: Snapshot::new(&self.target, &stats, papers, now),
        }
    }

    fn scholar_records(&self, now: DateTime<Utc>) -> Vec<Value> {
        let Some(source) = &self.scholar else {
            return Vec::new();
        };
        if let Some(cache) = &self.cache
            && let Some(records) = cache.load(&self.target.arxiv_id, now)
        {
            return records;
        }

        info!(source = source.name(), "fetching");
        let records = source.fetch(&self.target);
        if let Some(cache) = &self.cache
            && !records.is_empty()
        {
            match cache.save(&self.target.arxiv_id, &records, now) {
                Ok(()) => info!(path = %cache.path().display(), "search results cached"),
                Err(e) => warn!("could not save cache: {e:#}"),
            }
        }
        records
    }

    fn drop_self(&self, batch: Vec<Paper>) -> Vec<Paper> {
        batch
            .into_iter()
            .filter(|p| {
                let own = self.target.is_self(p);
                if own {
                    info!(title = %p.title, "skipping the tracked paper itself");
                }
                !own
            })
            .collect()
    }
}

/// Run the configured pipeline and write the snapshot. A missing API key or
/// a crash inside the pipeline yields the fallback snapshot instead.
pub fn track(config: &Config, now: DateTime<Utc>) -> anyhow::Result<Outcome> {
    let outcome = if config.uses(SourceKind::Scholar) && config.api_key.is_none() {
        error!("SERPAPI_KEY not found in the environment or .env file");
        info!("set it with `export SERPAPI_KEY=...` or a line `SERPAPI_KEY=...` in .env");
        Outcome::fallback(Snapshot::fallback(&config.target, None, now))
    } else {
        run_or_fallback(&config.target, now, || build(config, now).run(now))
    };
    outcome.snapshot.write(&config.output)?;
    Ok(outcome)
}

/// Log panics with their location and a backtrace, and remember the
/// location so the fallback snapshot can name it.
pub fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        let site = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
        error!(
            location = site.as_deref().unwrap_or("unknown"),
            "panic: {}\n{}",
            panic_message(info.payload()),
            Backtrace::force_capture()
        );
        PANIC_SITE.with(|s| *s.borrow_mut() = site);
    }));
}

/// Run `f`; a panic becomes the fallback snapshot with the panic message in
/// its `error` field.
fn run_or_fallback(
    target: &Target,
    now: DateTime<Utc>,
    f: impl FnOnce() -> Outcome,
) -> Outcome {
    PANIC_SITE.with(|s| s.borrow_mut().take());
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let mut reason = format!("Citation tracking aborted: {}", panic_message(&*payload));
            if let Some(site) = PANIC_SITE.with(|s| s.borrow_mut().take()) {
                reason.push_str(&format!(" (at {site})"));
            }
            error!("{reason}");
            Outcome::fallback(Snapshot::fallback(target, Some(&reason), now))
        }
    }
}

fn build(config: &Config, now: DateTime<Utc>) -> Pipeline<'static> {
    let mut pipeline =
        Pipeline::new(config.target.clone()).with_granularity(config.granularity);

    if config.uses(SourceKind::Scholar)
        && let Some(key) = &config.api_key
    {
        pipeline = pipeline.with_scholar(ScholarSource::new(
            HttpClient::new(config.timeout, config.retry.clone()),
            key.clone(),
            config.scholar.clone(),
        ));
    }
    if config.uses(SourceKind::Arxiv) {
        pipeline = pipeline.with_arxiv(ArxivSource::new(
            HttpClient::new(config.timeout, config.retry.clone()),
            config.arxiv.clone(),
            now.date_naive(),
        ));
    }
    if let Some(cache) = &config.cache {
        pipeline = pipeline.with_cache(Cache::new(&cache.path, cache.max_age_days));
    }
    pipeline
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use crate::source::arxiv::ArxivAuthor;
    use chrono::{NaiveDate, TimeDelta, TimeZone};
    use clap::Parser;
    use serde_json::json;
    use std::cell::Cell;
    use tempfile::TempDir;

    /// Hands out canned records and counts how often it was asked.
    struct Canned<'c, R> {
        records: Vec<R>,
        calls: &'c Cell<usize>,
    }

    impl<R: Clone> Source for Canned<'_, R> {
        type Record = R;

        fn name(&self) -> &'static str {
            "canned"
        }

        fn fetch(&self, _: &Target) -> Vec<R> {
            self.calls.set(self.calls.get() + 1);
            self.records.clone()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn target() -> Target {
        Target::resolve("2502.13138", None)
    }

    fn scholar_records() -> Vec<Value> {
        vec![
            json!({
                "title": "Agents that write ML code",
                "link": "https://openreview.net/forum?id=abc",
                "snippet": "We compare against AIDE, 2025-04-02 release.",
                "publication_info": {"summary": "A Author, B Author - ICML, 2025 - openreview.net"},
                "inline_links": {"cited_by": {"total": 7}}
            }),
            json!({
                "title": "AIDE: AI-Driven Exploration",
                "link": "https://arxiv.org/abs/2502.13138",
                "publication_info": {"summary": "Z Jiang - arXiv, 2025"}
            }),
            json!("garbage"),
        ]
    }

    fn arxiv_records() -> Vec<ArxivEntry> {
        vec![
            ArxivEntry {
                id: "http://arxiv.org/abs/2505.01234v1".into(),
                title: "Agents  that write ML code".into(),
                summary: "Duplicate of the scholar record.".into(),
                published: "2025-05-03T00:00:00Z".into(),
                authors: vec![ArxivAuthor {
                    name: "C Author".into(),
                    affiliations: vec![],
                }],
            },
            ArxivEntry {
                id: "http://arxiv.org/abs/2505.04321v1".into(),
                title: "Benchmarking code agents".into(),
                summary: "Extends arXiv:2502.13138.".into(),
                published: "2025-05-20T00:00:00Z".into(),
                authors: vec![],
            },
        ]
    }

    #[test]
    fn merges_sources_and_drops_the_target_itself() {
        let (s_calls, a_calls) = (Cell::new(0), Cell::new(0));
        let outcome = Pipeline::new(target())
            .with_scholar(Canned {
                records: scholar_records(),
                calls: &s_calls,
            })
            .with_arxiv(Canned {
                records: arxiv_records(),
                calls: &a_calls,
            })
            .run(now());

        assert_eq!((s_calls.get(), a_calls.get()), (1, 1));
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.kept, 2);

        let titles: Vec<_> = outcome.snapshot.papers.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["Benchmarking code agents", "Agents that write ML code"]);
        // First-seen wins: the scholar copy carries the citation count.
        assert_eq!(outcome.snapshot.papers[1].citation_count, 7);
        assert_eq!(outcome.snapshot.total_citations, 2);
        // Only the year is known for the scholar copy.
        assert_eq!(outcome.snapshot.papers[1].published_date_sort.to_string(), "2025-01-01");
        assert_eq!(outcome.snapshot.recent_citations, 1);
        assert!(outcome.snapshot.error.is_none());
    }

    #[test]
    fn cache_is_honoured_then_bypassed() {
        let dir = TempDir::new().unwrap();
        let calls = Cell::new(0);
        let pipeline = || {
            Pipeline::new(target())
                .with_scholar(Canned {
                    records: scholar_records(),
                    calls: &calls,
                })
                .with_cache(Cache::new(dir.path().join("cache.json"), 7))
        };

        let first = pipeline().run(now());
        assert_eq!(calls.get(), 1);

        let cached = pipeline().run(now() + TimeDelta::days(6));
        assert_eq!(calls.get(), 1);
        assert_eq!(cached.snapshot.papers, first.snapshot.papers);

        pipeline().run(now() + TimeDelta::days(8));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn cache_is_not_shared_between_papers() {
        let dir = TempDir::new().unwrap();
        let cache_path = dir.path().join("cache.json");
        let calls = Cell::new(0);

        let aide = Pipeline::new(target())
            .with_scholar(Canned {
                records: vec![json!({"title": "Cites AIDE only", "link": "https://a.org/1"})],
                calls: &calls,
            })
            .with_cache(Cache::new(&cache_path, 7))
            .run(now());
        assert_eq!(aide.kept, 1);

        let bert = Pipeline::new(Target::resolve("1810.04805", None))
            .with_scholar(Canned {
                records: vec![json!({"title": "Cites BERT only", "link": "https://b.org/2"})],
                calls: &calls,
            })
            .with_cache(Cache::new(&cache_path, 7))
            .run(now() + TimeDelta::days(1));
        assert_eq!(calls.get(), 2);
        let titles: Vec<_> = bert.snapshot.papers.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["Cites BERT only"]);
        assert_eq!(bert.snapshot.arxiv_id, "1810.04805");
    }

    #[test]
    fn empty_fetch_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let calls = Cell::new(0);
        let cache_path = dir.path().join("cache.json");
        let outcome = Pipeline::new(target())
            .with_scholar(Canned::<Value> {
                records: vec![],
                calls: &calls,
            })
            .with_cache(Cache::new(&cache_path, 7))
            .run(now());
        assert!(!cache_path.exists());
        assert_eq!(outcome.snapshot.total_citations, 0);
        assert!(outcome.snapshot.timeline.is_empty());
    }

    #[test]
    fn missing_key_writes_fallback() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("citations_data.json");
        let cli = Cli::try_parse_from([
            "citetrack",
            "track",
            "--api-key",
            "",
            "--output",
            output.to_str().unwrap(),
        ])
        .unwrap();
        let Command::Track(args) = cli.command else {
            panic!("expected track");
        };
        let config = Config::from_args(args, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());

        let outcome = track(&config, now()).unwrap();
        assert_eq!(outcome.kept, 0);

        let written = Snapshot::read(&output).unwrap();
        assert!(written.error.is_some());
        assert_eq!(
            (written.total_citations, written.h_index, written.recent_citations),
            (0, 0, 0)
        );
        assert_eq!(written.avg_citations_per_month, 0.0);
    }

    struct Exploding;

    impl Source for Exploding {
        type Record = Value;

        fn name(&self) -> &'static str {
            "exploding"
        }

        fn fetch(&self, _: &Target) -> Vec<Value> {
            panic!("search index exploded");
        }
    }

    #[test]
    fn crash_in_a_source_yields_explained_fallback() {
        let outcome = run_or_fallback(&target(), now(), || {
            Pipeline::new(target()).with_scholar(Exploding).run(now())
        });
        assert_eq!(outcome.kept, 0);
        let reason = outcome.snapshot.error.unwrap();
        assert!(reason.contains("search index exploded"), "{reason}");
        assert_eq!(outcome.snapshot.total_citations, 0);
        assert!(outcome.snapshot.papers.is_empty());
    }

    #[test]
    fn panic_hook_records_where_it_happened() {
        install_panic_hook();
        let outcome = run_or_fallback(&target(), now(), || panic!("boom"));
        // Back to the default hook for the other tests.
        let _ = panic::take_hook();

        let reason = outcome.snapshot.error.unwrap();
        assert!(reason.contains("boom"), "{reason}");
        assert!(reason.contains("pipeline.rs:"), "{reason}");
    }

    #[test]
    fn panic_message_reads_both_payload_kinds() {
        let p: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*p), "boom");
        let p: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*p), "bang");
    }
}
