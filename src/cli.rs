use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::cache::DEFAULT_MAX_AGE_DAYS;
use crate::stats::Granularity;
use crate::target::DEFAULT_ARXIV_ID;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch citing papers and write a fresh snapshot
    Track(TrackArgs),
    /// Write the degraded snapshot without touching the network
    Fallback(TargetArgs),
    /// Recompute and print the statistics of an existing snapshot
    Stats {
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,
        /// Timeline buckets; read from the snapshot when omitted
        #[arg(long, value_enum)]
        granularity: Option<Granularity>,
    },
}

/// Which paper, and where its snapshot goes.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// arXiv URL or identifier of the tracked paper
    #[arg(long, env = "CITETRACK_TARGET", default_value_t = format!("https://arxiv.org/abs/{DEFAULT_ARXIV_ID}"))]
    pub target: String,

    /// Snapshot file to write
    #[arg(short, long, default_value = "citations_data.json")]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct TrackArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Search API key
    #[arg(long = "api-key", env = "SERPAPI_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Raw search results cache
    #[arg(long, default_value = ".citation_cache.json")]
    pub cache: PathBuf,

    /// Days a cached fetch stays fresh
    #[arg(long = "cache-days", default_value_t = DEFAULT_MAX_AGE_DAYS)]
    pub cache_days: i64,

    /// Always hit the network
    #[arg(long = "no-cache")]
    pub no_cache: bool,

    /// Upper bound on search results
    #[arg(long = "max-results", default_value_t = 100)]
    pub max_results: usize,

    /// Results per search page
    #[arg(long = "page-size", default_value_t = 20)]
    pub page_size: usize,

    #[arg(long, value_enum, value_delimiter = ',', default_values_t = [SourceKind::Scholar, SourceKind::Arxiv])]
    pub sources: Vec<SourceKind>,

    /// Preprint categories to scan (repeatable)
    #[arg(long = "arxiv-category", value_name = "CAT", default_values_t = ["cs.AI".to_string(), "cs.LG".to_string()])]
    pub arxiv_categories: Vec<String>,

    /// How far back the preprint feed looks
    #[arg(long = "arxiv-days", default_value_t = 30)]
    pub arxiv_days: u64,

    /// Entries newer than this get their full text searched
    #[arg(long = "fulltext-days", default_value_t = 7)]
    pub fulltext_days: u64,

    /// Another string that counts as citing the paper, e.g. a project name
    #[arg(long)]
    pub alias: Option<String>,

    #[arg(long, value_enum, default_value_t = Granularity::Month)]
    pub granularity: Granularity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    Scholar,
    Arxiv,
}
