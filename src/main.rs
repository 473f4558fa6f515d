use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr};
use tracing::error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    cli::{Cli, Command, TargetArgs},
    config::Config,
    snapshot::Snapshot,
    stats::{Granularity, Statistics},
    target::Target,
};

mod cache;
mod cli;
mod config;
mod dedup;
mod error;
mod http;
mod institution;
mod lookup;
mod paper;
mod parse;
mod pipeline;
mod snapshot;
mod source;
mod stats;
mod target;

fn main() -> ExitCode {
    // A missing .env is the normal case.
    let _ = dotenvy::dotenv();
    let args = Cli::parse();
    init_logging(args.verbose);
    pipeline::install_panic_hook();

    let result = match args.command {
        Command::Track(track) => {
            let now = Utc::now();
            let config = Config::from_args(track, now.date_naive());
            pipeline::track(&config, now).map(|outcome| {
                print_summary(outcome.kept, outcome.skipped);
                ExitCode::SUCCESS
            })
        }
        Command::Fallback(target) => write_fallback(&target).map(|_| ExitCode::SUCCESS),
        Command::Stats {
            snapshot,
            granularity,
        } => check_stats(&snapshot, granularity),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn write_fallback(args: &TargetArgs) -> anyhow::Result<()> {
    let target = Target::resolve(&args.target, None);
    Snapshot::fallback(&target, None, Utc::now()).write(&args.output)
}

/// Print the stored statistics and fail if recomputing them from the
/// papers gives something else.
fn check_stats(path: &Path, granularity: Option<Granularity>) -> anyhow::Result<ExitCode> {
    let snapshot = Snapshot::read(path)?;
    let granularity = granularity.unwrap_or_else(|| Granularity::infer(&snapshot.timeline));
    let today = snapshot
        .run_date()
        .with_context(|| format!("unreadable last_updated {:?}", snapshot.last_updated))?;
    let stored = snapshot.statistics();
    let recomputed = stats::compute(&snapshot.papers, today, granularity);

    println!("target:                  {}", snapshot.target_paper);
    println!("last updated:            {}", snapshot.last_updated);
    println!("total citations:         {}", stored.total);
    println!("h-index:                 {}", stored.h_index);
    println!("recent citations:        {}", stored.recent);
    println!(
        "avg citations per month: {}",
        stats::format_rate(stored.avg_per_month)
    );
    if let (Some(first), Some(last)) = (stored.timeline.first(), stored.timeline.last()) {
        println!(
            "timeline:                {} .. {} ({} points)",
            first.date,
            last.date,
            stored.timeline.len()
        );
    }
    if let Some(reason) = &snapshot.error {
        println!("error:                   {reason}");
    }

    if same_statistics(&stored, &recomputed) {
        eprintln!("{} statistics consistent", "✓".if_supports_color(Stderr, |t| t.green()));
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!(
            "{} statistics differ from the papers: recomputed total {} h-index {} recent {} avg {}",
            "✗".if_supports_color(Stderr, |t| t.red()),
            recomputed.total,
            recomputed.h_index,
            recomputed.recent,
            stats::format_rate(recomputed.avg_per_month)
        );
        Ok(ExitCode::FAILURE)
    }
}

/// Equal as written to disk; the rate only carries two decimals.
fn same_statistics(a: &Statistics, b: &Statistics) -> bool {
    a.total == b.total
        && a.h_index == b.h_index
        && a.recent == b.recent
        && stats::format_rate(a.avg_per_month) == stats::format_rate(b.avg_per_month)
        && a.timeline == b.timeline
}

fn print_summary(kept: usize, skipped: usize) {
    eprintln!(
        "{} {}  {} {}",
        "✓".if_supports_color(Stderr, |t| t.green()),
        kept,
        "✗".if_supports_color(Stderr, |t| t.red()),
        skipped
    );
}
