//! Summary metrics over the merged citing papers.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::paper::Paper;

/// Papers published this many days before the run (inclusive) are recent.
pub const RECENT_WINDOW_DAYS: u64 = 30;

/// Bucket size of the cumulative timeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Granularity {
    #[default]
    Month,
    Day,
}

impl Granularity {
    fn label(self, date: NaiveDate) -> String {
        match self {
            Granularity::Month => date.format("%Y-%m").to_string(),
            Granularity::Day => date.format("%Y-%m-%d").to_string(),
        }
    }

    /// The granularity a stored timeline was built with, read off its
    /// labels. An empty timeline reads as monthly.
    pub fn infer(timeline: &[TimelinePoint]) -> Self {
        match timeline.first() {
            Some(p) if NaiveDate::parse_from_str(&p.date, "%Y-%m-%d").is_ok() => Granularity::Day,
            _ => Granularity::Month,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub date: String,
    /// Running total up to and including this period.
    pub citations: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Statistics {
    pub total: usize,
    pub h_index: usize,
    pub recent: usize,
    /// Rounded to two decimals.
    pub avg_per_month: f64,
    pub timeline: Vec<TimelinePoint>,
}

pub fn compute(papers: &[Paper], today: NaiveDate, granularity: Granularity) -> Statistics {
    let dated: Vec<NaiveDate> = papers
        .iter()
        .filter(|p| p.has_known_date())
        .map(|p| p.published_date_sort)
        .collect();

    Statistics {
        total: papers.len(),
        h_index: h_index(papers.iter().map(|p| p.citation_count)),
        recent: recent_count(&dated, today),
        avg_per_month: avg_per_month(&dated),
        timeline: timeline(&dated, granularity),
    }
}

/// Largest `h` such that `h` papers have at least `h` citations each.
pub fn h_index(counts: impl IntoIterator<Item = u64>) -> usize {
    let mut counts: Vec<u64> = counts.into_iter().collect();
    counts.sort_unstable_by(|a, b| b.cmp(a));
    counts
        .iter()
        .enumerate()
        .take_while(|(i, c)| **c >= (*i as u64 + 1))
        .count()
}

fn recent_count(dates: &[NaiveDate], today: NaiveDate) -> usize {
    let from = today
        .checked_sub_days(Days::new(RECENT_WINDOW_DAYS))
        .unwrap_or(NaiveDate::MIN);
    dates.iter().filter(|d| **d >= from && **d <= today).count()
}

/// Dated papers per calendar month, over the inclusive span between the
/// earliest and latest of them.
fn avg_per_month(dates: &[NaiveDate]) -> f64 {
    let (Some(first), Some(last)) = (dates.iter().min(), dates.iter().max()) else {
        return 0.0;
    };
    let span = (last.year() - first.year()) * 12 + last.month() as i32 - first.month() as i32 + 1;
    round2(dates.len() as f64 / span.max(1) as f64)
}

fn timeline(dates: &[NaiveDate], granularity: Granularity) -> Vec<TimelinePoint> {
    let mut buckets: BTreeMap<String, usize> = BTreeMap::new();
    for d in dates {
        *buckets.entry(granularity.label(*d)).or_default() += 1;
    }
    let mut running = 0;
    buckets
        .into_iter()
        .map(|(date, n)| {
            running += n;
            TimelinePoint {
                date,
                citations: running,
            }
        })
        .collect()
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Two-decimal rendering used in snapshots and reports.
pub fn format_rate(x: f64) -> String {
    format!("{x:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::{SENTINEL_DATE, sample};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn h_index_example() {
        assert_eq!(h_index([10, 8, 5, 4, 3]), 4);
        assert_eq!(h_index([3, 10, 4, 8, 5]), 4);
        assert_eq!(h_index([0, 0]), 0);
        assert_eq!(h_index([100]), 1);
        assert_eq!(h_index(Vec::<u64>::new()), 0);
    }

    #[test]
    fn h_index_definition_holds() {
        proptest::proptest!(|(counts in proptest::collection::vec(0u64..50, 0..40))| {
            let h = h_index(counts.iter().copied());
            let at_least = |k: usize| counts.iter().filter(|c| **c >= k as u64).count();
            proptest::prop_assert!(at_least(h) >= h);
            proptest::prop_assert!(at_least(h + 1) < h + 1);
        })
    }

    #[test]
    fn empty_input_is_all_zero() {
        let s = compute(&[], ymd(2025, 6, 1), Granularity::Month);
        assert_eq!(s, Statistics::default());
        assert_eq!(format_rate(s.avg_per_month), "0.00");
        assert!(s.timeline.is_empty());
    }

    #[test]
    fn sentinel_dates_are_excluded_from_date_stats() {
        let papers = vec![
            sample("a", "2025-05-20", 2),
            sample("b", SENTINEL_DATE, 5),
            sample("c", SENTINEL_DATE, 1),
        ];
        let s = compute(&papers, ymd(2025, 6, 1), Granularity::Month);
        assert_eq!(s.total, 3);
        assert_eq!(s.h_index, 2);
        assert_eq!(s.recent, 1);
        assert_eq!(s.avg_per_month, 1.0);
        assert_eq!(
            s.timeline,
            vec![TimelinePoint {
                date: "2025-05".into(),
                citations: 1
            }]
        );
    }

    #[test]
    fn recent_window_is_thirty_days_inclusive() {
        let dates = [
            ymd(2025, 5, 2),
            ymd(2025, 5, 1),
            ymd(2025, 6, 1),
            ymd(2025, 6, 2),
        ];
        // 2025-05-02 ..= 2025-06-01; the future date doesn't count.
        assert_eq!(recent_count(&dates, ymd(2025, 6, 1)), 2);
    }

    #[test]
    fn average_uses_inclusive_month_span() {
        let dates = [ymd(2025, 1, 31), ymd(2025, 3, 1), ymd(2025, 3, 2)];
        assert_eq!(avg_per_month(&dates), 1.0);
        let dates = [ymd(2024, 11, 1), ymd(2025, 1, 1)];
        assert_eq!(avg_per_month(&dates), 0.67);
        assert_eq!(avg_per_month(&[ymd(2025, 1, 1)]), 1.0);
    }

    #[test]
    fn timeline_is_cumulative_and_ascending() {
        let dates = [
            ymd(2025, 3, 5),
            ymd(2025, 1, 9),
            ymd(2025, 3, 1),
            ymd(2024, 12, 30),
        ];
        let months = timeline(&dates, Granularity::Month);
        let got: Vec<_> = months.iter().map(|p| (p.date.as_str(), p.citations)).collect();
        assert_eq!(got, [("2024-12", 1), ("2025-01", 2), ("2025-03", 4)]);

        let days = timeline(&dates, Granularity::Day);
        assert_eq!(days.len(), 4);
        assert_eq!(days.last().unwrap().citations, 4);
        assert!(days.windows(2).all(|w| w[0].date < w[1].date));

        assert_eq!(Granularity::infer(&months), Granularity::Month);
        assert_eq!(Granularity::infer(&days), Granularity::Day);
        assert_eq!(Granularity::infer(&[]), Granularity::Month);
    }
}
