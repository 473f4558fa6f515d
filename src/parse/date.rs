//! Best-effort publication date recovery.
//!
//! Each matcher looks at the record's link and free text and either
//! produces a date or passes. They run in priority order and the first hit
//! wins; a matcher whose numbers don't form a real calendar date passes.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

use crate::paper::sentinel_date;

/// Day assumed when only a year and month are known.
const MID_MONTH: u32 = 15;

/// What the matchers get to look at.
#[derive(Clone, Copy, Debug, Default)]
pub struct DateInput<'a> {
    pub link: &'a str,
    pub text: &'a str,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedDate {
    pub display: String,
    pub sort: NaiveDate,
}

impl ExtractedDate {
    pub fn unknown() -> Self {
        ExtractedDate {
            display: "Unknown".to_string(),
            sort: sentinel_date(),
        }
    }
}

type Matcher = fn(&DateInput<'_>) -> Option<ExtractedDate>;

/// Matchers in priority order.
pub static MATCHERS: &[(&str, Matcher)] = &[
    ("arxiv-link", from_arxiv_link),
    ("iso", from_iso),
    ("month-day-year", from_month_day_year),
    ("us-slash", from_us_slash),
    ("month-year", from_month_year),
    ("year", from_bare_year),
];

pub fn extract(input: &DateInput<'_>) -> Option<ExtractedDate> {
    MATCHERS.iter().find_map(|(name, m)| {
        let date = m(input)?;
        trace!(matcher = *name, date = %date.sort, "publication date matched");
        Some(date)
    })
}

pub fn extract_or_unknown(input: &DateInput<'_>) -> ExtractedDate {
    extract(input).unwrap_or_else(ExtractedDate::unknown)
}

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const MONTH_PATTERN: &str = r"(Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|June?|July?|Aug(?:ust)?|Sep(?:t(?:ember)?)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)";

fn month_number(name: &str) -> Option<u32> {
    let head: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    let idx = MONTH_NAMES
        .iter()
        .position(|m| m[..3].eq_ignore_ascii_case(&head))?;
    Some(idx as u32 + 1)
}

fn month_name(month: u32) -> &'static str {
    MONTH_NAMES
        .get(month.wrapping_sub(1) as usize)
        .copied()
        .unwrap_or("Unknown")
}

/// New-style arXiv IDs encode year and month: `arxiv.org/abs/2503.01234`.
/// The day comes from an ISO date in the text when it agrees on year and
/// month, otherwise mid-month.
fn from_arxiv_link(input: &DateInput<'_>) -> Option<ExtractedDate> {
    static ARXIV_LINK: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)arxiv\.org/(?:abs|pdf|html)/(\d{2})(\d{2})\.\d{4,5}").unwrap()
    });
    let caps = ARXIV_LINK.captures(input.link)?;
    let year = 2000 + caps[1].parse::<i32>().ok()?;
    let month = caps[2].parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)?;

    let day = from_iso(input)
        .map(|d| d.sort)
        .filter(|d| d.year() == year && d.month() == month)
        .map_or(MID_MONTH, |d| d.day());
    Some(ExtractedDate {
        display: format!("{} {}", month_name(month), year),
        sort: NaiveDate::from_ymd_opt(year, month, day)?,
    })
}

fn from_iso(input: &DateInput<'_>) -> Option<ExtractedDate> {
    static ISO: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})").unwrap());
    ISO.captures_iter(input.text).find_map(|caps| {
        let sort = NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        )?;
        Some(ExtractedDate {
            display: sort.format("%Y-%m-%d").to_string(),
            sort,
        })
    })
}

fn from_month_day_year(input: &DateInput<'_>) -> Option<ExtractedDate> {
    static MDY: Lazy<Regex> = Lazy::new(|| {
        Regex::new(&format!(r"(?i)\b{MONTH_PATTERN}\.?\s+(\d{{1,2}}),?\s+(\d{{4}})\b")).unwrap()
    });
    MDY.captures_iter(input.text).find_map(|caps| {
        let month = month_number(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        let sort = NaiveDate::from_ymd_opt(year, month, day)?;
        Some(ExtractedDate {
            display: format!("{} {}, {}", month_name(month), day, year),
            sort,
        })
    })
}

/// `MM/DD/YYYY`, US order.
fn from_us_slash(input: &DateInput<'_>) -> Option<ExtractedDate> {
    static SLASH: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());
    SLASH.captures_iter(input.text).find_map(|caps| {
        let sort = NaiveDate::from_ymd_opt(
            caps[3].parse().ok()?,
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
        )?;
        Some(ExtractedDate {
            display: sort.format("%m/%d/%Y").to_string(),
            sort,
        })
    })
}

fn from_month_year(input: &DateInput<'_>) -> Option<ExtractedDate> {
    static MY: Lazy<Regex> = Lazy::new(|| {
        Regex::new(&format!(r"(?i)\b{MONTH_PATTERN}\.?,?\s+(\d{{4}})\b")).unwrap()
    });
    MY.captures_iter(input.text).find_map(|caps| {
        let month = month_number(&caps[1])?;
        let year: i32 = caps[2].parse().ok()?;
        Some(ExtractedDate {
            display: format!("{} {}", month_name(month), year),
            sort: NaiveDate::from_ymd_opt(year, month, MID_MONTH)?,
        })
    })
}

fn from_bare_year(input: &DateInput<'_>) -> Option<ExtractedDate> {
    static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").unwrap());
    let year: i32 = YEAR.captures(input.text)?[1].parse().ok()?;
    Some(ExtractedDate {
        display: year.to_string(),
        sort: NaiveDate::from_ymd_opt(year, 1, 1)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matchers_run_most_specific_first() {
        let names: Vec<_> = MATCHERS.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            ["arxiv-link", "iso", "month-day-year", "us-slash", "month-year", "year"]
        );
    }

    fn text(t: &str) -> DateInput<'_> {
        DateInput { link: "", text: t }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn arxiv_link_estimates_mid_month() {
        let d = extract(&DateInput {
            link: "https://arxiv.org/abs/2503.01234v2",
            text: "J Doe - arXiv preprint, 2025 - arxiv.org",
        })
        .unwrap();
        assert_eq!(d.sort, ymd(2025, 3, 15));
        assert_eq!(d.display, "March 2025");
    }

    #[test]
    fn arxiv_link_takes_day_from_matching_iso_date() {
        let d = extract(&DateInput {
            link: "http://arxiv.org/abs/2503.01234v1",
            text: "2025-03-04T17:59:01Z",
        })
        .unwrap();
        assert_eq!(d.sort, ymd(2025, 3, 4));

        // A disagreeing ISO date doesn't override the link.
        let d = extract(&DateInput {
            link: "http://arxiv.org/abs/2503.01234v1",
            text: "2025-04-02T00:00:00Z",
        })
        .unwrap();
        assert_eq!(d.sort, ymd(2025, 3, 15));
    }

    #[test]
    fn invalid_link_month_falls_through() {
        let d = extract(&DateInput {
            link: "https://arxiv.org/abs/2513.01234",
            text: "2024",
        })
        .unwrap();
        assert_eq!(d.sort, ymd(2024, 1, 1));
    }

    #[test]
    fn iso_beats_textual_patterns() {
        let d = extract(&text("Published March 3, 2024; revised 2024-05-06")).unwrap();
        assert_eq!(d.sort, ymd(2024, 5, 6));
        assert_eq!(d.display, "2024-05-06");
    }

    #[test]
    fn month_day_year() {
        let d = extract(&text("Proc. NeurIPS, Dec. 9, 2024")).unwrap();
        assert_eq!(d.sort, ymd(2024, 12, 9));
        assert_eq!(d.display, "December 9, 2024");
    }

    #[test]
    fn us_slash_order() {
        let d = extract(&text("posted 03/07/2025")).unwrap();
        assert_eq!(d.sort, ymd(2025, 3, 7));
        assert_eq!(d.display, "03/07/2025");

        // 13 is not a month; the year still gives something.
        let d = extract(&text("posted 13/07/2025")).unwrap();
        assert_eq!(d.sort, ymd(2025, 1, 1));
    }

    #[test]
    fn month_year_defaults_to_mid_month() {
        let d = extract(&text("ICLR workshop, Sept 2024")).unwrap();
        assert_eq!(d.sort, ymd(2024, 9, 15));
        assert_eq!(d.display, "September 2024");
    }

    #[test]
    fn bare_year_defaults_to_new_year() {
        let d = extract(&text("A Smith - Journal of Things, 2023 - example.org")).unwrap();
        assert_eq!(d.sort, ymd(2023, 1, 1));
        assert_eq!(d.display, "2023");
    }

    #[test]
    fn nothing_yields_sentinel() {
        let d = extract_or_unknown(&text("no dates here"));
        assert_eq!(d, ExtractedDate::unknown());
        assert_eq!(d.sort.to_string(), crate::paper::SENTINEL_DATE);
    }

    #[test]
    fn extracted_dates_are_always_valid() {
        proptest::proptest!(|(s in "[A-Za-z0-9 ,./-]{0,40}")| {
            let d = extract_or_unknown(&text(&s));
            let reparsed = NaiveDate::parse_from_str(&d.sort.to_string(), "%Y-%m-%d");
            proptest::prop_assert_eq!(reparsed.ok(), Some(d.sort));
        })
    }
}
