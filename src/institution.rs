//! Best-effort affiliation inference for a single record.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::lookup::InstitutionTables;
use crate::paper::normalize_ws;

pub const UNKNOWN: &str = "Unknown";

/// Shortest cleaned name worth keeping.
const MIN_LEN: usize = 3;

/// Everything a record offers that may name an institution.
#[derive(Clone, Copy, Debug, Default)]
pub struct InstitutionInput<'a> {
    /// Structured affiliation strings, when the source has them.
    pub affiliations: &'a [String],
    /// Venue, snippet, summary and similar free text.
    pub texts: &'a [&'a str],
    pub link: &'a str,
}

type TextMatcher = fn(&str, &InstitutionTables) -> Vec<String>;

static TEXT_MATCHERS: &[TextMatcher] = &[university_of, suffixed_name, companies];

/// Comma-joined, deduplicated institutions, or "Unknown".
pub fn extract(input: &InstitutionInput<'_>, tables: &InstitutionTables) -> String {
    let mut raw: Vec<String> = Vec::new();

    for aff in input.affiliations {
        let found = matches_in(aff, tables);
        if found.is_empty() {
            raw.push(aff.clone());
        } else {
            raw.extend(found);
        }
    }
    for text in input.texts {
        raw.extend(matches_in(text, tables));
    }
    if let Some(name) = Url::parse(input.link)
        .ok()
        .and_then(|u| u.host_str().and_then(|h| tables.for_host(h)).map(str::to_string))
    {
        raw.push(name);
    }

    let mut seen: Vec<String> = Vec::new();
    for name in raw.iter().filter_map(|r| canonicalize(r, tables)) {
        if !seen.iter().any(|s| s.eq_ignore_ascii_case(&name)) {
            seen.push(name);
        }
    }

    if seen.is_empty() {
        UNKNOWN.to_string()
    } else {
        seen.join(", ")
    }
}

fn matches_in(text: &str, tables: &InstitutionTables) -> Vec<String> {
    TEXT_MATCHERS.iter().flat_map(|m| m(text, tables)).collect()
}

fn university_of(text: &str, _: &InstitutionTables) -> Vec<String> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"\bUniversity of(?:\s+(?:the\s+)?[A-Z][\w'-]*)+").unwrap()
    });
    RE.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// "Stanford University", "Allen Institute for AI", "Imperial College London".
fn suffixed_name(text: &str, _: &InstitutionTables) -> Vec<String> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"\b(?:[A-Z][\w'&-]*\s+){1,3}(?:University|Institute|College)(?:\s+(?:of|for)(?:\s+[A-Z][\w'-]*)+|\s+London)?\b",
        )
        .unwrap()
    });
    RE.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

fn companies(text: &str, tables: &InstitutionTables) -> Vec<String> {
    tables.companies_in(text).map(str::to_string).collect()
}

/// Trim, drop leading filler words, then map to the canonical spelling or
/// title-case it.
fn canonicalize(raw: &str, tables: &InstitutionTables) -> Option<String> {
    const FILLER: &[&str] = &["The", "At", "In", "From", "And", "With", "By", "Of"];

    let mut cleaned = normalize_ws(raw.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, ',' | ';' | '.' | ':' | '(' | ')' | '"' | '\'')
    }));
    while let Some((head, rest)) = cleaned.split_once(' ') {
        if FILLER.contains(&head) && rest.split_whitespace().count() > 1 {
            cleaned = rest.to_string();
        } else {
            break;
        }
    }

    if cleaned.chars().count() < MIN_LEN {
        return None;
    }
    Some(
        tables
            .canonical(&cleaned)
            .map(str::to_string)
            .unwrap_or_else(|| title_case(&cleaned)),
    )
}

/// Capitalise lowercase words, keeping acronyms and mixed-case words as
/// written and short connectives lowercase.
fn title_case(s: &str) -> String {
    const SMALL: &[&str] = &["of", "and", "the", "for", "at", "in", "de"];
    s.split(' ')
        .enumerate()
        .map(|(i, word)| {
            let lower = word.to_lowercase();
            if i > 0 && SMALL.contains(&lower.as_str()) {
                lower
            } else if word.chars().all(|c| !c.is_uppercase()) {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
