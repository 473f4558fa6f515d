use crate::institution::{self, InstitutionInput};
use crate::lookup::TABLES;
use crate::paper::{Paper, normalize_ws};
use crate::parse::date::{self, DateInput};
use crate::source::arxiv::ArxivEntry;

const SNIPPET_CHARS: usize = 300;

/// Convert one Atom `<entry>` from the preprint feed. Always succeeds; the
/// `Result` lets it share [`super::parse_all`] with the scholar parser.
pub fn from_arxiv_entry(entry: &ArxivEntry) -> anyhow::Result<Paper> {
    let title = Some(normalize_ws(&entry.title))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());
    let authors = if entry.authors.is_empty() {
        "Unknown authors".to_string()
    } else {
        entry
            .authors
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let summary = normalize_ws(&entry.summary);
    let snippet = if summary.is_empty() {
        "No snippet available".to_string()
    } else {
        truncate(&summary, SNIPPET_CHARS)
    };

    let published = date::extract_or_unknown(&DateInput {
        link: &entry.id,
        text: &entry.published,
    });

    let affiliations: Vec<String> = entry
        .authors
        .iter()
        .flat_map(|a| a.affiliations.iter().cloned())
        .collect();
    let institutions = institution::extract(
        &InstitutionInput {
            affiliations: &affiliations,
            texts: &[summary.as_str()],
            link: &entry.id,
        },
        &TABLES,
    );

    Ok(Paper {
        title,
        authors,
        venue: "arXiv".to_string(),
        snippet,
        link: entry.id.clone(),
        published_date: published.display,
        published_date_sort: published.sort,
        citation_count: 0,
        institutions,
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", s[..idx].trim_end()),
        None => s.to_string(),
    }
}
