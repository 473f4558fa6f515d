use anyhow::anyhow;
use serde_json::Value;

use crate::institution::{self, InstitutionInput};
use crate::lookup::TABLES;
use crate::paper::{Paper, normalize_ws};
use crate::parse::date::{self, DateInput};

/// Convert one `organic_results` entry from the scholarly search API.
///
/// Only a record that isn't a JSON object is an error; every missing field
/// gets a placeholder.
pub fn from_scholar_result(result: &Value) -> anyhow::Result<Paper> {
    if !result.is_object() {
        return Err(anyhow!("search result is not an object: {result}"));
    }
    let text = |ptr: &str| {
        result
            .pointer(ptr)
            .and_then(Value::as_str)
            .map(normalize_ws)
            .filter(|s| !s.is_empty())
    };

    let title = text("/title").unwrap_or_else(|| "Untitled".to_string());
    let summary = text("/publication_info/summary");
    let snippet = text("/snippet").unwrap_or_else(|| "No snippet available".to_string());
    let link = text("/link").unwrap_or_default();

    let listed: Vec<&Value> = result
        .pointer("/publication_info/authors")
        .and_then(Value::as_array)
        .map(|a| a.iter().collect())
        .unwrap_or_default();
    let authors = if !listed.is_empty() {
        listed
            .iter()
            .filter_map(|a| a.get("name").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        summary
            .as_deref()
            .and_then(|s| s.split_once(" - "))
            .map(|(a, _)| a.trim().to_string())
            .unwrap_or_else(|| "Unknown authors".to_string())
    };

    let venue = summary
        .as_deref()
        .and_then(|s| s.split(" - ").nth(1))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("Unknown venue")
        .to_string();

    let published = date::extract_or_unknown(&DateInput {
        link: &link,
        text: summary.as_deref().unwrap_or_default(),
    });

    let citation_count = result
        .pointer("/inline_links/cited_by/total")
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let affiliations: Vec<String> = listed
        .iter()
        .filter_map(|a| a.get("affiliation").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    let texts = [
        venue.as_str(),
        snippet.as_str(),
        summary.as_deref().unwrap_or_default(),
    ];
    let institutions = institution::extract(
        &InstitutionInput {
            affiliations: &affiliations,
            texts: &texts,
            link: &link,
        },
        &TABLES,
    );

    Ok(Paper {
        title,
        authors,
        venue,
        snippet,
        link,
        published_date: published.display,
        published_date_sort: published.sort,
        citation_count,
        institutions,
    })
}
