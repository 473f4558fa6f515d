//! Institution lookup tables, loaded from `data/institutions.json`.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::error;

static BUNDLED: &str = include_str!("../data/institutions.json");

/// The tables compiled into the binary.
pub static TABLES: Lazy<InstitutionTables> =
    Lazy::new(|| match InstitutionTables::from_json(BUNDLED) {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "bundled institution tables are invalid; institution lookup disabled");
            InstitutionTables::default()
        }
    });

#[derive(Debug, Default, Deserialize)]
pub struct InstitutionTables {
    /// Lowercase spelling or acronym -> canonical name.
    #[serde(default)]
    aliases: HashMap<String, String>,
    /// Organisation names matched verbatim in free text.
    #[serde(default)]
    companies: Vec<String>,
    /// Link domain -> canonical name. Subdomains match too.
    #[serde(default)]
    domains: HashMap<String, String>,
    #[serde(skip)]
    company_pattern: Option<Regex>,
}

impl InstitutionTables {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let mut tables: InstitutionTables = serde_json::from_str(json)?;
        tables.aliases = tables
            .aliases
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v))
            .collect();
        tables.domains = tables
            .domains
            .into_iter()
            .map(|(k, v)| (k.trim().trim_start_matches('.').to_lowercase(), v))
            .collect();

        // Longest names first so "Google DeepMind" wins over a shorter prefix.
        let mut names: Vec<&str> = tables.companies.iter().map(String::as_str).collect();
        names.sort_by_key(|n| std::cmp::Reverse(n.len()));
        if !names.is_empty() {
            let alternation = names
                .iter()
                .map(|n| regex::escape(n))
                .collect::<Vec<_>>()
                .join("|");
            tables.company_pattern = Some(Regex::new(&format!(r"\b(?:{alternation})\b"))?);
        }
        Ok(tables)
    }

    pub fn canonical(&self, name: &str) -> Option<&str> {
        self.aliases
            .get(&name.trim().to_lowercase())
            .map(String::as_str)
    }

    /// Institution owning `host` or one of its parent domains.
    pub fn for_host(&self, host: &str) -> Option<&str> {
        let host = host.trim_end_matches('.').to_lowercase();
        let mut candidate = host.as_str();
        loop {
            if let Some(name) = self.domains.get(candidate) {
                return Some(name);
            }
            candidate = candidate.split_once('.')?.1;
        }
    }

    pub fn companies_in<'t>(&self, text: &'t str) -> impl Iterator<Item = &'t str> {
        self.company_pattern
            .iter()
            .flat_map(move |re| re.find_iter(text).map(|m| m.as_str()))
    }
}
