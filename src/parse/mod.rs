//! Turning raw source records into [`Paper`]s. No I/O happens here.

pub mod date;

mod arxiv;
mod scholar;

pub use arxiv::from_arxiv_entry;
pub use scholar::from_scholar_result;

use tracing::{debug, warn};

use crate::paper::Paper;

/// Parse every record, logging and skipping the ones that can't be read.
/// Returns the papers and the number of skipped records.
pub fn parse_all<R>(
    records: &[R],
    source: &str,
    parse: impl Fn(&R) -> anyhow::Result<Paper>,
) -> (Vec<Paper>, usize) {
    let mut papers = Vec::with_capacity(records.len());
    let mut skipped = 0;
    for (i, record) in records.iter().enumerate() {
        match parse(record) {
            Ok(p) => {
                debug!(source, title = %p.title, "parsed record");
                papers.push(p);
            }
            Err(e) => {
                warn!(source, index = i, error = %e, "skipping unreadable record");
                skipped += 1;
            }
        }
    }
    (papers, skipped)
}
