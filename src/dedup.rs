use std::collections::HashSet;

use tracing::debug;

use crate::paper::Paper;

/// Merge batches into one list with no two papers sharing a normalised
/// title. The first occurrence wins, in batch order and then record order;
/// later copies are dropped even if they carry a different link, date or
/// citation count.
pub fn merge<I>(batches: I) -> Vec<Paper>
where
    I: IntoIterator<Item = Vec<Paper>>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for paper in batches.into_iter().flatten() {
        if seen.insert(paper.identity()) {
            merged.push(paper);
        } else {
            debug!(title = %paper.title, "dropping duplicate");
        }
    }
    merged
}
