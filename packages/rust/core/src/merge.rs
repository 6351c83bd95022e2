//! Appending enriched records to the historical set.
//!
//! Runs are append-only with respect to identity key, and at most one
//! historical record may exist per key afterwards. Duplicates are resolved
//! by keeping the earliest-created record and discarding later ones with a
//! diagnostic — never by overwriting silently.

use std::collections::HashSet;

use tracing::warn;

use grantsync_shared::HistoricalRecord;

/// Append `incoming` to `existing`, suppressing duplicate identity keys.
///
/// `existing` precedes `incoming`, so the earliest-created record for a key
/// always wins. Keyless legacy rows are kept as-is; they never collide.
/// Returns the merged table and the number of duplicates discarded.
pub fn merge_historical(
    existing: Vec<HistoricalRecord>,
    incoming: Vec<HistoricalRecord>,
) -> (Vec<HistoricalRecord>, usize) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::with_capacity(existing.len() + incoming.len());
    let mut dropped = 0;

    for record in existing.into_iter().chain(incoming) {
        let key = record.stub.link.as_str();
        if key.is_empty() {
            merged.push(record);
            continue;
        }
        if seen.contains(key) {
            warn!(key, scraped_at = %record.scraped_at, "duplicate identity key, keeping earliest record");
            dropped += 1;
            continue;
        }
        seen.insert(key.to_string());
        merged.push(record);
    }

    (merged, dropped)
}
