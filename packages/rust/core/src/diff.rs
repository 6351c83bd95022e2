//! Change detection between the fresh snapshot and the historical table.
//!
//! Identity-key diffing on the detail link: a fresh record is new iff its
//! non-empty link is absent from the historical key set. O(fresh +
//! historical), deterministic, and robust to reordering and cosmetic drift
//! in unrelated columns.

use std::collections::HashSet;

use tracing::{info, warn};

use grantsync_shared::{HistoricalTable, STUB_COLUMNS, StubRecord};

/// Outcome of diffing one snapshot against the historical table.
#[derive(Debug, Default)]
pub struct DiffResult {
    /// Fresh records not yet in the historical table, in snapshot order.
    pub new_records: Vec<StubRecord>,
    /// Fresh records excluded for lacking an identity key.
    pub missing_key: usize,
    /// Whether the column-set policy forced treat-all-as-new.
    pub schema_mismatch: bool,
}

/// Diff `snapshot` against `historical` by identity key.
///
/// Column-set policy: if the canonical stub columns are not a subset of the
/// historical file's columns, keys cannot be compared safely; every keyed
/// fresh record is treated as new (conservative bias toward re-processing)
/// and a diagnostic is emitted. Records without a key are excluded from the
/// result either way — they still belong to the persisted snapshot, just
/// not to diffing or enrichment.
pub fn diff_snapshot(historical: &HistoricalTable, snapshot: &[StubRecord]) -> DiffResult {
    let mut result = DiffResult::default();

    let columns_comparable = historical.columns.is_empty()
        || STUB_COLUMNS
            .iter()
            .all(|c| historical.columns.iter().any(|h| h == c));

    if !columns_comparable {
        warn!(
            historical_columns = ?historical.columns,
            fresh_columns = ?STUB_COLUMNS,
            "column mismatch between snapshot and historical table, treating all fresh records as new"
        );
        result.schema_mismatch = true;
        for record in snapshot {
            if record.has_key() {
                result.new_records.push(record.clone());
            } else {
                result.missing_key += 1;
            }
        }
        return result;
    }

    let known_keys: HashSet<&str> = historical
        .records
        .iter()
        .map(|r| r.stub.link.as_str())
        .filter(|k| !k.is_empty())
        .collect();

    for record in snapshot {
        if !record.has_key() {
            result.missing_key += 1;
        } else if !known_keys.contains(record.link.as_str()) {
            result.new_records.push(record.clone());
        }
    }

    info!(
        new = result.new_records.len(),
        known = known_keys.len(),
        missing_key = result.missing_key,
        "snapshot diff computed"
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use grantsync_shared::HistoricalRecord;

    fn stub(link: &str) -> StubRecord {
        StubRecord {
            link: link.into(),
            agency: "GSA".into(),
            ..Default::default()
        }
    }

    fn table(links: &[&str]) -> HistoricalTable {
        let mut columns: Vec<String> = STUB_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.push("dt_scrape".into());
        HistoricalTable {
            columns,
            records: links
                .iter()
                .map(|l| HistoricalRecord {
                    stub: stub(l),
                    ..Default::default()
                })
                .collect(),
        }
    }

    #[test]
    fn finds_only_unknown_keys() {
        let historical = table(&["https://x.gov/a", "https://x.gov/b"]);
        let snapshot = vec![stub("https://x.gov/a"), stub("https://x.gov/b"), stub("https://x.gov/c")];

        let diff = diff_snapshot(&historical, &snapshot);
        assert_eq!(diff.new_records.len(), 1);
        assert_eq!(diff.new_records[0].link, "https://x.gov/c");
        assert!(!diff.schema_mismatch);
    }

    #[test]
    fn empty_historical_means_all_new() {
        let diff = diff_snapshot(&HistoricalTable::default(), &[stub("https://x.gov/a")]);
        assert_eq!(diff.new_records.len(), 1);
        assert!(!diff.schema_mismatch);
    }

    #[test]
    fn keyless_records_are_excluded_but_counted() {
        let historical = table(&["https://x.gov/a"]);
        let snapshot = vec![stub(""), stub("https://x.gov/a"), stub("")];

        let diff = diff_snapshot(&historical, &snapshot);
        assert!(diff.new_records.is_empty());
        assert_eq!(diff.missing_key, 2);
    }

    #[test]
    fn robust_to_cosmetic_drift_in_other_columns() {
        let historical = table(&["https://x.gov/a"]);
        let mut changed = stub("https://x.gov/a");
        changed.description = "re-worded description".into();
        changed.agency = "Renamed Agency".into();

        let diff = diff_snapshot(&historical, &[changed]);
        assert!(diff.new_records.is_empty());
    }

    #[test]
    fn column_mismatch_treats_all_keyed_as_new() {
        // Legacy historical file missing the link column entirely.
        let historical = HistoricalTable {
            columns: vec!["date".into(), "agency".into(), "dt_scrape".into()],
            records: vec![HistoricalRecord {
                stub: stub("https://x.gov/a"),
                ..Default::default()
            }],
        };
        let snapshot = vec![stub("https://x.gov/a"), stub("https://x.gov/b"), stub("")];

        let diff = diff_snapshot(&historical, &snapshot);
        assert!(diff.schema_mismatch);
        assert_eq!(diff.new_records.len(), 2);
        assert_eq!(diff.missing_key, 1);
    }

    #[test]
    fn reordered_snapshot_yields_same_new_set() {
        let historical = table(&["https://x.gov/b"]);
        let forward = vec![stub("https://x.gov/a"), stub("https://x.gov/b")];
        let reversed = vec![stub("https://x.gov/b"), stub("https://x.gov/a")];

        let d1 = diff_snapshot(&historical, &forward);
        let d2 = diff_snapshot(&historical, &reversed);
        assert_eq!(d1.new_records, d2.new_records);
    }
}
