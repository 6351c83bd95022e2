//! Core domain types for grantsync records and runs.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical stub columns, in persisted order.
pub const STUB_COLUMNS: [&str; 8] = [
    "date",
    "agency",
    "recipient",
    "value",
    "savings",
    "link",
    "description",
    "uploaded_dt",
];

/// Namespace prefix for columns merged from the award-lookup API.
pub const AWARD_PREFIX: &str = "usas_";

/// Column holding the run's scrape timestamp in the historical table.
pub const SCRAPE_TS_COLUMN: &str = "dt_scrape";

/// Format a run timestamp the way the historical table stores it.
pub fn run_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d-%H%M").to_string()
}

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for sync-run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// StubRecord
// ---------------------------------------------------------------------------

/// One normalized listing record. Output of the normalizer; the unit the
/// diff engine and enricher operate on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StubRecord {
    /// Disclosure date, when parsable.
    pub date: Option<NaiveDate>,
    /// Awarding agency.
    pub agency: String,
    /// Award recipient.
    pub recipient: String,
    /// Award value in dollars.
    pub value: Option<f64>,
    /// Claimed savings in dollars.
    pub savings: Option<f64>,
    /// Detail-page link. The identity key: empty means the record cannot
    /// participate in diffing or enrichment.
    pub link: String,
    /// Listing description (renamed from the source's description field).
    pub description: String,
    /// Upload timestamp parsed from the listing's `uploaded_on` text.
    pub uploaded_dt: Option<DateTime<Utc>>,
}

impl StubRecord {
    /// Whether this record carries a usable identity key.
    pub fn has_key(&self) -> bool {
        !self.link.is_empty()
    }

    /// Render the record as CSV fields aligned with [`STUB_COLUMNS`].
    pub fn to_fields(&self) -> Vec<String> {
        vec![
            self.date.map(|d| d.to_string()).unwrap_or_default(),
            self.agency.clone(),
            self.recipient.clone(),
            self.value.map(fmt_f64).unwrap_or_default(),
            self.savings.map(fmt_f64).unwrap_or_default(),
            self.link.clone(),
            self.description.clone(),
            self.uploaded_dt.map(|dt| dt.to_rfc3339()).unwrap_or_default(),
        ]
    }

    /// Rebuild a record from a CSV row, tolerating absent columns.
    /// Column names outside the canonical set are ignored here; the store
    /// routes award columns separately.
    pub fn from_columns(row: &BTreeMap<&str, &str>) -> Self {
        let get = |k: &str| row.get(k).copied().unwrap_or("").to_string();
        Self {
            date: row.get("date").and_then(|v| v.parse().ok()),
            agency: get("agency"),
            recipient: get("recipient"),
            value: row.get("value").and_then(|v| v.parse().ok()),
            savings: row.get("savings").and_then(|v| v.parse().ok()),
            link: get("link"),
            description: get("description"),
            uploaded_dt: row
                .get("uploaded_dt")
                .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// Format a float without trailing noise for whole-dollar amounts.
fn fmt_f64(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

// ---------------------------------------------------------------------------
// HistoricalRecord
// ---------------------------------------------------------------------------

/// A stub record promoted into the durable historical table: enrichment
/// fields under the [`AWARD_PREFIX`] namespace plus the run's scrape
/// timestamp. Owned exclusively by the merger once created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    /// The normalized listing fields.
    pub stub: StubRecord,
    /// Award-lookup fields, keys already `usas_`-prefixed. Empty when
    /// enrichment failed or was not attempted.
    pub award: BTreeMap<String, String>,
    /// Scrape timestamp of the run that first persisted this record.
    pub scraped_at: String,
}

/// The loaded historical dataset together with the column header actually
/// present in the CSV on disk. The header is what the diff engine's
/// column-set policy inspects.
#[derive(Debug, Clone, Default)]
pub struct HistoricalTable {
    /// Column names as read from disk; empty for a fresh dataset.
    pub columns: Vec<String>,
    /// All previously persisted records, in file order.
    pub records: Vec<HistoricalRecord>,
}

impl HistoricalTable {
    /// Whether the table holds no prior records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SyncCounts
// ---------------------------------------------------------------------------

/// Per-run bookkeeping surfaced to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    /// Records fetched across all listing pages.
    pub fetched: usize,
    /// Records in the fresh snapshot lacking an identity key.
    pub missing_key: usize,
    /// New records found by the diff.
    pub new: usize,
    /// New records successfully enriched.
    pub enriched: usize,
    /// New records persisted with empty enrichment after a failed lookup.
    pub enrichment_failed: usize,
    /// New records whose link was not award-addressable (no call attempted).
    pub not_addressable: usize,
    /// Duplicate keys discarded by the merger.
    pub duplicates_dropped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn run_timestamp_format() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 30).unwrap();
        assert_eq!(run_timestamp(ts), "2025-03-09-1405");
    }

    #[test]
    fn stub_fields_align_with_columns() {
        let record = StubRecord {
            date: Some(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()),
            agency: "Department of Example".into(),
            recipient: "Example University".into(),
            value: Some(1_500_000.0),
            savings: Some(250000.5),
            link: "https://example.gov/award/ABC-123".into(),
            description: "research grant".into(),
            uploaded_dt: Some(Utc.with_ymd_and_hms(2025, 1, 16, 0, 0, 0).unwrap()),
        };

        let fields = record.to_fields();
        assert_eq!(fields.len(), STUB_COLUMNS.len());
        assert_eq!(fields[0], "2025-01-15");
        assert_eq!(fields[3], "1500000");
        assert_eq!(fields[4], "250000.5");
        assert_eq!(fields[5], "https://example.gov/award/ABC-123");
    }

    #[test]
    fn stub_roundtrips_through_columns() {
        let record = StubRecord {
            date: Some(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()),
            agency: "HHS".into(),
            recipient: "Acme Labs".into(),
            value: Some(42.0),
            savings: None,
            link: "https://example.gov/award/X1".into(),
            description: "desc".into(),
            uploaded_dt: Some(Utc.with_ymd_and_hms(2025, 2, 2, 8, 30, 0).unwrap()),
        };

        let fields = record.to_fields();
        let row: BTreeMap<&str, &str> = STUB_COLUMNS
            .iter()
            .copied()
            .zip(fields.iter().map(String::as_str))
            .collect();
        let parsed = StubRecord::from_columns(&row);
        assert_eq!(parsed, record);
    }

    #[test]
    fn missing_columns_degrade_to_empty() {
        let row: BTreeMap<&str, &str> = [("agency", "GSA")].into_iter().collect();
        let parsed = StubRecord::from_columns(&row);
        assert_eq!(parsed.agency, "GSA");
        assert!(parsed.link.is_empty());
        assert!(parsed.date.is_none());
        assert!(!parsed.has_key());
    }
}
