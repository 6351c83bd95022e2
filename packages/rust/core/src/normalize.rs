//! Raw listing records → canonical stub records.
//!
//! A pure per-record transform: no shared table state, so enrichment can
//! fan out over the output safely. Malformed field values degrade to
//! empty/None; a malformed record is never dropped. Identical input always
//! yields identical output.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use grantsync_client::RawRecord;
use grantsync_shared::StubRecord;

/// Normalize one raw listing item into the canonical stub schema.
///
/// Field names are lower-snaked before lookup, the listing's description
/// field maps to the canonical `description` column, `uploaded_on` is parsed
/// into `uploaded_dt`, and a recipient of `"N/A"` is treated as absent.
pub fn normalize(raw: &RawRecord) -> StubRecord {
    let fields: Vec<(String, &Value)> = raw
        .iter()
        .map(|(k, v)| (snake_case(k), v))
        .collect();
    let get = |name: &str| fields.iter().find(|(k, _)| k == name).map(|(_, v)| *v);

    let recipient = get_string(get("recipient"));
    let recipient = if recipient == "N/A" { String::new() } else { recipient };

    StubRecord {
        date: get_str(get("date")).and_then(parse_date),
        agency: get_string(get("agency")),
        recipient,
        value: get_f64(get("value")),
        savings: get_f64(get("savings")),
        link: get_string(get("link")),
        description: get_string(get("description")),
        uploaded_dt: get_str(get("uploaded_on")).and_then(parse_datetime),
    }
}

/// Lower-snake a field name the way the listing columns are canonicalized.
fn snake_case(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

fn get_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str)
}

fn get_string(value: Option<&Value>) -> String {
    get_str(value).unwrap_or("").to_string()
}

/// Numbers arrive as JSON numbers or as numeric text, sometimes with `$`
/// and thousands separators. Anything else is None.
fn get_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches('$')
                .chars()
                .filter(|c| *c != ',')
                .collect();
            cleaned.parse().ok()
        }
        _ => None,
    }
}

/// Parse a date-only field; unparsable text is None, never an error.
fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%m/%d/%Y"))
        .ok()
}

/// Parse an upload timestamp; accepts RFC 3339, bare datetimes, or a plain
/// date (midnight UTC). Unparsable text is None.
fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.and_utc());
        }
    }
    parse_date(text).map(|d| d.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc())
}
