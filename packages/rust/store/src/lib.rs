//! CSV-backed persistence for the sync pipeline.
//!
//! The [`Store`] owns one data directory and, for its lifetime, the
//! exclusive run lock inside it — two overlapping runs against the same
//! dataset cannot both hold it, which is what keeps the historical table
//! append-only under concurrent invocation.
//!
//! **Files:**
//! - `<endpoint>.csv` — historical table, rewritten atomically each run
//! - `<endpoint>-stub.csv` — latest snapshot, fully replaced each run
//! - `err-req.log` — append-only enrichment failure log
//! - `.grantsync.lock` — run lockfile, held open → removed on drop

use std::collections::{BTreeMap, BTreeSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use grantsync_shared::{
    AWARD_PREFIX, GrantSyncError, HistoricalRecord, HistoricalTable, Result, SCRAPE_TS_COLUMN,
    STUB_COLUMNS, StubRecord,
};

/// Run lockfile name inside the data directory.
const LOCK_FILE_NAME: &str = ".grantsync.lock";

/// Enrichment failure log name.
const ERROR_LOG_NAME: &str = "err-req.log";

/// Handle to one endpoint's persisted dataset. Holds the run lock.
#[derive(Debug)]
pub struct Store {
    data_dir: PathBuf,
    endpoint: String,
    lock_path: PathBuf,
}

impl Store {
    /// Open the data directory for `endpoint`, acquiring the exclusive run
    /// lock. Fails with a storage error if another run holds it.
    pub fn open(data_dir: &Path, endpoint: &str) -> Result<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| GrantSyncError::io(data_dir, e))?;

        let lock_path = data_dir.join(LOCK_FILE_NAME);
        match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(mut file) => {
                // Record the owning pid for operators cleaning up a crash.
                let _ = writeln!(file, "{}", std::process::id());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(GrantSyncError::Storage(format!(
                    "another run holds the lock at {} (remove it if that run crashed)",
                    lock_path.display()
                )));
            }
            Err(e) => return Err(GrantSyncError::io(&lock_path, e)),
        }

        debug!(data_dir = %data_dir.display(), endpoint, "store opened, run lock acquired");

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            endpoint: endpoint.to_string(),
            lock_path,
        })
    }

    /// Path of the historical table CSV.
    pub fn historical_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.csv", self.endpoint))
    }

    /// Path of the latest-snapshot CSV.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}-stub.csv", self.endpoint))
    }

    /// Path of the append-only enrichment failure log.
    pub fn error_log_path(&self) -> PathBuf {
        self.data_dir.join(ERROR_LOG_NAME)
    }

    // -----------------------------------------------------------------------
    // Historical table
    // -----------------------------------------------------------------------

    /// Load the historical table. A missing, empty, or unreadable file
    /// degrades to an empty table with a warning rather than failing the run.
    pub fn load_historical(&self) -> Result<HistoricalTable> {
        let path = self.historical_path();

        if !path.exists() || std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true) {
            debug!(path = %path.display(), "no historical table yet");
            return Ok(HistoricalTable::default());
        }

        match read_historical_csv(&path) {
            Ok(table) => {
                info!(records = table.records.len(), "historical table loaded");
                Ok(table)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read historical table, starting empty");
                Ok(HistoricalTable::default())
            }
        }
    }

    /// Write the historical table atomically (temp file + rename). On any
    /// failure before the rename, the previous file is untouched.
    pub fn write_historical(&self, records: &[HistoricalRecord]) -> Result<()> {
        let columns = historical_columns(records);
        let path = self.historical_path();

        self.write_atomic(&path, |writer| {
            writer
                .write_record(&columns)
                .map_err(|e| GrantSyncError::Storage(format!("write header: {e}")))?;

            for record in records {
                let mut fields = record.stub.to_fields();
                for col in columns.iter().skip(STUB_COLUMNS.len()) {
                    if col == SCRAPE_TS_COLUMN {
                        fields.push(record.scraped_at.clone());
                    } else {
                        fields.push(record.award.get(col).cloned().unwrap_or_default());
                    }
                }
                writer
                    .write_record(&fields)
                    .map_err(|e| GrantSyncError::Storage(format!("write record: {e}")))?;
            }
            Ok(())
        })?;

        info!(records = records.len(), columns = columns.len(), path = %path.display(), "historical table written");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Snapshot table
    // -----------------------------------------------------------------------

    /// Write the latest snapshot, fully replacing the previous one.
    pub fn write_snapshot(&self, records: &[StubRecord]) -> Result<()> {
        let path = self.snapshot_path();

        self.write_atomic(&path, |writer| {
            writer
                .write_record(STUB_COLUMNS)
                .map_err(|e| GrantSyncError::Storage(format!("write header: {e}")))?;
            for record in records {
                writer
                    .write_record(&record.to_fields())
                    .map_err(|e| GrantSyncError::Storage(format!("write record: {e}")))?;
            }
            Ok(())
        })?;

        info!(records = records.len(), path = %path.display(), "snapshot written");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Error log
    // -----------------------------------------------------------------------

    /// Append one enrichment failure line: `{category},{run_timestamp},{url}`.
    pub fn log_enrichment_failure(&self, category: &str, run_ts: &str, url: &str) -> Result<()> {
        let path = self.error_log_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| GrantSyncError::io(&path, e))?;
        writeln!(file, "{category},{run_ts},{url}").map_err(|e| GrantSyncError::io(&path, e))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Write a CSV to `.{name}.tmp` and rename over `path`. The rename is
    /// the commit point.
    fn write_atomic(
        &self,
        path: &Path,
        fill: impl FnOnce(&mut csv::Writer<std::fs::File>) -> Result<()>,
    ) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| GrantSyncError::Storage(format!("bad path: {}", path.display())))?;
        let temp = self.data_dir.join(format!(".{file_name}.tmp"));

        let file = std::fs::File::create(&temp).map_err(|e| GrantSyncError::io(&temp, e))?;
        let mut writer = csv::Writer::from_writer(file);

        let result = fill(&mut writer).and_then(|()| {
            writer
                .flush()
                .map_err(|e| GrantSyncError::io(&temp, e))
        });

        if let Err(e) = result {
            let _ = std::fs::remove_file(&temp);
            return Err(e);
        }
        drop(writer);

        std::fs::rename(&temp, path).map_err(|e| GrantSyncError::io(path, e))
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            warn!(path = %self.lock_path.display(), error = %e, "failed to remove run lock");
        }
    }
}

/// Historical header: canonical stub columns, then the sorted union of award
/// columns across all records, then the scrape timestamp.
fn historical_columns(records: &[HistoricalRecord]) -> Vec<String> {
    let award_columns: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.award.keys().map(String::as_str))
        .collect();

    STUB_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(award_columns.into_iter().map(String::from))
        .chain(std::iter::once(SCRAPE_TS_COLUMN.to_string()))
        .collect()
}

/// Parse the historical CSV back into typed records, routing `usas_` columns
/// into the award map and tolerating schema drift in older files.
fn read_historical_csv(path: &Path) -> Result<HistoricalTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| GrantSyncError::Storage(format!("{}: {e}", path.display())))?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| GrantSyncError::Storage(format!("{}: {e}", path.display())))?
        .iter()
        .map(String::from)
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| GrantSyncError::Storage(format!("{}: {e}", path.display())))?;

        let cells: BTreeMap<&str, &str> = columns
            .iter()
            .map(String::as_str)
            .zip(row.iter())
            .collect();

        let award: BTreeMap<String, String> = cells
            .iter()
            .filter(|(k, v)| k.starts_with(AWARD_PREFIX) && !v.is_empty())
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        records.push(HistoricalRecord {
            stub: StubRecord::from_columns(&cells),
            award,
            scraped_at: cells.get(SCRAPE_TS_COLUMN).copied().unwrap_or("").to_string(),
        });
    }

    Ok(HistoricalTable { columns, records })
}
