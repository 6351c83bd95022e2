//! End-to-end sync run: fetch → normalize → diff → enrich → merge → persist.
//!
//! One logical run per invocation; the store's run lock serializes
//! overlapping invocations against the same data directory. Per-record
//! enrichment failures never fail the run; fetch, decode, and persist
//! errors do, and on a fatal error the on-disk historical table is left in
//! its pre-run state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use grantsync_client::{AwardClient, ListingClient, RateLimiter};
use grantsync_shared::{
    GrantSyncError, HistoricalRecord, Result, RunId, StubRecord, SyncConfig, SyncCounts,
    run_timestamp,
};
use grantsync_store::Store;

use crate::diff::diff_snapshot;
use crate::enrich::{self, EnrichStatus};
use crate::merge::merge_historical;
use crate::normalize::normalize;

/// Result of one completed sync run.
#[derive(Debug)]
pub struct SyncResult {
    /// Run identifier.
    pub run_id: RunId,
    /// Scrape timestamp stamped on records persisted by this run.
    pub scraped_at: String,
    /// The updated historical table, as persisted.
    pub historical: Vec<HistoricalRecord>,
    /// The fresh snapshot, as persisted.
    pub snapshot: Vec<StubRecord>,
    /// Per-run bookkeeping.
    pub counts: SyncCounts,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once the listing fetch completes.
    fn records_fetched(&self, count: usize);
    /// Called when a record finishes its enrichment attempt.
    fn record_enriched(&self, current: usize, total: usize, link: &str);
    /// Called when the run completes.
    fn done(&self, result: &SyncResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn records_fetched(&self, _count: usize) {}
    fn record_enriched(&self, _current: usize, _total: usize, _link: &str) {}
    fn done(&self, _result: &SyncResult) {}
}

/// Run the full sync pipeline.
///
/// 1. Acquire the run lock and load the historical table
/// 2. Fetch all listing pages
/// 3. Normalize into the fresh snapshot
/// 4. Diff against historical identity keys
/// 5. Enrich only the new records
/// 6. Merge, then persist both tables
#[instrument(skip_all, fields(endpoint = %config.endpoint))]
pub async fn run_sync(
    config: &SyncConfig,
    cancel: &CancellationToken,
    progress: &dyn ProgressReporter,
) -> Result<SyncResult> {
    let start = Instant::now();
    let run_id = RunId::new();
    let scraped_at = run_timestamp(Utc::now());

    info!(%run_id, scraped_at, "starting sync run");

    // --- Phase 1: Storage ---
    progress.phase("Loading current data");
    let store = Store::open(&config.data_dir, &config.endpoint)?;
    let historical = store.load_historical()?;

    // --- Phase 2: Fetch ---
    progress.phase("Fetching listing pages");
    let listing = ListingClient::new(config.listing.clone())?;
    let raw_records = listing.fetch_all_pages(&config.endpoint, cancel).await?;
    progress.records_fetched(raw_records.len());

    // --- Phase 3: Normalize ---
    progress.phase("Normalizing records");
    let snapshot: Vec<StubRecord> = raw_records.iter().map(normalize).collect();

    // --- Phase 4: Diff ---
    progress.phase("Finding new entries");
    let diff = diff_snapshot(&historical, &snapshot);

    // --- Phase 5: Enrich ---
    progress.phase("Extending new entries with award data");
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit.max_calls,
        Duration::from_secs(config.rate_limit.period_secs),
    ));
    let award_client = AwardClient::new(&config.award, limiter)?;

    let enriched = enrich::enrich_new_records(
        &award_client,
        &store,
        &config.endpoint,
        &scraped_at,
        diff.new_records,
        config.award.concurrency as usize,
        cancel,
        progress,
    )
    .await?;

    let mut counts = SyncCounts {
        fetched: snapshot.len(),
        missing_key: diff.missing_key,
        new: enriched.len(),
        ..Default::default()
    };
    for record in &enriched {
        match record.status {
            EnrichStatus::Enriched => counts.enriched += 1,
            EnrichStatus::Failed => counts.enrichment_failed += 1,
            EnrichStatus::NotAddressable => counts.not_addressable += 1,
        }
    }

    // --- Phase 6: Merge & persist ---
    if cancel.is_cancelled() {
        return Err(GrantSyncError::validation("run cancelled"));
    }
    progress.phase("Writing tables");

    let incoming: Vec<HistoricalRecord> = enriched
        .into_iter()
        .map(|r| HistoricalRecord {
            stub: r.stub,
            award: r.award,
            scraped_at: scraped_at.clone(),
        })
        .collect();

    let (merged, duplicates_dropped) = merge_historical(historical.records, incoming);
    counts.duplicates_dropped = duplicates_dropped;

    // Snapshot first: it is fully replaced every run, so a failure here
    // leaves the historical table in its pre-run state.
    store.write_snapshot(&snapshot)?;
    store.write_historical(&merged)?;

    let result = SyncResult {
        run_id,
        scraped_at,
        historical: merged,
        snapshot,
        counts,
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        run_id = %result.run_id,
        fetched = result.counts.fetched,
        new = result.counts.new,
        enriched = result.counts.enriched,
        failed = result.counts.enrichment_failed,
        elapsed_ms = result.elapsed.as_millis(),
        "sync run complete"
    );

    Ok(result)
}
