//! Per-record enrichment of newly discovered records.
//!
//! Each new record whose link is an award-addressable URL gets one lookup
//! against the secondary API, through the shared rate limiter. Failures are
//! isolated per record: the record is kept with empty enrichment fields and
//! one line is appended to the error log. A link that is not an http(s) URL
//! with a final path segment is skipped silently — no call, no log line.
//!
//! The award id is the last path segment of the link. That the link keeps
//! this shape is a documented precondition of the source API, not something
//! validated further here.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use grantsync_client::AwardClient;
use grantsync_shared::{GrantSyncError, Result, StubRecord};
use grantsync_store::Store;

use crate::pipeline::ProgressReporter;

/// How one record's enrichment ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichStatus {
    /// Award data merged.
    Enriched,
    /// Link not award-addressable; no call attempted.
    NotAddressable,
    /// Lookup failed; logged, record kept unenriched.
    Failed,
}

/// A new record after its enrichment attempt.
#[derive(Debug, Clone)]
pub struct EnrichedRecord {
    /// The normalized listing record.
    pub stub: StubRecord,
    /// `usas_`-prefixed award fields; empty unless [`EnrichStatus::Enriched`].
    pub award: BTreeMap<String, String>,
    /// Outcome for bookkeeping.
    pub status: EnrichStatus,
}

/// Derive the award id from a detail link: the last non-empty path segment
/// of an http(s) URL. None means the record is not addressable.
pub fn award_id_from_link(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()
        .map(String::from)
}

/// Enrich `records` with bounded, order-preserving concurrency.
///
/// No per-record failure aborts the batch; output order matches input
/// order. Cancellation is observed between records and aborts the run
/// without persisting — failure lines already logged stay logged.
pub async fn enrich_new_records(
    client: &AwardClient,
    store: &Store,
    category: &str,
    run_ts: &str,
    records: Vec<StubRecord>,
    concurrency: usize,
    cancel: &CancellationToken,
    progress: &dyn ProgressReporter,
) -> Result<Vec<EnrichedRecord>> {
    let total = records.len();
    let completed = AtomicUsize::new(0);

    let outcomes: Vec<Result<EnrichedRecord>> = stream::iter(records)
        .map(|stub| {
            let completed = &completed;
            async move {
                if cancel.is_cancelled() {
                    return Err(GrantSyncError::validation("run cancelled"));
                }

                let record = enrich_one(client, store, category, run_ts, stub).await;
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                progress.record_enriched(done, total, &record.stub.link);
                Ok(record)
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let results: Vec<EnrichedRecord> = outcomes.into_iter().collect::<Result<_>>()?;

    let enriched = results
        .iter()
        .filter(|r| r.status == EnrichStatus::Enriched)
        .count();
    info!(total, enriched, "enrichment pass complete");

    Ok(results)
}

/// One record's enrichment attempt. Never returns an error: failure is a
/// state of the record, not of the batch.
async fn enrich_one(
    client: &AwardClient,
    store: &Store,
    category: &str,
    run_ts: &str,
    stub: StubRecord,
) -> EnrichedRecord {
    let Some(award_id) = award_id_from_link(&stub.link) else {
        debug!(link = %stub.link, "link not award-addressable, skipping lookup");
        return EnrichedRecord {
            stub,
            award: BTreeMap::new(),
            status: EnrichStatus::NotAddressable,
        };
    };

    match client.lookup(&award_id).await {
        Ok(award) => EnrichedRecord {
            stub,
            award,
            status: EnrichStatus::Enriched,
        },
        Err(e) => {
            let url = client.lookup_url(&award_id);
            warn!(%url, error = %e, "award lookup failed, keeping record unenriched");
            if let Err(log_err) = store.log_enrichment_failure(category, run_ts, &url) {
                warn!(error = %log_err, "could not append to error log");
            }
            EnrichedRecord {
                stub,
                award: BTreeMap::new(),
                status: EnrichStatus::Failed,
            }
        }
    }
}
