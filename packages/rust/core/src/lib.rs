//! Core pipeline orchestration and domain logic for grantsync.
//!
//! This crate ties together paged fetching, normalization, change
//! detection, rate-limited enrichment, and persistence into the end-to-end
//! [`pipeline::run_sync`] workflow.

pub mod diff;
pub mod enrich;
pub mod merge;
pub mod normalize;
pub mod pipeline;

pub use diff::{DiffResult, diff_snapshot};
pub use enrich::{EnrichStatus, EnrichedRecord, award_id_from_link};
pub use merge::merge_historical;
pub use normalize::normalize;
pub use pipeline::{ProgressReporter, SilentProgress, SyncResult, run_sync};
