//! HTTP clients for the spending-disclosure pipeline.
//!
//! This crate provides:
//! - [`RateLimiter`] — rolling-window ceiling on outbound award lookups
//! - [`ListingClient`] — paged fetching of the primary listing API
//! - [`AwardClient`] — keyed lookups against the secondary award API

pub mod award;
pub mod limiter;
pub mod listing;

pub use award::{AwardClient, flatten_award};
pub use limiter::RateLimiter;
pub use listing::{ListingClient, RawRecord, USER_AGENT};
