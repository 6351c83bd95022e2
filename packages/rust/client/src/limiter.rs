//! Rolling-window rate limiter for award-lookup calls.
//!
//! At most `max_calls` dispatches in any `period`-long window. Callers over
//! budget suspend until the oldest issued slot leaves the window. Issuance is
//! FIFO: the timestamp deque sits behind a fair async mutex that is held
//! across the wait, so waiters drain in arrival order.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Bounds outbound calls to `max_calls` per rolling `period`.
///
/// Cannot fail, only delay. Safe for concurrent acquisition across the
/// enrichment fan-out; it is the only synchronization point there.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    period: Duration,
    issued: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_calls` per `period`.
    pub fn new(max_calls: u32, period: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1) as usize,
            period,
            issued: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until a dispatch slot is free, then claim it.
    pub async fn acquire(&self) {
        let mut issued = self.issued.lock().await;
        loop {
            let now = Instant::now();
            while issued
                .front()
                .is_some_and(|t| now.duration_since(*t) >= self.period)
            {
                issued.pop_front();
            }

            if issued.len() < self.max_calls {
                issued.push_back(now);
                return;
            }

            // Oldest slot frees up first; sleep until it ages out.
            let oldest = *issued.front().expect("deque is at capacity");
            tokio::time::sleep_until(oldest + self.period).await;
        }
    }
}
