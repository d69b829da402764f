//! Shared request throttle for the Vika API

use bridge_traits::time::Clock;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

/// Minimum spacing between API calls
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1200);

/// Upper bound of the random extra delay added to each spacing
pub const DEFAULT_JITTER: Duration = Duration::from_millis(400);

/// Global throttle shared by every connector talking to the same account.
///
/// Consecutive [`acquire`](RateLimiter::acquire) calls return at least
/// `min_interval + uniform(0, jitter)` apart. Callers queue on an async mutex,
/// so concurrent tasks are serialized rather than bursting.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    min_interval: Duration,
    jitter: Duration,
    last_request_ms: Mutex<Option<i64>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, jitter: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            min_interval,
            jitter,
            last_request_ms: Mutex::new(None),
        }
    }

    /// Limiter with no spacing at all
    pub fn unthrottled(clock: Arc<dyn Clock>) -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, clock)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    fn spacing(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.min_interval + Duration::from_millis(extra)
    }

    /// Wait until the next request is allowed, then claim the slot.
    pub async fn acquire(&self) {
        let mut last = self.last_request_ms.lock().await;

        if let Some(last_ms) = *last {
            let required_ms = self.spacing().as_millis() as i64;
            let elapsed_ms = self.clock.unix_timestamp_millis() - last_ms;
            if elapsed_ms < required_ms {
                let wait_time = Duration::from_millis((required_ms - elapsed_ms) as u64);
                debug!("Rate limiting: waiting {:?}", wait_time);
                sleep(wait_time).await;
            }
        }

        *last = Some(self.clock.unix_timestamp_millis());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::time::ManualClock;
    use chrono::{TimeZone, Utc};
    use tokio::time::Instant;

    fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_request_is_immediate() {
        let limiter = RateLimiter::new(DEFAULT_MIN_INTERVAL, DEFAULT_JITTER, manual_clock());

        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_requests_are_spaced() {
        let limiter = RateLimiter::new(
            Duration::from_millis(1200),
            Duration::from_millis(400),
            manual_clock(),
        );

        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        let waited = start.elapsed();

        assert!(waited >= Duration::from_millis(1200), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(1700), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_time_counts_toward_spacing() {
        let clock = manual_clock();
        let limiter = RateLimiter::new(Duration::from_millis(1200), Duration::ZERO, clock.clone());

        limiter.acquire().await;
        clock.advance(chrono::Duration::milliseconds(1000));

        let start = Instant::now();
        limiter.acquire().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(200), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(300), "waited {:?}", waited);

        clock.advance(chrono::Duration::seconds(5));
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
