use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Enforces a minimum spacing between dispatched requests.
///
/// The dispatch time is recorded only when [`acquire`](Self::acquire)
/// returns, so a caller dropped while waiting leaves no trace. Waiters
/// re-check after waking, which keeps callers sharing one limiter spaced.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last_dispatch: Mutex::new(None) }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a request may be sent and record it as dispatched.
    pub async fn acquire(&self) {
        while let Err(slot) = self.try_claim(Instant::now()) {
            let wait = slot.saturating_duration_since(Instant::now());
            debug!(wait_ms = wait.as_millis() as u64, "Rate limit wait");
            sleep_until(slot).await;
        }
    }

    /// Claim `now` as a dispatch time, or return the earliest instant at
    /// which a claim could succeed.
    fn try_claim(&self, now: Instant) -> Result<(), Instant> {
        let mut last = self.last_dispatch.lock();
        if let Some(prev) = *last {
            let slot = prev + self.min_interval;
            if slot > now {
                return Err(slot);
            }
        }
        *last = Some(now);
        Ok(())
    }
}
