//! Minimum spacing between outbound requests.
//!
//! Each source task owns its own [`RateLimiter`], so politeness is enforced
//! per task rather than through a shared lock.

use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::trace;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_delay: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last: None,
        }
    }

    /// Wait until at least `min_delay` has passed since the previous call returned.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let remaining = self.min_delay - elapsed;
                trace!(?remaining, "Rate limiting");
                sleep(remaining).await;
            }
        }
        self.last = Some(Instant::now());
    }
}
