use std::time::Duration;

use tokio::time::Instant;

/// Fixed-window token counter: `limit` grants per `window`.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    limit: u64,
    window: Duration,
    window_start: Instant,
    used: u64,
}

impl TokenBucket {
    pub(crate) fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window,
            window_start: Instant::now(),
            used: 0,
        }
    }

    /// Takes one token if the current window has any left.
    pub(crate) fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.used = 0;
        }
        if self.used < self.limit {
            self.used = self.used.saturating_add(1);
            true
        } else {
            false
        }
    }
}
