use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding one-minute window over batch flushes.
#[derive(Debug)]
pub struct RateLimiter {
    per_minute: u32,
    window: Duration,
    history: VecDeque<Instant>,
}

impl RateLimiter {
    /// `per_minute = 0` disables throttling.
    pub fn per_minute(per_minute: u32) -> Self {
        Self {
            per_minute,
            window: WINDOW,
            history: VecDeque::with_capacity(per_minute as usize),
        }
    }

    /// Wait until one more write fits in the window, then record it.
    pub async fn acquire(&mut self) {
        if self.per_minute == 0 {
            return;
        }
        loop {
            let now = Instant::now();
            while let Some(oldest) = self.history.front() {
                if *oldest + self.window <= now {
                    self.history.pop_front();
                } else {
                    break;
                }
            }
            if self.history.len() < self.per_minute as usize {
                self.history.push_back(now);
                return;
            }
            if let Some(oldest) = self.history.front() {
                let wait = (*oldest + self.window).saturating_duration_since(now);
                debug!(wait_ms = wait.as_millis() as u64, "Write rate limit reached, waiting");
                sleep(wait).await;
            }
        }
    }
}
