//! Requests-per-minute limiter over a sliding one-minute window

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const WINDOW: Duration = Duration::from_secs(60);

/// Client-side pacing for one provider.
///
/// Each adapter holds one and acquires it before every request, so several
/// concurrent item tasks against the same provider share the budget.
pub struct RateLimiter {
    requests_per_minute: u32,
    sent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute: requests_per_minute.max(1),
            sent: Mutex::new(VecDeque::new()),
        }
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    /// Wait until a request fits in the window, then record it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut sent = self.sent.lock().await;
                let now = Instant::now();
                prune(&mut sent, now);

                if sent.len() < self.requests_per_minute as usize {
                    sent.push_back(now);
                    return;
                }

                // full window: sleep until the oldest request ages out
                sent.front()
                    .map(|&oldest| WINDOW.saturating_sub(now.duration_since(oldest)))
                    .unwrap_or_default()
                    + Duration::from_millis(10)
            };

            tracing::debug!("Rate limit reached, waiting {}ms", wait.as_millis());
            tokio::time::sleep(wait).await;
        }
    }

    /// Requests recorded in the current window
    pub async fn in_flight_window(&self) -> usize {
        let mut sent = self.sent.lock().await;
        prune(&mut sent, Instant::now());
        sent.len()
    }
}

fn prune(sent: &mut VecDeque<Instant>, now: Instant) {
    while let Some(&front) = sent.front() {
        if now.duration_since(front) > WINDOW {
            sent.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_requests_within_budget_do_not_wait() {
        let limiter = RateLimiter::new(5);

        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(limiter.in_flight_window().await, 5);
    }

    #[tokio::test]
    async fn test_sixth_request_waits_for_window() {
        let limiter = RateLimiter::new(5);
        for _ in 0..5 {
            limiter.acquire().await;
        }

        let blocked = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(blocked.is_err());
    }

    #[test]
    fn test_zero_budget_is_clamped() {
        assert_eq!(RateLimiter::new(0).requests_per_minute(), 1);
    }
}
