//! Minimum-interval throttle for outbound platform requests.

use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Per-adapter request throttle.
///
/// Keeps the time of the last request and suspends callers so that
/// consecutive requests are at least `60 / requests_per_minute` seconds
/// apart. A zero requests-per-minute ceiling disables throttling.
pub struct Throttle {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Throttle {
    /// Create a throttle from a requests-per-minute ceiling.
    pub fn new(requests_per_minute: u32) -> Self {
        let min_interval = if requests_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(60.0 / requests_per_minute as f64)
        };
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Suspend until the minimum interval since the previous request has
    /// elapsed, then mark the current request.
    pub async fn throttle(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_request_is_immediate() {
        let throttle = Throttle::new(60);

        let start = Instant::now();
        throttle.throttle().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_waits_min_interval() {
        // 60 rpm = 1 second between requests
        let throttle = Throttle::new(60);

        throttle.throttle().await;
        let start = Instant::now();
        throttle.throttle().await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_time_counts_toward_interval() {
        let throttle = Throttle::new(60);

        throttle.throttle().await;
        tokio::time::advance(Duration::from_millis(600)).await;

        let start = Instant::now();
        throttle.throttle().await;
        assert_eq!(start.elapsed(), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_long_idle() {
        let throttle = Throttle::new(60);

        throttle.throttle().await;
        tokio::time::advance(Duration::from_secs(5)).await;

        let start = Instant::now();
        throttle.throttle().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rpm_disables_throttling() {
        let throttle = Throttle::new(0);

        let start = Instant::now();
        for _ in 0..10 {
            throttle.throttle().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_rpm_long_interval() {
        // 5 rpm = 12 seconds between requests
        let throttle = Throttle::new(5);

        throttle.throttle().await;
        let start = Instant::now();
        throttle.throttle().await;
        assert_eq!(start.elapsed(), Duration::from_secs(12));
    }
}
