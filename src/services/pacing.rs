use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::trace;

/// Randomized inter-request pacing.
///
/// `wait` is a plain async sleep: callers must not hold locks or proxy
/// reservations across it.
#[derive(Debug, Clone, Copy)]
pub struct PacedScheduler {
    min_ms: u64,
    max_ms: u64,
}

impl PacedScheduler {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: max_ms.max(min_ms),
        }
    }

    /// No pacing at all (tests, local feeds)
    pub fn disabled() -> Self {
        Self::new(0, 0)
    }

    pub fn window(&self) -> (u64, u64) {
        (self.min_ms, self.max_ms)
    }

    /// Sleep for the configured window
    pub async fn pause(&self) -> Duration {
        self.wait(self.min_ms, self.max_ms).await
    }

    /// Sleep a uniformly random duration in `[min_ms, max_ms]`
    pub async fn wait(&self, min_ms: u64, max_ms: u64) -> Duration {
        let delay = Self::draw(min_ms, max_ms);
        if !delay.is_zero() {
            trace!(delay_ms = delay.as_millis() as u64, "Pacing before request");
            sleep(delay).await;
        }
        delay
    }

    fn draw(min_ms: u64, max_ms: u64) -> Duration {
        let (low, high) = if min_ms <= max_ms { (min_ms, max_ms) } else { (max_ms, min_ms) };
        if low == high {
            return Duration::from_millis(low);
        }
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn test_draw_stays_in_window() {
        for _ in 0..500 {
            let delay = PacedScheduler::draw(500, 2000);
            assert!(delay >= Duration::from_millis(500) && delay <= Duration::from_millis(2000));
        }
        assert_eq!(PacedScheduler::draw(300, 300), Duration::from_millis(300));
        let swapped = PacedScheduler::draw(50, 10);
        assert!(swapped >= Duration::from_millis(10) && swapped <= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_sleeps_for_drawn_delay() {
        let scheduler = PacedScheduler::new(100, 200);
        let start = Instant::now();
        let delay = scheduler.pause().await;
        assert!(start.elapsed() >= delay);
        assert!(delay >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_disabled_does_not_sleep() {
        let delay = PacedScheduler::disabled().pause().await;
        assert!(delay.is_zero());
    }
}
