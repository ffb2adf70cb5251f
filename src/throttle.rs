use std::time::Duration;

/// Fixed pause between collection-level operations, to stay clear of the
/// store's request-rate limits. Not a retry mechanism.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Throttle {
    interval: Duration,
}

impl Throttle {
    pub fn fixed(interval: Duration) -> Self {
        Throttle { interval }
    }

    pub fn none() -> Self {
        Throttle::default()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn pause(&self) {
        if !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
    }
}
