//! Clock port.
//!
//! Every polling loop in the runtime sleeps through this trait so that
//! budgets expressed as (max-attempts, tick-interval) pairs can run against
//! a test clock in milliseconds instead of minutes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

/// Source of delay for polling loops.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock whose sleeps return immediately, counting each call.
///
/// The single yield keeps cooperative scheduling alive so concurrent
/// workers still make progress between ticks.
#[derive(Debug, Default)]
pub struct NullClock {
    sleeps: AtomicU64,
}

impl NullClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `sleep` has been awaited.
    pub fn sleep_count(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Clock for NullClock {
    async fn sleep(&self, _duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_clock_counts_sleeps() {
        let clock = NullClock::new();
        clock.sleep(Duration::from_secs(60)).await;
        clock.sleep(Duration::from_secs(60)).await;
        assert_eq!(clock.sleep_count(), 2);
    }
}
