//! Injected time source so retry delays, poll intervals, and outage windows
//! are controllable in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Time and sleep provider used by every component that waits or stamps.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by tokio's timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
