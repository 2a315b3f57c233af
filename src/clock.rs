//! Injectable time source so the poll and scheduler loops can be driven
//! instantly in tests.

use std::time::Duration;

use async_trait::async_trait;

/// The single suspension point used by all orchestrator loops.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by the tokio timer.
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
