//! Sleep primitive for watchdogs and polling loops.

use async_trait::async_trait;
use std::time::Duration;

#[async_trait(?Send)]
pub trait Timer {
    async fn sleep(&self, duration: Duration);
}

/// `tokio::time::sleep`; needs a tokio runtime with the time driver.
#[cfg(feature = "native")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

#[cfg(feature = "native")]
#[async_trait(?Send)]
impl Timer for TokioTimer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
