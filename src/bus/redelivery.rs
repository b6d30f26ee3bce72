//! Redelivering event bus wrapper for testing at-least-once delivery.
//!
//! Wraps any `EventBus` implementation and publishes some events twice,
//! based on a configurable probability. Consumers behind it must produce the
//! same projections as they would with exactly-once delivery.
//!
//! # Example
//!
//! ```ignore
//! use postdex::bus::{ChannelEventBus, RedeliveringEventBus, RedeliveryConfig};
//!
//! // Deliver every event twice
//! let bus = RedeliveringEventBus::new(ChannelEventBus::publisher(), RedeliveryConfig::always());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, warn};

use super::{EventBus, EventHandler, Result};
use crate::events::{EventEnvelope, EventKind};

/// Configuration for redelivery behavior.
#[derive(Clone, Debug)]
pub struct RedeliveryConfig {
    /// Probability of publishing an event a second time (0.0 to 1.0).
    pub duplicate_rate: f64,
    /// Whether to log duplicated events.
    pub log_duplicates: bool,
}

impl Default for RedeliveryConfig {
    fn default() -> Self {
        Self::none()
    }
}

impl RedeliveryConfig {
    /// Never duplicate (pass-through).
    pub fn none() -> Self {
        Self {
            duplicate_rate: 0.0,
            log_duplicates: false,
        }
    }

    /// Duplicate with the given probability, clamped to `[0, 1]`.
    pub fn with_duplicate_rate(rate: f64) -> Self {
        Self {
            duplicate_rate: rate.clamp(0.0, 1.0),
            log_duplicates: true,
        }
    }

    /// Duplicate every event.
    pub fn always() -> Self {
        Self::with_duplicate_rate(1.0)
    }

    pub fn is_redelivering(&self) -> bool {
        self.duplicate_rate > 0.0
    }
}

/// Counters for the redelivering bus.
#[derive(Debug, Default)]
pub struct RedeliveryStats {
    /// Events received for publish.
    pub total: AtomicU64,
    /// Events published a second time.
    pub duplicated: AtomicU64,
}

impl RedeliveryStats {
    /// `(total, duplicated)`.
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.total.load(Ordering::Relaxed),
            self.duplicated.load(Ordering::Relaxed),
        )
    }
}

/// Wrapper that publishes some events twice.
pub struct RedeliveringEventBus<B: EventBus> {
    inner: B,
    config: RedeliveryConfig,
    stats: Arc<RedeliveryStats>,
}

impl<B: EventBus> RedeliveringEventBus<B> {
    pub fn new(inner: B, config: RedeliveryConfig) -> Self {
        if config.is_redelivering() {
            warn!(
                duplicate_rate = config.duplicate_rate,
                "Redelivering event bus enabled - events may be delivered twice"
            );
        }

        Self {
            inner,
            config,
            stats: Arc::new(RedeliveryStats::default()),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn stats(&self) -> &RedeliveryStats {
        &self.stats
    }

    fn should_duplicate(&self) -> bool {
        if self.config.duplicate_rate <= 0.0 {
            return false;
        }
        if self.config.duplicate_rate >= 1.0 {
            return true;
        }
        rand::rng().random::<f64>() < self.config.duplicate_rate
    }
}

#[async_trait]
impl<B: EventBus> EventBus for RedeliveringEventBus<B> {
    async fn publish(&self, event: Arc<EventEnvelope>) -> Result<()> {
        self.stats.total.fetch_add(1, Ordering::Relaxed);
        self.inner.publish(Arc::clone(&event)).await?;

        if self.should_duplicate() {
            self.stats.duplicated.fetch_add(1, Ordering::Relaxed);
            if self.config.log_duplicates {
                debug!(kind = %event.kind(), post_id = %event.event.post_id(), "Redelivering event");
            }
            self.inner.publish(event).await?;
        }
        Ok(())
    }

    async fn subscribe(&self, handler: Box<dyn EventHandler>) -> Result<()> {
        self.inner.subscribe(handler).await
    }

    async fn start_consuming(&self) -> Result<()> {
        self.inner.start_consuming().await
    }

    async fn create_subscriber(
        &self,
        name: &str,
        kind: Option<EventKind>,
    ) -> Result<Arc<dyn EventBus>> {
        self.inner.create_subscriber(name, kind).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MockEventBus;
    use crate::test_utils::sample_post_liked;

    fn liked() -> Arc<EventEnvelope> {
        Arc::new(EventEnvelope::new(sample_post_liked("p1", 7, 1)))
    }

    #[test]
    fn test_config_clamps_rate() {
        assert_eq!(RedeliveryConfig::with_duplicate_rate(-1.0).duplicate_rate, 0.0);
        assert_eq!(RedeliveryConfig::with_duplicate_rate(2.0).duplicate_rate, 1.0);
        assert!(!RedeliveryConfig::none().is_redelivering());
    }

    #[tokio::test]
    async fn test_passthrough_publishes_once() {
        let bus = RedeliveringEventBus::new(MockEventBus::new(), RedeliveryConfig::none());
        for _ in 0..5 {
            bus.publish(liked()).await.unwrap();
        }

        assert_eq!(bus.inner().published_count().await, 5);
        assert_eq!(bus.stats().snapshot(), (5, 0));
    }

    #[tokio::test]
    async fn test_always_publishes_twice() {
        let bus = RedeliveringEventBus::new(MockEventBus::new(), RedeliveryConfig::always());
        for _ in 0..5 {
            bus.publish(liked()).await.unwrap();
        }

        assert_eq!(bus.inner().published_count().await, 10);
        assert_eq!(bus.stats().snapshot(), (5, 5));
    }

    #[tokio::test]
    async fn test_inner_failure_propagates() {
        let inner = MockEventBus::new();
        inner.set_fail_on_publish(true).await;
        let bus = RedeliveringEventBus::new(inner, RedeliveryConfig::always());

        assert!(bus.publish(liked()).await.is_err());
    }
}
