//! In-memory channel-based event bus for standalone mode.
//!
//! Every consuming subscriber owns a bounded tokio mpsc queue fed by the
//! publisher. A full queue makes `publish` wait, so a slow handler slows
//! publishing down and no event is dropped. Failed deliveries are retried a
//! bounded number of times.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use super::{dispatch_to_handlers, EventBus, EventHandler, Result};
use crate::events::{EventEnvelope, EventKind};

/// Queue capacity per subscriber.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Configuration for channel event bus.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Kind filter for subscribers. `None` receives every kind.
    pub kind_filter: Option<EventKind>,
    /// Redeliveries after a handler failure before the event is dropped.
    pub max_redeliveries: u32,
    /// Pause between redeliveries.
    pub redelivery_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            kind_filter: None,
            max_redeliveries: 3,
            redelivery_delay: Duration::from_millis(50),
        }
    }
}

impl ChannelConfig {
    /// Create config for publishing only.
    pub fn publisher() -> Self {
        Self::default()
    }

    /// Create config for subscribing to one event kind.
    pub fn subscriber(kind: EventKind) -> Self {
        Self {
            kind_filter: Some(kind),
            ..Self::default()
        }
    }

    /// Create config for subscribing to all kinds.
    pub fn subscriber_all() -> Self {
        Self::default()
    }

    pub fn with_max_redeliveries(mut self, max: u32) -> Self {
        self.max_redeliveries = max;
        self
    }

    fn matches(&self, kind: EventKind) -> bool {
        match self.kind_filter {
            Some(filter) => filter == kind,
            None => true,
        }
    }
}

/// Queue of one consuming subscriber.
struct Subscription {
    config: ChannelConfig,
    sender: mpsc::Sender<Arc<EventEnvelope>>,
}

/// In-memory event bus using one mpsc queue per subscriber.
///
/// Buses made with [`ChannelEventBus::with_config`] or `create_subscriber`
/// share the subscription list, so publishing on any of them reaches all.
pub struct ChannelEventBus {
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
    config: ChannelConfig,
    handlers: Arc<RwLock<Vec<Box<dyn EventHandler>>>>,
    consuming: Arc<RwLock<bool>>,
}

impl ChannelEventBus {
    /// Create a new channel event bus.
    pub fn new(config: ChannelConfig) -> Self {
        info!(
            kind_filter = ?config.kind_filter,
            "Channel event bus initialized"
        );

        Self {
            subscriptions: Arc::new(RwLock::new(Vec::new())),
            config,
            handlers: Arc::new(RwLock::new(Vec::new())),
            consuming: Arc::new(RwLock::new(false)),
        }
    }

    /// Create a publisher-only bus instance.
    pub fn publisher() -> Self {
        Self::new(ChannelConfig::publisher())
    }

    /// Create a new bus that shares the same subscriptions but has different config.
    pub fn with_config(&self, config: ChannelConfig) -> Self {
        Self {
            subscriptions: self.subscriptions.clone(),
            config,
            handlers: Arc::new(RwLock::new(Vec::new())),
            consuming: Arc::new(RwLock::new(false)),
        }
    }

    async fn start_consuming_impl(&self) -> Result<()> {
        {
            let mut consuming = self.consuming.write().await;
            if *consuming {
                return Ok(());
            }
            *consuming = true;
        }

        let (sender, mut receiver) = mpsc::channel(CHANNEL_CAPACITY);
        self.subscriptions.write().await.push(Subscription {
            config: self.config.clone(),
            sender,
        });

        let handlers = self.handlers.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                debug!(
                    kind = %event.kind(),
                    post_id = %event.event.post_id(),
                    "Received event via channel"
                );

                deliver(&handlers, &event, &config).await;
            }
            info!("Channel closed, stopping consumer");
        });

        info!(
            kind_filter = ?self.config.kind_filter,
            "Channel consumer started"
        );

        Ok(())
    }
}

/// Dispatch with bounded redelivery on handler failure.
async fn deliver(
    handlers: &Arc<RwLock<Vec<Box<dyn EventHandler>>>>,
    event: &Arc<EventEnvelope>,
    config: &ChannelConfig,
) {
    for attempt in 0..=config.max_redeliveries {
        if attempt > 0 {
            tokio::time::sleep(config.redelivery_delay).await;
            debug!(attempt, kind = %event.kind(), "Redelivering event");
        }
        if dispatch_to_handlers(handlers, event).await {
            return;
        }
    }

    warn!(
        kind = %event.kind(),
        post_id = %event.event.post_id(),
        attempts = config.max_redeliveries + 1,
        "Giving up on event after repeated handler failures"
    );
}

#[async_trait]
impl EventBus for ChannelEventBus {
    #[tracing::instrument(name = "bus.publish", skip_all, fields(kind = %event.kind()))]
    async fn publish(&self, event: Arc<EventEnvelope>) -> Result<()> {
        let kind = event.kind();
        let senders: Vec<_> = self
            .subscriptions
            .read()
            .await
            .iter()
            .filter(|sub| sub.config.matches(kind))
            .map(|sub| sub.sender.clone())
            .collect();

        let mut delivered = 0;
        let mut closed = false;
        for sender in senders {
            // Waits while the subscriber's queue is full.
            if sender.send(Arc::clone(&event)).await.is_ok() {
                delivered += 1;
            } else {
                closed = true;
            }
        }

        if closed {
            self.subscriptions
                .write()
                .await
                .retain(|sub| !sub.sender.is_closed());
        }

        debug!(receivers = delivered, "Published event to channel");
        Ok(())
    }

    async fn subscribe(&self, handler: Box<dyn EventHandler>) -> Result<()> {
        let count = {
            let mut handlers = self.handlers.write().await;
            handlers.push(handler);
            handlers.len()
        };

        info!(handler_count = count, "Handler subscribed to channel bus");

        Ok(())
    }

    async fn start_consuming(&self) -> Result<()> {
        self.start_consuming_impl().await
    }

    async fn create_subscriber(
        &self,
        _name: &str,
        kind: Option<EventKind>,
    ) -> Result<Arc<dyn EventBus>> {
        let config = ChannelConfig {
            kind_filter: kind,
            ..self.config.clone()
        };
        Ok(Arc::new(self.with_config(config)))
    }
}
