//! Event bus for async delivery of domain events.
//!
//! This module contains:
//! - `EventBus` trait: publish/subscribe transport
//! - `EventHandler` trait: for processing delivered events
//! - Bus configuration types and factory
//! - Implementations: in-process channel, AMQP (RabbitMQ), mock, and a
//!   redelivering wrapper
//!
//! Delivery is at-least-once. Handlers must tolerate duplicates and events
//! of different kinds arriving in any order.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::info;

use crate::events::{EventEnvelope, EventKind};

// Implementation modules
#[cfg(feature = "amqp")]
pub mod amqp;
pub mod channel;
mod dispatch;
pub mod mock;
#[cfg(feature = "redelivery")]
pub mod redelivery;

// Re-exports
#[cfg(feature = "amqp")]
pub use amqp::{AmqpConfig, AmqpEventBus};
pub use channel::{ChannelConfig, ChannelEventBus};
pub use dispatch::{dispatch_to_handlers, process_message, DispatchResult};
pub use mock::MockEventBus;
#[cfg(feature = "redelivery")]
pub use redelivery::{RedeliveringEventBus, RedeliveryConfig};

// ============================================================================
// Traits
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Handler '{name}' failed: {message}")]
    HandlerFailed { name: String, message: String },

    #[error("Event encoding failed: {0}")]
    Encode(#[from] crate::events::EventError),

    #[error("Subscribe not supported for this bus type")]
    SubscribeNotSupported,

    #[error("Event bus unavailable: {0}")]
    Unavailable(String),
}

/// Handler for processing events from the bus.
pub trait EventHandler: Send + Sync {
    /// Process one delivered event.
    ///
    /// An error asks the bus to redeliver the event.
    fn handle(&self, event: Arc<EventEnvelope>)
        -> BoxFuture<'static, std::result::Result<(), BusError>>;
}

/// Interface for event delivery to consumers.
///
/// Implementations:
/// - `ChannelEventBus`: per-subscriber tokio mpsc queues, single process
/// - `AmqpEventBus`: RabbitMQ via AMQP
/// - `MockEventBus`: records published events for testing
/// - `RedeliveringEventBus`: wrapper that duplicates deliveries
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event to every subscriber of its kind.
    ///
    /// The envelope is wrapped in Arc so all consumers share the same
    /// immutable data.
    async fn publish(&self, event: Arc<EventEnvelope>) -> Result<()>;

    /// Register a handler. Call [`EventBus::start_consuming`] afterwards.
    async fn subscribe(&self, handler: Box<dyn EventHandler>) -> Result<()>;

    /// Start delivering events to subscribed handlers.
    async fn start_consuming(&self) -> Result<()> {
        Ok(())
    }

    /// Create a subscriber bus sharing this bus's transport.
    ///
    /// `name` identifies the consumer (the durable queue for AMQP).
    /// `kind` restricts delivery to one event kind; `None` receives all.
    async fn create_subscriber(
        &self,
        _name: &str,
        _kind: Option<EventKind>,
    ) -> Result<Arc<dyn EventBus>> {
        Err(BusError::SubscribeNotSupported)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Messaging type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingType {
    /// In-process channel bus.
    #[default]
    Channel,
    /// AMQP/RabbitMQ messaging.
    Amqp,
}

/// Messaging configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Messaging type discriminator.
    #[serde(rename = "type")]
    pub messaging_type: MessagingType,
    /// AMQP-specific configuration.
    pub amqp: AmqpBusConfig,
}

/// AMQP-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AmqpBusConfig {
    /// AMQP connection URL.
    pub url: String,
    /// Topic exchange events are published to.
    pub exchange: String,
    /// Prefix for consumer queue names.
    pub queue_prefix: String,
    /// Broker redeliveries of one message before it is dropped.
    pub max_redeliveries: u32,
    /// Pause before a failed message is requeued, in milliseconds.
    pub redelivery_delay_ms: u64,
}

impl Default for AmqpBusConfig {
    fn default() -> Self {
        Self {
            url: "amqp://localhost:5672".to_string(),
            exchange: "postdex.events".to_string(),
            queue_prefix: "postdex".to_string(),
            max_redeliveries: 5,
            redelivery_delay_ms: 1000,
        }
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Initialize the publishing side of the event bus.
///
/// Consumers are attached through [`EventBus::create_subscriber`] on the
/// returned bus. Requires the corresponding feature for AMQP.
pub async fn init_event_bus(config: &MessagingConfig) -> Result<Arc<dyn EventBus>> {
    match config.messaging_type {
        MessagingType::Channel => {
            info!(messaging_type = "channel", "Event bus initialized");
            Ok(Arc::new(ChannelEventBus::publisher()))
        }
        MessagingType::Amqp => {
            #[cfg(feature = "amqp")]
            {
                let amqp_config = AmqpConfig::publisher(&config.amqp.url)
                    .with_exchange(&config.amqp.exchange)
                    .with_queue_prefix(&config.amqp.queue_prefix)
                    .with_redelivery(
                        config.amqp.max_redeliveries,
                        std::time::Duration::from_millis(config.amqp.redelivery_delay_ms),
                    );
                let bus = AmqpEventBus::new(amqp_config).await?;
                info!(messaging_type = "amqp", "Event bus initialized");
                Ok(Arc::new(bus))
            }

            #[cfg(not(feature = "amqp"))]
            {
                Err(BusError::Unavailable(
                    "AMQP support requires the 'amqp' feature. Rebuild with --features amqp"
                        .to_string(),
                ))
            }
        }
    }
}
