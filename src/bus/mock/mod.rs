//! Mock event bus implementation for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BusError, EventBus, EventHandler, Result};
use crate::events::{DomainEvent, EventEnvelope};

/// Mock event bus that records published events.
#[derive(Default)]
pub struct MockEventBus {
    published: RwLock<Vec<EventEnvelope>>,
    fail_on_publish: RwLock<bool>,
}

impl MockEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    /// Drain the published events, oldest first.
    pub async fn take_published(&self) -> Vec<DomainEvent> {
        std::mem::take(&mut *self.published.write().await)
            .into_iter()
            .map(|envelope| envelope.event)
            .collect()
    }
}

#[async_trait]
impl EventBus for MockEventBus {
    async fn publish(&self, event: Arc<EventEnvelope>) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Connection("Mock publish failure".to_string()));
        }
        self.published.write().await.push((*event).clone());
        Ok(())
    }

    async fn subscribe(&self, _handler: Box<dyn EventHandler>) -> Result<()> {
        Err(BusError::SubscribeNotSupported)
    }
}
