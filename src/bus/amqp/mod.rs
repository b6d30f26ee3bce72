//! AMQP (RabbitMQ) event bus implementation.
//!
//! Events are published to a durable topic exchange with the event kind's
//! routing key (`post.created`, `post.liked`). Each consumer owns a durable
//! quorum queue bound to the kinds it handles. A handler failure is nacked
//! with requeue after a pause. The queue's delivery limit caps how often the
//! broker redelivers one message before dropping it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBuilder, Retryable};
use deadpool_lapin::{Manager, Pool, PoolError};
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel, ExchangeKind,
};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn, Instrument};

use super::{process_message, BusError, EventBus, EventHandler, Result};
use crate::events::{EventEnvelope, EventKind};

/// Default exchange for postdex events.
const EVENTS_EXCHANGE: &str = "postdex.events";

/// Binding that matches every event kind.
const ALL_EVENTS: &str = "post.#";

/// Default broker redeliveries of one message after handler failures.
pub const DEFAULT_MAX_REDELIVERIES: u32 = 5;

/// Default pause before a failed message is handed back to the broker.
pub const DEFAULT_REDELIVERY_DELAY: Duration = Duration::from_secs(1);

/// Retries after a failed publish.
const PUBLISH_MAX_RETRIES: usize = 5;

fn publish_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(PUBLISH_MAX_RETRIES)
        .with_jitter()
}

/// Configuration for AMQP connection.
#[derive(Clone, Debug)]
pub struct AmqpConfig {
    /// AMQP connection URL (e.g., amqp://localhost:5672).
    pub url: String,
    /// Exchange name for publishing events.
    pub exchange: String,
    /// Prefix applied to consumer queue names.
    pub queue_prefix: String,
    /// Queue name for consuming (used by subscribers).
    pub queue: Option<String>,
    /// Routing key pattern for binding.
    pub routing_key: Option<String>,
    /// Broker redeliveries of one message before it is dropped.
    pub max_redeliveries: u32,
    /// Pause before nacking a message whose handler failed.
    pub redelivery_delay: Duration,
}

impl AmqpConfig {
    /// Create config for publishing only.
    pub fn publisher(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            exchange: EVENTS_EXCHANGE.to_string(),
            queue_prefix: "postdex".to_string(),
            queue: None,
            routing_key: None,
            max_redeliveries: DEFAULT_MAX_REDELIVERIES,
            redelivery_delay: DEFAULT_REDELIVERY_DELAY,
        }
    }

    pub fn with_redelivery(mut self, max_redeliveries: u32, delay: Duration) -> Self {
        self.max_redeliveries = max_redeliveries;
        self.redelivery_delay = delay;
        self
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    pub fn with_queue_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.queue_prefix = prefix.into();
        self
    }

    /// Derive a subscriber config for consumer `name`, bound to `kind` (or
    /// every kind).
    pub fn subscriber(&self, name: &str, kind: Option<EventKind>) -> Self {
        let routing_key = match kind {
            Some(kind) => kind.routing_key().to_string(),
            None => ALL_EVENTS.to_string(),
        };
        Self {
            queue: Some(format!("{}.{}", self.queue_prefix, name)),
            routing_key: Some(routing_key),
            ..self.clone()
        }
    }

    /// Declaration arguments for consumer queues: a quorum queue whose
    /// delivery limit bounds redeliveries.
    pub fn queue_arguments(&self) -> FieldTable {
        let mut args = FieldTable::default();
        args.insert(
            "x-queue-type".into(),
            AMQPValue::LongString("quorum".into()),
        );
        args.insert(
            "x-delivery-limit".into(),
            AMQPValue::LongUInt(self.max_redeliveries),
        );
        args
    }
}

/// AMQP event bus implementation using RabbitMQ.
pub struct AmqpEventBus {
    pool: Pool,
    config: AmqpConfig,
    handlers: Arc<RwLock<Vec<Box<dyn EventHandler>>>>,
}

impl AmqpEventBus {
    /// Connect, declare the exchange and return the bus.
    pub async fn new(config: AmqpConfig) -> Result<Self> {
        let manager = Manager::new(config.url.clone(), Default::default());
        let pool = Pool::builder(manager)
            .max_size(10)
            .build()
            .map_err(|e| BusError::Connection(format!("Failed to create pool: {}", e)))?;

        let conn = pool
            .get()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to connect: {}", e)))?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to create channel: {}", e)))?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Connection(format!("Failed to declare exchange: {}", e)))?;

        info!(
            exchange = %config.exchange,
            url = %config.url,
            "Connected to AMQP"
        );

        Ok(Self {
            pool,
            config,
            handlers: Arc::new(RwLock::new(Vec::new())),
        })
    }

    async fn get_channel(&self) -> Result<Channel> {
        let conn = self.pool.get().await.map_err(|e: PoolError| {
            BusError::Connection(format!("Failed to get connection from pool: {}", e))
        })?;

        conn.create_channel()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to create channel: {}", e)))
    }

    /// One persistent publish on a fresh channel, awaiting the broker confirm.
    async fn publish_once(&self, routing_key: &str, payload: &[u8]) -> Result<()> {
        let channel = self.get_channel().await?;
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2);

        channel
            .basic_publish(
                &self.config.exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| BusError::Publish(format!("Failed to publish: {}", e)))?
            .await
            .map_err(|e| BusError::Publish(format!("Publish confirmation failed: {}", e)))?;
        Ok(())
    }

    /// Spawn the consumer task for this subscriber's queue.
    async fn consume(&self) -> Result<()> {
        let queue = self
            .config
            .queue
            .clone()
            .ok_or_else(|| BusError::Subscribe("No queue configured".to_string()))?;
        let routing_key = self
            .config
            .routing_key
            .clone()
            .ok_or_else(|| BusError::Subscribe("No routing key configured".to_string()))?;

        let consumer = QueueConsumer {
            pool: self.pool.clone(),
            exchange: self.config.exchange.clone(),
            queue,
            routing_key,
            arguments: self.config.queue_arguments(),
            redelivery_delay: self.config.redelivery_delay,
            handlers: self.handlers.clone(),
        };
        tokio::spawn(consumer.run());

        Ok(())
    }
}

/// Long-running consumer of one durable queue.
struct QueueConsumer {
    pool: Pool,
    exchange: String,
    queue: String,
    routing_key: String,
    arguments: FieldTable,
    redelivery_delay: Duration,
    handlers: Arc<RwLock<Vec<Box<dyn EventHandler>>>>,
}

impl QueueConsumer {
    /// Consume until the task is dropped, reconnecting with jittered
    /// exponential backoff whenever the stream breaks.
    async fn run(self) {
        use futures::StreamExt;

        let reconnect = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(30))
            .with_jitter();
        let mut delays = reconnect.build();

        loop {
            let mut stream = match self.connect().await {
                Ok(stream) => stream,
                Err(e) => {
                    let delay = delays.next().unwrap_or(Duration::from_secs(30));
                    error!(
                        queue = %self.queue,
                        error = %e,
                        backoff_ms = %delay.as_millis(),
                        "Consumer setup failed"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            info!(queue = %self.queue, routing_key = %self.routing_key, "Consumer connected");
            delays = reconnect.build();

            while let Some(delivery) = stream.next().await {
                match delivery {
                    Ok(delivery) => self.settle(delivery).await,
                    Err(e) => {
                        error!(queue = %self.queue, error = %e, "Delivery error, reconnecting");
                        break;
                    }
                }
            }

            let delay = delays.next().unwrap_or(Duration::from_secs(30));
            info!(queue = %self.queue, backoff_ms = %delay.as_millis(), "Consumer stream ended");
            tokio::time::sleep(delay).await;
        }
    }

    /// Declare and bind the queue, then open a manual-ack consumer on it.
    async fn connect(&self) -> Result<lapin::Consumer> {
        let conn = self.pool.get().await.map_err(|e: PoolError| {
            BusError::Connection(format!("Failed to get connection from pool: {}", e))
        })?;
        let channel = conn
            .create_channel()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to create channel: {}", e)))?;

        let durable = QueueDeclareOptions {
            durable: true,
            ..Default::default()
        };
        channel
            .queue_declare(&self.queue, durable, self.arguments.clone())
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to declare queue: {}", e)))?;
        channel
            .queue_bind(
                &self.queue,
                &self.exchange,
                &self.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to bind queue: {}", e)))?;

        channel
            .basic_consume(
                &self.queue,
                "postdex-consumer",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to start consumer: {}", e)))
    }

    /// Dispatch one delivery and ack or nack it.
    ///
    /// A failed message waits `redelivery_delay` before it is requeued so a
    /// message that always fails does not spin.
    async fn settle(&self, delivery: lapin::message::Delivery) {
        let span = tracing::info_span!("bus.consume", routing_key = %delivery.routing_key);
        let result = process_message(&delivery.data, &self.handlers)
            .instrument(span)
            .await;

        if result.should_ack() {
            if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                error!(error = %e, "Failed to ack message");
            }
            return;
        }

        warn!(
            routing_key = %delivery.routing_key,
            redelivered = delivery.redelivered,
            delay_ms = %self.redelivery_delay.as_millis(),
            "Handler failed, requeueing message"
        );
        tokio::time::sleep(self.redelivery_delay).await;

        let requeue = BasicNackOptions {
            requeue: true,
            ..Default::default()
        };
        if let Err(e) = delivery.nack(requeue).await {
            error!(error = %e, "Failed to nack message");
        }
    }
}

#[async_trait]
impl EventBus for AmqpEventBus {
    #[tracing::instrument(name = "bus.publish", skip_all, fields(kind = %event.kind()))]
    async fn publish(&self, event: Arc<EventEnvelope>) -> Result<()> {
        let routing_key = event.routing_key();
        let payload = event.encode()?;

        (|| self.publish_once(routing_key, &payload))
            .retry(publish_backoff())
            .notify(|e: &BusError, delay: Duration| {
                warn!(error = %e, retry_in_ms = %delay.as_millis(), "Publish failed, retrying");
            })
            .await?;

        debug!(exchange = %self.config.exchange, routing_key, "Published event");
        Ok(())
    }

    async fn subscribe(&self, handler: Box<dyn EventHandler>) -> Result<()> {
        if self.config.queue.is_none() {
            return Err(BusError::Subscribe(
                "Cannot subscribe: no queue configured. Use create_subscriber()".to_string(),
            ));
        }

        self.handlers.write().await.push(handler);
        Ok(())
    }

    async fn start_consuming(&self) -> Result<()> {
        self.consume().await
    }

    async fn create_subscriber(
        &self,
        name: &str,
        kind: Option<EventKind>,
    ) -> Result<Arc<dyn EventBus>> {
        let bus = AmqpEventBus::new(self.config.subscriber(name, kind)).await?;
        Ok(Arc::new(bus))
    }
}
