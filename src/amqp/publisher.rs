//! AMQP publisher for outbound player notifications

use crate::amqp::messages::MessageEnvelope;
use crate::error::{LedgerError, Result};
use crate::types::*;
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Trait for delivering notifications to players
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, notification: &Notification) -> Result<()>;
}

/// Configuration for notification publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub publish_timeout_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
            publish_timeout_ms: 5000,
        }
    }
}

/// Publishes notifications to a topic exchange, routed by kind
pub struct AmqpNotificationPublisher {
    channel: Channel,
    exchange: String,
    config: PublisherConfig,
}

impl AmqpNotificationPublisher {
    /// Create a publisher and declare its exchange
    pub async fn new(
        channel: Channel,
        exchange: impl Into<String>,
        config: PublisherConfig,
    ) -> Result<Self> {
        let publisher = Self {
            channel,
            exchange: exchange.into(),
            config,
        };

        publisher.setup_exchange().await?;

        Ok(publisher)
    }

    async fn setup_exchange(&self) -> Result<()> {
        let args = ExchangeDeclareArguments::new(&self.exchange, "topic")
            .durable(true)
            .finish();
        self.channel.exchange_declare(args).await.map_err(|e| {
            LedgerError::AmqpConnectionFailed {
                message: format!("Failed to declare notification exchange: {}", e),
            }
        })?;

        info!("Declared notification exchange: {}", self.exchange);
        Ok(())
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    async fn publish_with_retry<T>(&self, envelope: &MessageEnvelope<T>) -> Result<()>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(envelope).await {
                Ok(()) => {
                    debug!(
                        "Published message {} to exchange {} with key {}",
                        envelope.correlation_id, self.exchange, envelope.routing_key
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish message {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for message {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    async fn try_publish<T>(&self, envelope: &MessageEnvelope<T>) -> Result<()>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(&self.exchange, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        let limit = Duration::from_millis(self.config.publish_timeout_ms);
        match timeout(limit, self.channel.basic_publish(properties, payload, args)).await {
            Ok(result) => result.map_err(|e| {
                LedgerError::AmqpConnectionFailed {
                    message: format!("Failed to publish message: {}", e),
                }
                .into()
            }),
            Err(_) => Err(LedgerError::AmqpConnectionFailed {
                message: format!("Publish timed out after {:?}", limit),
            }
            .into()),
        }
    }
}

#[async_trait]
impl NotificationPublisher for AmqpNotificationPublisher {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        let envelope = MessageEnvelope::new(notification.clone(), notification.kind.routing_key());
        self.publish_with_retry(&envelope).await
    }
}

/// Publisher that keeps every notification in memory
#[derive(Debug, Default)]
pub struct RecordingNotificationPublisher {
    published: std::sync::Mutex<Vec<Notification>>,
    failing: std::sync::Mutex<usize>,
}

impl RecordingNotificationPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all published notifications (for testing)
    pub fn get_published(&self) -> Vec<Notification> {
        self.published
            .lock()
            .map(|published| published.clone())
            .unwrap_or_default()
    }

    /// Notifications addressed to one recipient, in publish order
    pub fn published_to(&self, recipient: TransportId) -> Vec<Notification> {
        self.get_published()
            .into_iter()
            .filter(|notification| notification.recipient == recipient)
            .collect()
    }

    /// Make the next `count` publishes fail
    pub fn fail_next(&self, count: usize) {
        if let Ok(mut failing) = self.failing.lock() {
            *failing = count;
        }
    }

    pub fn clear(&self) {
        if let Ok(mut published) = self.published.lock() {
            published.clear();
        }
    }
}

#[async_trait]
impl NotificationPublisher for RecordingNotificationPublisher {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        if let Ok(mut failing) = self.failing.lock() {
            if *failing > 0 {
                *failing -= 1;
                return Err(LedgerError::AmqpConnectionFailed {
                    message: "injected publish failure".to_string(),
                }
                .into());
            }
        }

        if let Ok(mut published) = self.published.lock() {
            published.push(notification.clone());
        }
        Ok(())
    }
}
