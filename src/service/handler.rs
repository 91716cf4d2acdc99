//! Production message handler
//!
//! Runs each inbound command through the router and publishes the resulting
//! notifications. The ledger is never rolled back for a failed publish:
//! the failure is logged and counted.

use crate::amqp::handlers::MessageHandler;
use crate::amqp::publisher::NotificationPublisher;
use crate::commands::CommandRouter;
use crate::error::{LedgerError, Result};
use crate::metrics::MetricsCollector;
use crate::types::{CommandRequest, Notification, NotificationKind, TransportId};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Longest payload excerpt written to the log for a bad delivery
const PREVIEW_BYTES: usize = 100;

pub struct LedgerMessageHandler {
    router: Arc<CommandRouter>,
    publisher: Arc<dyn NotificationPublisher>,
    metrics_collector: Arc<MetricsCollector>,
}

impl LedgerMessageHandler {
    pub fn new(
        router: Arc<CommandRouter>,
        publisher: Arc<dyn NotificationPublisher>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            router,
            publisher,
            metrics_collector,
        }
    }

    /// Publish each notification, returning how many went out
    pub async fn publish_all(&self, notifications: &[Notification]) -> usize {
        let mut delivered = 0;

        for notification in notifications {
            let timer = self.metrics_collector.start_timer();
            let result = self.publisher.publish(notification).await;
            self.metrics_collector
                .record_amqp_operation("publish", result.is_ok(), timer.stop());

            match result {
                Ok(()) => delivered += 1,
                Err(e) => error!(
                    "Failed to publish {:?} notification to {}: {}",
                    notification.kind, notification.recipient, e
                ),
            }
        }

        delivered
    }
}

/// Actor id from a payload that failed to decode as a command, if present
fn actor_hint(message_data: &[u8]) -> Option<TransportId> {
    serde_json::from_slice::<serde_json::Value>(message_data)
        .ok()?
        .get("actor")?
        .as_i64()
}

#[async_trait]
impl MessageHandler for LedgerMessageHandler {
    async fn handle_command(&self, request: CommandRequest) -> Result<()> {
        let start_time = std::time::Instant::now();
        let command = request.command.name();

        let notifications = self.router.dispatch(&request).await;
        let delivered = self.publish_all(&notifications).await;

        info!(
            "Command {} from {} handled - notifications: {}/{}, time: {:.2}ms",
            command,
            request.actor,
            delivered,
            notifications.len(),
            start_time.elapsed().as_secs_f64() * 1000.0
        );

        Ok(())
    }

    async fn handle_error(&self, error: LedgerError, message_data: &[u8]) {
        warn!(
            "Undeliverable command - error: '{}', message_size: {} bytes",
            error,
            message_data.len()
        );

        if !message_data.is_empty() {
            let preview_len = std::cmp::min(PREVIEW_BYTES, message_data.len());
            debug!(
                "Message preview: {:?}",
                String::from_utf8_lossy(&message_data[..preview_len])
            );
        }

        let Some(actor) = actor_hint(message_data) else {
            return;
        };

        let reply = Notification::new(
            actor,
            NotificationKind::CommandFailed,
            crate::commands::replies::failure("unknown", &anyhow::Error::from(error)),
        );
        self.publish_all(std::slice::from_ref(&reply)).await;
    }
}
