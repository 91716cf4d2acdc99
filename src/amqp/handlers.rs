//! AMQP consumer for inbound player commands
//!
//! Deliveries are decoded into [`CommandRequest`]s and handed to a
//! [`MessageHandler`]. Every delivery is acked once processed: a command that
//! fails is answered with an error reply, so redelivering it would only
//! repeat that reply.

use crate::amqp::messages::MessageUtils;
use crate::error::{LedgerError, Result};
use crate::types::CommandRequest;
use amqprs::{
    channel::{BasicAckArguments, BasicCancelArguments, BasicConsumeArguments, Channel},
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Trait defining the interface for handling AMQP messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a decoded player command
    async fn handle_command(&self, request: CommandRequest) -> Result<()>;

    /// Handle a delivery that could not be decoded or processed
    async fn handle_error(&self, error: LedgerError, message_data: &[u8]);
}

/// Consumer bound to the command queue
pub struct CommandConsumer {
    handler: Arc<dyn MessageHandler>,
    channel: Channel,
    consumer_tag: String,
}

impl CommandConsumer {
    pub fn new(handler: Arc<dyn MessageHandler>, channel: Channel) -> Self {
        let consumer_tag = format!("command-consumer-{}", uuid::Uuid::new_v4());

        Self {
            handler,
            channel,
            consumer_tag,
        }
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    /// Start consuming messages from the queue
    pub async fn start_consuming(&self, queue_name: &str) -> Result<()> {
        // no_ack defaults to false; deliveries are acked in the processor
        let args = BasicConsumeArguments::new(queue_name, &self.consumer_tag);

        self.channel
            .basic_consume(DeliveryProcessor::new(self.handler.clone()), args)
            .await
            .map_err(|e| LedgerError::AmqpConnectionFailed {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!("Started consuming commands from queue: {}", queue_name);
        Ok(())
    }

    /// Stop consuming messages
    pub async fn stop_consuming(&self) -> Result<()> {
        let args = BasicCancelArguments::new(&self.consumer_tag);

        self.channel
            .basic_cancel(args)
            .await
            .map_err(|e| LedgerError::AmqpConnectionFailed {
                message: format!("Failed to stop consuming: {}", e),
            })?;

        info!("Stopped consuming commands");
        Ok(())
    }
}

/// Per-delivery processing handed to amqprs
struct DeliveryProcessor {
    handler: Arc<dyn MessageHandler>,
}

impl DeliveryProcessor {
    fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self { handler }
    }

    async fn process_message(&self, content: &[u8]) -> Result<()> {
        let request = MessageUtils::deserialize_command(content)?;

        debug!(
            "Command parsed - actor: {}, command: {}",
            request.actor,
            request.command.name()
        );

        self.handler.handle_command(request).await
    }
}

#[async_trait]
impl AsyncConsumer for DeliveryProcessor {
    async fn consume(
        &mut self,
        channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        let start_time = std::time::Instant::now();

        debug!(
            "AMQP message received - delivery_tag: {}, routing_key: '{}', size: {} bytes",
            delivery_tag,
            deliver.routing_key(),
            content.len()
        );

        match self.process_message(&content).await {
            Ok(()) => {
                debug!(
                    "Message processed - delivery_tag: {}, processing_time: {:.2}ms",
                    delivery_tag,
                    start_time.elapsed().as_secs_f64() * 1000.0
                );
            }
            Err(e) => {
                warn!(
                    "Message processing failed - delivery_tag: {}, error: {}",
                    delivery_tag, e
                );
                let error = match e.downcast::<LedgerError>() {
                    Ok(ledger_error) => ledger_error,
                    Err(other) => LedgerError::InternalError {
                        message: other.to_string(),
                    },
                };
                self.handler.handle_error(error, &content).await;
            }
        }

        if let Err(e) = channel
            .basic_ack(BasicAckArguments::new(delivery_tag, false))
            .await
        {
            error!("Failed to ack delivery {}: {}", delivery_tag, e);
        }
    }
}

/// Mock message handler for testing
#[derive(Default)]
pub struct MockMessageHandler {
    pub received_requests: Arc<tokio::sync::Mutex<Vec<CommandRequest>>>,
    pub received_errors: Arc<tokio::sync::Mutex<Vec<String>>>,
}

impl MockMessageHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageHandler for MockMessageHandler {
    async fn handle_command(&self, request: CommandRequest) -> Result<()> {
        let mut requests = self.received_requests.lock().await;
        requests.push(request);
        Ok(())
    }

    async fn handle_error(&self, error: LedgerError, _message_data: &[u8]) {
        let mut errors = self.received_errors.lock().await;
        errors.push(error.to_string());
    }
}
