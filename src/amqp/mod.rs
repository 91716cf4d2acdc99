//! AMQP integration for the ledger service
//!
//! Commands arrive on a durable queue and notifications leave through a
//! topic exchange routed by notification kind.

pub mod connection;
pub mod handlers;
pub mod messages;
pub mod publisher;

// Re-export commonly used types
pub use connection::{AmqpConfig, AmqpConnection};
pub use handlers::{CommandConsumer, MessageHandler, MockMessageHandler};
pub use messages::*;
pub use publisher::{
    AmqpNotificationPublisher, NotificationPublisher, PublisherConfig,
    RecordingNotificationPublisher,
};
