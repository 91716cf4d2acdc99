//! Rally Ledger - match confirmation and rating service
//!
//! Players report match results over AMQP, opponents confirm or reject
//! them, and confirmed matches settle both ratings with a margin-weighted
//! Elo update.

pub mod amqp;
pub mod commands;
pub mod config;
pub mod directory;
pub mod error;
pub mod matches;
pub mod metrics;
pub mod rating;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{ErrorKind, LedgerError, Result};
pub use types::*;

// Re-export key components
pub use amqp::publisher::NotificationPublisher;
pub use directory::PlayerDirectory;
pub use matches::{MatchStore, SettlementCoordinator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
