//! Service layer for the rally-ledger service
//!
//! Application state, ledger wiring, the command handler and health
//! reporting for the production service.

pub mod app;
pub mod handler;
pub mod health;
pub mod ledger;

pub use app::{AppState, ServiceError};
pub use handler::LedgerMessageHandler;
pub use health::{HealthCheck, HealthStatus};
pub use ledger::Ledger;
