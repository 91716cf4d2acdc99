//! Metrics and monitoring for the rally-ledger service
//!
//! Prometheus collectors for matches, players, commands and the broker,
//! plus the HTTP server that exposes them alongside the health probes.

pub mod collector;
pub mod health;

pub use collector::{
    CommandMetrics, LedgerSnapshot, MatchMetrics, MetricsCollector, MetricsTimer,
    PerformanceMetrics, PlayerMetrics, ServiceMetrics,
};
pub use health::{HealthEndpoints, HealthServer, HealthServerConfig};
