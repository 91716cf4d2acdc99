//! Health check endpoints and monitoring
//!
//! This module provides health check functionality for the rally-ledger
//! service, including readiness and liveness probes.

use crate::service::app::AppState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value exported as `health_status`
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    /// Combine with a component status, keeping the worse of the two
    fn worst(self, other: HealthStatus) -> HealthStatus {
        match (self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Set when the component is not healthy
    pub message: Option<String>,
    pub duration_ms: u64,
}

/// Ledger figures reported alongside health
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub registered_players: usize,
    pub pending_matches: usize,
    pub matches_reported: u64,
    pub matches_confirmed: u64,
    pub matches_rejected: u64,
    pub partial_failures: u64,
    pub matches_restored: u64,
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let service_check = Self::check_service_running(&app_state).await;
        Ok(Self::build(&app_state, vec![service_check]).await)
    }

    /// Check the ledger and broker only, ignoring whether the service loop
    /// has been started
    pub async fn check_dependencies(app_state: Arc<AppState>) -> Result<Self> {
        Ok(Self::build(&app_state, Vec::new()).await)
    }

    async fn build(app_state: &AppState, mut checks: Vec<ComponentCheck>) -> Self {
        checks.push(Self::check_ledger(app_state).await);
        checks.push(Self::check_amqp_health(app_state).await);

        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |status, check| status.worst(check.status));

        HealthCheck {
            status,
            service: app_state.config().service.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats: Self::gather_service_stats(app_state).await,
        }
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if app_state.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify service can handle commands
    pub async fn readiness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if !app_state.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        let ledger = Self::check_ledger(&app_state).await.status;
        let amqp = Self::check_amqp_health(&app_state).await.status;
        Ok(ledger.worst(amqp))
    }

    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// The ledger answers if its registry and stats locks are usable
    async fn check_ledger(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();
        let ledger = app_state.ledger();

        let (status, message) = match ledger.snapshot().await {
            Ok(_) => match ledger.coordinator().get_stats() {
                Ok(_) => (HealthStatus::Healthy, None),
                Err(e) => {
                    error!("Coordinator stats check failed: {}", e);
                    (
                        HealthStatus::Degraded,
                        Some(format!("Stats check failed: {}", e)),
                    )
                }
            },
            Err(e) => (
                HealthStatus::Unhealthy,
                Some(format!("Ledger unavailable: {}", e)),
            ),
        };

        ComponentCheck {
            name: "ledger".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn check_amqp_health(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = match app_state.amqp_connection().await {
            Some(connection) if connection.is_alive() => (HealthStatus::Healthy, None),
            Some(_) => (
                HealthStatus::Unhealthy,
                Some("AMQP connection closed".to_string()),
            ),
            None => (
                HealthStatus::Degraded,
                Some("Not connected to AMQP broker".to_string()),
            ),
        };

        ComponentCheck {
            name: "amqp_connection".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn gather_service_stats(app_state: &AppState) -> ServiceStats {
        let ledger = app_state.ledger();
        let mut stats = ServiceStats {
            uptime_seconds: app_state.uptime().as_secs(),
            ..ServiceStats::default()
        };

        match ledger.snapshot().await {
            Ok(snapshot) => {
                stats.registered_players = snapshot.registered_players;
                stats.pending_matches = snapshot.pending_matches;
            }
            Err(e) => debug!("Failed to read ledger snapshot for health check: {}", e),
        }

        match ledger.coordinator().get_stats() {
            Ok(coordinator) => {
                stats.matches_reported = coordinator.matches_reported;
                stats.matches_confirmed = coordinator.matches_confirmed;
                stats.matches_rejected = coordinator.matches_rejected;
                stats.partial_failures = coordinator.partial_failures;
                stats.matches_restored = coordinator.matches_restored;
            }
            Err(e) => debug!("Failed to read coordinator stats for health check: {}", e),
        }

        stats
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
