//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the rally-ledger service:
//! protocol transitions, command outcomes, directory size and settlement
//! latency.

use crate::error::ErrorKind;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Point-in-time ledger figures pushed into gauges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub registered_players: usize,
    pub pending_matches: usize,
}

/// Main metrics collector for the ledger service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Match protocol metrics
    match_metrics: MatchMetrics,

    /// Player-related metrics
    player_metrics: PlayerMetrics,

    /// Command surface metrics
    command_metrics: CommandMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total AMQP messages processed
    pub amqp_messages_total: IntCounterVec,

    /// AMQP message processing errors
    pub amqp_errors_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Match protocol metrics
#[derive(Clone)]
pub struct MatchMetrics {
    /// Reports accepted into the pending registry
    pub matches_reported_total: IntCounter,

    /// Reports confirmed and settled
    pub matches_confirmed_total: IntCounter,

    /// Reports rejected by the opponent
    pub matches_rejected_total: IntCounter,

    /// Confirmations that stopped midway and await retry
    pub partial_failures_total: IntCounter,

    /// Reports awaiting a decision
    pub pending_matches: IntGauge,

    /// Absolute rating movement per settled player
    pub rating_delta: Histogram,
}

/// Player-related metrics
#[derive(Clone)]
pub struct PlayerMetrics {
    /// Players in the directory
    pub registered_players: IntGauge,

    /// Successful registrations
    pub registrations_total: IntCounter,

    /// Ratings written by settlements
    pub rating_distribution: Histogram,
}

/// Command surface metrics
#[derive(Clone)]
pub struct CommandMetrics {
    /// Commands handled by command and outcome
    pub commands_total: IntCounterVec,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Time from confirm to settled
    pub settlement_duration: Histogram,

    /// Command handling time
    pub command_processing_duration: HistogramVec,

    /// AMQP operation durations
    pub amqp_operation_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let match_metrics = MatchMetrics::new(&registry)?;
        let player_metrics = PlayerMetrics::new(&registry)?;
        let command_metrics = CommandMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            match_metrics,
            player_metrics,
            command_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get match metrics
    pub fn matches(&self) -> &MatchMetrics {
        &self.match_metrics
    }

    /// Get player metrics
    pub fn player(&self) -> &PlayerMetrics {
        &self.player_metrics
    }

    /// Get command metrics
    pub fn commands(&self) -> &CommandMetrics {
        &self.command_metrics
    }

    /// Get performance metrics
    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Push current ledger figures into the gauges
    pub fn update_from_snapshot(&self, snapshot: &LedgerSnapshot) {
        self.player_metrics
            .registered_players
            .set(snapshot.registered_players as i64);
        self.match_metrics
            .pending_matches
            .set(snapshot.pending_matches as i64);
    }

    /// Record a report entering the pending registry
    pub fn record_match_reported(&self) {
        self.match_metrics.matches_reported_total.inc();
        self.match_metrics.pending_matches.inc();
    }

    /// Record a completed settlement
    pub fn record_match_confirmed(&self, deltas: &[i32], new_ratings: &[i32], duration: Duration) {
        self.match_metrics.matches_confirmed_total.inc();
        self.match_metrics.pending_matches.dec();

        for delta in deltas {
            self.match_metrics
                .rating_delta
                .observe(f64::from(delta.unsigned_abs()));
        }
        for rating in new_ratings {
            self.player_metrics
                .rating_distribution
                .observe(f64::from(*rating));
        }

        self.performance_metrics
            .settlement_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a rejected report
    pub fn record_match_rejected(&self) {
        self.match_metrics.matches_rejected_total.inc();
        self.match_metrics.pending_matches.dec();
    }

    /// Record a settlement that stopped midway
    pub fn record_partial_failure(&self) {
        self.match_metrics.partial_failures_total.inc();
    }

    /// Record a new registration
    pub fn record_registration(&self) {
        self.player_metrics.registrations_total.inc();
        self.player_metrics.registered_players.inc();
    }

    /// Record a handled command
    pub fn record_command(&self, command: &str, outcome: Option<ErrorKind>, duration: Duration) {
        let outcome_str = outcome.map(|kind| kind.as_str()).unwrap_or("ok");

        self.command_metrics
            .commands_total
            .with_label_values(&[command, outcome_str])
            .inc();

        self.performance_metrics
            .command_processing_duration
            .with_label_values(&[command])
            .observe(duration.as_secs_f64());
    }

    /// Record AMQP operation
    pub fn record_amqp_operation(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[operation, status])
            .inc();

        if !success {
            self.service_metrics
                .amqp_errors_total
                .with_label_values(&[operation])
                .inc();
        }

        self.performance_metrics
            .amqp_operation_duration
            .with_label_values(&[operation, status])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("rally_ledger_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let amqp_messages_total = IntCounterVec::new(
            Opts::new(
                "rally_ledger_amqp_messages_total",
                "Total AMQP messages processed",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;

        let amqp_errors_total = IntCounterVec::new(
            Opts::new("rally_ledger_amqp_errors_total", "Total AMQP errors"),
            &["operation"],
        )?;
        registry.register(Box::new(amqp_errors_total.clone()))?;

        let health_status = IntGauge::new(
            "rally_ledger_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("rally_ledger_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            amqp_errors_total,
            health_status,
            component_health,
        })
    }
}

impl MatchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let matches_reported_total = IntCounter::new(
            "rally_ledger_matches_reported_total",
            "Match reports accepted",
        )?;
        registry.register(Box::new(matches_reported_total.clone()))?;

        let matches_confirmed_total = IntCounter::new(
            "rally_ledger_matches_confirmed_total",
            "Matches confirmed and settled",
        )?;
        registry.register(Box::new(matches_confirmed_total.clone()))?;

        let matches_rejected_total = IntCounter::new(
            "rally_ledger_matches_rejected_total",
            "Match reports rejected",
        )?;
        registry.register(Box::new(matches_rejected_total.clone()))?;

        let partial_failures_total = IntCounter::new(
            "rally_ledger_partial_failures_total",
            "Settlements interrupted after staging",
        )?;
        registry.register(Box::new(partial_failures_total.clone()))?;

        let pending_matches = IntGauge::new(
            "rally_ledger_pending_matches",
            "Match reports awaiting a decision",
        )?;
        registry.register(Box::new(pending_matches.clone()))?;

        let rating_delta = Histogram::with_opts(
            HistogramOpts::new(
                "rally_ledger_rating_delta",
                "Absolute rating change per settled player",
            )
            .buckets(vec![0.0, 2.0, 5.0, 10.0, 15.0, 20.0, 30.0, 45.0, 64.0]),
        )?;
        registry.register(Box::new(rating_delta.clone()))?;

        Ok(Self {
            matches_reported_total,
            matches_confirmed_total,
            matches_rejected_total,
            partial_failures_total,
            pending_matches,
            rating_delta,
        })
    }
}

impl PlayerMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let registered_players = IntGauge::new(
            "rally_ledger_registered_players",
            "Players in the directory",
        )?;
        registry.register(Box::new(registered_players.clone()))?;

        let registrations_total = IntCounter::new(
            "rally_ledger_registrations_total",
            "Successful player registrations",
        )?;
        registry.register(Box::new(registrations_total.clone()))?;

        let rating_distribution = Histogram::with_opts(
            HistogramOpts::new(
                "rally_ledger_rating_distribution",
                "Ratings written by settlements",
            )
            .buckets(vec![
                1000.0, 1200.0, 1300.0, 1400.0, 1500.0, 1600.0, 1700.0, 1800.0, 2000.0,
            ]),
        )?;
        registry.register(Box::new(rating_distribution.clone()))?;

        Ok(Self {
            registered_players,
            registrations_total,
            rating_distribution,
        })
    }
}

impl CommandMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let commands_total = IntCounterVec::new(
            Opts::new("rally_ledger_commands_total", "Commands handled"),
            &["command", "outcome"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        Ok(Self { commands_total })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let settlement_duration = Histogram::with_opts(
            HistogramOpts::new(
                "rally_ledger_settlement_duration_seconds",
                "Confirmation settlement time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(settlement_duration.clone()))?;

        let command_processing_duration = HistogramVec::new(
            HistogramOpts::new(
                "rally_ledger_command_processing_duration_seconds",
                "Command processing time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["command"],
        )?;
        registry.register(Box::new(command_processing_duration.clone()))?;

        let amqp_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "rally_ledger_amqp_operation_duration_seconds",
                "AMQP operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_operation_duration.clone()))?;

        Ok(Self {
            settlement_duration,
            command_processing_duration,
            amqp_operation_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _service = collector.service();
        let _matches = collector.matches();
        let _player = collector.player();
        let _commands = collector.commands();
        let _performance = collector.performance();
    }

    #[test]
    fn test_protocol_counters() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_match_reported();
        collector.record_match_reported();
        assert_eq!(collector.matches().pending_matches.get(), 2);

        collector.record_match_confirmed(&[14, -14], &[1514, 1486], Duration::from_micros(50));
        collector.record_match_rejected();

        assert_eq!(collector.matches().matches_reported_total.get(), 2);
        assert_eq!(collector.matches().matches_confirmed_total.get(), 1);
        assert_eq!(collector.matches().matches_rejected_total.get(), 1);
        assert_eq!(collector.matches().pending_matches.get(), 0);
        assert_eq!(collector.matches().rating_delta.get_sample_count(), 2);
        assert_eq!(collector.matches().rating_delta.get_sample_sum(), 28.0);
    }

    #[test]
    fn test_command_outcomes() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_command("confirm_match", None, Duration::from_millis(1));
        collector.record_command(
            "confirm_match",
            Some(ErrorKind::NotFound),
            Duration::from_millis(1),
        );

        let commands = &collector.commands().commands_total;
        assert_eq!(
            commands.with_label_values(&["confirm_match", "ok"]).get(),
            1
        );
        assert_eq!(
            commands
                .with_label_values(&["confirm_match", "not_found"])
                .get(),
            1
        );
    }

    #[test]
    fn test_snapshot_sets_gauges() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_registration();

        collector.update_from_snapshot(&LedgerSnapshot {
            registered_players: 12,
            pending_matches: 3,
        });

        assert_eq!(collector.player().registered_players.get(), 12);
        assert_eq!(collector.matches().pending_matches.get(), 3);
        assert_eq!(collector.player().registrations_total.get(), 1);
    }

    #[test]
    fn test_health_status_updates() {
        let collector = MetricsCollector::new().unwrap();

        collector.update_health_status(2);
        collector.update_component_health("coordinator", true);
        collector.update_component_health("amqp", false);

        assert_eq!(collector.service().health_status.get(), 2);
        assert_eq!(
            collector
                .service()
                .component_health
                .with_label_values(&["amqp"])
                .get(),
            0
        );
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().unwrap();
        let timer = collector.start_timer();

        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.elapsed() >= Duration::from_millis(10));
        assert!(timer.stop() >= Duration::from_millis(10));
    }
}
