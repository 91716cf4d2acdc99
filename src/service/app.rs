//! Main application state and service coordination
//!
//! `AppState` owns the ledger, the broker connection, the health server and
//! the background tasks. Construction is synchronous and never touches the
//! network; `start` brings up the broker side.

use crate::amqp::connection::{AmqpConfig, AmqpConnection};
use crate::amqp::handlers::CommandConsumer;
use crate::amqp::publisher::{AmqpNotificationPublisher, NotificationPublisher, PublisherConfig};
use crate::config::AppConfig;
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector};
use crate::service::handler::LedgerMessageHandler;
use crate::service::health::HealthCheck;
use crate::service::ledger::Ledger;
use amqprs::channel::QueueDeclareArguments;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

const METRICS_INTERVAL: Duration = Duration::from_secs(30);
const HEALTH_INTERVAL: Duration = Duration::from_secs(60);

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,
    ledger: Arc<Ledger>,
    metrics_collector: Arc<MetricsCollector>,

    /// Set once `start` or `connect_amqp` reaches the broker
    amqp_connection: RwLock<Option<Arc<AmqpConnection>>>,
    publisher: RwLock<Option<Arc<dyn NotificationPublisher>>>,
    consumer: Mutex<Option<CommandConsumer>>,

    background_tasks: Mutex<Vec<JoinHandle<()>>>,
    health_server: Mutex<Option<Arc<HealthServer>>>,

    is_running: Arc<RwLock<bool>>,
    started_at: Instant,
}

impl AppState {
    /// Build the ledger and metrics without connecting to anything
    pub fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing {} service", config.service.name);
        info!(
            "Configuration: amqp_url={}, command_queue={}, k_factor={}",
            config.amqp.url, config.amqp.command_queue, config.rating.k_factor
        );

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let ledger = Ledger::new(&config.rating, metrics_collector.clone()).map_err(|e| {
            ServiceError::Configuration {
                message: format!("Failed to initialize ledger: {}", e),
            }
        })?;

        Ok(Self {
            config,
            ledger: Arc::new(ledger),
            metrics_collector,
            amqp_connection: RwLock::new(None),
            publisher: RwLock::new(None),
            consumer: Mutex::new(None),
            background_tasks: Mutex::new(Vec::new()),
            health_server: Mutex::new(None),
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        })
    }

    /// Start the health server, connect to the broker and begin consuming
    pub async fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        info!("Starting {} service", self.config.service.name);

        self.start_health_server().await;

        let connection = self.connect_amqp().await?;
        self.start_amqp_consumption(&connection).await?;

        *self.is_running.write().await = true;

        self.start_background_tasks().await;

        info!("✅ {} service started successfully", self.config.service.name);
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of {}", self.config.service.name);

        *self.is_running.write().await = false;

        if let Some(consumer) = self.consumer.lock().await.take() {
            match consumer.stop_consuming().await {
                Ok(()) => info!("✅ AMQP command consumption stopped"),
                Err(e) => warn!("Failed to stop AMQP consumer: {}", e),
            }
        }

        self.stop_background_tasks().await;

        if let Some(server) = self.health_server.lock().await.take() {
            if let Err(e) = server.stop().await {
                warn!("Failed to stop health server: {}", e);
            }
        }

        let final_stats =
            self.ledger
                .coordinator()
                .get_stats()
                .map_err(|e| ServiceError::BackgroundTask {
                    message: format!("Failed to get final stats: {}", e),
                })?;

        info!("Final ledger statistics: {:?}", final_stats);
        info!("✅ {} shutdown completed", self.config.service.name);

        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    #[cfg(test)]
    pub(crate) async fn mark_running(&self, running: bool) {
        *self.is_running.write().await = running;
    }

    pub fn ledger(&self) -> Arc<Ledger> {
        self.ledger.clone()
    }

    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// Broker connection, if one has been established
    pub async fn amqp_connection(&self) -> Option<Arc<AmqpConnection>> {
        self.amqp_connection.read().await.clone()
    }

    /// Publisher the command handler reports through, once connected
    pub async fn publisher(&self) -> Option<Arc<dyn NotificationPublisher>> {
        self.publisher.read().await.clone()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Connect to the broker using the configured URL and retry policy
    pub async fn connect_amqp(&self) -> Result<Arc<AmqpConnection>, ServiceError> {
        info!("Connecting to AMQP broker: {}", self.config.amqp.url);

        let amqp_config = AmqpConfig {
            max_retries: self.config.amqp.max_retry_attempts,
            retry_delay_ms: self.config.amqp.retry_delay_ms,
            connection_timeout_ms: self.config.amqp_connection_timeout().as_millis() as u64,
            ..AmqpConfig::from_url(&self.config.amqp.url).map_err(|e| {
                ServiceError::Configuration {
                    message: format!("Failed to parse AMQP URL: {}", e),
                }
            })?
        };

        let timer = self.metrics_collector.start_timer();
        let result = AmqpConnection::new(amqp_config).await;
        self.metrics_collector
            .record_amqp_operation("connect", result.is_ok(), timer.stop());

        let connection = Arc::new(result.map_err(|e| ServiceError::AmqpConnection {
            message: format!("Failed to connect to AMQP: {}", e),
        })?);

        *self.amqp_connection.write().await = Some(connection.clone());
        self.metrics_collector.update_component_health("amqp", true);

        Ok(connection)
    }

    async fn start_health_server(self: &Arc<Self>) {
        let health_config = HealthServerConfig {
            port: self.config.service.health_port,
            host: "0.0.0.0".to_string(),
        };
        let server = Arc::new(
            HealthServer::new(health_config, self.metrics_collector.clone())
                .with_app_state(self.clone()),
        );

        let task = {
            let server = server.clone();
            tokio::spawn(async move {
                if let Err(e) = server.start().await {
                    error!("Health server failed: {}", e);
                }
            })
        };

        *self.health_server.lock().await = Some(server);
        self.background_tasks.lock().await.push(task);

        // Give the listener a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;
        info!(
            "✅ Health endpoints started on port {}",
            self.config.service.health_port
        );
    }

    async fn start_amqp_consumption(
        &self,
        connection: &AmqpConnection,
    ) -> Result<(), ServiceError> {
        let queue = self.config.amqp.command_queue.as_str();
        let exchange = self.config.amqp.notification_exchange.as_str();

        let publish_channel = connection
            .connection()
            .open_channel(None)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open publisher channel: {}", e),
            })?;

        let publisher_config = PublisherConfig {
            max_retries: self.config.amqp.max_retry_attempts,
            ..PublisherConfig::default()
        };
        let publisher: Arc<dyn NotificationPublisher> = Arc::new(
            AmqpNotificationPublisher::new(publish_channel, exchange, publisher_config)
                .await
                .map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to initialize notification publisher: {}", e),
                })?,
        );
        *self.publisher.write().await = Some(publisher.clone());

        let consume_channel = connection
            .connection()
            .open_channel(None)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open consumer channel: {}", e),
            })?;

        debug!("Declaring queue: '{}'", queue);
        let queue_args = QueueDeclareArguments::new(queue)
            .durable(true)
            .auto_delete(false)
            .finish();
        consume_channel
            .queue_declare(queue_args)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to declare queue {}: {}", queue, e),
            })?;

        // Pending reports must be back before the first confirm arrives
        self.ledger
            .restore()
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to restore pending matches: {}", e),
            })?;

        let handler = Arc::new(LedgerMessageHandler::new(
            self.ledger.router(),
            publisher,
            self.metrics_collector.clone(),
        ));
        let consumer = CommandConsumer::new(handler, consume_channel);
        consumer
            .start_consuming(queue)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to start consuming commands: {}", e),
            })?;

        *self.consumer.lock().await = Some(consumer);

        info!(
            "Listening for commands on '{}', publishing to '{}'",
            queue, exchange
        );
        Ok(())
    }

    async fn start_background_tasks(self: &Arc<Self>) {
        let metrics_task = {
            let ledger = self.ledger.clone();
            let metrics_collector = self.metrics_collector.clone();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(METRICS_INTERVAL);
                debug!("Metrics update task started");

                while *is_running.read().await {
                    interval.tick().await;

                    match ledger.snapshot().await {
                        Ok(snapshot) => {
                            debug!(
                                "Updating metrics - players: {}, pending: {}",
                                snapshot.registered_players, snapshot.pending_matches
                            );
                            metrics_collector.update_from_snapshot(&snapshot);
                        }
                        Err(e) => warn!("Failed to read ledger snapshot: {}", e),
                    }
                }

                debug!("Metrics update task stopped");
            })
        };

        let health_task = {
            let app_state = self.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(HEALTH_INTERVAL);
                debug!("Health metrics task started");

                while app_state.is_running().await {
                    interval.tick().await;

                    let metrics_collector = &app_state.metrics_collector;
                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(app_state.uptime().as_secs() as i64);

                    match HealthCheck::check(app_state.clone()).await {
                        Ok(health) => {
                            metrics_collector.update_health_status(health.status.as_gauge());
                            for check in &health.checks {
                                metrics_collector.update_component_health(
                                    &check.name,
                                    check.status.as_gauge() > 0,
                                );
                            }
                        }
                        Err(e) => warn!("Health check failed: {}", e),
                    }
                }

                debug!("Health metrics task stopped");
            })
        };

        let mut tasks = self.background_tasks.lock().await;
        tasks.push(metrics_task);
        tasks.push(health_task);
        info!("{} background tasks running", tasks.len());
    }

    async fn stop_background_tasks(&self) {
        let mut tasks = self.background_tasks.lock().await;
        let task_count = tasks.len();
        if task_count == 0 {
            return;
        }

        for task in tasks.drain(..) {
            task.abort();
        }

        info!("✅ Stopped {} background tasks", task_count);
    }
}
