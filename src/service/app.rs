//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the store,
//! notification dispatch, HTTP surface and the optional sweep schedule.

use crate::api::{ApiState, HttpServer, HttpServerConfig};
use crate::config::{validate_config, AppConfig};
use crate::metrics::MetricsCollector;
use crate::notify::{
    AmqpConnection, AmqpNotificationPublisher, LoggingDispatcher, NotificationDispatcher,
    PublisherConfig,
};
use crate::service::health::{HealthCheck, ServiceStatus};
use crate::store::{AppointmentStore, RestAppointmentStore};
use crate::sweeper::{ExpirySweeper, SweepOutcome};
use crate::types::SweepResponse;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Sweep logic bound to the configured store and dispatcher
    sweeper: ExpirySweeper,

    /// Prometheus metrics shared with the HTTP surface
    metrics: Arc<MetricsCollector>,

    /// Running flag and last sweep result
    status: Arc<ServiceStatus>,

    /// Sweep, health and metrics endpoints
    http_server: Arc<HttpServer>,

    /// Broker connection when intents are published to AMQP
    amqp_connection: Option<Arc<AmqpConnection>>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing appointment sweeper");
        info!(
            "Configuration: service={}, store_url={}, procedure={}",
            config.service.name, config.store.url, config.store.cancel_procedure
        );

        let store: Arc<dyn AppointmentStore> = Arc::new(
            RestAppointmentStore::new(&config.store).map_err(|e| ServiceError::Initialization {
                message: format!("Failed to create store client: {}", e),
            })?,
        );

        let (dispatcher, amqp_connection) = Self::initialize_dispatcher(&config).await?;

        Self::with_components(config, store, dispatcher, amqp_connection)
    }

    /// Assemble the service from already constructed parts
    pub fn with_components(
        config: AppConfig,
        store: Arc<dyn AppointmentStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        amqp_connection: Option<Arc<AmqpConnection>>,
    ) -> Result<Self, ServiceError> {
        validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let metrics = Arc::new(
            MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            })?,
        );

        let sweeper = ExpirySweeper::new(store, dispatcher).with_metrics(metrics.clone());
        let status = Arc::new(ServiceStatus::new());

        let api_state = ApiState {
            sweeper: sweeper.clone(),
            metrics: metrics.clone(),
            status: status.clone(),
            service_name: config.service.name.clone(),
        };
        let http_config = HttpServerConfig {
            port: config.service.http_port,
            host: config.service.http_host.clone(),
        };
        let http_server = Arc::new(HttpServer::new(http_config, api_state));

        Ok(Self {
            config,
            sweeper,
            metrics,
            status,
            http_server,
            amqp_connection,
            background_tasks: Vec::new(),
        })
    }

    /// Pick the notification channel from configuration
    async fn initialize_dispatcher(
        config: &AppConfig,
    ) -> Result<(Arc<dyn NotificationDispatcher>, Option<Arc<AmqpConnection>>), ServiceError> {
        if !config.amqp.enabled {
            info!("AMQP publishing disabled - notification intents will be logged");
            return Ok((Arc::new(LoggingDispatcher::new()), None));
        }

        info!("Connecting to AMQP broker: {}", config.amqp.url);
        let connection = AmqpConnection::new(&config.amqp).await.map_err(|e| {
            ServiceError::AmqpConnection {
                message: format!("Failed to connect to AMQP: {}", e),
            }
        })?;

        let channel = connection.connection().open_channel(None).await.map_err(|e| {
            ServiceError::AmqpConnection {
                message: format!("Failed to open AMQP channel: {}", e),
            }
        })?;

        let publisher_config = PublisherConfig {
            exchange_name: config.amqp.exchange_name.clone(),
            max_retries: config.amqp.max_retry_attempts,
            retry_delay_ms: config.amqp.retry_delay_ms,
            ..PublisherConfig::default()
        };
        let publisher = AmqpNotificationPublisher::new(channel, publisher_config)
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to initialize notification publisher: {}", e),
            })?;

        Ok((Arc::new(publisher), Some(Arc::new(connection))))
    }

    /// Start the HTTP server and background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting appointment sweeper");

        self.status.set_running(true).await;

        self.start_http_server().await?;
        self.start_background_tasks();

        info!("✅ Appointment sweeper started successfully");
        Ok(())
    }

    /// Run a single sweep and record its result
    pub async fn run_sweep(&self) -> crate::error::Result<SweepOutcome> {
        let result = self.sweeper.sweep().await;
        self.status.record_sweep(&result).await;
        result
    }

    /// Run one sweep and shape the result like the HTTP endpoint does
    pub async fn run_once(&self) -> SweepResponse {
        match self.run_sweep().await {
            Ok(outcome) => SweepResponse::success(outcome.cancelled),
            Err(e) => {
                error!("Sweep failed: {}", e);
                SweepResponse::failure(e.to_string())
            }
        }
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of appointment sweeper");

        self.status.set_running(false).await;

        if let Err(e) = self.http_server.stop().await {
            warn!("Failed to stop HTTP server: {}", e);
        }

        self.stop_background_tasks().await;

        if let Some(connection) = self.amqp_connection.take() {
            match Arc::try_unwrap(connection) {
                Ok(connection) => {
                    if let Err(e) = connection.close().await {
                        warn!("Failed to close AMQP connection: {}", e);
                    } else {
                        info!("✅ AMQP connection closed");
                    }
                }
                Err(_) => debug!("AMQP connection still shared, leaving it to drop"),
            }
        }

        if let Some(last) = self.status.last_sweep().await {
            info!("Last sweep before shutdown: {:?}", last);
        }
        info!("✅ Appointment sweeper shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        self.status.is_running().await
    }

    pub fn status(&self) -> Arc<ServiceStatus> {
        self.status.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn sweeper(&self) -> &ExpirySweeper {
        &self.sweeper
    }

    /// Spawn the HTTP server as a background task
    async fn start_http_server(&mut self) -> Result<(), ServiceError> {
        info!("Starting HTTP endpoints");

        let http_server = self.http_server.clone();
        let port = self.config.service.http_port;

        let handle = tokio::spawn(async move {
            if let Err(e) = http_server.start().await {
                error!("HTTP server failed: {}", e);
            } else {
                info!("HTTP server task completed");
            }
        });

        self.background_tasks.push(handle);

        // Give the server a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("✅ HTTP endpoints started on port {}", port);
        Ok(())
    }

    /// Start the scheduled sweep and health metric tasks
    fn start_background_tasks(&mut self) {
        if self.config.sweeper.schedule_enabled {
            let interval_duration = self.config.sweep_interval();
            info!(
                "Starting scheduled sweep task ({}s interval)...",
                interval_duration.as_secs()
            );

            let sweeper = self.sweeper.clone();
            let status = self.status.clone();

            let sweep_task = tokio::spawn(async move {
                let mut interval = tokio::time::interval(interval_duration);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                info!("Scheduled sweep task started");

                while status.is_running().await {
                    interval.tick().await;

                    let result = sweeper.sweep().await;
                    if let Err(e) = &result {
                        warn!("Scheduled sweep failed: {}", e);
                    }
                    status.record_sweep(&result).await;
                }

                info!("Scheduled sweep task stopped");
            });
            self.background_tasks.push(sweep_task);
        } else {
            info!("Sweep schedule disabled - sweeps run only when the endpoint is called");
        }

        let health_task = {
            let metrics = self.metrics.clone();
            let status = self.status.clone();
            let service_name = self.config.service.name.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                info!("Health metrics task started");

                while status.is_running().await {
                    interval.tick().await;

                    let uptime = chrono::Utc::now() - status.started_at();
                    metrics.service().uptime_seconds.set(uptime.num_seconds());

                    let health = HealthCheck::check(&status, &service_name).await;
                    metrics.update_health_status(health.status.as_gauge());
                    debug!(
                        "Updated health metrics - status: {}, uptime: {}s",
                        health.status,
                        uptime.num_seconds()
                    );
                }

                info!("Health metrics task stopped");
            })
        };
        self.background_tasks.push(health_task);

        info!(
            "{} background tasks running",
            self.background_tasks.len()
        );
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}
