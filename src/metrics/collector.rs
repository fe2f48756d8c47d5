//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the appointment sweeper
//! using Prometheus metrics.

use anyhow::Result;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the sweeper service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Sweep-related metrics
    sweep_metrics: SweepMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,
}

/// Sweep-related metrics
#[derive(Clone)]
pub struct SweepMetrics {
    /// Sweeps run, by outcome
    pub sweeps_total: IntCounterVec,

    /// Appointments cancelled for non-payment
    pub appointments_cancelled_total: IntCounter,

    /// Notification attempts, by outcome
    pub notifications_total: IntCounterVec,

    /// Wall time of a whole sweep, notifications included
    pub sweep_duration: Histogram,

    /// Unix time of the last successful sweep
    pub last_success_timestamp: IntGauge,
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
        let sweep_metrics = SweepMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            sweep_metrics,
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

    /// Get sweep metrics
    pub fn sweep(&self) -> &SweepMetrics {
        &self.sweep_metrics
    }

    /// Record a sweep whose remote procedure succeeded
    pub fn record_sweep_success(&self, cancelled: usize, duration: Duration) {
        self.sweep_metrics
            .sweeps_total
            .with_label_values(&["success"])
            .inc();
        self.sweep_metrics
            .appointments_cancelled_total
            .inc_by(cancelled as u64);
        self.sweep_metrics
            .sweep_duration
            .observe(duration.as_secs_f64());
        self.sweep_metrics
            .last_success_timestamp
            .set(chrono::Utc::now().timestamp());
    }

    /// Record a sweep whose remote procedure failed
    pub fn record_sweep_failure(&self, duration: Duration) {
        self.sweep_metrics
            .sweeps_total
            .with_label_values(&["error"])
            .inc();
        self.sweep_metrics
            .sweep_duration
            .observe(duration.as_secs_f64());
    }

    /// Record one notification attempt
    pub fn record_notification(&self, status: &str) {
        self.sweep_metrics
            .notifications_total
            .with_label_values(&[status])
            .inc();
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    /// Start timing now
    pub fn start() -> Self {
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
        let uptime_seconds = IntGauge::new(
            "appointment_sweeper_uptime_seconds",
            "Service uptime in seconds",
        )?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "appointment_sweeper_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
        })
    }
}

impl SweepMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let sweeps_total = IntCounterVec::new(
            Opts::new("appointment_sweeper_sweeps_total", "Total sweeps run"),
            &["status"],
        )?;
        registry.register(Box::new(sweeps_total.clone()))?;

        let appointments_cancelled_total = IntCounter::new(
            "appointment_sweeper_appointments_cancelled_total",
            "Appointments cancelled for non-payment",
        )?;
        registry.register(Box::new(appointments_cancelled_total.clone()))?;

        let notifications_total = IntCounterVec::new(
            Opts::new(
                "appointment_sweeper_notifications_total",
                "Client notification attempts",
            ),
            &["status"],
        )?;
        registry.register(Box::new(notifications_total.clone()))?;

        let sweep_duration = Histogram::with_opts(
            HistogramOpts::new(
                "appointment_sweeper_sweep_duration_seconds",
                "Sweep duration including notifications",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(sweep_duration.clone()))?;

        let last_success_timestamp = IntGauge::new(
            "appointment_sweeper_last_success_timestamp_seconds",
            "Unix time of the last successful sweep",
        )?;
        registry.register(Box::new(last_success_timestamp.clone()))?;

        Ok(Self {
            sweeps_total,
            appointments_cancelled_total,
            notifications_total,
            sweep_duration,
            last_success_timestamp,
        })
    }
}
