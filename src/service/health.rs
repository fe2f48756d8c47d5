//! Health check state and reporting
//!
//! This module tracks whether the service is running and how the most recent
//! sweep went, and turns that into liveness and readiness answers.

use crate::error::Result;
use crate::sweeper::SweepOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Numeric form used by the health gauge
    pub fn as_gauge(self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Summary of the most recent sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastSweep {
    pub finished_at: DateTime<Utc>,
    pub succeeded: bool,
    pub cancelled: usize,
    pub notification_failures: usize,
    pub error: Option<String>,
}

/// Shared runtime status of the service
#[derive(Debug)]
pub struct ServiceStatus {
    running: RwLock<bool>,
    last_sweep: RwLock<Option<LastSweep>>,
    started_at: DateTime<Utc>,
}

impl ServiceStatus {
    pub fn new() -> Self {
        Self {
            running: RwLock::new(false),
            last_sweep: RwLock::new(None),
            started_at: Utc::now(),
        }
    }

    pub async fn set_running(&self, running: bool) {
        *self.running.write().await = running;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub async fn last_sweep(&self) -> Option<LastSweep> {
        self.last_sweep.read().await.clone()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Remember how a sweep ended
    pub async fn record_sweep(&self, result: &Result<SweepOutcome>) {
        let summary = match result {
            Ok(outcome) => LastSweep {
                finished_at: Utc::now(),
                succeeded: true,
                cancelled: outcome.cancelled_count(),
                notification_failures: outcome.notification_failures,
                error: None,
            },
            Err(e) => LastSweep {
                finished_at: Utc::now(),
                succeeded: false,
                cancelled: 0,
                notification_failures: 0,
                error: Some(e.to_string()),
            },
        };

        debug!("Recording sweep result: succeeded={}", summary.succeeded);
        *self.last_sweep.write().await = Some(summary);
    }
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub checks: Vec<ComponentCheck>,
    pub last_sweep: Option<LastSweep>,
}

impl HealthCheck {
    /// Perform a full health check
    pub async fn check(status: &ServiceStatus, service_name: &str) -> Self {
        let running = Self::check_service_running(status).await;
        let sweeps = Self::check_last_sweep(status).await;

        let overall = [&running, &sweeps]
            .iter()
            .map(|check| check.status)
            .fold(HealthStatus::Healthy, |acc, status| match (acc, status) {
                (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => {
                    HealthStatus::Unhealthy
                }
                (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => {
                    HealthStatus::Degraded
                }
                _ => HealthStatus::Healthy,
            });

        let now = Utc::now();
        HealthCheck {
            status: overall,
            service: service_name.to_string(),
            version: crate::VERSION.to_string(),
            timestamp: now,
            uptime_seconds: (now - status.started_at()).num_seconds(),
            checks: vec![running, sweeps],
            last_sweep: status.last_sweep().await,
        }
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(status: &ServiceStatus) -> HealthStatus {
        if status.is_running().await {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    async fn check_service_running(status: &ServiceStatus) -> ComponentCheck {
        let (health, message) = if status.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status: health,
            message,
        }
    }

    /// A failed last sweep degrades the service; no sweep yet is fine
    async fn check_last_sweep(status: &ServiceStatus) -> ComponentCheck {
        let (health, message) = match status.last_sweep().await {
            Some(last) if !last.succeeded => (HealthStatus::Degraded, last.error),
            _ => (HealthStatus::Healthy, None),
        };

        ComponentCheck {
            name: "last_sweep".to_string(),
            status: health,
            message,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
