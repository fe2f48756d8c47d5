//! Expired-appointment sweep
//!
//! One sweep asks the store to cancel every expired unpaid appointment, then
//! tries to notify each affected client. Only the cancellation call can fail
//! the sweep. Enrichment and dispatch errors are logged per appointment and
//! the loop moves on.

use crate::error::{Result, SweeperError};
use crate::metrics::{MetricsCollector, MetricsTimer};
use crate::notify::NotificationDispatcher;
use crate::store::AppointmentStore;
use crate::types::{CancellationRecord, NotificationIntent};
use anyhow::anyhow;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of a completed sweep
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    /// Records returned by the store, in store order
    pub cancelled: Vec<CancellationRecord>,
    /// Notifications handed to the dispatcher
    pub notified: usize,
    /// Appointments whose enrichment or dispatch failed
    pub notification_failures: usize,
    /// Appointments skipped because the client has no email
    pub skipped: usize,
}

impl SweepOutcome {
    pub fn cancelled_count(&self) -> usize {
        self.cancelled.len()
    }
}

enum NotifyStatus {
    Sent,
    Skipped,
}

/// Runs expiry sweeps against a store
#[derive(Clone)]
pub struct ExpirySweeper {
    store: Arc<dyn AppointmentStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ExpirySweeper {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            metrics: None,
        }
    }

    /// Attach a metrics collector
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run one sweep.
    ///
    /// Fails only when the store's cancellation call fails; in that case no
    /// notification is attempted.
    pub async fn sweep(&self) -> Result<SweepOutcome> {
        let timer = MetricsTimer::start();

        let cancelled = match self.store.cancel_expired_appointments().await {
            Ok(records) => records,
            Err(e) => {
                error!("Expired appointment cancellation failed: {}", e);
                if let Some(metrics) = &self.metrics {
                    metrics.record_sweep_failure(timer.elapsed());
                }
                return Err(e);
            }
        };

        if cancelled.is_empty() {
            debug!("Sweep found no expired unpaid appointments");
        } else {
            info!("Cancelled {} expired unpaid appointments", cancelled.len());
        }

        let mut outcome = SweepOutcome {
            cancelled,
            ..SweepOutcome::default()
        };

        for record in &outcome.cancelled {
            let status = match self.notify_client(record).await {
                Ok(NotifyStatus::Sent) => {
                    outcome.notified += 1;
                    "sent"
                }
                Ok(NotifyStatus::Skipped) => {
                    outcome.skipped += 1;
                    "skipped"
                }
                Err(e) => {
                    warn!(
                        row = %record.as_value(),
                        "Failed to notify client of cancelled appointment: {:#}", e
                    );
                    outcome.notification_failures += 1;
                    "failed"
                }
            };

            if let Some(metrics) = &self.metrics {
                metrics.record_notification(status);
            }
        }

        let elapsed = timer.stop();
        if let Some(metrics) = &self.metrics {
            metrics.record_sweep_success(outcome.cancelled_count(), elapsed);
        }

        info!(
            "Sweep completed - cancelled: {}, notified: {}, skipped: {}, failed: {}, time: {:.2}ms",
            outcome.cancelled_count(),
            outcome.notified,
            outcome.skipped,
            outcome.notification_failures,
            elapsed.as_secs_f64() * 1000.0
        );

        Ok(outcome)
    }

    /// Enrich one cancelled appointment and dispatch the client notice
    async fn notify_client(&self, record: &CancellationRecord) -> Result<NotifyStatus> {
        let appointment_id =
            record
                .appointment_id()
                .ok_or_else(|| SweeperError::InvalidStoreResponse {
                    reason: format!(
                        "cancellation row has no usable {}",
                        CancellationRecord::ID_FIELD
                    ),
                })?;

        let details = self
            .store
            .fetch_appointment_details(appointment_id)
            .await
            .map_err(|e| anyhow!("enrichment failed: {:#}", e))?;

        let Some(intent) = NotificationIntent::cancelled_unpaid(&details, Utc::now()) else {
            warn!(
                appointment_id = %appointment_id,
                client_id = %details.client.id,
                "Client has no email address, skipping notification"
            );
            return Ok(NotifyStatus::Skipped);
        };

        self.dispatcher
            .dispatch(intent)
            .await
            .map_err(|e| anyhow!("dispatch failed: {:#}", e))?;

        Ok(NotifyStatus::Sent)
    }
}
