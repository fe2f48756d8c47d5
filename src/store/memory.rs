//! In-process appointment store
//!
//! Evaluates an [`ExpiryPolicy`] itself and cancels matching appointments
//! with a conditional update under a single lock, so concurrent sweeps can
//! never cancel the same appointment twice.

use crate::error::{Result, SweeperError};
use crate::store::AppointmentStore;
use crate::sweeper::policy::{ExpiryPolicy, PaymentWindowPolicy};
use crate::types::{
    Appointment, AppointmentDetails, AppointmentId, AppointmentStatus, CancellationRecord,
    ClientContact, PractitionerSummary, ServiceSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Reason recorded on appointments cancelled by the sweep
pub const PAYMENT_EXPIRED_REASON: &str = "payment_expired";

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Default)]
struct StoreState {
    /// Insertion order is kept so sweeps report cancellations deterministically
    appointments: Vec<Appointment>,
    clients: HashMap<Uuid, ClientContact>,
    practitioners: HashMap<Uuid, PractitionerSummary>,
    services: HashMap<Uuid, ServiceSummary>,
}

/// Appointment store held entirely in memory
pub struct InMemoryAppointmentStore {
    state: Mutex<StoreState>,
    policy: Arc<dyn ExpiryPolicy>,
    clock: Clock,
}

impl InMemoryAppointmentStore {
    /// Create an empty store using the default payment window and wall clock
    pub fn new() -> Self {
        Self::with_policy(Arc::new(PaymentWindowPolicy::default()))
    }

    /// Create an empty store with a custom expiry policy
    pub fn with_policy(policy: Arc<dyn ExpiryPolicy>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            policy,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the clock used to evaluate the policy
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state.lock().map_err(|_| {
            SweeperError::InternalError {
                message: "Failed to acquire appointment store lock".to_string(),
            }
            .into()
        })
    }

    pub fn insert_appointment(&self, appointment: Appointment) -> Result<()> {
        let mut state = self.lock()?;
        match state
            .appointments
            .iter_mut()
            .find(|existing| existing.id == appointment.id)
        {
            Some(existing) => *existing = appointment,
            None => state.appointments.push(appointment),
        }
        Ok(())
    }

    pub fn insert_client(&self, client: ClientContact) -> Result<()> {
        self.lock()?.clients.insert(client.id, client);
        Ok(())
    }

    pub fn insert_practitioner(&self, practitioner: PractitionerSummary) -> Result<()> {
        self.lock()?
            .practitioners
            .insert(practitioner.id, practitioner);
        Ok(())
    }

    pub fn insert_service(&self, service: ServiceSummary) -> Result<()> {
        self.lock()?.services.insert(service.id, service);
        Ok(())
    }

    pub fn get_appointment(&self, appointment_id: AppointmentId) -> Result<Option<Appointment>> {
        Ok(self
            .lock()?
            .appointments
            .iter()
            .find(|appointment| appointment.id == appointment_id)
            .cloned())
    }

    /// Number of appointments currently in the cancelled state
    pub fn cancelled_count(&self) -> Result<usize> {
        Ok(self
            .lock()?
            .appointments
            .iter()
            .filter(|appointment| appointment.is_cancelled())
            .count())
    }
}

impl Default for InMemoryAppointmentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn cancel_expired_appointments(&self) -> Result<Vec<CancellationRecord>> {
        let now = (self.clock)();
        let mut state = self.lock()?;
        let mut records = Vec::new();

        for appointment in state.appointments.iter_mut() {
            if appointment.is_cancelled() || !self.policy.is_expired(appointment, now) {
                continue;
            }

            appointment.status = AppointmentStatus::Cancelled;
            appointment.cancellation_reason = Some(PAYMENT_EXPIRED_REASON.to_string());
            appointment.cancelled_at = Some(now);

            debug!("Cancelled expired appointment {}", appointment.id);
            records.push(CancellationRecord::new(appointment.id));
        }

        Ok(records)
    }

    async fn fetch_appointment_details(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<AppointmentDetails> {
        let state = self.lock()?;

        let not_found = || SweeperError::AppointmentNotFound {
            appointment_id: appointment_id.to_string(),
        };

        let appointment = state
            .appointments
            .iter()
            .find(|appointment| appointment.id == appointment_id)
            .ok_or_else(not_found)?;

        let client = state
            .clients
            .get(&appointment.client_id)
            .cloned()
            .ok_or_else(|| SweeperError::InvalidStoreResponse {
                reason: format!("Client {} missing", appointment.client_id),
            })?;
        let practitioner = state
            .practitioners
            .get(&appointment.practitioner_id)
            .cloned()
            .ok_or_else(|| SweeperError::InvalidStoreResponse {
                reason: format!("Practitioner {} missing", appointment.practitioner_id),
            })?;
        let service = state
            .services
            .get(&appointment.service_id)
            .cloned()
            .ok_or_else(|| SweeperError::InvalidStoreResponse {
                reason: format!("Service {} missing", appointment.service_id),
            })?;

        Ok(AppointmentDetails {
            id: appointment.id,
            start_time: appointment.start_time,
            client,
            practitioner,
            service,
        })
    }
}
