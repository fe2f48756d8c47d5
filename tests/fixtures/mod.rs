//! Test fixtures and fake collaborators for integration testing

#![allow(dead_code)]

use appointment_sweeper::api::ApiState;
use appointment_sweeper::error::{Result, SweeperError};
use appointment_sweeper::metrics::MetricsCollector;
use appointment_sweeper::notify::NotificationDispatcher;
use appointment_sweeper::service::ServiceStatus;
use appointment_sweeper::store::AppointmentStore;
use appointment_sweeper::sweeper::ExpirySweeper;
use appointment_sweeper::types::{
    AppointmentDetails, AppointmentId, CancellationRecord, ClientContact, NotificationIntent,
    PractitionerSummary, ServiceSummary,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Store fake whose answers are scripted up front
#[derive(Default)]
pub struct ScriptedStore {
    cancel_result: Mutex<Option<std::result::Result<Vec<CancellationRecord>, String>>>,
    details: Mutex<HashMap<AppointmentId, AppointmentDetails>>,
    failing_details: Mutex<HashSet<AppointmentId>>,
    cancel_calls: AtomicUsize,
    detail_calls: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose cancellation call returns the given records
    pub fn returning(records: Vec<CancellationRecord>) -> Self {
        let store = Self::new();
        *store.cancel_result.lock().unwrap() = Some(Ok(records));
        store
    }

    /// Store whose cancellation call fails with the given gateway message
    pub fn failing(message: &str) -> Self {
        let store = Self::new();
        *store.cancel_result.lock().unwrap() = Some(Err(message.to_string()));
        store
    }

    /// Register enrichment data for an appointment
    pub fn with_details(self, details: AppointmentDetails) -> Self {
        self.details.lock().unwrap().insert(details.id, details);
        self
    }

    /// Make enrichment fail for one appointment
    pub fn with_failing_details(self, appointment_id: AppointmentId) -> Self {
        self.failing_details.lock().unwrap().insert(appointment_id);
        self
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AppointmentStore for ScriptedStore {
    async fn cancel_expired_appointments(&self) -> Result<Vec<CancellationRecord>> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);

        match self.cancel_result.lock().unwrap().clone() {
            Some(Ok(records)) => Ok(records),
            Some(Err(message)) => Err(SweeperError::RemoteProcedure {
                status: 400,
                message,
            }
            .into()),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_appointment_details(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<AppointmentDetails> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_details.lock().unwrap().contains(&appointment_id) {
            return Err(SweeperError::StoreUnavailable {
                message: "connection reset".to_string(),
            }
            .into());
        }

        self.details
            .lock()
            .unwrap()
            .get(&appointment_id)
            .cloned()
            .ok_or_else(|| {
                SweeperError::AppointmentNotFound {
                    appointment_id: appointment_id.to_string(),
                }
                .into()
            })
    }
}

/// Dispatcher that records every intent and can be told to reject some
#[derive(Default)]
pub struct RecordingDispatcher {
    dispatched: Mutex<Vec<NotificationIntent>>,
    rejected: Mutex<HashSet<AppointmentId>>,
    attempts: AtomicUsize,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail dispatch for one appointment
    pub fn rejecting(self, appointment_id: AppointmentId) -> Self {
        self.rejected.lock().unwrap().insert(appointment_id);
        self
    }

    pub fn dispatched(&self) -> Vec<NotificationIntent> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, intent: NotificationIntent) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.rejected.lock().unwrap().contains(&intent.appointment_id) {
            return Err(SweeperError::NotificationFailed {
                appointment_id: intent.appointment_id.to_string(),
                reason: "mail provider rejected message".to_string(),
            }
            .into());
        }

        self.dispatched.lock().unwrap().push(intent);
        Ok(())
    }
}

/// Enrichment data for an appointment tomorrow with a reachable client
pub fn details_for(appointment_id: AppointmentId, email: Option<&str>) -> AppointmentDetails {
    AppointmentDetails {
        id: appointment_id,
        start_time: Utc::now() + Duration::days(1),
        client: ClientContact {
            id: Uuid::new_v4(),
            email: email.map(str::to_string),
            full_name: Some("Jamie Rivera".to_string()),
        },
        practitioner: PractitionerSummary {
            id: Uuid::new_v4(),
            display_name: Some("Dr. Okafor".to_string()),
        },
        service: ServiceSummary {
            id: Uuid::new_v4(),
            name: "Initial consultation".to_string(),
        },
    }
}

/// Router state backed by the given fakes
pub fn api_state(
    store: Arc<dyn AppointmentStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
) -> ApiState {
    let metrics = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
    let sweeper = ExpirySweeper::new(store, dispatcher).with_metrics(metrics.clone());

    ApiState {
        sweeper,
        metrics,
        status: Arc::new(ServiceStatus::new()),
        service_name: "appointment-sweeper".to_string(),
    }
}
