//! Common types used throughout the sweeper service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for appointments
pub type AppointmentId = Uuid;

/// Booking lifecycle state of an appointment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    PendingPayment,
    Confirmed,
    Cancelled,
    Completed,
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppointmentStatus::PendingPayment => write!(f, "pending_payment"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Payment state of an appointment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

/// An appointment as stored by the booking platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub client_id: Uuid,
    pub practitioner_id: Uuid,
    pub service_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn is_cancelled(&self) -> bool {
        self.status == AppointmentStatus::Cancelled
    }
}

/// Acknowledgment from the store that one appointment was cancelled by a sweep.
///
/// The row is kept exactly as the store returned it so the sweep response can
/// echo it back unchanged, even when its id is missing or malformed. Only the
/// notification step needs a usable `cancelled_appointment_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CancellationRecord(serde_json::Value);

impl CancellationRecord {
    pub const ID_FIELD: &'static str = "cancelled_appointment_id";

    pub fn new(cancelled_appointment_id: AppointmentId) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert(
            Self::ID_FIELD.to_string(),
            serde_json::Value::String(cancelled_appointment_id.to_string()),
        );
        Self(serde_json::Value::Object(fields))
    }

    /// Wrap a raw row as returned by the store
    pub fn from_value(row: serde_json::Value) -> Self {
        Self(row)
    }

    /// Add or replace a field on an object row
    pub fn with_field(mut self, key: &str, value: serde_json::Value) -> Self {
        if let Some(fields) = self.0.as_object_mut() {
            fields.insert(key.to_string(), value);
        }
        self
    }

    /// The cancelled appointment's id, if the row carries a valid one
    pub fn appointment_id(&self) -> Option<AppointmentId> {
        self.0
            .get(Self::ID_FIELD)?
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientContact {
    pub id: Uuid,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PractitionerSummary {
    pub id: Uuid,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub id: Uuid,
    pub name: String,
}

/// Appointment joined with its client, practitioner and service records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentDetails {
    pub id: AppointmentId,
    pub start_time: DateTime<Utc>,
    pub client: ClientContact,
    pub practitioner: PractitionerSummary,
    pub service: ServiceSummary,
}

/// Kind of client notification the sweeper emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AppointmentCancelledUnpaid,
}

/// A request to tell a client about something that happened to their booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub kind: NotificationKind,
    pub appointment_id: AppointmentId,
    pub recipient_email: String,
    pub recipient_name: Option<String>,
    pub practitioner_name: Option<String>,
    pub service_name: String,
    pub start_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl NotificationIntent {
    /// Build a cancellation notice from enriched details.
    ///
    /// Returns `None` when the client has no email address on file.
    pub fn cancelled_unpaid(details: &AppointmentDetails, now: DateTime<Utc>) -> Option<Self> {
        let email = details.client.email.as_deref()?.trim();
        if email.is_empty() {
            return None;
        }

        Some(Self {
            kind: NotificationKind::AppointmentCancelledUnpaid,
            appointment_id: details.id,
            recipient_email: email.to_string(),
            recipient_name: details.client.full_name.clone(),
            practitioner_name: details.practitioner.display_name.clone(),
            service_name: details.service.name.clone(),
            start_time: details.start_time,
            created_at: now,
        })
    }
}

/// JSON envelope returned by the sweep endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SweepResponse {
    Success {
        success: bool,
        cancelled_count: usize,
        cancelled_appointments: Vec<CancellationRecord>,
    },
    Failure {
        error: String,
    },
}

impl SweepResponse {
    pub fn success(cancelled_appointments: Vec<CancellationRecord>) -> Self {
        SweepResponse::Success {
            success: true,
            cancelled_count: cancelled_appointments.len(),
            cancelled_appointments,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        SweepResponse::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SweepResponse::Success { .. })
    }

    /// Process exit status for a one-shot sweep
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}
