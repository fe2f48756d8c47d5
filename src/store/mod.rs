//! Access to the booking platform's appointment data
//!
//! The sweeper only needs two things from the store: an atomic "cancel every
//! expired unpaid appointment" operation and a read that joins an appointment
//! to its client, practitioner and service for notifications.

pub mod memory;
pub mod rest;

pub use memory::InMemoryAppointmentStore;
pub use rest::RestAppointmentStore;

use crate::error::Result;
use crate::types::{AppointmentDetails, AppointmentId, CancellationRecord};
use async_trait::async_trait;

/// Trait for the data store that owns appointments
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Cancel every appointment whose payment window has lapsed.
    ///
    /// Must be idempotent: an appointment already cancelled by an earlier call
    /// is never reported again.
    async fn cancel_expired_appointments(&self) -> Result<Vec<CancellationRecord>>;

    /// Fetch an appointment joined with its client, practitioner and service
    async fn fetch_appointment_details(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<AppointmentDetails>;
}
