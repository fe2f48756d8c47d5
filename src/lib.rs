//! Appointment Sweeper - cancels expired unpaid appointments
//!
//! This crate exposes an HTTP-triggered sweep that asks the appointment store
//! to cancel every pending appointment whose payment window has lapsed, then
//! notifies each affected client without letting a single failure abort the
//! batch.

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod types;

// Re-export commonly used types and traits
pub use error::{Result, SweeperError};
pub use types::*;

// Re-export key components
pub use notify::{LoggingDispatcher, NotificationDispatcher};
pub use store::{AppointmentStore, InMemoryAppointmentStore, RestAppointmentStore};
pub use sweeper::{ExpiryPolicy, ExpirySweeper, PaymentWindowPolicy, SweepOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
