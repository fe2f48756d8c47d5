//! Error types for the sweeper service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific sweep scenarios
#[derive(Debug, thiserror::Error)]
pub enum SweeperError {
    #[error("Remote procedure failed ({status}): {message}")]
    RemoteProcedure { status: u16, message: String },

    #[error("Store query on {resource} failed ({status}): {message}")]
    GatewayQuery {
        resource: String,
        status: u16,
        message: String,
    },

    #[error("Data store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Appointment not found: {appointment_id}")]
    AppointmentNotFound { appointment_id: String },

    #[error("Invalid store response: {reason}")]
    InvalidStoreResponse { reason: String },

    #[error("Notification failed for appointment {appointment_id}: {reason}")]
    NotificationFailed {
        appointment_id: String,
        reason: String,
    },

    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
