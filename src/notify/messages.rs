//! AMQP message definitions and serialization

use crate::error::{Result, SweeperError};
use crate::types::{NotificationIntent, NotificationKind};

/// Default exchange for notification intents
pub const NOTIFICATIONS_EXCHANGE: &str = "notifications.appointments";

/// Routing keys for notification intents
pub const CANCELLED_UNPAID_ROUTING_KEY: &str = "appointment.cancelled.unpaid";

/// Message envelope with metadata
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    /// Create a new message envelope
    pub fn new(payload: T, routing_key: String) -> Self {
        Self {
            payload,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            routing_key,
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            SweeperError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            SweeperError::InternalError {
                message: format!("Failed to deserialize message: {}", e),
            }
            .into()
        })
    }
}

/// Routing key for an intent
pub fn routing_key_for(intent: &NotificationIntent) -> &'static str {
    match intent.kind {
        NotificationKind::AppointmentCancelledUnpaid => CANCELLED_UNPAID_ROUTING_KEY,
    }
}
