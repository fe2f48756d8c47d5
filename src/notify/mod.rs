//! Client notification dispatch
//!
//! The concrete email contract lives outside this service. Intents are either
//! logged or published to AMQP for a downstream mailer to pick up.

pub mod connection;
pub mod messages;
pub mod publisher;

pub use connection::AmqpConnection;
pub use publisher::{
    AmqpNotificationPublisher, ChannelSink, MessageSink, OutgoingMessage, PublisherConfig,
};

use crate::error::Result;
use crate::types::NotificationIntent;
use async_trait::async_trait;
use tracing::info;

/// Trait for delivering notification intents
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Hand one intent to the delivery channel
    async fn dispatch(&self, intent: NotificationIntent) -> Result<()>;
}

/// Dispatcher that only records the intent in the log
#[derive(Debug, Default, Clone)]
pub struct LoggingDispatcher;

impl LoggingDispatcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn dispatch(&self, intent: NotificationIntent) -> Result<()> {
        info!(
            appointment_id = %intent.appointment_id,
            recipient = %intent.recipient_email,
            service = %intent.service_name,
            start_time = %intent.start_time,
            "Would notify client of cancellation for unpaid appointment"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NotificationKind;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_logging_dispatcher_always_succeeds() {
        let intent = NotificationIntent {
            kind: NotificationKind::AppointmentCancelledUnpaid,
            appointment_id: Uuid::new_v4(),
            recipient_email: "client@example.com".to_string(),
            recipient_name: None,
            practitioner_name: None,
            service_name: "Consultation".to_string(),
            start_time: Utc::now(),
            created_at: Utc::now(),
        };

        assert!(LoggingDispatcher::new().dispatch(intent).await.is_ok());
    }
}
