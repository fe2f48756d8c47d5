//! AMQP publisher for notification intents

use crate::error::{Result, SweeperError};
use crate::notify::messages::{routing_key_for, MessageEnvelope};
use crate::notify::NotificationDispatcher;
use crate::types::{AppointmentId, NotificationIntent};
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Configuration for intent publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub exchange_name: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub enable_deduplication: bool,
    /// How long an announced appointment is remembered
    pub dedup_window: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            exchange_name: crate::notify::messages::NOTIFICATIONS_EXCHANGE.to_string(),
            max_retries: 3,
            retry_delay_ms: 500,
            enable_deduplication: true,
            dedup_window: Duration::from_secs(3600),
        }
    }
}

/// A serialized envelope ready for the broker
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub exchange: String,
    pub routing_key: String,
    pub message_id: String,
    pub timestamp: u64,
    pub payload: Vec<u8>,
}

/// Where published messages go
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn publish(&self, message: OutgoingMessage) -> Result<()>;
}

/// Sink backed by an open amqprs channel
pub struct ChannelSink {
    channel: Channel,
}

impl ChannelSink {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// Declare the durable topic exchange intents are published to
    pub async fn declare_exchange(&self, exchange_name: &str) -> Result<()> {
        let args = ExchangeDeclareArguments::new(exchange_name, "topic")
            .durable(true)
            .finish();
        self.channel.exchange_declare(args).await.map_err(|e| {
            SweeperError::AmqpConnectionFailed {
                message: format!("Failed to declare exchange {}: {}", exchange_name, e),
            }
        })?;

        info!("Declared notification exchange {}", exchange_name);
        Ok(())
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn publish(&self, message: OutgoingMessage) -> Result<()> {
        let args = BasicPublishArguments::new(&message.exchange, &message.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&message.message_id)
            .with_timestamp(message.timestamp)
            .with_content_type("application/json")
            .with_persistence(true);

        self.channel
            .basic_publish(properties, message.payload, args)
            .await
            .map_err(|e| SweeperError::AmqpConnectionFailed {
                message: format!("Failed to publish message: {}", e),
            })?;

        Ok(())
    }
}

/// Publishes notification intents to a topic exchange
pub struct AmqpNotificationPublisher {
    sink: Arc<dyn MessageSink>,
    config: PublisherConfig,
    /// Appointments announced within the dedup window, with when
    published: Mutex<HashMap<AppointmentId, Instant>>,
}

impl AmqpNotificationPublisher {
    /// Create a publisher on an open channel and declare its exchange
    pub async fn new(channel: Channel, config: PublisherConfig) -> Result<Self> {
        let sink = ChannelSink::new(channel);
        sink.declare_exchange(&config.exchange_name).await?;

        Ok(Self::with_sink(Arc::new(sink), config))
    }

    pub fn with_sink(sink: Arc<dyn MessageSink>, config: PublisherConfig) -> Self {
        Self {
            sink,
            config,
            published: Mutex::new(HashMap::new()),
        }
    }

    fn lock_published(&self) -> Result<std::sync::MutexGuard<'_, HashMap<AppointmentId, Instant>>> {
        let mut published = self
            .published
            .lock()
            .map_err(|_| SweeperError::InternalError {
                message: "Failed to acquire published intents lock".to_string(),
            })?;

        let window = self.config.dedup_window;
        published.retain(|_, at| at.elapsed() < window);
        Ok(published)
    }

    fn already_published(&self, appointment_id: &AppointmentId) -> Result<bool> {
        Ok(self.lock_published()?.contains_key(appointment_id))
    }

    fn mark_published(&self, appointment_id: AppointmentId) -> Result<()> {
        self.lock_published()?.insert(appointment_id, Instant::now());
        Ok(())
    }

    /// Publish with bounded retry and exponential backoff
    async fn publish_with_retry(
        &self,
        envelope: &MessageEnvelope<NotificationIntent>,
    ) -> Result<()> {
        let message = OutgoingMessage {
            exchange: self.config.exchange_name.clone(),
            routing_key: envelope.routing_key.clone(),
            message_id: envelope.correlation_id.clone(),
            timestamp: envelope.timestamp.timestamp() as u64,
            payload: envelope.to_bytes()?,
        };

        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.sink.publish(message.clone()).await {
                Ok(()) => {
                    debug!(
                        "Published intent {} to exchange {}",
                        envelope.correlation_id, self.config.exchange_name
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish intent {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for intent {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    /// Appointments announced within the dedup window
    pub fn published_count(&self) -> usize {
        self.lock_published().map(|set| set.len()).unwrap_or(0)
    }
}

#[async_trait]
impl NotificationDispatcher for AmqpNotificationPublisher {
    async fn dispatch(&self, intent: NotificationIntent) -> Result<()> {
        let appointment_id = intent.appointment_id;

        if self.config.enable_deduplication && self.already_published(&appointment_id)? {
            debug!(
                "Intent for appointment {} already published, skipping",
                appointment_id
            );
            return Ok(());
        }

        let routing_key = routing_key_for(&intent).to_string();
        let envelope = MessageEnvelope::new(intent, routing_key);

        self.publish_with_retry(&envelope)
            .await
            .map_err(|e| SweeperError::NotificationFailed {
                appointment_id: appointment_id.to_string(),
                reason: e.to_string(),
            })?;

        if self.config.enable_deduplication {
            self.mark_published(appointment_id)?;
            debug!("{} appointments in dedup window", self.published_count());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::messages::{CANCELLED_UNPAID_ROUTING_KEY, NOTIFICATIONS_EXCHANGE};
    use crate::types::NotificationKind;
    use anyhow::anyhow;
    use chrono::Utc;
    use uuid::Uuid;

    fn intent(appointment_id: AppointmentId) -> NotificationIntent {
        NotificationIntent {
            kind: NotificationKind::AppointmentCancelledUnpaid,
            appointment_id,
            recipient_email: "client@example.com".to_string(),
            recipient_name: Some("Sam Client".to_string()),
            practitioner_name: None,
            service_name: "Consultation".to_string(),
            start_time: Utc::now(),
            created_at: Utc::now(),
        }
    }

    fn fast_config() -> PublisherConfig {
        PublisherConfig {
            max_retries: 2,
            retry_delay_ms: 1,
            ..PublisherConfig::default()
        }
    }

    #[test]
    fn test_publisher_config_default() {
        let config = PublisherConfig::default();
        assert_eq!(config.exchange_name, NOTIFICATIONS_EXCHANGE);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 500);
        assert!(config.enable_deduplication);
        assert_eq!(config.dedup_window, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_publish_sends_envelope_to_exchange() {
        let appointment_id = Uuid::new_v4();
        let mut sink = MockMessageSink::new();
        sink.expect_publish()
            .withf(move |message| {
                let envelope: MessageEnvelope<NotificationIntent> =
                    MessageEnvelope::from_bytes(&message.payload).unwrap();
                message.exchange == NOTIFICATIONS_EXCHANGE
                    && message.routing_key == CANCELLED_UNPAID_ROUTING_KEY
                    && message.message_id == envelope.correlation_id
                    && envelope.payload.appointment_id == appointment_id
            })
            .times(1)
            .returning(|_| Ok(()));

        let publisher = AmqpNotificationPublisher::with_sink(Arc::new(sink), fast_config());
        publisher.dispatch(intent(appointment_id)).await.unwrap();

        assert_eq!(publisher.published_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_intent_is_skipped() {
        let appointment_id = Uuid::new_v4();
        let mut sink = MockMessageSink::new();
        sink.expect_publish().times(1).returning(|_| Ok(()));

        let publisher = AmqpNotificationPublisher::with_sink(Arc::new(sink), fast_config());
        publisher.dispatch(intent(appointment_id)).await.unwrap();
        publisher.dispatch(intent(appointment_id)).await.unwrap();

        assert_eq!(publisher.published_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted_is_notification_failure() {
        let appointment_id = Uuid::new_v4();
        let mut sink = MockMessageSink::new();
        // One attempt plus two retries
        sink.expect_publish()
            .times(3)
            .returning(|_| Err(anyhow!("channel closed")));

        let publisher = AmqpNotificationPublisher::with_sink(Arc::new(sink), fast_config());
        let err = publisher.dispatch(intent(appointment_id)).await.unwrap_err();

        match err.downcast_ref::<SweeperError>() {
            Some(SweeperError::NotificationFailed {
                appointment_id: failed,
                reason,
            }) => {
                assert_eq!(failed, &appointment_id.to_string());
                assert!(reason.contains("channel closed"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(publisher.published_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_publish_is_retried_on_next_dispatch() {
        let appointment_id = Uuid::new_v4();
        let mut seq = mockall::Sequence::new();
        let mut sink = MockMessageSink::new();
        sink.expect_publish()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(anyhow!("broker unreachable")));
        sink.expect_publish()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let config = PublisherConfig {
            max_retries: 0,
            ..fast_config()
        };
        let publisher = AmqpNotificationPublisher::with_sink(Arc::new(sink), config);

        assert!(publisher.dispatch(intent(appointment_id)).await.is_err());
        assert_eq!(publisher.published_count(), 0);

        publisher.dispatch(intent(appointment_id)).await.unwrap();
        assert_eq!(publisher.published_count(), 1);
    }

    #[tokio::test]
    async fn test_recovers_within_retry_budget() {
        let mut seq = mockall::Sequence::new();
        let mut sink = MockMessageSink::new();
        sink.expect_publish()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(anyhow!("flow control")));
        sink.expect_publish()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let publisher = AmqpNotificationPublisher::with_sink(Arc::new(sink), fast_config());
        assert!(publisher.dispatch(intent(Uuid::new_v4())).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_dedup_entries_are_forgotten() {
        let appointment_id = Uuid::new_v4();
        let mut sink = MockMessageSink::new();
        sink.expect_publish().times(2).returning(|_| Ok(()));

        let config = PublisherConfig {
            dedup_window: Duration::ZERO,
            ..fast_config()
        };
        let publisher = AmqpNotificationPublisher::with_sink(Arc::new(sink), config);

        publisher.dispatch(intent(appointment_id)).await.unwrap();
        publisher.dispatch(intent(appointment_id)).await.unwrap();
        assert_eq!(publisher.published_count(), 0);
    }

    #[tokio::test]
    async fn test_deduplication_can_be_disabled() {
        let appointment_id = Uuid::new_v4();
        let mut sink = MockMessageSink::new();
        sink.expect_publish().times(2).returning(|_| Ok(()));

        let config = PublisherConfig {
            enable_deduplication: false,
            ..fast_config()
        };
        let publisher = AmqpNotificationPublisher::with_sink(Arc::new(sink), config);

        publisher.dispatch(intent(appointment_id)).await.unwrap();
        publisher.dispatch(intent(appointment_id)).await.unwrap();
        assert_eq!(publisher.published_count(), 0);
    }
}
