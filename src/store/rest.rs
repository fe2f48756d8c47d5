//! REST gateway client for the appointment store
//!
//! Talks to a PostgREST-style gateway: remote procedures live under
//! `/rest/v1/rpc/<name>` and tables under `/rest/v1/<table>`. Every request
//! carries the service key as both `apikey` and bearer token.

use crate::config::StoreSettings;
use crate::error::{Result, SweeperError};
use crate::store::AppointmentStore;
use crate::types::{AppointmentDetails, AppointmentId, CancellationRecord};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Columns and embedded relations for the enrichment query
const DETAILS_SELECT: &str = "id,start_time,\
client:profiles!client_id(id,email,full_name),\
practitioner:practitioners!practitioner_id(id,display_name),\
service:services!service_id(id,name)";

/// Error body shape returned by the gateway
#[derive(Debug, Deserialize)]
struct GatewayError {
    message: Option<String>,
    error: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

impl GatewayError {
    fn describe(self) -> Option<String> {
        let mut parts: Vec<String> = Vec::new();
        if let Some(message) = self.message.or(self.error) {
            parts.push(message);
        }
        if let Some(details) = self.details {
            parts.push(details);
        }
        if let Some(hint) = self.hint {
            parts.push(format!("hint: {}", hint));
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" - "))
        }
    }
}

/// Appointment store backed by the platform's REST gateway
pub struct RestAppointmentStore {
    http_client: Client,
    base_url: String,
    service_key: String,
    cancel_procedure: String,
}

impl RestAppointmentStore {
    /// Create a new store client from explicit settings
    pub fn new(settings: &StoreSettings) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            service_key: settings.service_key.clone(),
            cancel_procedure: settings.cancel_procedure.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn rpc_url(&self) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, self.cancel_procedure)
    }

    fn details_url(&self) -> String {
        format!("{}/rest/v1/appointments", self.base_url)
    }

    /// Read a non-success response into its status and a readable message
    async fn failure_message(response: Response) -> (u16, String) {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        let message = serde_json::from_str::<GatewayError>(&body)
            .ok()
            .and_then(GatewayError::describe)
            .unwrap_or_else(|| {
                if body.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                } else {
                    body
                }
            });

        (status.as_u16(), message)
    }
}

/// Rows returned by the cancel procedure.
///
/// The cancellations are already committed when this runs, so nothing here
/// may fail on row contents: `null` is an empty result and a lone object is
/// a single row.
fn cancellation_rows(result: Value) -> Vec<CancellationRecord> {
    match result {
        Value::Null => Vec::new(),
        Value::Array(rows) => rows.into_iter().map(CancellationRecord::from_value).collect(),
        row => vec![CancellationRecord::from_value(row)],
    }
}

#[async_trait]
impl AppointmentStore for RestAppointmentStore {
    async fn cancel_expired_appointments(&self) -> Result<Vec<CancellationRecord>> {
        let url = self.rpc_url();
        debug!("Calling remote procedure {}", url);

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| SweeperError::StoreUnavailable {
                message: format!("Failed to call {}: {}", self.cancel_procedure, e),
            })?;

        if !response.status().is_success() {
            let (status, message) = Self::failure_message(response).await;
            return Err(SweeperError::RemoteProcedure { status, message }.into());
        }

        let result: Value =
            response
                .json()
                .await
                .map_err(|e| SweeperError::InvalidStoreResponse {
                    reason: format!("Failed to parse {} result: {}", self.cancel_procedure, e),
                })?;
        let records = cancellation_rows(result);

        let unusable = records
            .iter()
            .filter(|record| record.appointment_id().is_none())
            .count();
        if unusable > 0 {
            warn!(
                "{} of {} cancellation rows from {} carry no usable appointment id",
                unusable,
                records.len(),
                self.cancel_procedure
            );
        }

        info!(
            "Remote procedure {} cancelled {} appointments",
            self.cancel_procedure,
            records.len()
        );
        Ok(records)
    }

    async fn fetch_appointment_details(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<AppointmentDetails> {
        let id_filter = format!("eq.{}", appointment_id);

        let response = self
            .http_client
            .get(self.details_url())
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .query(&[
                ("id", id_filter.as_str()),
                ("select", DETAILS_SELECT),
                ("limit", "1"),
            ])
            .send()
            .await
            .map_err(|e| SweeperError::StoreUnavailable {
                message: format!(
                    "Failed to fetch details for appointment {}: {}",
                    appointment_id, e
                ),
            })?;

        if !response.status().is_success() {
            let (status, message) = Self::failure_message(response).await;
            return Err(SweeperError::GatewayQuery {
                resource: "appointments".to_string(),
                status,
                message,
            }
            .into());
        }

        let mut rows: Vec<AppointmentDetails> =
            response
                .json()
                .await
                .map_err(|e| SweeperError::InvalidStoreResponse {
                    reason: format!(
                        "Failed to parse details for appointment {}: {}",
                        appointment_id, e
                    ),
                })?;

        if rows.is_empty() {
            return Err(SweeperError::AppointmentNotFound {
                appointment_id: appointment_id.to_string(),
            }
            .into());
        }

        Ok(rows.swap_remove(0))
    }
}
