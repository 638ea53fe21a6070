//! Submission gateway: where a finished application goes.
//!
//! The engine only depends on the [`SubmissionGateway`] trait. Latency,
//! transport and persistence belong to the implementation.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::fields::FieldValue;
use crate::error::GatewayError;

/// Owned copy of a session's answers, taken when submission starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSnapshot {
    pub session_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub fields: BTreeMap<String, FieldValue>,
}

/// Acknowledgement from a gateway that accepted a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub reference: String,
    pub accepted_at: DateTime<Utc>,
}

impl SubmissionReceipt {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            accepted_at: Utc::now(),
        }
    }
}

/// Accepts finished applications.
#[async_trait]
pub trait SubmissionGateway: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn submit(&self, snapshot: FormSnapshot) -> Result<SubmissionReceipt, GatewayError>;
}

/// Logs each submission and acknowledges it after an optional simulated
/// latency. Used when no downstream endpoint is configured.
pub struct LoggingGateway {
    latency: Duration,
}

impl LoggingGateway {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl SubmissionGateway for LoggingGateway {
    fn name(&self) -> &str {
        "logging"
    }

    async fn submit(&self, snapshot: FormSnapshot) -> Result<SubmissionReceipt, GatewayError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        info!(
            session_id = %snapshot.session_id,
            fields = ?snapshot.fields,
            "Application received"
        );
        Ok(SubmissionReceipt::new(format!("APP-{}", snapshot.session_id.simple())))
    }
}

/// POSTs the snapshot as JSON to an intake endpoint.
///
/// Any 2xx counts as accepted. If the body carries a `reference` string it is
/// used for the receipt, otherwise the session id is.
pub struct HttpGateway {
    client: reqwest::Client,
    url: String,
    token: Option<SecretString>,
}

impl HttpGateway {
    pub fn new(url: impl Into<String>, token: Option<SecretString>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            token,
        }
    }
}

#[derive(Deserialize)]
struct IntakeResponse {
    reference: Option<String>,
}

#[async_trait]
impl SubmissionGateway for HttpGateway {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit(&self, snapshot: FormSnapshot) -> Result<SubmissionReceipt, GatewayError> {
        let mut request = self.client.post(&self.url).json(&snapshot);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(
                session_id = %snapshot.session_id,
                status = status.as_u16(),
                "Intake endpoint rejected application"
            );
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let reference = serde_json::from_str::<IntakeResponse>(&body)
            .ok()
            .and_then(|r| r.reference)
            .unwrap_or_else(|| snapshot.session_id.to_string());

        info!(session_id = %snapshot.session_id, reference = %reference, "Application accepted");
        Ok(SubmissionReceipt::new(reference))
    }
}
