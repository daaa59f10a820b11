//! Webhook intake — tickets pushed by an external helpdesk, classified in the
//! background, with the result posted back to a callback URL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CallbackError;
use crate::pipeline::{ClassificationResponse, Orchestrator};

/// A ticket pushed by the helpdesk.
#[derive(Debug, Clone, Deserialize)]
pub struct IntakeTicket {
    pub ticket_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub department: Option<String>,
    /// Where to post the result. No callback is made without it.
    #[serde(default)]
    pub callback_url: Option<String>,
}

impl IntakeTicket {
    /// Title, description and department as one ticket text.
    pub fn ticket_text(&self) -> String {
        let mut text = String::new();
        for part in [self.title.trim(), self.description.trim()] {
            if part.is_empty() {
                continue;
            }
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(part);
        }
        if let Some(department) = self.department.as_deref().map(str::trim)
            && !department.is_empty()
            && !text.is_empty()
        {
            text.push_str(&format!("\n\nDepartment: {department}"));
        }
        text
    }
}

/// Body posted to the callback URL once the run finishes.
#[derive(Debug, Clone, Serialize)]
pub struct IntakeResult {
    pub ticket_id: String,
    #[serde(flatten)]
    pub result: ClassificationResponse,
    pub processed_at: DateTime<Utc>,
}

/// Delivers intake results.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn deliver(&self, url: &str, result: &IntakeResult) -> Result<(), CallbackError>;
}

/// Posts results as JSON, with an optional bearer token.
pub struct HttpResultSink {
    client: reqwest::Client,
    token: Option<SecretString>,
}

impl HttpResultSink {
    pub fn new(token: Option<SecretString>, timeout: Duration) -> Result<Self, CallbackError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CallbackError::Client(e.to_string()))?;
        Ok(Self { client, token })
    }
}

#[async_trait]
impl ResultSink for HttpResultSink {
    async fn deliver(&self, url: &str, result: &IntakeResult) -> Result<(), CallbackError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| CallbackError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CallbackError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let mut request = self.client.post(parsed).json(result);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| CallbackError::SendFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CallbackError::Rejected {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Classify an intake ticket and deliver the result. Errors are logged, never returned.
pub async fn process_intake(
    orchestrator: Arc<Orchestrator>,
    sink: Arc<dyn ResultSink>,
    ticket: IntakeTicket,
) {
    let result = match orchestrator.classify(&ticket.ticket_text()).await {
        Ok(result) => result,
        Err(e) => {
            warn!(ticket_id = %ticket.ticket_id, error = %e, "Intake ticket could not be classified");
            return;
        }
    };
    info!(ticket_id = %ticket.ticket_id, stage = %result.stage(), "Intake ticket classified");

    let Some(url) = ticket.callback_url.as_deref() else {
        return;
    };

    let payload = IntakeResult {
        ticket_id: ticket.ticket_id.clone(),
        result: result.to_response(),
        processed_at: Utc::now(),
    };
    match sink.deliver(url, &payload).await {
        Ok(()) => info!(ticket_id = %ticket.ticket_id, "Intake result delivered"),
        Err(e) => warn!(ticket_id = %ticket.ticket_id, error = %e, "Intake callback failed"),
    }
}
