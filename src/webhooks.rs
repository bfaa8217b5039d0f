//! Serverless endpoints.
//!
//! Two HTTP functions run next to the database: an archival sweep that flips
//! ended events to `archived`, and a privileged event save that also sends a
//! notification. Both are called as plain JSON-over-HTTP endpoints.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::{Event, EventInput};
use crate::{HuginnError, Result};

const EXTENSION_MISSING: &str = "EXTENSION_MISSING";

/// Summary returned by the archival sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveReport {
    /// Events flipped to archived in this run.
    pub processed: u64,
    /// Active events inspected.
    pub total: u64,
    #[serde(default)]
    pub events: Vec<ArchivedEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedEvent {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveEventRequest<'a> {
    event_data: &'a EventInput,
    is_new: bool,
}

#[derive(Deserialize)]
struct SaveEventResponse {
    #[serde(default)]
    success: bool,
    data: Option<Event>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

fn webhook_error(status: u16, text: &str) -> HuginnError {
    let body: WebhookErrorBody = serde_json::from_str(text).unwrap_or_default();
    let message = body.error.unwrap_or_else(|| {
        if text.is_empty() {
            format!("HTTP {status}")
        } else {
            text.to_string()
        }
    });
    if body.code.as_deref() == Some(EXTENSION_MISSING) || message.contains("pg_net") {
        return HuginnError::MissingExtension(message);
    }
    HuginnError::Webhook { status, message }
}

/// Client for the archival and save-event functions.
#[derive(Clone)]
pub struct WebhookClient {
    http: Client,
    archive_url: String,
    save_event_url: String,
    token: Option<String>,
}

impl WebhookClient {
    pub fn new(archive_url: impl Into<String>, save_event_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| HuginnError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            archive_url: archive_url.into(),
            save_event_url: save_event_url.into(),
            token: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every call.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    async fn post<B: Serialize + ?Sized>(&self, url: &str, body: Option<&B>) -> Result<String> {
        let mut request = self.http.post(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| HuginnError::Http(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| HuginnError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(webhook_error(status.as_u16(), &text));
        }
        Ok(text)
    }

    /// Archive every active event that has ended.
    pub async fn archive_sweep(&self) -> Result<ArchiveReport> {
        let text = self.post::<()>(&self.archive_url, None).await?;
        let report: ArchiveReport = serde_json::from_str(&text)?;
        info!(
            processed = report.processed,
            total = report.total,
            "archive sweep finished"
        );
        Ok(report)
    }

    /// Insert (`is_new`) or update an event with elevated privileges.
    pub async fn save_event(&self, event_data: &EventInput, is_new: bool) -> Result<Event> {
        let request = SaveEventRequest { event_data, is_new };
        let text = self.post(&self.save_event_url, Some(&request)).await?;
        let response: SaveEventResponse = serde_json::from_str(&text)?;
        match response.data {
            Some(event) if response.success => {
                info!(id = %event.id, is_new, "event saved via webhook");
                Ok(event)
            }
            _ => {
                let message = response
                    .error
                    .unwrap_or_else(|| "save-event returned no data".to_string());
                warn!(error = %message, "save-event rejected");
                Err(HuginnError::Webhook {
                    status: 200,
                    message,
                })
            }
        }
    }
}
