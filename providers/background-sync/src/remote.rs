//! Client for the monitoring server's critical alert API
//!
//! ```text
//! GET  {server}/api/devices/{device_id}/critical-alerts              -> {"alerts": [...]} | [...]
//! POST {server}/api/devices/{device_id}/critical-alerts/acknowledge  <- {"alert_ids": [...]}
//! POST {server}/api/devices/{device_id}/critical-events              <- CriticalEvent
//! ```

use async_trait::async_trait;
use guardian_common::{CriticalAlert, CriticalEvent, GuardianError, Result};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait AlertEndpoint: Send + Sync {
    async fn fetch_critical_alerts(
        &self,
        server_url: &str,
        device_id: &str,
    ) -> Result<Vec<CriticalAlert>>;

    async fn acknowledge_critical_alerts(
        &self,
        server_url: &str,
        device_id: &str,
        alert_ids: &[i64],
    ) -> Result<bool>;

    async fn send_critical_event(
        &self,
        server_url: &str,
        device_id: &str,
        event: &CriticalEvent,
    ) -> Result<bool>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AlertsResponse {
    Wrapped { alerts: Vec<CriticalAlert> },
    Bare(Vec<CriticalAlert>),
}

#[derive(Serialize)]
struct AcknowledgeRequest<'a> {
    alert_ids: &'a [i64],
}

#[derive(Deserialize)]
struct AcknowledgeResponse {
    success: bool,
}

/// HTTP implementation over `reqwest`
pub struct HttpAlertEndpoint {
    client: Client,
}

impl HttpAlertEndpoint {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GuardianError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    fn device_url(server_url: &str, device_id: &str, tail: &[&str]) -> Result<Url> {
        let mut url = Url::parse(server_url).map_err(|e| {
            GuardianError::Configuration(format!("Invalid server URL {}: {}", server_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                GuardianError::Configuration(format!("Server URL cannot be a base: {}", server_url))
            })?
            .pop_if_empty()
            .extend(["api", "devices", device_id])
            .extend(tail);
        Ok(url)
    }
}

fn transport(e: reqwest::Error) -> GuardianError {
    GuardianError::Transport(e.to_string())
}

#[async_trait]
impl AlertEndpoint for HttpAlertEndpoint {
    async fn fetch_critical_alerts(
        &self,
        server_url: &str,
        device_id: &str,
    ) -> Result<Vec<CriticalAlert>> {
        let url = Self::device_url(server_url, device_id, &["critical-alerts"])?;
        let response = self.client.get(url).send().await.map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(GuardianError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let alerts = match serde_json::from_str::<AlertsResponse>(&body)? {
            AlertsResponse::Wrapped { alerts } => alerts,
            AlertsResponse::Bare(alerts) => alerts,
        };
        debug!("fetched {} critical alerts for {}", alerts.len(), device_id);
        Ok(alerts)
    }

    async fn acknowledge_critical_alerts(
        &self,
        server_url: &str,
        device_id: &str,
        alert_ids: &[i64],
    ) -> Result<bool> {
        let url = Self::device_url(server_url, device_id, &["critical-alerts", "acknowledge"])?;
        let response = self
            .client
            .post(url)
            .json(&AcknowledgeRequest { alert_ids })
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            debug!("acknowledge returned status {}", response.status());
            return Ok(false);
        }

        let body = response.text().await.map_err(transport)?;
        if body.trim().is_empty() {
            return Ok(true);
        }
        Ok(serde_json::from_str::<AcknowledgeResponse>(&body)?.success)
    }

    async fn send_critical_event(
        &self,
        server_url: &str,
        device_id: &str,
        event: &CriticalEvent,
    ) -> Result<bool> {
        let url = Self::device_url(server_url, device_id, &["critical-events"])?;
        let response = self
            .client
            .post(url)
            .json(event)
            .send()
            .await
            .map_err(transport)?;

        Ok(response.status().is_success())
    }
}
