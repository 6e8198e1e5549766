//! Notification channel port and the chat-ops webhook implementation
//!
//! Message bodies are deliberately minimal: formatting rich email/chat
//! content is an external collaborator's job, the core only guarantees
//! that a "send alert" and "send compliance notice" operation exists and
//! can fail independently per channel.

use super::Alert;
use crate::{DepwatchError, DepwatchResult};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// A best-effort, fire-and-forget delivery channel
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel name for logging
    fn name(&self) -> &str;

    async fn send_alert(&self, alert: &Alert) -> DepwatchResult<()>;

    async fn send_compliance_notice(
        &self,
        repository_id: &str,
        policy_id: &str,
        score: u32,
    ) -> DepwatchResult<()>;
}

/// Posts JSON payloads to a chat-ops webhook URL
pub struct ChatopsWebhook {
    client: reqwest::Client,
    webhook_url: String,
}

impl ChatopsWebhook {
    pub fn new(webhook_url: impl Into<String>) -> DepwatchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DepwatchError::Notification(format!("failed to build client: {}", e)))?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }

    async fn post(&self, payload: serde_json::Value) -> DepwatchResult<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DepwatchError::Notification(format!("webhook post failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(DepwatchError::Notification(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for ChatopsWebhook {
    fn name(&self) -> &str {
        "chatops-webhook"
    }

    async fn send_alert(&self, alert: &Alert) -> DepwatchResult<()> {
        self.post(json!({
            "text": format!(
                "[{}] {} in {}: {}",
                alert.severity, alert.dependency_name, alert.repository_id, alert.description
            ),
            "alert_id": alert.id,
            "alert_type": alert.alert_type,
            "severity": alert.severity,
            "risk_score": alert.risk_score,
        }))
        .await
    }

    async fn send_compliance_notice(
        &self,
        repository_id: &str,
        policy_id: &str,
        score: u32,
    ) -> DepwatchResult<()> {
        self.post(json!({
            "text": format!(
                "Compliance score for {} dropped to {} under policy {}",
                repository_id, score, policy_id
            ),
            "repository_id": repository_id,
            "policy_id": policy_id,
            "compliance_score": score,
        }))
        .await
    }
}
