//! Alert taxonomy and notification dispatch
//!
//! Defines the severity ladder and alert record shared by the whole
//! pipeline, the license-change severity rule, and the notification
//! channel port. Persisting an alert and notifying about it are two
//! separate steps: a persistence failure skips notification for that
//! alert only, and a channel failure never rolls back the persisted
//! alert or affects the other channels.

pub mod notify;

pub use notify::{ChatopsWebhook, NotificationChannel};

use crate::store::ScanStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

// ─── Severity ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, unlikely to need action
    Low,
    /// Real finding with moderate risk
    Medium,
    /// Serious finding, action expected
    High,
    /// Immediate exposure, action required
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

// ─── Alert Record ───────────────────────────────────────────────────

/// What kind of change raised this alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertType {
    License,
    Vuln,
    Compliance,
    GateFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Open,
    /// Closed externally, e.g. by remediation
    Resolved,
}

/// One detected change event against a (repository, dependency) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub repository_id: String,
    pub dependency_name: String,
    pub alert_type: AlertType,
    /// Prior value (old license, none for a fresh vulnerability)
    pub old_value: Option<String>,
    /// New value (new license, vulnerability id)
    pub new_value: String,
    pub severity: Severity,
    pub description: String,
    pub is_used_in_code: bool,
    pub usage_count: usize,
    pub risk_score: u32,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(
        repository_id: impl Into<String>,
        dependency_name: impl Into<String>,
        alert_type: AlertType,
        new_value: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            repository_id: repository_id.into(),
            dependency_name: dependency_name.into(),
            alert_type,
            old_value: None,
            new_value: new_value.into(),
            severity,
            description: description.into(),
            is_used_in_code: false,
            usage_count: 0,
            risk_score: 0,
            status: AlertStatus::Open,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn with_old_value(mut self, old: impl Into<String>) -> Self {
        self.old_value = Some(old.into());
        self
    }

    pub fn with_usage(mut self, is_used: bool, count: usize) -> Self {
        self.is_used_in_code = is_used;
        self.usage_count = count;
        self
    }

    pub fn with_risk_score(mut self, score: u32) -> Self {
        self.risk_score = score;
        self
    }

    pub fn is_open(&self) -> bool {
        self.status == AlertStatus::Open
    }
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}/{}: {}",
            self.severity, self.repository_id, self.dependency_name, self.description
        )
    }
}

// ─── License Change Severity ────────────────────────────────────────

/// License prefixes that always escalate a license change to critical.
/// Copyleft obligations propagate into the consuming project, so a
/// dependency silently moving onto one of these is the worst case.
const COPYLEFT_PREFIXES: &[&str] = &["GPL", "AGPL", "LGPL", "SSPL", "OSL", "EUPL"];

fn is_copyleft(license: &str) -> bool {
    let upper = license.to_uppercase();
    COPYLEFT_PREFIXES.iter().any(|p| upper.starts_with(p))
}

/// Severity of a license observation per the fixed rule: change onto a
/// copyleft-style license is critical, any other change from a known
/// prior license is medium, first sighting with no prior is low.
pub fn license_change_severity(old: Option<&str>, new: &str) -> Severity {
    if is_copyleft(new) {
        return Severity::Critical;
    }
    match old {
        Some(prior) if prior != new => Severity::Medium,
        _ => Severity::Low,
    }
}

// ─── Alert Manager ──────────────────────────────────────────────────

/// Persists alerts and dispatches exactly one best-effort notification
/// attempt per configured channel.
pub struct AlertManager {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl AlertManager {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Persist `alert` through the store, then notify every channel.
    ///
    /// A persistence failure is logged and skips notification for this
    /// alert; channel failures are logged independently and never affect
    /// the persisted alert or the other channels. Returns the alert when
    /// it was persisted.
    pub async fn raise(&self, store: &dyn ScanStore, alert: Alert) -> Option<Alert> {
        if let Err(e) = store.insert_alert(alert.clone()) {
            tracing::error!(
                alert = %alert.id,
                dependency = %alert.dependency_name,
                error = %e,
                "failed to persist alert, skipping notification"
            );
            return None;
        }

        for channel in &self.channels {
            if let Err(e) = channel.send_alert(&alert).await {
                tracing::warn!(
                    channel = channel.name(),
                    alert = %alert.id,
                    error = %e,
                    "notification failed"
                );
            }
        }

        Some(alert)
    }

    /// Best-effort compliance notice across all channels, same isolation
    /// rules as [`raise`](Self::raise).
    pub async fn notify_compliance(&self, repository_id: &str, policy_id: &str, score: u32) {
        for channel in &self.channels {
            if let Err(e) = channel
                .send_compliance_notice(repository_id, policy_id, score)
                .await
            {
                tracing::warn!(
                    channel = channel.name(),
                    repository = repository_id,
                    error = %e,
                    "compliance notification failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::{DepwatchError, DepwatchResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChannel {
        sent: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl NotificationChannel for CountingChannel {
        fn name(&self) -> &str {
            "counting"
        }

        async fn send_alert(&self, _alert: &Alert) -> DepwatchResult<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DepwatchError::Notification("boom".into()))
            } else {
                Ok(())
            }
        }

        async fn send_compliance_notice(
            &self,
            _repository_id: &str,
            _policy_id: &str,
            _score: u32,
        ) -> DepwatchResult<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn sample_alert() -> Alert {
        Alert::new(
            "repo-1",
            "left-pad",
            AlertType::Vuln,
            "OSV-2024-0001",
            Severity::Critical,
            "critical vulnerability in left-pad",
        )
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn copyleft_change_is_critical() {
        assert_eq!(
            license_change_severity(Some("MIT"), "GPL-3.0"),
            Severity::Critical
        );
        assert_eq!(
            license_change_severity(Some("MIT"), "AGPL-3.0-only"),
            Severity::Critical
        );
        // Copyleft is critical even on first sighting
        assert_eq!(license_change_severity(None, "SSPL-1.0"), Severity::Critical);
    }

    #[test]
    fn non_copyleft_change_is_medium() {
        assert_eq!(
            license_change_severity(Some("MIT"), "BUSL-1.1"),
            Severity::Medium
        );
        assert_eq!(
            license_change_severity(Some("Apache-2.0"), "MIT"),
            Severity::Medium
        );
    }

    #[test]
    fn informational_sighting_is_low() {
        assert_eq!(license_change_severity(None, "MIT"), Severity::Low);
        assert_eq!(license_change_severity(Some("MIT"), "MIT"), Severity::Low);
    }

    #[tokio::test]
    async fn raise_notifies_every_channel_once() {
        let store = MemoryStore::new();
        let a = Arc::new(CountingChannel {
            sent: AtomicUsize::new(0),
            fail: false,
        });
        let b = Arc::new(CountingChannel {
            sent: AtomicUsize::new(0),
            fail: true,
        });
        let manager = AlertManager::new(vec![a.clone(), b.clone()]);

        let raised = manager.raise(&store, sample_alert()).await;
        assert!(raised.is_some());
        assert_eq!(a.sent.load(Ordering::SeqCst), 1);
        // Failing channel was still attempted exactly once
        assert_eq!(b.sent.load(Ordering::SeqCst), 1);
        assert_eq!(store.open_alerts("repo-1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn channel_failure_does_not_unpersist() {
        let store = MemoryStore::new();
        let failing = Arc::new(CountingChannel {
            sent: AtomicUsize::new(0),
            fail: true,
        });
        let manager = AlertManager::new(vec![failing]);

        let raised = manager.raise(&store, sample_alert()).await;
        assert!(raised.is_some());
        assert_eq!(store.open_alerts("repo-1").unwrap().len(), 1);
    }
}
