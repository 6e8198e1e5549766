//! Policy engine - license and severity compliance evaluation
//!
//! Evaluates a repository's dependencies and open alerts against the
//! owner's active security policies. Each policy evaluation produces a
//! `ComplianceReport` snapshot; a policy that fails validation is
//! skipped with a warning and never blocks the other policies.

use crate::alert::{Alert, Severity};
use crate::store::DependencyRecord;
use crate::{DepwatchError, DepwatchResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Compliance score below which a dedicated notification goes out
pub const NOTIFY_THRESHOLD: u32 = 70;

// ─── Policy Document ────────────────────────────────────────────────

/// An owner-scoped security policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityPolicy {
    pub id: String,
    pub owner_id: String,
    /// Licenses explicitly allowed; empty means allow all
    #[serde(default)]
    pub allowed_licenses: Vec<String>,
    /// Licenses explicitly blocked
    #[serde(default)]
    pub blocked_licenses: Vec<String>,
    /// Open alerts strictly above this tier violate the policy
    pub max_severity: Severity,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl SecurityPolicy {
    /// Load a policy document from TOML
    pub fn from_toml_str(content: &str) -> DepwatchResult<Self> {
        toml::from_str(content)
            .map_err(|e| DepwatchError::Policy(format!("failed to parse policy: {}", e)))
    }

    /// A license cannot be both allowed and blocked; such a policy is
    /// skipped rather than guessed at.
    pub fn validate(&self) -> DepwatchResult<()> {
        let blocked: HashSet<String> = self
            .blocked_licenses
            .iter()
            .map(|l| l.to_uppercase())
            .collect();
        for license in &self.allowed_licenses {
            if blocked.contains(&license.to_uppercase()) {
                return Err(DepwatchError::Policy(format!(
                    "policy {}: license '{}' is both allowed and blocked",
                    self.id, license
                )));
            }
        }
        Ok(())
    }
}

// ─── Violations & Report ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    BlockedLicense,
    UnapprovedLicense,
    MissingLicense,
    SeverityExceeded,
}

/// One failed policy check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub kind: ViolationKind,
    pub severity: Severity,
    /// Dependency name or alert id, depending on the check
    pub subject: String,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportStatus {
    Compliant,
    NonCompliant,
}

/// Snapshot of one policy evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub id: String,
    pub repository_id: String,
    pub policy_id: String,
    /// round(100 * passed / total); vacuously 100 when nothing to check
    pub compliance_score: u32,
    pub total_dependencies: usize,
    pub compliant_dependencies: usize,
    pub violating_dependencies: usize,
    pub critical_violations: usize,
    pub high_violations: usize,
    pub medium_violations: usize,
    pub low_violations: usize,
    pub violations: Vec<PolicyViolation>,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}

impl ComplianceReport {
    pub fn needs_notification(&self) -> bool {
        self.compliance_score < NOTIFY_THRESHOLD
    }
}

// ─── Engine ─────────────────────────────────────────────────────────

/// Evaluates policies against scan state
pub struct PolicyEngine;

impl PolicyEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate one policy against a repository's dependency records and
    /// open alerts.
    ///
    /// Each dependency and each open alert is one check; the score is
    /// the percentage of passed checks.
    pub fn evaluate(
        &self,
        policy: &SecurityPolicy,
        repository_id: &str,
        dependencies: &[DependencyRecord],
        open_alerts: &[Alert],
    ) -> ComplianceReport {
        let blocked: HashSet<String> = policy
            .blocked_licenses
            .iter()
            .map(|l| l.to_uppercase())
            .collect();
        let allowed: HashSet<String> = policy
            .allowed_licenses
            .iter()
            .map(|l| l.to_uppercase())
            .collect();

        let mut violations = Vec::new();
        let mut violating_dependencies = 0usize;

        for dep in dependencies {
            if let Some(violation) = check_dependency(dep, &blocked, &allowed) {
                violating_dependencies += 1;
                violations.push(violation);
            }
        }

        for alert in open_alerts {
            if alert.severity > policy.max_severity {
                violations.push(PolicyViolation {
                    kind: ViolationKind::SeverityExceeded,
                    severity: alert.severity,
                    subject: alert.id.clone(),
                    detail: format!(
                        "open {} alert on {} exceeds policy maximum {}",
                        alert.severity, alert.dependency_name, policy.max_severity
                    ),
                });
            }
        }

        let total_checks = dependencies.len() + open_alerts.len();
        let compliance_score = if total_checks == 0 {
            100
        } else {
            let passed = total_checks - violations.len();
            ((100.0 * passed as f64) / total_checks as f64).round() as u32
        };

        let (mut critical, mut high, mut medium, mut low) = (0, 0, 0, 0);
        for v in &violations {
            match v.severity {
                Severity::Critical => critical += 1,
                Severity::High => high += 1,
                Severity::Medium => medium += 1,
                Severity::Low => low += 1,
            }
        }

        let status = if violations.is_empty() {
            ReportStatus::Compliant
        } else {
            ReportStatus::NonCompliant
        };

        tracing::info!(
            repository = repository_id,
            policy = %policy.id,
            score = compliance_score,
            violations = violations.len(),
            "policy evaluated"
        );

        ComplianceReport {
            id: Uuid::new_v4().to_string(),
            repository_id: repository_id.to_string(),
            policy_id: policy.id.clone(),
            compliance_score,
            total_dependencies: dependencies.len(),
            compliant_dependencies: dependencies.len() - violating_dependencies,
            violating_dependencies,
            critical_violations: critical,
            high_violations: high,
            medium_violations: medium,
            low_violations: low,
            violations,
            status,
            created_at: Utc::now(),
        }
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// License compliance for one dependency; at most one violation per
/// dependency so that checks and violations stay one-to-one.
fn check_dependency(
    dep: &DependencyRecord,
    blocked: &HashSet<String>,
    allowed: &HashSet<String>,
) -> Option<PolicyViolation> {
    match dep.license.as_deref() {
        Some(license) => {
            let upper = license.to_uppercase();
            if blocked.contains(&upper) {
                return Some(PolicyViolation {
                    kind: ViolationKind::BlockedLicense,
                    severity: Severity::High,
                    subject: dep.name.clone(),
                    detail: format!("dependency '{}' uses blocked license '{}'", dep.name, license),
                });
            }
            if !allowed.is_empty() && !allowed.contains(&upper) {
                return Some(PolicyViolation {
                    kind: ViolationKind::UnapprovedLicense,
                    severity: Severity::Medium,
                    subject: dep.name.clone(),
                    detail: format!(
                        "dependency '{}' uses license '{}' outside the allow list",
                        dep.name, license
                    ),
                });
            }
            None
        }
        // Missing metadata is a violation, not a silent pass
        None => Some(PolicyViolation {
            kind: ViolationKind::MissingLicense,
            severity: Severity::Medium,
            subject: dep.name.clone(),
            detail: format!("dependency '{}' declares no license", dep.name),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{Alert, AlertType};

    fn policy(blocked: &[&str], allowed: &[&str], max: Severity) -> SecurityPolicy {
        SecurityPolicy {
            id: "policy-1".into(),
            owner_id: "owner-1".into(),
            allowed_licenses: allowed.iter().map(|s| s.to_string()).collect(),
            blocked_licenses: blocked.iter().map(|s| s.to_string()).collect(),
            max_severity: max,
            is_active: true,
        }
    }

    fn dep(name: &str, license: Option<&str>) -> DependencyRecord {
        DependencyRecord {
            repository_id: "repo-1".into(),
            name: name.into(),
            resolved_version: "1.0.0".into(),
            license: license.map(|s| s.to_string()),
            last_scanned_at: Utc::now(),
        }
    }

    #[test]
    fn blocked_license_scores_two_thirds() {
        let engine = PolicyEngine::new();
        let deps = vec![
            dep("a", Some("MIT")),
            dep("b", Some("GPL-3.0")),
            dep("c", Some("Apache-2.0")),
        ];
        let report = engine.evaluate(
            &policy(&["GPL-3.0"], &[], Severity::Critical),
            "repo-1",
            &deps,
            &[],
        );
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.compliance_score, 67);
        assert_eq!(report.violating_dependencies, 1);
        assert_eq!(report.high_violations, 1);
        assert_eq!(report.status, ReportStatus::NonCompliant);
    }

    #[test]
    fn allow_list_miss_is_medium() {
        let engine = PolicyEngine::new();
        let deps = vec![dep("a", Some("BUSL-1.1"))];
        let report = engine.evaluate(
            &policy(&[], &["MIT", "Apache-2.0"], Severity::Critical),
            "repo-1",
            &deps,
            &[],
        );
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].kind, ViolationKind::UnapprovedLicense);
        assert_eq!(report.medium_violations, 1);
    }

    #[test]
    fn missing_license_is_a_violation() {
        let engine = PolicyEngine::new();
        let deps = vec![dep("a", None)];
        let report = engine.evaluate(
            &policy(&[], &[], Severity::Critical),
            "repo-1",
            &deps,
            &[],
        );
        assert_eq!(report.violations[0].kind, ViolationKind::MissingLicense);
    }

    #[test]
    fn alert_severity_above_maximum_violates() {
        let engine = PolicyEngine::new();
        let alert = Alert::new(
            "repo-1",
            "left-pad",
            AlertType::Vuln,
            "OSV-1",
            Severity::Critical,
            "critical vulnerability",
        );
        let report = engine.evaluate(
            &policy(&[], &[], Severity::High),
            "repo-1",
            &[],
            &[alert],
        );
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].kind, ViolationKind::SeverityExceeded);
        assert_eq!(report.compliance_score, 0);
    }

    #[test]
    fn severity_at_maximum_passes() {
        let engine = PolicyEngine::new();
        let alert = Alert::new(
            "repo-1",
            "left-pad",
            AlertType::Vuln,
            "OSV-1",
            Severity::High,
            "high vulnerability",
        );
        let report = engine.evaluate(
            &policy(&[], &[], Severity::High),
            "repo-1",
            &[],
            &[alert],
        );
        assert!(report.violations.is_empty());
        assert_eq!(report.compliance_score, 100);
    }

    #[test]
    fn nothing_to_check_is_vacuously_compliant() {
        let engine = PolicyEngine::new();
        let report = engine.evaluate(
            &policy(&[], &[], Severity::Low),
            "repo-1",
            &[],
            &[],
        );
        assert_eq!(report.compliance_score, 100);
        assert_eq!(report.status, ReportStatus::Compliant);
    }

    #[test]
    fn overlapping_lists_fail_validation() {
        let bad = policy(&["GPL-3.0"], &["gpl-3.0"], Severity::Critical);
        assert!(bad.validate().is_err());
        let good = policy(&["GPL-3.0"], &["MIT"], Severity::Critical);
        assert!(good.validate().is_ok());
    }

    #[test]
    fn policy_loads_from_toml() {
        let doc = r#"
            id = "policy-os"
            owner_id = "owner-1"
            allowed_licenses = ["MIT", "Apache-2.0", "BSD-2-Clause"]
            blocked_licenses = ["AGPL-3.0"]
            max_severity = "high"
        "#;
        let policy = SecurityPolicy::from_toml_str(doc).unwrap();
        assert_eq!(policy.allowed_licenses.len(), 3);
        assert_eq!(policy.max_severity, Severity::High);
        assert!(policy.is_active);
    }

    #[test]
    fn notification_threshold() {
        let engine = PolicyEngine::new();
        let deps = vec![
            dep("a", Some("GPL-3.0")),
            dep("b", Some("GPL-3.0")),
            dep("c", Some("MIT")),
        ];
        let report = engine.evaluate(
            &policy(&["GPL-3.0"], &[], Severity::Critical),
            "repo-1",
            &deps,
            &[],
        );
        // 1/3 passing = 33, below the 70 threshold
        assert_eq!(report.compliance_score, 33);
        assert!(report.needs_notification());
    }
}
