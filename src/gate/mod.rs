//! Security gate - pure deployment pass/block evaluation
//!
//! The evaluator is a pure function over the current scan's summary and
//! a set of thresholds: no store reads, no network, fully deterministic
//! for identical inputs. Historical alerts never influence the gate,
//! only the latest completed scan does. The HTTP surface in
//! [`routes`] is a thin adapter over this function.

pub mod routes;

use crate::alert::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregated result of one completed scan, the gate's only input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub repository_id: String,
    pub critical_count: usize,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,
    pub license_violations: usize,
    pub policy_violations: usize,
    pub completed_at: DateTime<Utc>,
}

impl ScanSummary {
    pub fn empty(repository_id: impl Into<String>) -> Self {
        Self {
            repository_id: repository_id.into(),
            critical_count: 0,
            high_count: 0,
            medium_count: 0,
            low_count: 0,
            license_violations: 0,
            policy_violations: 0,
            completed_at: Utc::now(),
        }
    }

    pub fn count_for(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical_count,
            Severity::High => self.high_count,
            Severity::Medium => self.medium_count,
            Severity::Low => self.low_count,
        }
    }
}

/// Gate thresholds with production defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateThresholds {
    pub block_on_critical: bool,
    pub max_critical: usize,
    pub block_on_high: bool,
    pub max_high: usize,
    pub block_on_license_violation: bool,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            block_on_critical: true,
            max_critical: 0,
            block_on_high: false,
            max_high: 5,
            block_on_license_violation: true,
        }
    }
}

/// Per-severity counts in the gate response, wire names per contract
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateSummary {
    pub critical_count: usize,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,
    pub license_violations: usize,
    pub policy_violations: usize,
}

/// The gate verdict, serializable as the HTTP response body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateDecision {
    pub gate_passed: bool,
    pub deployment_blocked: bool,
    pub summary: GateSummary,
    pub details: Vec<String>,
    pub recommendations: Vec<String>,
    pub next_steps: Vec<String>,
}

impl GateDecision {
    /// 200 when the gate passed, 422 when deployment is blocked
    pub fn http_status(&self) -> u16 {
        if self.gate_passed {
            200
        } else {
            422
        }
    }
}

/// Evaluate the gate. Pure: identical inputs always produce the
/// identical decision.
pub fn evaluate_gate(scan: &ScanSummary, thresholds: &GateThresholds) -> GateDecision {
    let mut details = Vec::new();
    let mut recommendations = Vec::new();
    let mut blocked = false;

    if thresholds.block_on_critical && scan.critical_count > thresholds.max_critical {
        blocked = true;
        details.push(format!(
            "{} critical vulnerabilities exceed the allowed maximum of {}",
            scan.critical_count, thresholds.max_critical
        ));
        recommendations.push(
            "Apply the remediation suggestions for every critical vulnerability before deploying"
                .to_string(),
        );
    }

    if thresholds.block_on_high && scan.high_count > thresholds.max_high {
        blocked = true;
        details.push(format!(
            "{} high-severity vulnerabilities exceed the allowed maximum of {}",
            scan.high_count, thresholds.max_high
        ));
        recommendations
            .push("Reduce the high-severity backlog below the configured ceiling".to_string());
    }

    if thresholds.block_on_license_violation && scan.license_violations > 0 {
        blocked = true;
        details.push(format!(
            "{} license violations found in the current scan",
            scan.license_violations
        ));
        recommendations.push(
            "Resolve blocked-license dependencies or amend the security policy".to_string(),
        );
    }

    let next_steps = if blocked {
        vec![
            "Review the itemized findings above".to_string(),
            "Remediate or obtain a policy exception".to_string(),
            "Re-run the scan and request a fresh gate evaluation".to_string(),
        ]
    } else {
        vec!["Proceed with the deployment".to_string()]
    };

    GateDecision {
        gate_passed: !blocked,
        deployment_blocked: blocked,
        summary: GateSummary {
            critical_count: scan.critical_count,
            high_count: scan.high_count,
            medium_count: scan.medium_count,
            low_count: scan.low_count,
            license_violations: scan.license_violations,
            policy_violations: scan.policy_violations,
        },
        details,
        recommendations,
        next_steps,
    }
}
