//! Risk scoring - severity plus usage evidence into a priority signal
//!
//! Two independent paths:
//!
//! - **Baseline** (always available, fully deterministic): severity base
//!   score discounted for unused dependencies and amplified with
//!   diminishing returns for heavy usage, clamped to 0-100.
//! - **Enhanced** (optional): a 0-10 contextual score that folds in
//!   business criticality, exposure, and threat-intelligence signals
//!   from an external reasoning service. The service being down or not
//!   configured degrades to the baseline; alerting never depends on it.

use crate::alert::Severity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ─── Baseline Path ──────────────────────────────────────────────────

/// Base score per severity tier
fn base_score(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 90.0,
        Severity::High => 70.0,
        Severity::Medium => 50.0,
        Severity::Low => 30.0,
    }
}

/// Deterministic 0-100 risk score.
///
/// Unused dependencies are discounted to 30% (exposure unproven); used
/// ones gain 10% per matched line, capped at 2x.
pub fn baseline_score(severity: Severity, is_used: bool, usage_count: usize) -> u32 {
    let base = base_score(severity);
    let multiplier = if is_used {
        (1.0 + 0.1 * usage_count as f64).min(2.0)
    } else {
        0.3
    };
    (base * multiplier).round().clamp(0.0, 100.0) as u32
}

// ─── Enhanced Path ──────────────────────────────────────────────────

/// How central the affected component is to the business
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusinessCriticality {
    Low,
    Medium,
    High,
    Critical,
}

impl BusinessCriticality {
    fn multiplier(self) -> f64 {
        match self {
            Self::Critical => 1.5,
            Self::High => 1.2,
            Self::Medium => 1.0,
            Self::Low => 0.8,
        }
    }
}

/// Network position of the deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exposure {
    Public,
    External,
    Internal,
}

impl Exposure {
    fn multiplier(self) -> f64 {
        match self {
            Self::Public => 2.0,
            Self::External => 1.5,
            Self::Internal => 1.0,
        }
    }
}

/// Deployment context for the enhanced path
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BusinessContext {
    pub criticality: BusinessCriticality,
    pub exposure: Exposure,
}

impl Default for BusinessContext {
    fn default() -> Self {
        Self {
            criticality: BusinessCriticality::Medium,
            exposure: Exposure::Internal,
        }
    }
}

/// Threat-intelligence signals supplied by the reasoning service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatSignals {
    pub exploit_available: bool,
    /// 0.0 (proof of concept) to 1.0 (weaponized)
    pub exploit_maturity: f64,
    /// 0.0 (trivial) to 1.0 (very complex)
    pub attack_complexity: f64,
    pub recent_incidents: u32,
    pub patch_available: bool,
    /// 0.0 (drop-in) to 1.0 (major migration)
    pub patch_complexity: f64,
}

/// External reasoning service supplying threat context. Optional by
/// design; callers degrade to the baseline when it yields nothing.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn threat_signals(&self, package: &str, vulnerability_id: &str)
        -> Option<ThreatSignals>;
}

/// Severity tier value on the 0-10 scale
fn tier_value(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 9.0,
        Severity::High => 7.0,
        Severity::Medium => 5.0,
        Severity::Low => 3.0,
    }
}

/// Contextual adjustment in [0.5, 2.0] derived from threat signals.
///
/// Exploit availability and maturity push the factor up, attack
/// complexity and an easy patch pull it down, recent incidents add a
/// small step each.
pub fn contextual_adjustment(signals: &ThreatSignals) -> f64 {
    let mut factor = 1.0;
    if signals.exploit_available {
        factor += 0.4 + 0.3 * signals.exploit_maturity.clamp(0.0, 1.0);
    }
    factor -= 0.3 * signals.attack_complexity.clamp(0.0, 1.0);
    factor += 0.1 * f64::from(signals.recent_incidents.min(5));
    if signals.patch_available {
        factor -= 0.2 * (1.0 - signals.patch_complexity.clamp(0.0, 1.0));
    }
    factor.clamp(0.5, 2.0)
}

/// Contextual 0-10 risk score for the enhanced path
pub fn enhanced_score(
    severity: Severity,
    context: BusinessContext,
    signals: &ThreatSignals,
) -> f64 {
    let base = (tier_value(severity)
        * context.criticality.multiplier()
        * context.exposure.multiplier())
    .min(10.0);
    (base * contextual_adjustment(signals)).clamp(0.0, 10.0)
}

/// Priority tier from an enhanced 0-10 score
pub fn priority_from_score(score: f64) -> Severity {
    if score >= 9.0 {
        Severity::Critical
    } else if score >= 7.0 {
        Severity::High
    } else if score >= 4.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}
