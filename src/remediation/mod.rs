//! Remediation advice - upgrade, replace, or remove
//!
//! Strategy ladder per vulnerability: a known fixed version wins
//! (automatable upgrade), a curated alternative package is second best,
//! and removal is the last resort with the lowest confidence because
//! dropping a dependency may break functionality. A failed detail
//! lookup degrades to a minimal stub suggestion, never to a failure.

use crate::oracle::VulnDetails;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Curated drop-in alternatives for commonly flagged npm packages
static KNOWN_ALTERNATIVES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("request", "axios"),
        ("moment", "dayjs"),
        ("node-uuid", "uuid"),
        ("querystring", "qs"),
        ("istanbul", "nyc"),
        ("left-pad", "String.prototype.padStart"),
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixType {
    Upgrade,
    Replace,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Proposed,
    Applied,
    Dismissed,
}

/// One remediation proposal for a vulnerability alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationSuggestion {
    pub id: String,
    pub alert_id: String,
    pub dependency_name: String,
    pub current_version: String,
    pub recommended_version: Option<String>,
    pub fix_type: FixType,
    pub steps: Vec<String>,
    /// 0-100
    pub confidence: u8,
    pub automation_available: bool,
    pub status: SuggestionStatus,
    pub created_at: DateTime<Utc>,
}

/// Builds remediation suggestions from oracle fix metadata
pub struct RemediationAdvisor;

impl RemediationAdvisor {
    pub fn new() -> Self {
        Self
    }

    /// Propose a strategy for one vulnerability alert.
    ///
    /// `details` is the oracle's detail record; pass `None` when the
    /// lookup failed and the advisor will fall through the ladder.
    pub fn advise(
        &self,
        alert_id: &str,
        dependency: &str,
        current_version: &str,
        details: Option<&VulnDetails>,
    ) -> RemediationSuggestion {
        let fixed = details.and_then(|d| d.fixed_version.clone());

        if let Some(fixed_version) = fixed {
            return self.upgrade(alert_id, dependency, current_version, fixed_version);
        }

        if let Some(alternative) = KNOWN_ALTERNATIVES.get(dependency) {
            return self.replace(alert_id, dependency, current_version, alternative);
        }

        self.remove(alert_id, dependency, current_version)
    }

    fn upgrade(
        &self,
        alert_id: &str,
        dependency: &str,
        current_version: &str,
        fixed_version: String,
    ) -> RemediationSuggestion {
        let steps = vec![
            format!(
                "Update the manifest to declare \"{}\": \"{}\"",
                dependency, fixed_version
            ),
            "Reinstall dependencies to refresh the lockfile".to_string(),
            "Run the project test suite".to_string(),
            "Ship the updated lockfile".to_string(),
        ];
        RemediationSuggestion {
            id: Uuid::new_v4().to_string(),
            alert_id: alert_id.to_string(),
            dependency_name: dependency.to_string(),
            current_version: current_version.to_string(),
            recommended_version: Some(fixed_version),
            fix_type: FixType::Upgrade,
            steps,
            confidence: 90,
            automation_available: true,
            status: SuggestionStatus::Proposed,
            created_at: Utc::now(),
        }
    }

    fn replace(
        &self,
        alert_id: &str,
        dependency: &str,
        current_version: &str,
        alternative: &str,
    ) -> RemediationSuggestion {
        let steps = vec![
            format!("Remove {} from the manifest", dependency),
            format!("Adopt {} as the replacement", alternative),
            format!("Migrate call sites from {} to {}", dependency, alternative),
            "Run the project test suite".to_string(),
        ];
        RemediationSuggestion {
            id: Uuid::new_v4().to_string(),
            alert_id: alert_id.to_string(),
            dependency_name: dependency.to_string(),
            current_version: current_version.to_string(),
            recommended_version: None,
            fix_type: FixType::Replace,
            steps,
            confidence: 70,
            automation_available: false,
            status: SuggestionStatus::Proposed,
            created_at: Utc::now(),
        }
    }

    fn remove(
        &self,
        alert_id: &str,
        dependency: &str,
        current_version: &str,
    ) -> RemediationSuggestion {
        let steps = vec![
            format!("Audit remaining call sites of {}", dependency),
            format!("Remove {} from the manifest", dependency),
            "Inline or reimplement the needed functionality".to_string(),
            "Run the project test suite".to_string(),
        ];
        RemediationSuggestion {
            id: Uuid::new_v4().to_string(),
            alert_id: alert_id.to_string(),
            dependency_name: dependency.to_string(),
            current_version: current_version.to_string(),
            recommended_version: None,
            fix_type: FixType::Remove,
            steps,
            confidence: 50,
            automation_available: false,
            status: SuggestionStatus::Proposed,
            created_at: Utc::now(),
        }
    }
}

impl Default for RemediationAdvisor {
    fn default() -> Self {
        Self::new()
    }
}
