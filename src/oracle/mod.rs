//! Vulnerability oracle - package+version to known-vulnerability lookup
//!
//! Every failure mode here degrades instead of propagating: an
//! unreachable oracle means "no data this cycle" for that dependency,
//! and a failed detail lookup means "no known fix" for that
//! vulnerability. Neither ever aborts the caller.

pub mod osv;

pub use osv::OsvClient;

use crate::alert::Severity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One vulnerability affecting a package version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    pub summary: String,
    pub details: String,
    pub severity: Severity,
    /// Numeric score as supplied by the oracle, when available
    pub score: Option<f64>,
}

/// Fix metadata from a detail lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnDetails {
    pub id: String,
    /// First "fixed" version found across affected ranges
    pub fixed_version: Option<String>,
    pub aliases: Vec<String>,
}

/// Queries a vulnerability database
#[async_trait]
pub trait VulnOracle: Send + Sync {
    /// `None` means the oracle was unavailable; an empty vec means the
    /// version is clean as far as the oracle knows.
    async fn query(
        &self,
        package: &str,
        ecosystem: &str,
        version: &str,
    ) -> Option<Vec<Vulnerability>>;

    /// Detail lookup by vulnerability id. `None` degrades the caller to
    /// "no known fix".
    async fn fetch_details(&self, id: &str) -> Option<VulnDetails>;
}

/// Map a numeric oracle score onto the severity ladder.
///
/// Fixed thresholds; an absent score defaults to medium rather than
/// silently dropping the finding.
pub fn severity_from_score(score: Option<f64>) -> Severity {
    match score {
        Some(s) if s >= 9.0 => Severity::Critical,
        Some(s) if s >= 7.0 => Severity::High,
        Some(s) if s >= 4.0 => Severity::Medium,
        Some(_) => Severity::Low,
        None => Severity::Medium,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_thresholds() {
        assert_eq!(severity_from_score(Some(9.8)), Severity::Critical);
        assert_eq!(severity_from_score(Some(9.0)), Severity::Critical);
        assert_eq!(severity_from_score(Some(8.9)), Severity::High);
        assert_eq!(severity_from_score(Some(7.0)), Severity::High);
        assert_eq!(severity_from_score(Some(6.9)), Severity::Medium);
        assert_eq!(severity_from_score(Some(4.0)), Severity::Medium);
        assert_eq!(severity_from_score(Some(3.9)), Severity::Low);
        assert_eq!(severity_from_score(Some(0.0)), Severity::Low);
    }

    #[test]
    fn missing_score_defaults_to_medium() {
        assert_eq!(severity_from_score(None), Severity::Medium);
    }
}
