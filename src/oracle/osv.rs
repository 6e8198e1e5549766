//! OSV client - queries the osv.dev vulnerability database

use super::{severity_from_score, VulnDetails, VulnOracle, Vulnerability};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.osv.dev";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for the OSV API (`POST /v1/query`, `GET /v1/vulns/{id}`)
pub struct OsvClient {
    client: reqwest::Client,
    base_url: String,
}

impl OsvClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for OsvClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VulnOracle for OsvClient {
    async fn query(
        &self,
        package: &str,
        ecosystem: &str,
        version: &str,
    ) -> Option<Vec<Vulnerability>> {
        let url = format!("{}/v1/query", self.base_url);
        let body = json!({
            "version": version,
            "package": {"name": package, "ecosystem": ecosystem}
        });

        let response = match self.client.post(&url).json(&body).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::warn!(package, version, status = %r.status(), "oracle query rejected");
                return None;
            }
            Err(e) => {
                tracing::warn!(package, version, error = %e, "oracle unreachable");
                return None;
            }
        };

        let payload: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(package, error = %e, "invalid oracle response");
                return None;
            }
        };

        let vulns = payload
            .get("vulns")
            .and_then(|v| v.as_array())
            .map(|entries| entries.iter().map(parse_vulnerability).collect())
            .unwrap_or_default();

        Some(vulns)
    }

    async fn fetch_details(&self, id: &str) -> Option<VulnDetails> {
        let url = format!("{}/v1/vulns/{}", self.base_url, id);
        let response = match self.client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::warn!(vuln = id, status = %r.status(), "detail lookup rejected");
                return None;
            }
            Err(e) => {
                tracing::warn!(vuln = id, error = %e, "detail lookup failed");
                return None;
            }
        };

        let record: serde_json::Value = response.json().await.ok()?;
        Some(parse_details(id, &record))
    }
}

/// Parse one entry of an OSV query response
fn parse_vulnerability(entry: &serde_json::Value) -> Vulnerability {
    let id = entry
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or("UNKNOWN")
        .to_string();
    let summary = entry
        .get("summary")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let details = entry
        .get("details")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let score = cvss_score(entry);

    Vulnerability {
        id,
        summary,
        details,
        severity: severity_from_score(score),
        score,
    }
}

/// Pull a numeric score out of an OSV severity block.
///
/// OSV reports CVSS vectors; databases that enrich the record also
/// attach a numeric `database_specific.cvss_score`, which is preferred.
fn cvss_score(entry: &serde_json::Value) -> Option<f64> {
    if let Some(score) = entry
        .get("database_specific")
        .and_then(|d| d.get("cvss_score"))
        .and_then(|s| s.as_f64())
    {
        return Some(score);
    }

    entry
        .get("severity")
        .and_then(|s| s.as_array())
        .and_then(|entries| {
            entries
                .iter()
                .find_map(|e| e.get("score").and_then(|s| s.as_str()))
        })
        .and_then(parse_numeric_score)
}

/// Some databases put a bare number in the severity score field; CVSS
/// vector strings fail the parse and fall back to the medium default.
fn parse_numeric_score(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok()
}

/// First "fixed" event across all affected ranges
fn parse_details(id: &str, record: &serde_json::Value) -> VulnDetails {
    let fixed_version = record
        .get("affected")
        .and_then(|a| a.as_array())
        .and_then(|affected| {
            affected.iter().find_map(|pkg| {
                pkg.get("ranges")
                    .and_then(|r| r.as_array())?
                    .iter()
                    .find_map(|range| {
                        range
                            .get("events")
                            .and_then(|e| e.as_array())?
                            .iter()
                            .find_map(|event| {
                                event
                                    .get("fixed")
                                    .and_then(|f| f.as_str())
                                    .map(|s| s.to_string())
                            })
                    })
            })
        });

    let aliases = record
        .get("aliases")
        .and_then(|a| a.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    VulnDetails {
        id: id.to_string(),
        fixed_version,
        aliases,
    }
}
