//! npm registry client - queries registry.npmjs.org

use super::{PackageMetadata, Registry};
use async_trait::async_trait;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://registry.npmjs.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Registry client for the public npm registry (or a compatible mirror)
pub struct NpmRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl NpmRegistry {
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

    async fn fetch_packument(&self, name: &str) -> Result<serde_json::Value, String> {
        // npm packument URL; scoped names keep their slash encoded
        let url = format!("{}/{}", self.base_url, name.replace('/', "%2f"));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("registry returned {}", response.status()));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| format!("invalid registry response: {}", e))
    }
}

impl Default for NpmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Registry for NpmRegistry {
    async fn lookup(&self, name: &str) -> Option<PackageMetadata> {
        let packument = match self.fetch_packument(name).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(package = name, error = %e, "registry lookup failed, skipping");
                return None;
            }
        };

        Some(parse_packument(name, &packument))
    }
}

/// Extract the fields the scan needs from a registry packument
fn parse_packument(name: &str, packument: &serde_json::Value) -> PackageMetadata {
    let latest = packument
        .get("dist-tags")
        .and_then(|t| t.get("latest"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    // License lives either at the top level or on the latest version entry
    let license = packument
        .get("license")
        .and_then(license_string)
        .or_else(|| {
            let latest = latest.as_deref()?;
            packument
                .get("versions")
                .and_then(|v| v.get(latest))
                .and_then(|v| v.get("license"))
                .and_then(license_string)
        });

    let versions = packument
        .get("versions")
        .and_then(|v| v.as_object())
        .map(|v| v.keys().cloned().collect())
        .unwrap_or_default();

    PackageMetadata {
        name: name.to_string(),
        license,
        latest,
        versions,
    }
}

/// npm licenses appear either as a string or as `{"type": "..."}`
fn license_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(o) => o
            .get("type")
            .and_then(|t| t.as_str())
            .map(|s| s.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn packument_with_top_level_license() {
        let packument = json!({
            "name": "left-pad",
            "license": "MIT",
            "dist-tags": {"latest": "1.3.0"},
            "versions": {"1.0.0": {}, "1.3.0": {}}
        });
        let meta = parse_packument("left-pad", &packument);
        assert_eq!(meta.license.as_deref(), Some("MIT"));
        assert_eq!(meta.latest.as_deref(), Some("1.3.0"));
        assert_eq!(meta.versions.len(), 2);
    }

    #[test]
    fn license_object_form() {
        let packument = json!({
            "dist-tags": {"latest": "2.0.0"},
            "versions": {
                "2.0.0": {"license": {"type": "Apache-2.0"}}
            }
        });
        let meta = parse_packument("pkg", &packument);
        assert_eq!(meta.license.as_deref(), Some("Apache-2.0"));
    }

    #[test]
    fn missing_license_is_none() {
        let packument = json!({
            "dist-tags": {"latest": "1.0.0"},
            "versions": {"1.0.0": {}}
        });
        let meta = parse_packument("pkg", &packument);
        assert!(meta.license.is_none());
    }
}
