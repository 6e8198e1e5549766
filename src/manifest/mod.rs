//! Manifest parsing - declared dependency extraction
//!
//! Reads `package.json` at the workspace root. An absent manifest is a
//! successful zero-result outcome, not an error; so is a manifest that
//! declares no dependencies. Only a present-but-unparseable manifest
//! fails the scan for that repository.

use crate::{DepwatchError, DepwatchResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const MANIFEST_FILE: &str = "package.json";

/// Declared dependencies of one project manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestSummary {
    /// Dependency name to declared version-range string
    pub dependencies: BTreeMap<String, String>,
    /// The manifest's own declared license, informational
    pub declared_license: Option<String>,
}

impl ManifestSummary {
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}

/// Parse the manifest at the workspace root.
///
/// Returns `Ok(None)` when no manifest exists.
pub fn parse_manifest(workspace_root: &Path) -> DepwatchResult<Option<ManifestSummary>> {
    let manifest_path = workspace_root.join(MANIFEST_FILE);
    if !manifest_path.exists() {
        tracing::debug!("no manifest at {}", manifest_path.display());
        return Ok(None);
    }

    let content = std::fs::read_to_string(&manifest_path)?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| DepwatchError::Manifest(format!("invalid {}: {}", MANIFEST_FILE, e)))?;

    let mut dependencies = BTreeMap::new();
    if let Some(deps) = value.get("dependencies").and_then(|d| d.as_object()) {
        for (name, range) in deps {
            if let Some(range) = range.as_str() {
                dependencies.insert(name.clone(), range.to_string());
            }
        }
    }

    let declared_license = value
        .get("license")
        .and_then(|l| l.as_str())
        .map(|s| s.to_string());

    Ok(Some(ManifestSummary {
        dependencies,
        declared_license,
    }))
}
