//! Package registry lookups - license and version metadata
//!
//! A registry miss is a per-dependency skip for the current cycle, never
//! a scan failure, so the lookup returns `Option` instead of threading
//! an error through the pipeline.
//!
//! Version resolution is deliberately best-effort: an exact version pin
//! is used verbatim, anything else (ranges, tags, wildcards) falls back
//! to the registry's latest tag. True semver-range intersection is a
//! documented non-goal.

pub mod npm;

pub use npm::NpmRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Registry metadata for one package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    /// Declared license, missing for unlicensed/private packages
    pub license: Option<String>,
    /// The registry's "latest" dist-tag
    pub latest: Option<String>,
    /// Published versions, newest last
    pub versions: Vec<String>,
}

/// Resolves package names to published metadata
#[async_trait]
pub trait Registry: Send + Sync {
    /// `None` means the package is unknown to the registry (or the
    /// registry was unreachable); the caller skips the dependency for
    /// this cycle.
    async fn lookup(&self, name: &str) -> Option<PackageMetadata>;
}

/// Resolve a declared version range against registry metadata.
///
/// Exact pins win; everything else resolves to the latest tag.
pub fn resolve_version(declared: &str, metadata: &PackageMetadata) -> Option<String> {
    let trimmed = declared.trim();
    if semver::Version::parse(trimmed).is_ok() {
        return Some(trimmed.to_string());
    }
    metadata.latest.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(latest: Option<&str>) -> PackageMetadata {
        PackageMetadata {
            name: "left-pad".into(),
            license: Some("MIT".into()),
            latest: latest.map(|s| s.to_string()),
            versions: vec!["1.0.0".into(), "1.3.0".into()],
        }
    }

    #[test]
    fn exact_pin_used_verbatim() {
        let resolved = resolve_version("1.0.0", &metadata(Some("1.3.0")));
        assert_eq!(resolved.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn range_falls_back_to_latest() {
        assert_eq!(
            resolve_version("^1.0.0", &metadata(Some("1.3.0"))).as_deref(),
            Some("1.3.0")
        );
        assert_eq!(
            resolve_version("~1.2.0", &metadata(Some("1.3.0"))).as_deref(),
            Some("1.3.0")
        );
        assert_eq!(
            resolve_version("*", &metadata(Some("1.3.0"))).as_deref(),
            Some("1.3.0")
        );
    }

    #[test]
    fn no_latest_tag_resolves_nothing() {
        assert_eq!(resolve_version("^1.0.0", &metadata(None)), None);
    }
}
