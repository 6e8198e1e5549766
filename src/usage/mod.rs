//! Usage analysis - is a flagged dependency actually referenced?
//!
//! Walks the workspace once (iterative traversal, no recursion) and
//! tests every source line against a small set of import patterns per
//! dependency. The output is a derived view of the current tree:
//! evidence rows are rebuilt from scratch each scan, never accumulated.

use crate::{DepwatchError, DepwatchResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directories that never contain first-party source
static SKIP_DIRS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "node_modules",
        "vendor",
        "third_party",
        "dist",
        "build",
        "out",
        "target",
        "coverage",
        "__pycache__",
    ]
    .into_iter()
    .collect()
});

/// Extensions treated as scannable source
static SOURCE_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["js", "jsx", "ts", "tsx", "mjs", "cjs", "vue", "svelte"]
        .into_iter()
        .collect()
});

const MAX_EXCERPT_LEN: usize = 200;

/// One (file, line) proof that a dependency is referenced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvidence {
    pub repository_id: String,
    pub dependency_name: String,
    pub file: PathBuf,
    /// 1-indexed
    pub line: usize,
    pub excerpt: String,
    /// SHA-256 of the excerpt, anchoring the evidence to its content
    pub sha256: String,
}

/// Aggregated usage verdict for one dependency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyUsage {
    pub name: String,
    pub is_used: bool,
    /// Matched lines across the whole tree
    pub usage_count: usize,
    pub evidence: Vec<UsageEvidence>,
}

/// Per-dependency compiled import patterns: direct import, namespaced
/// import, dynamic import, synchronous require
struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    fn compile(dependency: &str) -> Self {
        let name = regex::escape(dependency);
        let sources = [
            // import x from 'dep' / export { y } from 'dep/sub'
            format!(r#"(?:import|export)\s+[^'";]*?from\s*['"]{name}(?:/[^'"]*)?['"]"#),
            // side-effect import 'dep'
            format!(r#"import\s*['"]{name}(?:/[^'"]*)?['"]"#),
            // dynamic import('dep')
            format!(r#"import\s*\(\s*['"]{name}(?:/[^'"]*)?['"]"#),
            // require('dep')
            format!(r#"require\s*\(\s*['"]{name}(?:/[^'"]*)?['"]"#),
        ];
        let patterns = sources
            .iter()
            .filter_map(|s| Regex::new(s).ok())
            .collect();
        Self { patterns }
    }

    fn matches(&self, line: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(line))
    }
}

/// Walks the source tree and measures per-dependency usage
pub struct UsageAnalyzer;

impl UsageAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze usage of every dependency in one pass over the tree.
    ///
    /// Returns one entry per requested dependency, in input order,
    /// including zero-usage entries.
    pub fn analyze(
        &self,
        repository_id: &str,
        root: &Path,
        dependencies: &[String],
    ) -> DepwatchResult<Vec<DependencyUsage>> {
        if !root.exists() {
            return Err(DepwatchError::Usage(format!(
                "workspace does not exist: {}",
                root.display()
            )));
        }

        let compiled: Vec<(usize, PatternSet)> = dependencies
            .iter()
            .enumerate()
            .map(|(i, name)| (i, PatternSet::compile(name)))
            .collect();

        let mut results: Vec<DependencyUsage> = dependencies
            .iter()
            .map(|name| DependencyUsage {
                name: name.clone(),
                is_used: false,
                usage_count: 0,
                evidence: Vec::new(),
            })
            .collect();

        let mut files_scanned = 0usize;
        for entry in WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| !is_skipped(e, root))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if !is_source_file(entry.path()) {
                continue;
            }

            let content = match std::fs::read_to_string(entry.path()) {
                Ok(c) => c,
                Err(e) => {
                    tracing::debug!(file = %entry.path().display(), error = %e, "unreadable, skipping");
                    continue;
                }
            };
            files_scanned += 1;

            for (line_no, line) in content.lines().enumerate() {
                for (idx, set) in &compiled {
                    if set.matches(line) {
                        let usage = &mut results[*idx];
                        usage.is_used = true;
                        usage.usage_count += 1;
                        usage.evidence.push(make_evidence(
                            repository_id,
                            &usage.name,
                            entry.path(),
                            line_no + 1,
                            line,
                        ));
                    }
                }
            }
        }

        tracing::debug!(
            repository = repository_id,
            files = files_scanned,
            dependencies = dependencies.len(),
            "usage analysis complete"
        );

        Ok(results)
    }
}

impl Default for UsageAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn make_evidence(
    repository_id: &str,
    dependency: &str,
    file: &Path,
    line: usize,
    raw_line: &str,
) -> UsageEvidence {
    let excerpt: String = raw_line.trim().chars().take(MAX_EXCERPT_LEN).collect();
    let sha256 = hex::encode(Sha256::digest(excerpt.as_bytes()));
    UsageEvidence {
        repository_id: repository_id.to_string(),
        dependency_name: dependency.to_string(),
        file: file.to_path_buf(),
        line,
        excerpt,
        sha256,
    }
}

/// Constant-time skip decision for one directory entry
fn is_skipped(entry: &walkdir::DirEntry, root: &Path) -> bool {
    if entry.path() == root || !entry.file_type().is_dir() {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.') || SKIP_DIRS.contains(name))
        .unwrap_or(false)
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SOURCE_EXTENSIONS.contains(e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn recognized_import_yields_usage() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "src/index.js",
            "import leftPad from 'left-pad';\nconsole.log(leftPad('x', 4));\n",
        );

        let results = UsageAnalyzer::new()
            .analyze("repo-1", dir.path(), &["left-pad".into()])
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_used);
        assert!(results[0].usage_count >= 1);
        assert_eq!(results[0].evidence[0].line, 1);
    }

    #[test]
    fn unreferenced_dependency_counts_zero() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/app.js", "const x = 1;\n");

        let results = UsageAnalyzer::new()
            .analyze("repo-1", dir.path(), &["left-pad".into()])
            .unwrap();
        assert!(!results[0].is_used);
        assert_eq!(results[0].usage_count, 0);
        assert!(results[0].evidence.is_empty());
    }

    #[test]
    fn all_import_forms_recognized() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "src/all.ts",
            concat!(
                "import pad from 'left-pad';\n",
                "import 'left-pad';\n",
                "import sub from 'left-pad/extra';\n",
                "const dyn = await import('left-pad');\n",
                "const cjs = require('left-pad');\n",
            ),
        );

        let results = UsageAnalyzer::new()
            .analyze("repo-1", dir.path(), &["left-pad".into()])
            .unwrap();
        assert_eq!(results[0].usage_count, 5);
    }

    #[test]
    fn similarly_named_package_not_matched() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "src/index.js",
            "import other from 'left-pad-extended';\n",
        );

        let results = UsageAnalyzer::new()
            .analyze("repo-1", dir.path(), &["left-pad".into()])
            .unwrap();
        assert_eq!(results[0].usage_count, 0);
    }

    #[test]
    fn skip_dirs_and_non_source_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "node_modules/left-pad/index.js",
            "require('left-pad');\n",
        );
        write(dir.path(), ".hidden/x.js", "require('left-pad');\n");
        write(dir.path(), "docs/readme.md", "require('left-pad')\n");
        write(dir.path(), "src/ok.js", "require('left-pad');\n");

        let results = UsageAnalyzer::new()
            .analyze("repo-1", dir.path(), &["left-pad".into()])
            .unwrap();
        // Only src/ok.js counts
        assert_eq!(results[0].usage_count, 1);
    }

    #[test]
    fn evidence_is_hash_anchored() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.js", "const p = require('left-pad');\n");

        let results = UsageAnalyzer::new()
            .analyze("repo-1", dir.path(), &["left-pad".into()])
            .unwrap();
        let evidence = &results[0].evidence[0];
        assert_eq!(
            evidence.sha256,
            hex::encode(Sha256::digest(evidence.excerpt.as_bytes()))
        );
    }

    #[test]
    fn scoped_package_names_work() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "src/s.ts",
            "import { core } from '@acme/toolkit';\n",
        );

        let results = UsageAnalyzer::new()
            .analyze("repo-1", dir.path(), &["@acme/toolkit".into()])
            .unwrap();
        assert_eq!(results[0].usage_count, 1);
    }
}
