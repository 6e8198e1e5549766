//! Persistence port - the storage seam around the scan pipeline
//!
//! Storage mechanics (ORM, SQL, migrations) are an external
//! collaborator; the core talks to this trait only. Every write is an
//! independent, idempotent-by-key operation so a failure on one item
//! never taints another. `MemoryStore` backs tests and default wiring.

use crate::alert::{Alert, AlertStatus};
use crate::fetch::Repository;
use crate::gate::ScanSummary;
use crate::policy::{ComplianceReport, SecurityPolicy};
use crate::remediation::RemediationSuggestion;
use crate::usage::UsageEvidence;
use crate::workflow::{SecurityWorkflow, TriggerType};
use crate::{DepwatchError, DepwatchResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Resolved state of one declared dependency, keyed by
/// (repository_id, name); exactly one row per key at any time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub repository_id: String,
    pub name: String,
    pub resolved_version: String,
    pub license: Option<String>,
    pub last_scanned_at: DateTime<Utc>,
}

/// Storage port for scan state
pub trait ScanStore: Send + Sync {
    // Repositories (owned externally, scan metadata only)
    fn register_repository(&self, repository: Repository) -> DepwatchResult<()>;
    fn repositories(&self) -> DepwatchResult<Vec<Repository>>;
    fn mark_repository_scanned(&self, repository_id: &str, at: DateTime<Utc>)
        -> DepwatchResult<()>;

    // Dependency records
    fn upsert_dependency(&self, record: DependencyRecord) -> DepwatchResult<()>;
    fn dependencies(&self, repository_id: &str) -> DepwatchResult<Vec<DependencyRecord>>;
    fn dependency(&self, repository_id: &str, name: &str)
        -> DepwatchResult<Option<DependencyRecord>>;

    // Usage evidence (derived view, rebuilt per scan)
    fn clear_usage_evidence(&self, repository_id: &str) -> DepwatchResult<()>;
    fn append_usage_evidence(&self, rows: Vec<UsageEvidence>) -> DepwatchResult<()>;
    fn usage_evidence(&self, repository_id: &str) -> DepwatchResult<Vec<UsageEvidence>>;

    // Alerts
    fn insert_alert(&self, alert: Alert) -> DepwatchResult<()>;
    fn open_alerts(&self, repository_id: &str) -> DepwatchResult<Vec<Alert>>;

    // Remediation suggestions
    fn insert_suggestion(&self, suggestion: RemediationSuggestion) -> DepwatchResult<()>;
    fn suggestions_for_alert(&self, alert_id: &str) -> DepwatchResult<Vec<RemediationSuggestion>>;

    // Policies & compliance reports
    fn register_policy(&self, policy: SecurityPolicy) -> DepwatchResult<()>;
    fn active_policies(&self, owner_id: &str) -> DepwatchResult<Vec<SecurityPolicy>>;
    fn insert_report(&self, report: ComplianceReport) -> DepwatchResult<()>;
    fn reports(&self, repository_id: &str) -> DepwatchResult<Vec<ComplianceReport>>;

    // Workflows
    fn register_workflow(&self, workflow: SecurityWorkflow) -> DepwatchResult<()>;
    fn workflows_for(&self, trigger: TriggerType) -> DepwatchResult<Vec<SecurityWorkflow>>;
    fn record_workflow_run(&self, workflow_id: &str, at: DateTime<Utc>) -> DepwatchResult<()>;

    // Scan summaries (gate input)
    fn record_scan_summary(&self, summary: ScanSummary) -> DepwatchResult<()>;
    fn latest_scan_summary(&self, repository_id: &str) -> DepwatchResult<Option<ScanSummary>>;
}

// ─── In-memory implementation ───────────────────────────────────────

#[derive(Default)]
struct Tables {
    repositories: HashMap<String, Repository>,
    dependencies: HashMap<(String, String), DependencyRecord>,
    usage_evidence: Vec<UsageEvidence>,
    alerts: Vec<Alert>,
    suggestions: Vec<RemediationSuggestion>,
    policies: Vec<SecurityPolicy>,
    reports: Vec<ComplianceReport>,
    workflows: Vec<SecurityWorkflow>,
    scan_summaries: Vec<ScanSummary>,
}

/// RwLock'd in-memory store
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> DepwatchResult<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| DepwatchError::Persistence("store lock poisoned".into()))
    }

    fn write(&self) -> DepwatchResult<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| DepwatchError::Persistence("store lock poisoned".into()))
    }
}

impl ScanStore for MemoryStore {
    fn register_repository(&self, repository: Repository) -> DepwatchResult<()> {
        self.write()?
            .repositories
            .insert(repository.id.clone(), repository);
        Ok(())
    }

    fn repositories(&self) -> DepwatchResult<Vec<Repository>> {
        let mut repos: Vec<Repository> = self.read()?.repositories.values().cloned().collect();
        repos.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(repos)
    }

    fn mark_repository_scanned(
        &self,
        repository_id: &str,
        at: DateTime<Utc>,
    ) -> DepwatchResult<()> {
        if let Some(repo) = self.write()?.repositories.get_mut(repository_id) {
            repo.last_scanned_at = Some(at);
        }
        Ok(())
    }

    fn upsert_dependency(&self, record: DependencyRecord) -> DepwatchResult<()> {
        self.write()?.dependencies.insert(
            (record.repository_id.clone(), record.name.clone()),
            record,
        );
        Ok(())
    }

    fn dependencies(&self, repository_id: &str) -> DepwatchResult<Vec<DependencyRecord>> {
        let mut deps: Vec<DependencyRecord> = self
            .read()?
            .dependencies
            .values()
            .filter(|d| d.repository_id == repository_id)
            .cloned()
            .collect();
        deps.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(deps)
    }

    fn dependency(
        &self,
        repository_id: &str,
        name: &str,
    ) -> DepwatchResult<Option<DependencyRecord>> {
        Ok(self
            .read()?
            .dependencies
            .get(&(repository_id.to_string(), name.to_string()))
            .cloned())
    }

    fn clear_usage_evidence(&self, repository_id: &str) -> DepwatchResult<()> {
        self.write()?
            .usage_evidence
            .retain(|e| e.repository_id != repository_id);
        Ok(())
    }

    fn append_usage_evidence(&self, rows: Vec<UsageEvidence>) -> DepwatchResult<()> {
        self.write()?.usage_evidence.extend(rows);
        Ok(())
    }

    fn usage_evidence(&self, repository_id: &str) -> DepwatchResult<Vec<UsageEvidence>> {
        Ok(self
            .read()?
            .usage_evidence
            .iter()
            .filter(|e| e.repository_id == repository_id)
            .cloned()
            .collect())
    }

    fn insert_alert(&self, alert: Alert) -> DepwatchResult<()> {
        self.write()?.alerts.push(alert);
        Ok(())
    }

    fn open_alerts(&self, repository_id: &str) -> DepwatchResult<Vec<Alert>> {
        Ok(self
            .read()?
            .alerts
            .iter()
            .filter(|a| a.repository_id == repository_id && a.status == AlertStatus::Open)
            .cloned()
            .collect())
    }

    fn insert_suggestion(&self, suggestion: RemediationSuggestion) -> DepwatchResult<()> {
        self.write()?.suggestions.push(suggestion);
        Ok(())
    }

    fn suggestions_for_alert(&self, alert_id: &str) -> DepwatchResult<Vec<RemediationSuggestion>> {
        Ok(self
            .read()?
            .suggestions
            .iter()
            .filter(|s| s.alert_id == alert_id)
            .cloned()
            .collect())
    }

    fn register_policy(&self, policy: SecurityPolicy) -> DepwatchResult<()> {
        self.write()?.policies.push(policy);
        Ok(())
    }

    fn active_policies(&self, owner_id: &str) -> DepwatchResult<Vec<SecurityPolicy>> {
        Ok(self
            .read()?
            .policies
            .iter()
            .filter(|p| p.owner_id == owner_id && p.is_active)
            .cloned()
            .collect())
    }

    fn insert_report(&self, report: ComplianceReport) -> DepwatchResult<()> {
        self.write()?.reports.push(report);
        Ok(())
    }

    fn reports(&self, repository_id: &str) -> DepwatchResult<Vec<ComplianceReport>> {
        Ok(self
            .read()?
            .reports
            .iter()
            .filter(|r| r.repository_id == repository_id)
            .cloned()
            .collect())
    }

    fn register_workflow(&self, workflow: SecurityWorkflow) -> DepwatchResult<()> {
        self.write()?.workflows.push(workflow);
        Ok(())
    }

    fn workflows_for(&self, trigger: TriggerType) -> DepwatchResult<Vec<SecurityWorkflow>> {
        Ok(self
            .read()?
            .workflows
            .iter()
            .filter(|w| w.trigger_type == trigger)
            .cloned()
            .collect())
    }

    fn record_workflow_run(&self, workflow_id: &str, at: DateTime<Utc>) -> DepwatchResult<()> {
        if let Some(workflow) = self
            .write()?
            .workflows
            .iter_mut()
            .find(|w| w.id == workflow_id)
        {
            workflow.last_executed_at = Some(at);
            workflow.execution_count += 1;
        }
        Ok(())
    }

    fn record_scan_summary(&self, summary: ScanSummary) -> DepwatchResult<()> {
        self.write()?.scan_summaries.push(summary);
        Ok(())
    }

    fn latest_scan_summary(&self, repository_id: &str) -> DepwatchResult<Option<ScanSummary>> {
        Ok(self
            .read()?
            .scan_summaries
            .iter()
            .filter(|s| s.repository_id == repository_id)
            .max_by_key(|s| s.completed_at)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(repo: &str, name: &str, version: &str) -> DependencyRecord {
        DependencyRecord {
            repository_id: repo.into(),
            name: name.into(),
            resolved_version: version.into(),
            license: Some("MIT".into()),
            last_scanned_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_keeps_one_row_per_key() {
        let store = MemoryStore::new();
        store.upsert_dependency(record("repo-1", "left-pad", "1.0.0")).unwrap();
        store.upsert_dependency(record("repo-1", "left-pad", "1.3.0")).unwrap();
        store.upsert_dependency(record("repo-1", "lodash", "4.17.21")).unwrap();
        store.upsert_dependency(record("repo-2", "left-pad", "1.0.0")).unwrap();

        let deps = store.dependencies("repo-1").unwrap();
        assert_eq!(deps.len(), 2);
        let left_pad = store.dependency("repo-1", "left-pad").unwrap().unwrap();
        assert_eq!(left_pad.resolved_version, "1.3.0");
    }

    #[test]
    fn usage_evidence_scoped_to_repository() {
        let store = MemoryStore::new();
        let row = |repo: &str| UsageEvidence {
            repository_id: repo.into(),
            dependency_name: "left-pad".into(),
            file: "src/a.js".into(),
            line: 1,
            excerpt: "require('left-pad')".into(),
            sha256: "abc".into(),
        };
        store.append_usage_evidence(vec![row("repo-1"), row("repo-2")]).unwrap();
        store.clear_usage_evidence("repo-1").unwrap();

        assert!(store.usage_evidence("repo-1").unwrap().is_empty());
        assert_eq!(store.usage_evidence("repo-2").unwrap().len(), 1);
    }

    #[test]
    fn mark_scanned_updates_metadata() {
        let store = MemoryStore::new();
        store
            .register_repository(Repository::new("repo-1", "owner-1", "https://x", "main"))
            .unwrap();
        let now = Utc::now();
        store.mark_repository_scanned("repo-1", now).unwrap();
        let repos = store.repositories().unwrap();
        assert_eq!(repos[0].last_scanned_at, Some(now));
    }
}
