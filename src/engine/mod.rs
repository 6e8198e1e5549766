//! Scan orchestration - the full fetch-to-workflow pipeline
//!
//! One repository scan is strictly sequential (its workspace must stay
//! consistent); scans of different repositories may run concurrently.
//! Concurrent scans of the *same* repository are serialized by an
//! in-process single-flight permit: the second caller is refused, not
//! queued, and the scheduler's next tick retries.
//!
//! Inside a scan, every dependency runs behind an isolated error
//! boundary: a failure on one dependency is logged and skipped, and the
//! remaining dependencies still complete.

pub mod scheduler;

pub use scheduler::ScanScheduler;

use crate::alert::{
    license_change_severity, Alert, AlertManager, AlertType, NotificationChannel, Severity,
};
use crate::fetch::{Repository, SourceFetcher};
use crate::gate::ScanSummary;
use crate::manifest::parse_manifest;
use crate::oracle::VulnOracle;
use crate::policy::{PolicyEngine, ViolationKind};
use crate::registry::{resolve_version, Registry};
use crate::remediation::RemediationAdvisor;
use crate::risk::{baseline_score, enhanced_score, priority_from_score, BusinessContext, ReasoningService};
use crate::store::{DependencyRecord, ScanStore};
use crate::usage::{DependencyUsage, UsageAnalyzer};
use crate::workflow::{ActionRunner, TriggerEvent, TriggerType, WorkflowEngine};
use crate::{DepwatchError, DepwatchResult};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

// ─── Configuration ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Ecosystem passed to the vulnerability oracle
    pub ecosystem: String,
    /// Deployment context for the enhanced risk path
    pub business_context: BusinessContext,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ecosystem: "npm".to_string(),
            business_context: BusinessContext::default(),
        }
    }
}

// ─── Single-flight ──────────────────────────────────────────────────

/// In-flight repository ids; permits release on drop
#[derive(Default, Clone)]
struct ScanLocks {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

struct ScanPermit {
    locks: ScanLocks,
    repository_id: String,
}

impl ScanLocks {
    fn acquire(&self, repository_id: &str) -> Option<ScanPermit> {
        let mut set = self.in_flight.lock().ok()?;
        if !set.insert(repository_id.to_string()) {
            return None;
        }
        Some(ScanPermit {
            locks: self.clone(),
            repository_id: repository_id.to_string(),
        })
    }
}

impl Drop for ScanPermit {
    fn drop(&mut self) {
        if let Ok(mut set) = self.locks.in_flight.lock() {
            set.remove(&self.repository_id);
        }
    }
}

// ─── Outcome ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Completed,
    /// Manifest absent: a successful zero-result scan
    NoManifest,
    /// Another scan of this repository is in flight
    AlreadyRunning,
}

/// What one scan did
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub repository_id: String,
    pub status: ScanStatus,
    pub dependencies: usize,
    /// Dependencies skipped this cycle (registry miss, oracle outage,
    /// isolated failures)
    pub dependencies_skipped: usize,
    pub vulnerabilities: usize,
    pub license_changes: usize,
    pub alerts_raised: usize,
    pub summary: ScanSummary,
    pub duration_ms: u64,
}

impl ScanOutcome {
    fn empty(repository_id: &str, status: ScanStatus) -> Self {
        Self {
            repository_id: repository_id.to_string(),
            status,
            dependencies: 0,
            dependencies_skipped: 0,
            vulnerabilities: 0,
            license_changes: 0,
            alerts_raised: 0,
            summary: ScanSummary::empty(repository_id),
            duration_ms: 0,
        }
    }
}

// ─── Engine ─────────────────────────────────────────────────────────

/// The scan pipeline with all collaborators injected
pub struct ScanEngine {
    config: ScanConfig,
    fetcher: SourceFetcher,
    registry: Arc<dyn Registry>,
    oracle: Arc<dyn VulnOracle>,
    reasoning: Option<Arc<dyn ReasoningService>>,
    usage: UsageAnalyzer,
    advisor: RemediationAdvisor,
    policies: PolicyEngine,
    alerts: AlertManager,
    workflows: WorkflowEngine,
    store: Arc<dyn ScanStore>,
    locks: ScanLocks,
}

impl ScanEngine {
    pub fn builder() -> ScanEngineBuilder {
        ScanEngineBuilder::default()
    }

    pub fn store(&self) -> &Arc<dyn ScanStore> {
        &self.store
    }

    /// Scan one repository end to end.
    ///
    /// Only infrastructure failures (clone, unreadable workspace,
    /// unparseable manifest) abort the scan; per-dependency trouble is
    /// skipped in isolation. The workspace is removed on every path.
    pub async fn scan(&self, repo: &Repository) -> DepwatchResult<ScanOutcome> {
        let Some(_permit) = self.locks.acquire(&repo.id) else {
            tracing::warn!(repository = %repo.id, "scan already in flight, refusing");
            return Ok(ScanOutcome::empty(&repo.id, ScanStatus::AlreadyRunning));
        };

        let start = std::time::Instant::now();
        tracing::info!(repository = %repo.id, url = %repo.source_url, "scan started");

        // Step 1: snapshot (workspace removal is RAII, all paths covered)
        let workspace = self.fetcher.fetch(repo)?;

        // Step 2: declared dependencies
        let Some(manifest) = parse_manifest(workspace.path())? else {
            tracing::info!(repository = %repo.id, "no manifest, nothing to scan");
            self.finish_scan(repo, ScanSummary::empty(&repo.id));
            let mut outcome = ScanOutcome::empty(&repo.id, ScanStatus::NoManifest);
            outcome.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(outcome);
        };

        let dep_names: Vec<String> = manifest.dependencies.keys().cloned().collect();
        tracing::info!(
            repository = %repo.id,
            dependencies = dep_names.len(),
            "manifest parsed"
        );

        // Step 3: usage evidence, rebuilt from the current tree
        let usages = self
            .usage
            .analyze(&repo.id, workspace.path(), &dep_names)?;
        if let Err(e) = self.store.clear_usage_evidence(&repo.id) {
            tracing::warn!(repository = %repo.id, error = %e, "failed to clear stale evidence");
        }
        for usage in &usages {
            if let Err(e) = self.store.append_usage_evidence(usage.evidence.clone()) {
                tracing::warn!(
                    repository = %repo.id,
                    dependency = %usage.name,
                    error = %e,
                    "failed to persist usage evidence"
                );
            }
        }

        // Step 4: per-dependency analysis, isolated error boundary
        let mut raised: Vec<Alert> = Vec::new();
        let mut skipped = 0usize;
        let mut vulnerabilities = 0usize;
        let mut license_changes = 0usize;

        for (name, range) in &manifest.dependencies {
            let usage = usages
                .iter()
                .find(|u| &u.name == name)
                .cloned()
                .unwrap_or(DependencyUsage {
                    name: name.clone(),
                    is_used: false,
                    usage_count: 0,
                    evidence: Vec::new(),
                });

            match self.scan_dependency(repo, name, range, &usage).await {
                Ok(result) => {
                    if result.skipped {
                        skipped += 1;
                    }
                    vulnerabilities += result.vulnerabilities;
                    license_changes += result.license_changes;
                    raised.extend(result.alerts);
                }
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(
                        repository = %repo.id,
                        dependency = %name,
                        error = %e,
                        "dependency analysis failed, skipping"
                    );
                }
            }
        }

        // Step 5: policy evaluation over the post-scan state
        let (license_violations, policy_violations) = self.evaluate_policies(repo).await;

        // Step 6: summary for gate evaluations
        let mut summary = ScanSummary::empty(&repo.id);
        for alert in &raised {
            match alert.severity {
                Severity::Critical => summary.critical_count += 1,
                Severity::High => summary.high_count += 1,
                Severity::Medium => summary.medium_count += 1,
                Severity::Low => summary.low_count += 1,
            }
        }
        summary.license_violations = license_violations;
        summary.policy_violations = policy_violations;
        self.finish_scan(repo, summary.clone());

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            repository = %repo.id,
            dependencies = dep_names.len(),
            skipped,
            vulnerabilities,
            alerts = raised.len(),
            duration_ms,
            "scan complete"
        );

        Ok(ScanOutcome {
            repository_id: repo.id.clone(),
            status: ScanStatus::Completed,
            dependencies: dep_names.len(),
            dependencies_skipped: skipped,
            vulnerabilities,
            license_changes,
            alerts_raised: raised.len(),
            summary,
            duration_ms,
        })
    }

    /// Analyze one dependency: resolve, cross-reference, alert.
    async fn scan_dependency(
        &self,
        repo: &Repository,
        name: &str,
        declared_range: &str,
        usage: &DependencyUsage,
    ) -> DepwatchResult<DependencyScanResult> {
        let mut result = DependencyScanResult::default();

        // Registry miss: skip this dependency for this cycle
        let Some(metadata) = self.registry.lookup(name).await else {
            result.skipped = true;
            return Ok(result);
        };
        let Some(version) = resolve_version(declared_range, &metadata) else {
            tracing::warn!(dependency = name, range = declared_range, "unresolvable version");
            result.skipped = true;
            return Ok(result);
        };

        // Prior state before this scan overwrites it
        let prior = self.store.dependency(&repo.id, name)?;
        let prior_license = prior.as_ref().and_then(|p| p.license.clone());

        self.store.upsert_dependency(DependencyRecord {
            repository_id: repo.id.clone(),
            name: name.to_string(),
            resolved_version: version.clone(),
            license: metadata.license.clone(),
            last_scanned_at: Utc::now(),
        })?;

        // License change detection
        if let Some(new_license) = metadata.license.as_deref() {
            let changed = prior_license.as_deref().is_some_and(|old| old != new_license);
            let severity = license_change_severity(prior_license.as_deref(), new_license);
            // Alert on an actual change, or on first sight of a license
            // severe enough to be critical on its own
            if changed || (prior.is_none() && severity == Severity::Critical) {
                result.license_changes += 1;
                let description = match prior_license.as_deref() {
                    Some(old) => format!(
                        "license of {} changed from {} to {}",
                        name, old, new_license
                    ),
                    None => format!("{} is licensed under {}", name, new_license),
                };
                let mut alert = Alert::new(
                    &repo.id,
                    name,
                    AlertType::License,
                    new_license,
                    severity,
                    description,
                )
                .with_usage(usage.is_used, usage.usage_count)
                .with_risk_score(baseline_score(severity, usage.is_used, usage.usage_count));
                if let Some(old) = prior_license.clone() {
                    alert = alert.with_old_value(old);
                }
                if let Some(alert) = self.alerts.raise(self.store.as_ref(), alert).await {
                    result.alerts.push(alert);
                }
            }
        }

        // Vulnerability cross-reference; oracle outage skips the rest
        let Some(vulns) = self
            .oracle
            .query(name, &self.config.ecosystem, &version)
            .await
        else {
            result.skipped = true;
            return Ok(result);
        };

        for vuln in vulns {
            result.vulnerabilities += 1;

            let severity = self.contextual_severity(name, &vuln.id, vuln.severity).await;
            let risk_score = baseline_score(severity, usage.is_used, usage.usage_count);

            let alert = Alert::new(
                &repo.id,
                name,
                AlertType::Vuln,
                &vuln.id,
                severity,
                format!("{}: {}", vuln.id, vuln.summary),
            )
            .with_usage(usage.is_used, usage.usage_count)
            .with_risk_score(risk_score);

            let Some(alert) = self.alerts.raise(self.store.as_ref(), alert).await else {
                continue;
            };

            // Remediation: detail-lookup failure degrades to a stub
            let details = self.oracle.fetch_details(&vuln.id).await;
            let suggestion =
                self.advisor
                    .advise(&alert.id, name, &version, details.as_ref());
            let confidence = suggestion.confidence;
            if let Err(e) = self.store.insert_suggestion(suggestion) {
                tracing::warn!(alert = %alert.id, error = %e, "failed to persist suggestion");
            }

            let event = TriggerEvent::new(
                TriggerType::VulnerabilityDetected,
                &repo.id,
                format!("{} in {}", vuln.id, name),
            )
            .with_severity(severity)
            .with_confidence(confidence);
            self.workflows.handle_event(self.store.as_ref(), &event).await;

            result.alerts.push(alert);
        }

        Ok(result)
    }

    /// Enhanced-path severity when the reasoning service has signals,
    /// the oracle's severity otherwise.
    async fn contextual_severity(
        &self,
        package: &str,
        vulnerability_id: &str,
        oracle_severity: Severity,
    ) -> Severity {
        let Some(reasoning) = &self.reasoning else {
            return oracle_severity;
        };
        match reasoning.threat_signals(package, vulnerability_id).await {
            Some(signals) => {
                let score =
                    enhanced_score(oracle_severity, self.config.business_context, &signals);
                priority_from_score(score)
            }
            None => {
                tracing::debug!(
                    package,
                    vulnerability = vulnerability_id,
                    "reasoning service unavailable, using baseline severity"
                );
                oracle_severity
            }
        }
    }

    /// Run every active policy of the repository owner. Returns
    /// (license violations, total violations) across all policies.
    async fn evaluate_policies(&self, repo: &Repository) -> (usize, usize) {
        let policies = match self.store.active_policies(&repo.owner_id) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(owner = %repo.owner_id, error = %e, "failed to load policies");
                return (0, 0);
            }
        };

        let dependencies = self.store.dependencies(&repo.id).unwrap_or_default();
        let open_alerts = self.store.open_alerts(&repo.id).unwrap_or_default();

        let mut license_violations = 0usize;
        let mut total_violations = 0usize;

        for policy in &policies {
            if let Err(e) = policy.validate() {
                tracing::warn!(policy = %policy.id, error = %e, "invalid policy skipped");
                continue;
            }

            let report = self
                .policies
                .evaluate(policy, &repo.id, &dependencies, &open_alerts);

            license_violations += report
                .violations
                .iter()
                .filter(|v| {
                    matches!(
                        v.kind,
                        ViolationKind::BlockedLicense
                            | ViolationKind::UnapprovedLicense
                            | ViolationKind::MissingLicense
                    )
                })
                .count();
            total_violations += report.violations.len();

            let violation_count = report.violations.len();
            let score = report.compliance_score;
            let needs_notice = report.needs_notification();
            let policy_id = report.policy_id.clone();

            let persisted = match self.store.insert_report(report) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(policy = %policy.id, error = %e, "failed to persist report");
                    false
                }
            };

            if violation_count > 0 {
                let event = TriggerEvent::new(
                    TriggerType::LicenseViolation,
                    &repo.id,
                    format!(
                        "{} policy violations under {} (score {})",
                        violation_count, policy_id, score
                    ),
                );
                self.workflows.handle_event(self.store.as_ref(), &event).await;
            }

            // Persistence failure skips the dependent notification for
            // this report only
            if needs_notice && persisted {
                self.alerts
                    .notify_compliance(&repo.id, &policy_id, score)
                    .await;
            }
        }

        (license_violations, total_violations)
    }

    fn finish_scan(&self, repo: &Repository, summary: ScanSummary) {
        if let Err(e) = self.store.record_scan_summary(summary) {
            tracing::warn!(repository = %repo.id, error = %e, "failed to record scan summary");
        }
        if let Err(e) = self.store.mark_repository_scanned(&repo.id, Utc::now()) {
            tracing::warn!(repository = %repo.id, error = %e, "failed to update scan metadata");
        }
    }
}

#[derive(Default)]
struct DependencyScanResult {
    skipped: bool,
    vulnerabilities: usize,
    license_changes: usize,
    alerts: Vec<Alert>,
}

// ─── Builder ────────────────────────────────────────────────────────

/// Wires the engine's collaborators; everything is injected, nothing is
/// a hidden singleton.
#[derive(Default)]
pub struct ScanEngineBuilder {
    config: ScanConfig,
    registry: Option<Arc<dyn Registry>>,
    oracle: Option<Arc<dyn VulnOracle>>,
    reasoning: Option<Arc<dyn ReasoningService>>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    action_runner: Option<Arc<dyn ActionRunner>>,
    store: Option<Arc<dyn ScanStore>>,
}

impl ScanEngineBuilder {
    pub fn config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn oracle(mut self, oracle: Arc<dyn VulnOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Optional: enables the enhanced risk path
    pub fn reasoning(mut self, service: Arc<dyn ReasoningService>) -> Self {
        self.reasoning = Some(service);
        self
    }

    pub fn notification_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn action_runner(mut self, runner: Arc<dyn ActionRunner>) -> Self {
        self.action_runner = Some(runner);
        self
    }

    pub fn store(mut self, store: Arc<dyn ScanStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> DepwatchResult<ScanEngine> {
        let registry = self
            .registry
            .ok_or_else(|| DepwatchError::Registry("no registry configured".into()))?;
        let oracle = self
            .oracle
            .ok_or_else(|| DepwatchError::Oracle("no oracle configured".into()))?;
        let store = self
            .store
            .ok_or_else(|| DepwatchError::Persistence("no store configured".into()))?;
        let action_runner = self
            .action_runner
            .ok_or_else(|| DepwatchError::Workflow("no action runner configured".into()))?;

        Ok(ScanEngine {
            config: self.config,
            fetcher: SourceFetcher::new(),
            registry,
            oracle,
            reasoning: self.reasoning,
            usage: UsageAnalyzer::new(),
            advisor: RemediationAdvisor::new(),
            policies: PolicyEngine::new(),
            alerts: AlertManager::new(self.channels),
            workflows: WorkflowEngine::new(action_runner),
            store,
            locks: ScanLocks::default(),
        })
    }
}
