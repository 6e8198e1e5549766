//! Workflow automation - trigger, condition, action
//!
//! Scan and policy events are matched against registered workflows. A
//! workflow's conditions are a small fixed vocabulary of tagged
//! variants, combined conjunctively; any condition a workflow does not
//! specify passes by default. Actions run in declared order through an
//! injected runner, and one failing action never blocks the rest or
//! marks the workflow as failed.

use crate::alert::Severity;
use crate::store::ScanStore;
use crate::DepwatchResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ─── Events ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    VulnerabilityDetected,
    LicenseViolation,
    ComplianceFailed,
    GateFailure,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VulnerabilityDetected => write!(f, "vulnerability_detected"),
            Self::LicenseViolation => write!(f, "license_violation"),
            Self::ComplianceFailed => write!(f, "compliance_failed"),
            Self::GateFailure => write!(f, "gate_failure"),
        }
    }
}

/// One emitted pipeline event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub trigger_type: TriggerType,
    pub repository_id: String,
    /// Severity of the originating finding, when it has one
    pub severity: Option<Severity>,
    /// Confidence 0-100 of the originating finding, when it has one
    pub confidence: Option<u8>,
    pub summary: String,
}

impl TriggerEvent {
    pub fn new(
        trigger_type: TriggerType,
        repository_id: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            trigger_type,
            repository_id: repository_id.into(),
            severity: None,
            confidence: None,
            summary: summary.into(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

// ─── Conditions & Actions ───────────────────────────────────────────

/// The fixed condition vocabulary. One evaluator per variant; anything
/// the event does not carry fails the specified check (fail-closed on
/// specified fields only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum TriggerCondition {
    SeverityEquals(Severity),
    MinConfidence(u8),
}

impl TriggerCondition {
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        match self {
            Self::SeverityEquals(expected) => event.severity == Some(*expected),
            Self::MinConfidence(min) => event.confidence.map(|c| c >= *min).unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowAction {
    NotifyChatops,
    NotifyEmail,
    OpenIssue,
    AutoRemediate,
}

/// A registered automation rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityWorkflow {
    pub id: String,
    pub trigger_type: TriggerType,
    /// Conjunctive; empty means the trigger type alone matches
    #[serde(default)]
    pub conditions: Vec<TriggerCondition>,
    /// Executed in declared order
    pub actions: Vec<WorkflowAction>,
    pub is_active: bool,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub execution_count: u64,
}

impl SecurityWorkflow {
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        self.trigger_type == event.trigger_type
            && self.conditions.iter().all(|c| c.matches(event))
    }
}

// ─── Execution ──────────────────────────────────────────────────────

/// Runs one workflow action. Implementations live at the edges
/// (notifiers, issue trackers, auto-remediation) and may fail freely;
/// the engine isolates each failure.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn run(&self, action: &WorkflowAction, event: &TriggerEvent) -> DepwatchResult<()>;
}

/// Matches events to workflows and drives their action chains
pub struct WorkflowEngine {
    runner: Arc<dyn ActionRunner>,
}

impl WorkflowEngine {
    pub fn new(runner: Arc<dyn ActionRunner>) -> Self {
        Self { runner }
    }

    /// Dispatch one event: load active workflows for its trigger type,
    /// run every matching workflow's actions in order, then update the
    /// workflow's execution stats. Returns the ids of executed
    /// workflows.
    pub async fn handle_event(
        &self,
        store: &dyn ScanStore,
        event: &TriggerEvent,
    ) -> Vec<String> {
        let workflows = match store.workflows_for(event.trigger_type) {
            Ok(w) => w,
            Err(e) => {
                tracing::error!(trigger = %event.trigger_type, error = %e, "failed to load workflows");
                return Vec::new();
            }
        };

        let mut executed = Vec::new();
        for workflow in workflows.iter().filter(|w| w.is_active) {
            if !workflow.matches(event) {
                continue;
            }

            tracing::info!(
                workflow = %workflow.id,
                trigger = %event.trigger_type,
                actions = workflow.actions.len(),
                "executing workflow"
            );

            for action in &workflow.actions {
                if let Err(e) = self.runner.run(action, event).await {
                    tracing::warn!(
                        workflow = %workflow.id,
                        action = ?action,
                        error = %e,
                        "action failed, continuing with remaining actions"
                    );
                }
            }

            if let Err(e) = store.record_workflow_run(&workflow.id, Utc::now()) {
                tracing::warn!(workflow = %workflow.id, error = %e, "failed to update workflow stats");
            }
            executed.push(workflow.id.clone());
        }

        executed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::DepwatchError;
    use std::sync::Mutex;

    struct RecordingRunner {
        runs: Mutex<Vec<WorkflowAction>>,
        fail_on: Option<WorkflowAction>,
    }

    impl RecordingRunner {
        fn new(fail_on: Option<WorkflowAction>) -> Self {
            Self {
                runs: Mutex::new(Vec::new()),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl ActionRunner for RecordingRunner {
        async fn run(&self, action: &WorkflowAction, _event: &TriggerEvent) -> DepwatchResult<()> {
            self.runs.lock().unwrap().push(*action);
            if self.fail_on == Some(*action) {
                Err(DepwatchError::Workflow("action failed".into()))
            } else {
                Ok(())
            }
        }
    }

    fn workflow(
        trigger: TriggerType,
        conditions: Vec<TriggerCondition>,
        actions: Vec<WorkflowAction>,
    ) -> SecurityWorkflow {
        SecurityWorkflow {
            id: "wf-1".into(),
            trigger_type: trigger,
            conditions,
            actions,
            is_active: true,
            last_executed_at: None,
            execution_count: 0,
        }
    }

    fn event(severity: Option<Severity>, confidence: Option<u8>) -> TriggerEvent {
        TriggerEvent {
            trigger_type: TriggerType::VulnerabilityDetected,
            repository_id: "repo-1".into(),
            severity,
            confidence,
            summary: "test".into(),
        }
    }

    #[test]
    fn unspecified_conditions_pass_by_default() {
        let wf = workflow(TriggerType::VulnerabilityDetected, vec![], vec![]);
        assert!(wf.matches(&event(None, None)));
    }

    #[test]
    fn severity_condition_is_exact_match() {
        let wf = workflow(
            TriggerType::VulnerabilityDetected,
            vec![TriggerCondition::SeverityEquals(Severity::Critical)],
            vec![],
        );
        assert!(wf.matches(&event(Some(Severity::Critical), None)));
        assert!(!wf.matches(&event(Some(Severity::High), None)));
        // Specified condition fails closed when the event lacks the field
        assert!(!wf.matches(&event(None, None)));
    }

    #[test]
    fn confidence_condition_is_a_floor() {
        let wf = workflow(
            TriggerType::VulnerabilityDetected,
            vec![TriggerCondition::MinConfidence(80)],
            vec![],
        );
        assert!(wf.matches(&event(None, Some(90))));
        assert!(wf.matches(&event(None, Some(80))));
        assert!(!wf.matches(&event(None, Some(79))));
        assert!(!wf.matches(&event(None, None)));
    }

    #[test]
    fn conditions_are_conjunctive() {
        let wf = workflow(
            TriggerType::VulnerabilityDetected,
            vec![
                TriggerCondition::SeverityEquals(Severity::Critical),
                TriggerCondition::MinConfidence(80),
            ],
            vec![],
        );
        assert!(wf.matches(&event(Some(Severity::Critical), Some(85))));
        assert!(!wf.matches(&event(Some(Severity::Critical), Some(50))));
        assert!(!wf.matches(&event(Some(Severity::High), Some(85))));
    }

    #[test]
    fn trigger_type_must_match() {
        let wf = workflow(TriggerType::LicenseViolation, vec![], vec![]);
        assert!(!wf.matches(&event(None, None)));
    }

    #[tokio::test]
    async fn failing_action_does_not_block_the_rest() {
        let store = MemoryStore::new();
        store
            .register_workflow(workflow(
                TriggerType::VulnerabilityDetected,
                vec![],
                vec![
                    WorkflowAction::NotifyChatops,
                    WorkflowAction::OpenIssue,
                    WorkflowAction::NotifyEmail,
                ],
            ))
            .unwrap();

        let runner = Arc::new(RecordingRunner::new(Some(WorkflowAction::OpenIssue)));
        let engine = WorkflowEngine::new(runner.clone());

        let executed = engine.handle_event(&store, &event(None, None)).await;
        assert_eq!(executed.len(), 1);
        // All three actions were attempted, in order
        assert_eq!(
            *runner.runs.lock().unwrap(),
            vec![
                WorkflowAction::NotifyChatops,
                WorkflowAction::OpenIssue,
                WorkflowAction::NotifyEmail,
            ]
        );
    }

    #[tokio::test]
    async fn execution_updates_workflow_stats() {
        let store = MemoryStore::new();
        store
            .register_workflow(workflow(
                TriggerType::VulnerabilityDetected,
                vec![],
                vec![WorkflowAction::NotifyChatops],
            ))
            .unwrap();

        let engine = WorkflowEngine::new(Arc::new(RecordingRunner::new(None)));
        engine.handle_event(&store, &event(None, None)).await;
        engine.handle_event(&store, &event(None, None)).await;

        let workflows = store
            .workflows_for(TriggerType::VulnerabilityDetected)
            .unwrap();
        assert_eq!(workflows[0].execution_count, 2);
        assert!(workflows[0].last_executed_at.is_some());
    }

    #[tokio::test]
    async fn inactive_workflow_never_runs() {
        let store = MemoryStore::new();
        let mut wf = workflow(
            TriggerType::VulnerabilityDetected,
            vec![],
            vec![WorkflowAction::NotifyChatops],
        );
        wf.is_active = false;
        store.register_workflow(wf).unwrap();

        let runner = Arc::new(RecordingRunner::new(None));
        let engine = WorkflowEngine::new(runner.clone());
        let executed = engine.handle_event(&store, &event(None, None)).await;
        assert!(executed.is_empty());
        assert!(runner.runs.lock().unwrap().is_empty());
    }
}
