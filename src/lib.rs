//! # depwatch — Continuous Dependency Risk Monitor
//!
//! Watches externally hosted source repositories for two risk classes in
//! their declared dependencies: known vulnerabilities and license changes.
//! Findings become prioritized, policy-aware alerts with remediation
//! guidance, and feed automation workflows and deployment gates.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ScanEngine                            │
//! │  ┌─────────┐  ┌──────────┐  ┌───────────────────────────┐   │
//! │  │ Fetcher │→ │ Manifest │→ │ per-dependency analysis   │   │
//! │  │ (git)   │  │ Parser   │  │ Registry │ Oracle │ Usage │   │
//! │  └─────────┘  └──────────┘  └─────────────┬─────────────┘   │
//! │                                           │                 │
//! │  ┌────────────────────────────────────────▼──────────────┐  │
//! │  │ Risk Score → Alerts → Remediation → Policy → Workflow │  │
//! │  │       Notification channels (best-effort, per-ch)     │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!                  Gate evaluator (pure) ← pipeline integrations
//! ```
//!
//! ## Capabilities
//!
//! - **Shallow Repository Snapshots**: depth-1 single-branch clones into
//!   RAII workspaces, cleaned up on every exit path
//! - **Best-Effort Resolution**: exact version pins honored, ranges fall
//!   back to the registry's latest tag
//! - **Vulnerability Cross-Reference**: OSV-style oracle queries with
//!   CVSS-threshold severity mapping
//! - **Usage Evidence**: import/require pattern matching with per-line,
//!   SHA-256 anchored evidence rows
//! - **Dual-Path Risk Scoring**: deterministic baseline plus an optional
//!   threat-context path that degrades cleanly
//! - **Policy Compliance**: license allow/block lists, severity ceilings,
//!   compliance scoring with report snapshots
//! - **Workflow Automation**: trigger/condition/action rules reacting to
//!   scan and policy events
//! - **Deployment Gates**: pure pass/block evaluation exposed over the
//!   gate HTTP contract

pub mod alert;
pub mod engine;
pub mod fetch;
pub mod gate;
pub mod manifest;
pub mod oracle;
pub mod policy;
pub mod registry;
pub mod remediation;
pub mod risk;
pub mod store;
pub mod usage;
pub mod workflow;

// Re-exports for convenience
pub use alert::{Alert, AlertManager, AlertStatus, AlertType, NotificationChannel, Severity};
pub use engine::{ScanEngine, ScanEngineBuilder, ScanOutcome, ScanScheduler};
pub use fetch::{Repository, SourceFetcher, Workspace};
pub use gate::{evaluate_gate, GateDecision, GateThresholds, ScanSummary};
pub use oracle::{OsvClient, VulnOracle, Vulnerability};
pub use policy::{ComplianceReport, PolicyEngine, SecurityPolicy};
pub use registry::{NpmRegistry, PackageMetadata, Registry};
pub use remediation::{FixType, RemediationAdvisor, RemediationSuggestion};
pub use store::{DependencyRecord, MemoryStore, ScanStore};
pub use usage::{DependencyUsage, UsageAnalyzer, UsageEvidence};
pub use workflow::{SecurityWorkflow, TriggerEvent, TriggerType, WorkflowEngine};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DepwatchError {
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Usage analysis error: {0}")]
    Usage(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Policy error: {0}")]
    Policy(String),

    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type DepwatchResult<T> = Result<T, DepwatchError>;
