//! Gate HTTP surface - the contract consumed by pipeline integrations
//!
//! `POST /gate/evaluate` with `{repository, branch, commitSha,
//! environment}` answers 200 when the gate passes and 422 when
//! deployment is blocked, body per the gate contract. A repository with
//! no recorded scan fails closed.

use super::{evaluate_gate, GateDecision, GateSummary, GateThresholds};
use crate::store::ScanStore;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared state for the gate router
#[derive(Clone)]
pub struct GateState {
    pub store: Arc<dyn ScanStore>,
    pub thresholds: GateThresholds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateRequest {
    pub repository: String,
    pub branch: String,
    pub commit_sha: String,
    pub environment: String,
}

/// Create the gate API router
pub fn create_router(state: GateState) -> Router {
    Router::new()
        .route("/gate/evaluate", post(evaluate))
        .with_state(state)
}

async fn evaluate(
    State(state): State<GateState>,
    Json(request): Json<GateRequest>,
) -> (StatusCode, Json<GateDecision>) {
    tracing::info!(
        repository = %request.repository,
        branch = %request.branch,
        environment = %request.environment,
        "gate evaluation requested"
    );

    let summary = match state.store.latest_scan_summary(&request.repository) {
        Ok(Some(summary)) => summary,
        Ok(None) => {
            // Fail closed: no scan on record means nothing to vouch for
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(no_scan_decision(&request.repository)),
            );
        }
        Err(e) => {
            tracing::error!(repository = %request.repository, error = %e, "store read failed");
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(no_scan_decision(&request.repository)),
            );
        }
    };

    let decision = evaluate_gate(&summary, &state.thresholds);
    let status = StatusCode::from_u16(decision.http_status())
        .unwrap_or(StatusCode::UNPROCESSABLE_ENTITY);
    (status, Json(decision))
}

fn no_scan_decision(repository: &str) -> GateDecision {
    GateDecision {
        gate_passed: false,
        deployment_blocked: true,
        summary: GateSummary {
            critical_count: 0,
            high_count: 0,
            medium_count: 0,
            low_count: 0,
            license_violations: 0,
            policy_violations: 0,
        },
        details: vec![format!("no completed scan recorded for '{}'", repository)],
        recommendations: vec!["Run a scan before requesting a gate evaluation".to_string()],
        next_steps: vec!["Trigger a scan and retry".to_string()],
    }
}
