// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Liveness and readiness checks.
//!
//! Readiness requires the request store to be readable and at least one RPC
//! endpoint to answer; the relay can neither compose nor publish otherwise.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Outcome of a single dependency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Unavailable,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DependencyChecks {
    pub storage: CheckStatus,
    pub ledger: CheckStatus,
    /// Latest block seen, when the ledger answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// Contracts loaded from the manifest
    pub contracts: usize,
}

/// Response of `/health` and `/health/ready`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessReport {
    /// "ok" or "degraded"
    pub status: String,
    pub checks: DependencyChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LivenessReport {
    pub status: String,
}

async fn check_dependencies(state: &AppState) -> DependencyChecks {
    let storage = match state.db.get("health-check") {
        Ok(_) => CheckStatus::Ok,
        Err(e) => {
            tracing::warn!(error = %e, "Request store check failed");
            CheckStatus::Unavailable
        }
    };

    let (ledger, block_number) = match state.ledger.block_number().await {
        Ok(block) => (CheckStatus::Ok, Some(block)),
        Err(e) => {
            tracing::warn!(error = %e, "Ledger check failed");
            (CheckStatus::Unavailable, None)
        }
    };

    DependencyChecks {
        storage,
        ledger,
        block_number,
        contracts: state.registry.entries().count(),
    }
}

/// Dependency report; 503 when any dependency is down.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "All dependencies reachable", body = ReadinessReport),
        (status = 503, description = "A dependency is down", body = ReadinessReport)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadinessReport>) {
    let checks = check_dependencies(&state).await;
    let ready = checks.storage == CheckStatus::Ok && checks.ledger == CheckStatus::Ok;

    let (code, status) = if ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        code,
        Json(ReadinessReport {
            status: status.to_string(),
            checks,
        }),
    )
}

/// Always 200 while the process serves requests.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses((status = 200, body = LivenessReport))
)]
pub async fn liveness() -> Json<LivenessReport> {
    Json(LivenessReport {
        status: "ok".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Ready to relay", body = ReadinessReport),
        (status = 503, description = "Not ready", body = ReadinessReport)
    )
)]
pub async fn readiness(state: State<AppState>) -> (StatusCode, Json<ReadinessReport>) {
    health(state).await
}
