// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::ApiError,
    models::{RequestResult, RequestStatusView},
    state::AppState,
};

#[utoipa::path(
    get,
    path = "/status/{request_id}",
    params(
        ("request_id" = String, Path, description = "Identifier returned by `POST /request`")
    ),
    tag = "Requests",
    responses(
        (status = 200, body = RequestResult),
        (status = 404, description = "Unknown request")
    )
)]
pub async fn request_status(
    Path(request_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RequestResult>, ApiError> {
    let request = state.db.get(&request_id).map_err(|e| {
        tracing::error!(request_id = %request_id, error = %e, "Failed to read request");
        ApiError::internal()
    })?;

    match request {
        Some(request) => Ok(Json(RequestResult {
            result: RequestStatusView::from(&request),
        })),
        None => Err(ApiError::not_found(format!(
            "Request with requestId='{request_id}' not found"
        ))),
    }
}
