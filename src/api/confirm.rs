// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use crate::{
    error::ApiError,
    models::{ConfirmRequestBody, RequestResult, RequestStatusView},
    state::AppState,
};

/// Attach the user's signature to a composed request and queue it for
/// publishing.
#[utoipa::path(
    post,
    path = "/confirm",
    request_body = ConfirmRequestBody,
    tag = "Requests",
    responses(
        (status = 200, body = RequestResult),
        (status = 400, description = "Request expired, already confirmed or would fail")
    )
)]
pub async fn confirm_request(
    State(state): State<AppState>,
    body: Result<Json<ConfirmRequestBody>, JsonRejection>,
) -> Result<Json<RequestResult>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let request = state
        .confirmation
        .confirm(&body.request_id, &body.signature_standard, &body.signature)
        .await?;

    Ok(Json(RequestResult {
        result: RequestStatusView::from(&request),
    }))
}
