// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use crate::{
    error::ApiError,
    models::{ComposedRequest, CreateRequestBody, CreateRequestResponse},
    relay::ComposeInput,
    state::AppState,
};

/// Compose a delegated call and return what the user has to sign.
#[utoipa::path(
    post,
    path = "/request",
    request_body = CreateRequestBody,
    tag = "Requests",
    responses(
        (status = 200, body = CreateRequestResponse),
        (status = 400, description = "Invalid request or unsupported contract")
    )
)]
pub async fn create_request(
    State(state): State<AppState>,
    body: Result<Json<CreateRequestBody>, JsonRejection>,
) -> Result<Json<CreateRequestResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let request = state
        .composer
        .compose(ComposeInput {
            contract_address: body.contract_address,
            function_name: body.function_name,
            function_arguments: body.function_arguments,
            from: body.from,
            gas_limit: body.gas_limit,
        })
        .await?;

    Ok(Json(CreateRequestResponse {
        request: ComposedRequest::from(&request),
    }))
}
