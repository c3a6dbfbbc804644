// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};

use crate::{models::DiscoveryResponse, state::AppState};

/// Network identity and the contracts this relay can delegate calls for.
#[utoipa::path(
    get,
    path = "/",
    tag = "Discovery",
    responses((status = 200, body = DiscoveryResponse))
)]
pub async fn discovery(State(state): State<AppState>) -> Json<DiscoveryResponse> {
    let contracts = state
        .catalog
        .describe(&state.registry, state.ledger.as_ref())
        .await;

    Json(DiscoveryResponse {
        service_name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        network_chain_id: state.ledger.chain_id(),
        network_name: state.network_name.clone(),
        delegate_address: state.ledger.delegate_address().to_checksum(None),
        contracts,
    })
}
