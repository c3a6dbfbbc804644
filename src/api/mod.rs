// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    manifest::{DataToSign, FeeItem, SignatureOption, SignatureStandard, TypedDataField},
    models::{
        ArgumentDescriptorDto, ComposedRequest, ConfirmRequestBody, ContractDescriptor,
        CreateRequestBody, CreateRequestResponse, DiscoveryResponse, FunctionDescriptor,
        RequestResult, RequestStatusView, TokenConstants,
    },
    state::AppState,
    storage::RequestStatus,
};

pub mod confirm;
pub mod health;
pub mod index;
pub mod request;
pub mod status;

/// Build the HTTP router.
///
/// `allowed_origins` restricts CORS; an empty list allows any origin.
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    let routes = Router::new()
        .route("/", get(index::discovery))
        .route("/request", post(request::create_request))
        .route("/confirm", post(confirm::confirm_request))
        .route("/status/{request_id}", get(status::request_status))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors_layer(allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

#[derive(OpenApi)]
#[openapi(
    paths(
        index::discovery,
        request::create_request,
        confirm::confirm_request,
        status::request_status,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            DiscoveryResponse,
            ContractDescriptor,
            FunctionDescriptor,
            ArgumentDescriptorDto,
            TokenConstants,
            CreateRequestBody,
            CreateRequestResponse,
            ComposedRequest,
            ConfirmRequestBody,
            RequestResult,
            RequestStatusView,
            RequestStatus,
            SignatureOption,
            SignatureStandard,
            DataToSign,
            TypedDataField,
            FeeItem,
            health::ReadinessReport,
            health::DependencyChecks,
            health::CheckStatus,
            health::LivenessReport
        )
    ),
    tags(
        (name = "Discovery", description = "Network and supported contracts"),
        (name = "Requests", description = "Composing, confirming and tracking delegated calls"),
        (name = "Health", description = "Liveness and readiness checks")
    )
)]
struct ApiDoc;
