// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! This module defines the request and response data structures used by
//! the REST API. All types derive `Serialize` and `ToSchema` for JSON
//! handling and OpenAPI documentation; request bodies also derive
//! `Deserialize`.
//!
//! Field names are camelCase on the wire.
//!
//! ## Model Categories
//!
//! - **Discovery**: network identity and the delegatable contracts
//! - **Requests**: composing a delegated call
//! - **Confirmation**: submitting the user's signature
//! - **Status**: progress of a request

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::manifest::{FeeItem, SignatureOption};
use crate::storage::{DelegateRequest, RequestStatus};

// =============================================================================
// Discovery Models
// =============================================================================

/// Name and type of a function argument.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ArgumentDescriptorDto {
    pub name: String,
    /// Solidity type, e.g. `uint256`
    #[serde(rename = "type")]
    pub ty: String,
}

/// ERC-20 constants of a token contract.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct TokenConstants {
    pub symbol: String,
    pub decimals: u8,
}

/// A function that can be called through the relay.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDescriptor {
    /// Function the user asks for, e.g. `transfer`
    pub name: String,
    pub arguments: Vec<ArgumentDescriptorDto>,
    /// Function the relay calls on the user's behalf
    pub delegated_function: String,
}

/// A contract served by the relay.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ContractDescriptor {
    /// Lowercase contract address
    pub address: String,
    /// Implemented standards, e.g. `ERC20`
    pub implements: Vec<String>,
    /// Token constants; absent when they could not be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constants: Option<TokenConstants>,
    pub functions: Vec<FunctionDescriptor>,
}

/// Response of `GET /`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DiscoveryResponse {
    #[serde(rename = "service-name")]
    pub service_name: String,
    pub version: String,
    #[serde(rename = "networkChainId")]
    pub network_chain_id: u64,
    #[serde(rename = "networkName")]
    pub network_name: String,
    /// Address that publishes delegated calls
    #[serde(rename = "delegateAddress")]
    pub delegate_address: String,
    pub contracts: Vec<ContractDescriptor>,
}

// =============================================================================
// Request Models
// =============================================================================

/// Body of `POST /request`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestBody {
    /// Contract the call targets.
    pub contract_address: String,
    /// Function to call, e.g. `transfer`.
    pub function_name: String,
    /// Arguments as strings, in ABI order.
    #[serde(default)]
    pub function_arguments: Vec<String>,
    /// Address of the user who will sign.
    pub from: String,
    /// Gas limit the user agrees to pay for; the rule decides when absent.
    #[serde(default)]
    pub gas_limit: Option<u64>,
}

/// A composed request, ready to be signed.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComposedRequest {
    pub id: String,
    /// Fee in the token's smallest unit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<String>,
    /// Itemized fee
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fees: Option<Vec<FeeItem>>,
    /// Payloads the user may sign, one per standard
    pub signature_options: Vec<SignatureOption>,
    /// Deadline for confirming the request
    pub expires_at: DateTime<Utc>,
}

impl From<&DelegateRequest> for ComposedRequest {
    fn from(request: &DelegateRequest) -> Self {
        Self {
            id: request.id.clone(),
            fee: request.fee.clone(),
            fees: request.fees.clone(),
            signature_options: request.signature_options.clone(),
            expires_at: request.request_expires_at,
        }
    }
}

/// Response of `POST /request`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreateRequestResponse {
    pub request: ComposedRequest,
}

// =============================================================================
// Confirmation Models
// =============================================================================

/// Body of `POST /confirm`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequestBody {
    pub request_id: String,
    /// `eth_signTypedData` or `eth_personalSign`
    pub signature_standard: String,
    /// 0x-prefixed hex signature
    pub signature: String,
}

// =============================================================================
// Status Models
// =============================================================================

/// Public view of a request's progress.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatusView {
    pub id: String,
    pub status: RequestStatus,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    /// Why publishing failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&DelegateRequest> for RequestStatusView {
    fn from(request: &DelegateRequest) -> Self {
        Self {
            id: request.id.clone(),
            status: request.status,
            expires_at: request.request_expires_at,
            nonce: request.nonce,
            transaction_hash: request.transaction_hash.clone(),
            reason: request.reason.clone(),
        }
    }
}

/// Response of `POST /confirm` and `GET /status/{requestId}`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RequestResult {
    pub result: RequestStatusView,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_request;

    #[test]
    fn create_body_defaults_optional_fields() {
        let body: CreateRequestBody = serde_json::from_value(serde_json::json!({
            "contractAddress": "0xaa",
            "functionName": "transfer",
            "from": "0xbb"
        }))
        .unwrap();
        assert!(body.function_arguments.is_empty());
        assert!(body.gas_limit.is_none());
    }

    #[test]
    fn composed_request_uses_request_expiry() {
        let request = sample_request("req-1", "0x1111111111111111111111111111111111111111");
        let composed = ComposedRequest::from(&request);
        let json = serde_json::to_value(&composed).unwrap();

        assert_eq!(json["id"], "req-1");
        assert!(json.get("fees").is_none());
        assert!(json["signatureOptions"].is_array());
        assert_eq!(composed.expires_at, request.request_expires_at);
    }

    #[test]
    fn status_view_omits_unset_fields() {
        let request = sample_request("req-2", "0x1111111111111111111111111111111111111111");
        let json = serde_json::to_value(RequestStatusView::from(&request)).unwrap();
        assert_eq!(json["status"], "new");
        assert!(json.get("transactionHash").is_none());
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn discovery_uses_legacy_keys() {
        let json = serde_json::to_value(DiscoveryResponse {
            service_name: "relay".to_string(),
            version: "1.0.0".to_string(),
            network_chain_id: 1,
            network_name: "mainnet".to_string(),
            delegate_address: "0xde".to_string(),
            contracts: vec![],
        })
        .unwrap();
        assert_eq!(json["service-name"], "relay");
        assert_eq!(json["networkChainId"], 1);
    }
}
