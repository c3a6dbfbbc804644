// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing context and the payloads derived from it.
//!
//! A [`RequestContext`] is built once at composition time and persisted
//! with the request. Everything the user signs and everything forwarded
//! on-chain is derived from it, so it is never mutated after the request
//! is stored.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// =============================================================================
// Signature standards
// =============================================================================

/// Message-signing scheme offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum SignatureStandard {
    /// Structured typed data (legacy array form).
    #[serde(rename = "eth_signTypedData")]
    TypedData,
    /// Hash signed as a personal message.
    #[serde(rename = "eth_personalSign")]
    PersonalSign,
}

impl SignatureStandard {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureStandard::TypedData => "eth_signTypedData",
            SignatureStandard::PersonalSign => "eth_personalSign",
        }
    }

    /// Value of the `sigStd` argument the forwarding contracts expect.
    pub fn contract_code(&self) -> u8 {
        match self {
            SignatureStandard::TypedData => 0,
            SignatureStandard::PersonalSign => 1,
        }
    }
}

impl fmt::Display for SignatureStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureStandard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eth_signTypedData" => Ok(SignatureStandard::TypedData),
            "eth_personalSign" => Ok(SignatureStandard::PersonalSign),
            other => Err(format!("Unknown signature standard: {other}")),
        }
    }
}

// =============================================================================
// Signature payloads
// =============================================================================

/// One field of a typed-data message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TypedDataField {
    #[serde(rename = "type")]
    pub ty: String,
    pub name: String,
    pub value: String,
}

impl TypedDataField {
    pub fn new(ty: &str, name: &str, value: impl Into<String>) -> Self {
        Self {
            ty: ty.to_string(),
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// What the user is asked to sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum DataToSign {
    TypedData(Vec<TypedDataField>),
    /// 0x-prefixed 32-byte hash
    Hash(String),
}

/// A signing option offered for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignatureOption {
    pub standard: SignatureStandard,
    pub data_to_sign: DataToSign,
}

// =============================================================================
// Fees
// =============================================================================

/// One line of an itemized fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FeeItem {
    /// Token contract the fee is paid in
    pub address: String,
    pub decimals: u8,
    pub symbol: String,
    /// Amount in the token's smallest unit
    pub value: String,
}

/// Fee quoted to the user, either a single amount or itemized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeeQuote {
    Amount(String),
    Itemized(Vec<FeeItem>),
}

// =============================================================================
// Context
// =============================================================================

/// Contract the request targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractInfo {
    /// Lowercase 0x-prefixed address
    pub address: String,
    #[serde(default)]
    pub implements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

/// Snapshot of everything a delegation rule needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub contract: ContractInfo,
    pub function_name: String,
    pub function_arguments: Vec<String>,
    /// End-user address (lowercase)
    pub signer: String,
    /// Delegate gas price in wei at composition time
    pub gas_price: String,
    /// Native coin price from the price oracle
    pub price_oracle_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_id: Option<String>,
    /// Signature deadline, unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculated_token_fee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_recipient: Option<String>,
}

/// Fields a delegation rule may set on top of the base context.
///
/// `None` leaves the base value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextFields {
    pub gas_limit: Option<u64>,
    pub signature_id: Option<String>,
    pub expires_at: Option<i64>,
    pub calculated_token_fee: Option<String>,
    pub fee_recipient: Option<String>,
}

impl RequestContext {
    pub fn merge(&mut self, fields: ContextFields) {
        if let Some(gas_limit) = fields.gas_limit {
            self.gas_limit = Some(gas_limit);
        }
        if let Some(signature_id) = fields.signature_id {
            self.signature_id = Some(signature_id);
        }
        if let Some(expires_at) = fields.expires_at {
            self.expires_at = Some(expires_at);
        }
        if let Some(fee) = fields.calculated_token_fee {
            self.calculated_token_fee = Some(fee);
        }
        if let Some(recipient) = fields.fee_recipient {
            self.fee_recipient = Some(recipient);
        }
    }
}
