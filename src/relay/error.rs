// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relay error taxonomy.

use crate::blockchain::LedgerError;
use crate::manifest::{ManifestError, RuleError};
use crate::storage::RequestDbError;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    // =========================================================================
    // Composition
    // =========================================================================
    #[error("This back end does not support delegated transactions for {0}")]
    UnsupportedContract(String),

    #[error(
        "Function `{function}` does not support delegation in contract {contract}. \
         Available functions: '{}'",
        .available.join("', '")
    )]
    UnknownFunction {
        contract: String,
        function: String,
        available: Vec<String>,
    },

    #[error("{0}")]
    InvalidManifest(String),

    #[error("Invalid `functionArguments` provided: {0}")]
    InvalidArguments(String),

    #[error("Invalid parameter `{field}`={value} given, must be an address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("Invalid `gasLimit`={0} provided")]
    InvalidGasLimit(u64),

    #[error("Error at manifest request handler: {0}")]
    ManifestExecution(String),

    // =========================================================================
    // Confirmation
    // =========================================================================
    #[error("Request {0} not found or expired")]
    NotFoundOrExpired(String),

    #[error("Request {0} is already confirmed")]
    AlreadyConfirmed(String),

    #[error("Signature standard {standard} is not supported by request {id}")]
    UnsupportedSignatureStandard { id: String, standard: String },

    #[error("Request {id} has a broken context: {reason}")]
    BrokenContext { id: String, reason: String },

    #[error("Transaction would fail: {0}")]
    EstimationFailed(String),

    #[error("Gas estimate {estimate} exceeds the agreed gas limit {limit}")]
    GasLimitExceeded { estimate: u64, limit: u64 },

    #[error("Signer {signer} already has {pending} pending transactions (limit {limit})")]
    TooManyPendingTransactions {
        signer: String,
        pending: usize,
        limit: usize,
    },

    #[error("Provided 'signature'={0} must be a HEX string ('0x...')")]
    InvalidSignature(String),

    // =========================================================================
    // Infrastructure
    // =========================================================================
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(#[from] RequestDbError),
}

impl RelayError {
    /// Whether the caller can fix the request; infrastructure failures are not.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, RelayError::Ledger(_) | RelayError::Storage(_))
    }
}

impl From<ManifestError> for RelayError {
    fn from(error: ManifestError) -> Self {
        match error {
            ManifestError::UnsupportedContract(address) => RelayError::UnsupportedContract(address),
            other => RelayError::InvalidManifest(other.to_string()),
        }
    }
}

impl From<RuleError> for RelayError {
    fn from(error: RuleError) -> Self {
        match error {
            RuleError::Abi(e) => RelayError::InvalidArguments(e.to_string()),
            other => RelayError::ManifestExecution(other.to_string()),
        }
    }
}
