// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ERC-20 token introspection.

use alloy::{contract::Error as CallError, primitives::Address, providers::Provider, sol};

use super::client::LedgerError;
use super::types::TokenMetadata;

sol! {
    #[sol(rpc)]
    interface IERC20Metadata {
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
    }
}

/// Symbol reported for tokens without a readable `symbol()`.
pub const UNKNOWN_SYMBOL: &str = "???";

/// Read `decimals()` and `symbol()` of a token.
///
/// Decimals are required for fee arithmetic. A missing symbol only affects
/// display, so it falls back to [`UNKNOWN_SYMBOL`] unless the endpoint
/// itself failed.
pub async fn read_constants<P: Provider>(
    provider: P,
    token: Address,
) -> Result<TokenMetadata, LedgerError> {
    let contract = IERC20Metadata::new(token, provider);
    let decimals = contract.decimals().call().await.map_err(call_error)?;

    let symbol = match contract.symbol().call().await {
        Ok(symbol) => symbol,
        Err(e @ CallError::TransportError(_)) => return Err(call_error(e)),
        Err(e) => {
            tracing::debug!(token = %token, error = %e, "Token has no readable symbol");
            UNKNOWN_SYMBOL.to_string()
        }
    };

    Ok(TokenMetadata { symbol, decimals })
}

/// Transport failures stay retryable on the next endpoint.
fn call_error(error: CallError) -> LedgerError {
    match error {
        CallError::TransportError(e) => LedgerError::RpcError(e.to_string()),
        other => LedgerError::ContractError(other.to_string()),
    }
}
