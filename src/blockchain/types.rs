// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain types and constants.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// EVM network the relay publishes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: String,
    /// Chain ID
    pub chain_id: u64,
    /// RPC endpoint URLs, tried in order
    pub rpc_urls: Vec<String>,
}

/// Known network presets: (name, chain id, default public RPC).
const PRESETS: &[(&str, u64, &str)] = &[
    ("mainnet", 1, "https://ethereum-rpc.publicnode.com"),
    ("sepolia", 11_155_111, "https://ethereum-sepolia-rpc.publicnode.com"),
    ("avalanche", 43_114, "https://api.avax.network/ext/bc/C/rpc"),
    ("fuji", 43_113, "https://api.avax-test.network/ext/bc/C/rpc"),
];

impl NetworkConfig {
    /// Look up a known network by name (case-insensitive).
    pub fn preset(name: &str) -> Option<Self> {
        let wanted = name.trim().to_ascii_lowercase();
        PRESETS
            .iter()
            .find(|(preset, _, _)| *preset == wanted)
            .map(|(preset, chain_id, rpc)| Self {
                name: (*preset).to_string(),
                chain_id: *chain_id,
                rpc_urls: vec![(*rpc).to_string()],
            })
    }
}

/// A read-only call or gas estimation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    pub data: Vec<u8>,
}

/// Fully specified transaction parameters.
///
/// Persisted at publish time so the exact same transaction can be signed
/// and broadcast again. Signing is deterministic, so identical parameters
/// yield an identical transaction hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionParams {
    pub chain_id: u64,
    /// Calldata, 0x-prefixed hex
    pub data: String,
    pub gas_limit: u64,
    /// Legacy gas price in wei (decimal string)
    pub gas_price: String,
    pub nonce: u64,
    /// Destination contract address
    pub to: String,
    /// Value in wei (decimal string)
    pub value: String,
}

/// Normalized transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    /// Transaction hash
    pub transaction_hash: String,
    /// Block number where transaction was included
    pub block_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    /// Gas actually used
    pub gas_used: u64,
    pub cumulative_gas_used: u64,
    /// Effective gas price in wei (decimal string)
    pub effective_gas_price: String,
    /// Whether the transaction was successful
    pub success: bool,
    /// Blocks on top of (and including) the inclusion block
    pub confirmations: u64,
}

/// ERC-20 token constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub symbol: String,
    pub decimals: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_lookup_is_case_insensitive() {
        let fuji = NetworkConfig::preset("Fuji").unwrap();
        assert_eq!(fuji.chain_id, 43_113);
        assert_eq!(fuji.rpc_urls.len(), 1);
        assert!(NetworkConfig::preset("kovan").is_none());
    }

    #[test]
    fn transaction_params_serialize_camel_case() {
        let params = TransactionParams {
            chain_id: 1,
            data: "0x".to_string(),
            gas_limit: 21_000,
            gas_price: "1000".to_string(),
            nonce: 7,
            to: "0x1111111111111111111111111111111111111111".to_string(),
            value: "0".to_string(),
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["chainId"], 1);
        assert_eq!(json["gasLimit"], 21_000);
        assert_eq!(json["gasPrice"], "1000");
    }
}
