// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Contract metadata.
//!
//! Token constants never change, so they are read from the chain once per
//! contract and kept for the lifetime of the process. A failed read is not
//! cached and is retried on the next lookup.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;

use alloy::primitives::Address;

use crate::blockchain::{LedgerClient, LedgerError};
use crate::manifest::{ContractInfo, ManifestEntry, ManifestRegistry};
use crate::models::{ArgumentDescriptorDto, ContractDescriptor, FunctionDescriptor, TokenConstants};

const ERC20: &str = "ERC20";

/// Load-once cache of contract information.
#[derive(Default)]
pub struct ContractCatalog {
    cache: RwLock<HashMap<String, ContractInfo>>,
}

impl ContractCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address, standards and, for ERC-20 tokens, symbol and decimals.
    pub async fn contract_info(
        &self,
        entry: &ManifestEntry,
        ledger: &dyn LedgerClient,
    ) -> Result<ContractInfo, LedgerError> {
        if let Some(info) = self.cached(&entry.address) {
            return Ok(info);
        }

        let mut info = ContractInfo {
            address: entry.address.clone(),
            implements: entry.implements.clone(),
            decimals: None,
            symbol: None,
        };

        if entry.implements.iter().any(|s| s == ERC20) {
            let address = Address::from_str(&entry.address)
                .map_err(|e| LedgerError::InvalidAddress(e.to_string()))?;
            let token = ledger.token_metadata(address).await?;
            tracing::debug!(
                contract = %entry.address,
                symbol = %token.symbol,
                decimals = token.decimals,
                "Token constants loaded"
            );
            info.symbol = Some(token.symbol);
            info.decimals = Some(token.decimals);
        }

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(entry.address.clone(), info.clone());
        }
        Ok(info)
    }

    /// Discovery listing of every registered contract.
    ///
    /// Contracts whose constants cannot be read are still listed, without
    /// constants.
    pub async fn describe(
        &self,
        registry: &ManifestRegistry,
        ledger: &dyn LedgerClient,
    ) -> Vec<ContractDescriptor> {
        let mut contracts = Vec::new();
        for entry in registry.entries() {
            let constants = match self.contract_info(entry, ledger).await {
                Ok(info) => match (info.symbol, info.decimals) {
                    (Some(symbol), Some(decimals)) => Some(TokenConstants { symbol, decimals }),
                    _ => None,
                },
                Err(e) => {
                    tracing::warn!(contract = %entry.address, error = %e, "Failed to read token constants");
                    None
                }
            };

            let functions = entry
                .functions
                .iter()
                .map(|f| FunctionDescriptor {
                    name: f.function_name.clone(),
                    arguments: f
                        .strategy
                        .original()
                        .arguments()
                        .into_iter()
                        .map(|a| ArgumentDescriptorDto {
                            name: a.name,
                            ty: a.ty,
                        })
                        .collect(),
                    delegated_function: f.strategy.delegated().name().to_string(),
                })
                .collect();

            contracts.push(ContractDescriptor {
                address: entry.address.clone(),
                implements: entry.implements.clone(),
                constants,
                functions,
            });
        }
        contracts
    }

    fn cached(&self, address: &str) -> Option<ContractInfo> {
        self.cache.read().ok()?.get(address).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::mock::MockLedger;
    use serde_json::json;

    const TOKEN: &str = "0x82f4ded9cec9b5750fbff5c2185aee35afc16587";

    fn registry() -> ManifestRegistry {
        ManifestRegistry::from_json(json!({
            "contracts": [{
                "address": TOKEN,
                "delegatedFunctions": [
                    { "functionName": "transfer", "rule": "transferViaSignature" }
                ]
            }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn token_constants_are_read_once() {
        let ledger = MockLedger::new();
        ledger.set_token(Address::from_str(TOKEN).unwrap(), "DREAM", 6);
        let registry = registry();
        let entry = registry.resolve(TOKEN).unwrap();
        let catalog = ContractCatalog::new();

        let info = catalog.contract_info(entry, &ledger).await.unwrap();
        assert_eq!(info.symbol.as_deref(), Some("DREAM"));
        assert_eq!(info.decimals, Some(6));

        // served from cache even when the ledger stops answering
        ledger.fail_reads(true);
        let again = catalog.contract_info(entry, &ledger).await.unwrap();
        assert_eq!(again, info);
    }

    #[tokio::test]
    async fn failed_reads_are_not_cached() {
        let ledger = MockLedger::new();
        ledger.set_token(Address::from_str(TOKEN).unwrap(), "DREAM", 6);
        ledger.fail_reads(true);
        let registry = registry();
        let entry = registry.resolve(TOKEN).unwrap();
        let catalog = ContractCatalog::new();

        assert!(catalog.contract_info(entry, &ledger).await.is_err());
        ledger.fail_reads(false);
        assert!(catalog.contract_info(entry, &ledger).await.is_ok());
    }

    #[tokio::test]
    async fn describe_lists_functions_and_constants() {
        let ledger = MockLedger::new();
        ledger.set_token(Address::from_str(TOKEN).unwrap(), "DREAM", 6);
        let catalog = ContractCatalog::new();

        let contracts = catalog.describe(&registry(), &ledger).await;
        assert_eq!(contracts.len(), 1);
        let contract = &contracts[0];
        assert_eq!(contract.address, TOKEN);
        assert_eq!(contract.constants.as_ref().unwrap().symbol, "DREAM");
        assert_eq!(contract.functions[0].name, "transfer");
        assert_eq!(contract.functions[0].arguments[0].name, "to");
        assert_eq!(contract.functions[0].arguments[1].ty, "uint256");
        assert_eq!(contract.functions[0].delegated_function, "transferViaSignature");
    }

    #[tokio::test]
    async fn describe_survives_unreadable_constants() {
        let ledger = MockLedger::new();
        ledger.fail_reads(true);
        let contracts = ContractCatalog::new().describe(&registry(), &ledger).await;
        assert!(contracts[0].constants.is_none());
        assert_eq!(contracts[0].functions.len(), 1);
    }
}
