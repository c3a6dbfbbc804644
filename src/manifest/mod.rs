// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Manifest Registry
//!
//! Declares, per supported contract, which functions can be delegated and
//! under which rule. Loaded once at startup from `MANIFEST_PATH` and
//! read-only afterwards.
//!
//! ## File format
//!
//! ```json
//! {
//!   "contracts": [
//!     {
//!       "address": "0x82f4ded9cec9b5750fbff5c2185aee35afc16587",
//!       "implements": ["ERC20"],
//!       "maxPendingTransactionsPerAccount": 5,
//!       "delegatedFunctions": [
//!         {
//!           "functionName": "transfer",
//!           "rule": "transferViaSignature",
//!           "settings": {
//!             "gasLimit": { "policy": "estimatePlus" },
//!             "signatureLifetimeSeconds": 1800,
//!             "quoteFeeds": [[{ "url": "https://...", "pointer": "/ticker/last" }]]
//!           }
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```

pub mod context;
pub mod fee;
pub mod rules;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::Address;
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

pub use context::*;
pub use rules::{DelegationStrategy, RuleError, RuleSettings, SubmittedSignature};

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Manifest validation failed for {address}: {reason}")]
    InvalidManifest { address: String, reason: String },

    #[error("This back end does not support delegated transactions for {0}")]
    UnsupportedContract(String),
}

/// A delegatable function of a contract and the rule forwarding it.
#[derive(Clone)]
pub struct DelegatedFunction {
    pub function_name: String,
    pub strategy: Arc<dyn DelegationStrategy>,
    pub settings: RuleSettings,
}

impl fmt::Debug for DelegatedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedFunction")
            .field("function_name", &self.function_name)
            .field("rule", &self.strategy.name())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Delegation rules of one contract.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    /// Lowercase 0x-prefixed address
    pub address: String,
    pub implements: Vec<String>,
    /// Per-signer cap on pending requests, if the contract sets one
    pub max_pending: Option<usize>,
    pub functions: Vec<DelegatedFunction>,
}

impl ManifestEntry {
    pub fn function(&self, name: &str) -> Option<&DelegatedFunction> {
        self.functions.iter().find(|f| f.function_name == name)
    }

    pub fn function_names(&self) -> Vec<&str> {
        self.functions
            .iter()
            .map(|f| f.function_name.as_str())
            .collect()
    }

    /// Effective per-signer cap given the global one.
    pub fn pending_cap(&self, global: usize) -> usize {
        self.max_pending.map_or(global, |own| own.min(global))
    }
}

/// Every contract the relay serves, keyed by lowercase address.
#[derive(Debug, Clone, Default)]
pub struct ManifestRegistry {
    entries: HashMap<String, ManifestEntry>,
    /// Addresses in file order, for discovery
    order: Vec<String>,
}

impl ManifestRegistry {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let io_error = |reason: String| ManifestError::Io {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| io_error(e.to_string()))?;
        let document: Value = serde_json::from_str(&raw).map_err(|e| io_error(e.to_string()))?;
        Self::from_json(document)
    }

    pub fn from_json(document: Value) -> Result<Self, ManifestError> {
        let document: RawManifest = serde_json::from_value(document)
            .map_err(|_| invalid(UNKNOWN_ADDRESS, "`contracts` must be an array"))?;

        let mut registry = ManifestRegistry::default();
        for raw in document.contracts {
            let entry = parse_entry(raw)?;
            if registry.entries.contains_key(&entry.address) {
                return Err(invalid(&entry.address, "contract is declared twice"));
            }
            registry.order.push(entry.address.clone());
            registry.entries.insert(entry.address.clone(), entry);
        }

        tracing::info!(contracts = registry.order.len(), "Manifest registry loaded");
        Ok(registry)
    }

    /// Manifest of a contract; the address is matched case-insensitively.
    pub fn resolve(&self, contract_address: &str) -> Result<&ManifestEntry, ManifestError> {
        let address = contract_address.trim().to_ascii_lowercase();
        self.entries
            .get(&address)
            .ok_or(ManifestError::UnsupportedContract(address))
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.order.iter().filter_map(|a| self.entries.get(a))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn invalid(address: &str, reason: impl Into<String>) -> ManifestError {
    ManifestError::InvalidManifest {
        address: address.to_string(),
        reason: reason.into(),
    }
}

// =============================================================================
// File shape
// =============================================================================

const UNKNOWN_ADDRESS: &str = "0x<unknown>";

const MAX_PENDING_REASON: &str =
    "maxPendingTransactionsPerAccount is not a number or is less than 1";

/// Top level of the manifest file. Entries stay raw so a malformed one is
/// reported against its own address.
#[derive(Deserialize)]
struct RawManifest {
    contracts: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContract {
    address: String,
    #[serde(default)]
    implements: Option<Vec<String>>,
    #[serde(
        default,
        rename = "maxPendingTransactionsPerAccount",
        deserialize_with = "positive_count"
    )]
    max_pending: Option<usize>,
    #[serde(default)]
    delegated_functions: Option<Vec<RawFunction>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFunction {
    function_name: String,
    rule: String,
    #[serde(default)]
    settings: Option<RuleSettings>,
}

fn positive_count<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<u64>::deserialize(deserializer) {
        Ok(None) => Ok(None),
        Ok(Some(n)) if n >= 1 => Ok(Some(usize::try_from(n).unwrap_or(usize::MAX))),
        _ => Err(de::Error::custom(MAX_PENDING_REASON)),
    }
}

// =============================================================================
// Validation
// =============================================================================

fn parse_entry(raw: Value) -> Result<ManifestEntry, ManifestError> {
    let label = raw
        .get("address")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_ADDRESS)
        .to_string();
    let raw: RawContract =
        serde_json::from_value(raw).map_err(|e| invalid(&label, e.to_string()))?;

    if Address::from_str(&raw.address).is_err() {
        return Err(invalid(&raw.address, "`address` is not a valid address"));
    }
    let address = raw.address.to_ascii_lowercase();

    let functions = raw
        .delegated_functions
        .ok_or_else(|| invalid(&address, "delegatedFunctions must be an array"))?
        .into_iter()
        .map(|f| validate_function(&address, f))
        .collect::<Result<Vec<_>, _>>()?;

    let implements = raw
        .implements
        .unwrap_or_else(|| implied_standards(&functions));

    Ok(ManifestEntry {
        address,
        implements,
        max_pending: raw.max_pending,
        functions,
    })
}

fn validate_function(address: &str, raw: RawFunction) -> Result<DelegatedFunction, ManifestError> {
    let RawFunction {
        function_name,
        rule,
        settings,
    } = raw;

    let strategy = rules::strategy_for(&rule)
        .map_err(|e| invalid(address, format!("rule `{rule}` is malformed: {e}")))?
        .ok_or_else(|| invalid(address, format!("unknown rule `{rule}`")))?;

    if strategy.original().name() != function_name {
        return Err(invalid(
            address,
            format!(
                "rule `{rule}` forwards `{}`, not `{function_name}`",
                strategy.original().name()
            ),
        ));
    }

    let settings = settings.unwrap_or_default();
    if let Some(recipient) = &settings.fee_recipient {
        if Address::from_str(recipient).is_err() {
            return Err(invalid(address, format!("feeRecipient `{recipient}` is not an address")));
        }
    }

    Ok(DelegatedFunction {
        function_name,
        strategy,
        settings,
    })
}

fn implied_standards(functions: &[DelegatedFunction]) -> Vec<String> {
    let mut standards: Vec<String> = Vec::new();
    for function in functions {
        for standard in function.strategy.implements() {
            if !standards.iter().any(|s| s == standard) {
                standards.push(standard.to_string());
            }
        }
    }
    standards
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TOKEN: &str = "0x82F4ded9CEC9b5750FBFf5C2185AEE35AfC16587";

    fn manifest(entry: Value) -> Value {
        json!({ "contracts": [entry] })
    }

    #[test]
    fn resolves_case_insensitively() {
        let registry = ManifestRegistry::from_json(manifest(json!({
            "address": TOKEN,
            "maxPendingTransactionsPerAccount": 5,
            "delegatedFunctions": [
                { "functionName": "transfer", "rule": "transferViaSignature" },
                { "functionName": "approveAndCall", "rule": "approveAndCallViaSignature" }
            ]
        })))
        .unwrap();

        let entry = registry.resolve(&TOKEN.to_uppercase().replace("0X", "0x")).unwrap();
        assert_eq!(entry.address, TOKEN.to_lowercase());
        assert_eq!(entry.max_pending, Some(5));
        assert_eq!(entry.function_names(), vec!["transfer", "approveAndCall"]);
        assert!(entry.implements.contains(&"ERC20".to_string()));
        assert_eq!(entry.pending_cap(3), 3);
        assert_eq!(entry.pending_cap(10), 5);
    }

    #[test]
    fn unknown_contract_is_unsupported() {
        let registry = ManifestRegistry::from_json(json!({ "contracts": [] })).unwrap();
        assert!(matches!(
            registry.resolve(TOKEN),
            Err(ManifestError::UnsupportedContract(addr)) if addr == TOKEN.to_lowercase()
        ));
    }

    #[test]
    fn max_pending_must_be_a_positive_number() {
        for bad in [json!(0), json!("5"), json!(-1), json!(1.5)] {
            let result = ManifestRegistry::from_json(manifest(json!({
                "address": TOKEN,
                "maxPendingTransactionsPerAccount": bad,
                "delegatedFunctions": []
            })));
            assert!(
                matches!(result, Err(ManifestError::InvalidManifest { .. })),
                "accepted {bad}"
            );
        }
    }

    #[test]
    fn shape_errors_name_the_contract() {
        let result = ManifestRegistry::from_json(manifest(json!({
            "address": TOKEN,
            "maxPendingTransactionsPerAccount": "5",
            "delegatedFunctions": []
        })));
        match result {
            Err(ManifestError::InvalidManifest { address, reason }) => {
                assert_eq!(address, TOKEN);
                assert_eq!(reason, MAX_PENDING_REASON);
            }
            other => panic!("unexpected {other:?}"),
        }

        let result = ManifestRegistry::from_json(manifest(json!({
            "address": TOKEN,
            "delegatedFunctions": [{ "rule": "transferViaSignature" }]
        })));
        match result {
            Err(ManifestError::InvalidManifest { address, reason }) => {
                assert_eq!(address, TOKEN);
                assert!(reason.contains("functionName"), "{reason}");
            }
            other => panic!("unexpected {other:?}"),
        }

        let result = ManifestRegistry::from_json(json!({ "contracts": {} }));
        assert!(matches!(
            result,
            Err(ManifestError::InvalidManifest { address, .. }) if address == UNKNOWN_ADDRESS
        ));
    }

    #[test]
    fn delegated_functions_must_be_a_list() {
        let result = ManifestRegistry::from_json(manifest(json!({
            "address": TOKEN,
            "delegatedFunctions": { "transfer": "transferViaSignature" }
        })));
        assert!(matches!(result, Err(ManifestError::InvalidManifest { .. })));

        let result = ManifestRegistry::from_json(manifest(json!({ "address": TOKEN })));
        assert!(matches!(result, Err(ManifestError::InvalidManifest { .. })));
    }

    #[test]
    fn rules_are_checked_against_the_table() {
        let unknown = ManifestRegistry::from_json(manifest(json!({
            "address": TOKEN,
            "delegatedFunctions": [{ "functionName": "mint", "rule": "mintViaSignature" }]
        })));
        assert!(matches!(unknown, Err(ManifestError::InvalidManifest { .. })));

        let mismatched = ManifestRegistry::from_json(manifest(json!({
            "address": TOKEN,
            "delegatedFunctions": [{ "functionName": "approve", "rule": "transferViaSignature" }]
        })));
        assert!(matches!(mismatched, Err(ManifestError::InvalidManifest { .. })));
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        let result = ManifestRegistry::from_json(manifest(json!({
            "address": "0x1234",
            "delegatedFunctions": []
        })));
        assert!(matches!(result, Err(ManifestError::InvalidManifest { .. })));

        let result = ManifestRegistry::from_json(manifest(json!({
            "address": TOKEN,
            "delegatedFunctions": [{
                "functionName": "transfer",
                "rule": "transferViaSignature",
                "settings": { "feeRecipient": "nobody" }
            }]
        })));
        assert!(matches!(result, Err(ManifestError::InvalidManifest { .. })));
    }

    #[test]
    fn settings_are_parsed() {
        let registry = ManifestRegistry::from_json(manifest(json!({
            "address": TOKEN,
            "delegatedFunctions": [{
                "functionName": "transfer",
                "rule": "transferViaSignature",
                "settings": {
                    "gasLimit": { "policy": "estimatePlus", "overhead": 50000 },
                    "feeFormat": "itemized",
                    "quoteFeeds": [[{ "url": "https://q.example", "pointer": "/ticker/last" }]]
                }
            }]
        })))
        .unwrap();

        let function = registry.resolve(TOKEN).unwrap().function("transfer").unwrap();
        assert_eq!(
            function.settings.gas_limit,
            rules::GasLimitPolicy::EstimatePlus {
                overhead: Some(50_000)
            }
        );
        assert_eq!(function.settings.fee_format, rules::FeeFormat::Itemized);
        assert_eq!(function.settings.quote_feeds[0][0].ttl_seconds, 300);
        assert_eq!(
            function.settings.signature_lifetime_seconds,
            rules::DEFAULT_SIGNATURE_LIFETIME_SECONDS
        );
    }

    #[test]
    fn load_reads_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            manifest(json!({ "address": TOKEN, "delegatedFunctions": [] })).to_string(),
        )
        .unwrap();

        let registry = ManifestRegistry::load(&path).unwrap();
        assert_eq!(registry.entries().count(), 1);

        assert!(matches!(
            ManifestRegistry::load(&dir.path().join("missing.json")),
            Err(ManifestError::Io { .. })
        ));
    }

    #[test]
    fn bundled_example_manifest_is_valid() {
        let document: Value =
            serde_json::from_str(include_str!("../../manifest.example.json")).unwrap();
        let registry = ManifestRegistry::from_json(document).unwrap();
        let entry = registry.resolve(TOKEN).unwrap();
        assert_eq!(entry.function_names(), vec!["transfer", "approveAndCall"]);
        assert_eq!(entry.pending_cap(10), 5);
    }
}
