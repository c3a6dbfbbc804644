// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use chrono::Utc;
use serde_json::json;

use crate::blockchain::gas_price::DEFAULT_GAS_PRICE_TTL;
use crate::blockchain::mock::MockLedger;
use crate::blockchain::{GasPriceCache, LedgerClient};
use crate::manifest::rules::{DelegationStrategy, RuleSettings, TransferViaSignature};
use crate::manifest::{ContractInfo, ManifestRegistry, RequestContext};
use crate::metadata::ContractCatalog;
use crate::oracle::tests::ScriptedFetcher;
use crate::oracle::{PriceOracle, PriceSource};
use crate::relay::{ConfirmationHandler, NonceSequencer, RelaySettings, RequestComposer};
use crate::state::AppState;
use crate::storage::{DelegateRequest, RequestDatabase};

pub const TOKEN: &str = "0x82f4ded9cec9b5750fbff5c2185aee35afc16587";
pub const SIGNER: &str = "0x1111111111111111111111111111111111111111";
pub const RECIPIENT: &str = "0x2222222222222222222222222222222222222222";

const NATIVE_URL: &str = "https://native.example/price";

/// A composed `transfer` request in `new` status, valid for an hour.
pub fn sample_request(id: &str, signer: &str) -> DelegateRequest {
    let now = Utc::now();
    let expires_at = now + chrono::Duration::hours(1);
    let context = RequestContext {
        contract: ContractInfo {
            address: TOKEN.to_string(),
            implements: vec!["ERC20".to_string()],
            decimals: Some(6),
            symbol: Some("DREAM".to_string()),
        },
        function_name: "transfer".to_string(),
        function_arguments: vec![RECIPIENT.to_string(), "1000".to_string()],
        signer: signer.to_string(),
        gas_price: "20000000000".to_string(),
        price_oracle_value: 1.0,
        gas_limit: Some(100_000),
        signature_id: Some("1".to_string()),
        expires_at: Some(expires_at.timestamp()),
        calculated_token_fee: Some("4000".to_string()),
        fee_recipient: Some(RECIPIENT.to_string()),
    };
    let response = TransferViaSignature::new()
        .unwrap()
        .build_response(&context, &RuleSettings::default())
        .unwrap();

    DelegateRequest::new_composed(
        id.to_string(),
        context,
        response.signature_options,
        Some("4000".to_string()),
        None,
        now,
        expires_at,
    )
}

/// Manifest with one token supporting both rules.
pub fn test_registry() -> ManifestRegistry {
    ManifestRegistry::from_json(json!({
        "contracts": [{
            "address": TOKEN,
            "implements": ["ERC20"],
            "delegatedFunctions": [
                {
                    "functionName": "transfer",
                    "rule": "transferViaSignature",
                    "settings": {
                        "gasLimit": { "policy": "fixed", "value": 100000 },
                        "quoteFeeds": [
                            [{ "url": "https://q1.example", "pointer": "/ticker/last" }],
                            [{ "url": "https://q2.example", "pointer": "/ticker/last" }]
                        ]
                    }
                },
                { "functionName": "approveAndCall", "rule": "approveAndCallViaSignature" }
            ]
        }]
    }))
    .unwrap()
}

/// Relay components wired to a temporary store and a scripted ledger.
pub struct TestRelay {
    _dir: Arc<tempfile::TempDir>,
    pub db: Arc<RequestDatabase>,
    pub ledger: Arc<MockLedger>,
    pub registry: Arc<ManifestRegistry>,
    pub oracle: Arc<PriceOracle>,
    pub gas_price: Arc<GasPriceCache>,
    pub catalog: Arc<ContractCatalog>,
    pub settings: RelaySettings,
}

impl TestRelay {
    pub fn new() -> Self {
        Self::with_settings(Self::settings())
    }

    pub fn with_global_cap(cap: usize) -> Self {
        Self::with_settings(RelaySettings {
            max_pending_per_account: cap,
            ..Self::settings()
        })
    }

    pub fn settings() -> RelaySettings {
        RelaySettings {
            request_ttl: Duration::from_secs(3600),
            max_pending_per_account: 5,
            required_confirmations: 2,
            republish_after: Duration::from_secs(300),
            max_nonce_retries: 32,
        }
    }

    pub fn with_settings(settings: RelaySettings) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = RequestDatabase::open(&dir.path().join("requests.redb")).unwrap();
        Self::assemble(Arc::new(dir), Arc::new(db), MockLedger::new(), settings)
    }

    /// Same store, different ledger (e.g. another delegate key).
    pub fn with_ledger_sharing_db(other: &TestRelay, ledger: MockLedger) -> Self {
        Self::assemble(
            other._dir.clone(),
            other.db.clone(),
            ledger,
            other.settings.clone(),
        )
    }

    fn assemble(
        dir: Arc<tempfile::TempDir>,
        db: Arc<RequestDatabase>,
        ledger: MockLedger,
        settings: RelaySettings,
    ) -> Self {
        ledger.set_token(Address::from_str(TOKEN).unwrap(), "DREAM", 6);

        let fetcher = ScriptedFetcher::default()
            .with(NATIVE_URL, json!({ "price": 1.0 }))
            .with("https://q1.example", json!({ "ticker": { "last": "0.5" } }))
            .with("https://q2.example", json!({ "ticker": { "last": "2" } }));
        let oracle = PriceOracle::new(
            Arc::new(fetcher),
            vec![PriceSource::new(NATIVE_URL, "/price", 300)],
        );

        Self {
            _dir: dir,
            db,
            ledger: Arc::new(ledger),
            registry: Arc::new(test_registry()),
            oracle: Arc::new(oracle),
            gas_price: Arc::new(GasPriceCache::new(DEFAULT_GAS_PRICE_TTL, 100)),
            catalog: Arc::new(ContractCatalog::new()),
            settings,
        }
    }

    pub fn ledger_client(&self) -> Arc<dyn LedgerClient> {
        self.ledger.clone()
    }

    pub fn composer(&self) -> RequestComposer {
        RequestComposer::new(
            self.registry.clone(),
            self.db.clone(),
            self.ledger_client(),
            self.oracle.clone(),
            self.gas_price.clone(),
            self.catalog.clone(),
            self.settings.request_ttl,
        )
    }

    pub fn confirmation(&self) -> ConfirmationHandler {
        ConfirmationHandler::new(
            self.registry.clone(),
            self.db.clone(),
            self.ledger_client(),
            self.settings.max_pending_per_account,
        )
    }

    pub fn sequencer(&self) -> NonceSequencer {
        NonceSequencer::new(
            self.registry.clone(),
            self.db.clone(),
            self.ledger_client(),
            &self.settings,
        )
    }

    /// HTTP state over the same store and ledger.
    pub fn app_state(&self) -> AppState {
        AppState::new(
            "testnet",
            self.registry.clone(),
            self.db.clone(),
            self.ledger_client(),
            self.oracle.clone(),
            self.gas_price.clone(),
            &self.settings,
        )
    }

    /// Compose a `transfer` of 1 token unit from [`SIGNER`] to [`RECIPIENT`].
    pub async fn compose_transfer(&self) -> DelegateRequest {
        self.composer()
            .compose(crate::relay::ComposeInput {
                contract_address: TOKEN.to_string(),
                function_name: "transfer".to_string(),
                function_arguments: vec![RECIPIENT.to_string(), "1".to_string()],
                from: SIGNER.to_string(),
                gas_limit: None,
            })
            .await
            .unwrap()
    }
}
