// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request composition.
//!
//! Turns "call `transfer` on this token for me" into a persisted `new`
//! request carrying the fee and the payloads the user may sign. Nothing is
//! written unless every step succeeds.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::RelayError;
use crate::blockchain::{GasPriceCache, LedgerClient};
use crate::manifest::rules::RuleEnv;
use crate::manifest::{FeeQuote, ManifestRegistry, RequestContext};
use crate::metadata::ContractCatalog;
use crate::oracle::PriceOracle;
use crate::storage::{DelegateRequest, RequestDatabase};

/// What the caller wants delegated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeInput {
    pub contract_address: String,
    pub function_name: String,
    pub function_arguments: Vec<String>,
    /// The user who will sign
    pub from: String,
    pub gas_limit: Option<u64>,
}

pub struct RequestComposer {
    registry: Arc<ManifestRegistry>,
    db: Arc<RequestDatabase>,
    ledger: Arc<dyn LedgerClient>,
    oracle: Arc<PriceOracle>,
    gas_price: Arc<GasPriceCache>,
    catalog: Arc<ContractCatalog>,
    request_ttl: Duration,
}

impl RequestComposer {
    pub fn new(
        registry: Arc<ManifestRegistry>,
        db: Arc<RequestDatabase>,
        ledger: Arc<dyn LedgerClient>,
        oracle: Arc<PriceOracle>,
        gas_price: Arc<GasPriceCache>,
        catalog: Arc<ContractCatalog>,
        request_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            db,
            ledger,
            oracle,
            gas_price,
            catalog,
            request_ttl,
        }
    }

    pub async fn compose(&self, input: ComposeInput) -> Result<DelegateRequest, RelayError> {
        parse_address("contractAddress", &input.contract_address)?;
        parse_address("from", &input.from)?;
        if input.gas_limit == Some(0) {
            return Err(RelayError::InvalidGasLimit(0));
        }

        let entry = self.registry.resolve(&input.contract_address)?;
        let function =
            entry
                .function(&input.function_name)
                .ok_or_else(|| RelayError::UnknownFunction {
                    contract: entry.address.clone(),
                    function: input.function_name.clone(),
                    available: entry.function_names().iter().map(|n| n.to_string()).collect(),
                })?;
        function
            .strategy
            .original()
            .coerce_arguments(&input.function_arguments)
            .map_err(|e| RelayError::InvalidArguments(e.to_string()))?;

        let contract = self.catalog.contract_info(entry, self.ledger.as_ref()).await?;
        let gas_price = self.gas_price.get(self.ledger.as_ref()).await?;
        let price_oracle_value = self.oracle.get_price().await;
        let now = Utc::now();

        let mut context = RequestContext {
            contract,
            function_name: input.function_name.clone(),
            function_arguments: input.function_arguments,
            signer: input.from.to_ascii_lowercase(),
            gas_price: gas_price.to_string(),
            price_oracle_value,
            gas_limit: input.gas_limit,
            signature_id: None,
            expires_at: None,
            calculated_token_fee: None,
            fee_recipient: None,
        };

        let env = RuleEnv {
            ledger: self.ledger.as_ref(),
            oracle: self.oracle.as_ref(),
            now: now.timestamp(),
        };
        let fields = function
            .strategy
            .build_context(&context, &function.settings, &env)
            .await?;
        context.merge(fields);

        let response = function
            .strategy
            .build_response(&context, &function.settings)?;
        if response.signature_options.is_empty() {
            return Err(RelayError::ManifestExecution(
                "rule offered no signature options".to_string(),
            ));
        }
        let (fee, fees) = match response.fee {
            FeeQuote::Amount(amount) => (Some(amount), None),
            FeeQuote::Itemized(items) => (None, Some(items)),
        };

        let expires_at = context
            .expires_at
            .and_then(|seconds| DateTime::<Utc>::from_timestamp(seconds, 0))
            .unwrap_or_else(|| default_expiry(now, self.request_ttl));

        let request = DelegateRequest::new_composed(
            Uuid::new_v4().to_string(),
            context,
            response.signature_options,
            fee,
            fees,
            now,
            expires_at,
        );
        self.db.insert(&request)?;

        tracing::info!(
            request_id = %request.id,
            signer = %request.signer,
            contract = %request.context.contract.address,
            function = %request.context.function_name,
            "Request composed"
        );
        Ok(request)
    }
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, RelayError> {
    Address::from_str(value).map_err(|_| RelayError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

fn default_expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
