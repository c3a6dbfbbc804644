// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Delegation rules.
//!
//! A rule turns a call the user wants to make (e.g. `transfer`) into a call
//! the delegate can make for them (e.g. `transferViaSignature`). Each rule
//! exposes three capabilities:
//!
//! 1. `build_context`: gas limit, fee, expiry, signature id, fee recipient
//! 2. `build_response`: the fee quote and the payloads offered for signing
//! 3. `forwarding_arguments`: the arguments of the delegated call once the
//!    user's signature is known
//!
//! Rules are selected by name from a fixed table, see [`strategy_for`].

use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use super::context::*;
use super::fee::{calculate_token_fee, FeeError, FeeInputs};
use crate::blockchain::abi::{AbiError, FunctionSignature};
use crate::blockchain::{CallRequest, LedgerClient};
use crate::oracle::{OracleError, PriceOracle, PriceSource};

/// Gas limit used when nothing else determines it.
pub const DEFAULT_GAS_LIMIT: u64 = 200_000;

/// Default signature lifetime: 30 minutes.
pub const DEFAULT_SIGNATURE_LIFETIME_SECONDS: u64 = 30 * 60;

/// Default fee markup over the raw gas cost.
pub const DEFAULT_FEE_MARKUP: f64 = 2.0;

// =============================================================================
// Settings
// =============================================================================

/// How a rule determines the gas limit when the caller did not supply one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "camelCase")]
pub enum GasLimitPolicy {
    Fixed { value: u64 },
    /// Estimate of the original call plus the delegated call's overhead.
    /// Without an explicit overhead the rule's own default is used.
    EstimatePlus {
        #[serde(default)]
        overhead: Option<u64>,
    },
}

impl Default for GasLimitPolicy {
    fn default() -> Self {
        GasLimitPolicy::Fixed {
            value: DEFAULT_GAS_LIMIT,
        }
    }
}

/// Shape of the fee in the compose response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeeFormat {
    /// `fee`: a single amount in the contract's token
    #[default]
    Amount,
    /// `fees`: itemized list with token constants
    Itemized,
}

/// Per-function rule settings from the manifest file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleSettings {
    pub gas_limit: GasLimitPolicy,
    /// Account receiving the fee; the delegate account when absent
    pub fee_recipient: Option<String>,
    pub signature_lifetime_seconds: u64,
    pub fee_markup: f64,
    /// Token price in successive quote currencies; each feed is an ordered
    /// list of sources
    pub quote_feeds: Vec<Vec<PriceSource>>,
    pub fee_format: FeeFormat,
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self {
            gas_limit: GasLimitPolicy::default(),
            fee_recipient: None,
            signature_lifetime_seconds: DEFAULT_SIGNATURE_LIFETIME_SECONDS,
            fee_markup: DEFAULT_FEE_MARKUP,
            quote_feeds: Vec::new(),
            fee_format: FeeFormat::default(),
        }
    }
}

// =============================================================================
// Errors and I/O types
// =============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleError {
    #[error("{0}")]
    Abi(#[from] AbiError),

    #[error("Context is missing {0}")]
    MissingContextField(&'static str),

    #[error("Gas estimation of the original call failed: {0}")]
    Estimation(String),

    #[error("Token quote unavailable: {0}")]
    Quote(#[from] OracleError),

    #[error("Fee calculation failed: {0}")]
    Fee(#[from] FeeError),
}

/// Services a rule may call while building its context.
pub struct RuleEnv<'a> {
    pub ledger: &'a dyn LedgerClient,
    pub oracle: &'a PriceOracle,
    /// Current time, unix seconds
    pub now: i64,
}

/// Output of `build_response`.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleResponse {
    pub fee: FeeQuote,
    pub signature_options: Vec<SignatureOption>,
}

/// The user's signature over one of the offered payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedSignature {
    pub standard: SignatureStandard,
    /// 0x-prefixed hex
    pub signature: String,
}

// =============================================================================
// Strategy
// =============================================================================

/// A named delegation rule.
#[async_trait]
pub trait DelegationStrategy: Send + Sync {
    /// Name used in manifest files.
    fn name(&self) -> &'static str;

    /// Function the user asks for.
    fn original(&self) -> &FunctionSignature;

    /// Function the delegate calls.
    fn delegated(&self) -> &FunctionSignature;

    /// Gas the delegated call costs on top of the original one.
    fn default_overhead(&self) -> u64;

    /// Standards the contract implements by virtue of this rule.
    fn implements(&self) -> &'static [&'static str];

    async fn build_context(
        &self,
        base: &RequestContext,
        settings: &RuleSettings,
        env: &RuleEnv<'_>,
    ) -> Result<ContextFields, RuleError> {
        default_context(self.original(), self.default_overhead(), base, settings, env).await
    }

    fn build_response(
        &self,
        ctx: &RequestContext,
        settings: &RuleSettings,
    ) -> Result<RuleResponse, RuleError>;

    fn forwarding_arguments(
        &self,
        ctx: &RequestContext,
        signature: &SubmittedSignature,
    ) -> Result<Vec<String>, RuleError>;
}

/// Look up a rule by its manifest name.
pub fn strategy_for(name: &str) -> Result<Option<Arc<dyn DelegationStrategy>>, AbiError> {
    let strategy: Arc<dyn DelegationStrategy> = match name {
        TRANSFER_VIA_SIGNATURE => Arc::new(TransferViaSignature::new()?),
        APPROVE_AND_CALL_VIA_SIGNATURE => Arc::new(ApproveAndCallViaSignature::new()?),
        _ => return Ok(None),
    };
    Ok(Some(strategy))
}

/// Fresh 256-bit signature id, decimal.
pub fn random_signature_id() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    U256::from_be_bytes(bytes).to_string()
}

/// Context shared by the signature-forwarding rules.
async fn default_context(
    original: &FunctionSignature,
    default_overhead: u64,
    base: &RequestContext,
    settings: &RuleSettings,
    env: &RuleEnv<'_>,
) -> Result<ContextFields, RuleError> {
    let gas_limit = match (base.gas_limit, &settings.gas_limit) {
        (Some(requested), _) => requested,
        (None, GasLimitPolicy::Fixed { value }) => *value,
        (None, GasLimitPolicy::EstimatePlus { overhead }) => {
            let estimate = estimate_original(original, base, env).await?;
            estimate.saturating_add(overhead.unwrap_or(default_overhead))
        }
    };

    let mut quotes = Vec::with_capacity(settings.quote_feeds.len());
    for feed in &settings.quote_feeds {
        quotes.push(env.oracle.try_get_price(feed).await?);
    }

    let decimals = base
        .contract
        .decimals
        .ok_or(RuleError::MissingContextField("contract decimals"))?;
    let gas_price_wei = base
        .gas_price
        .parse::<u128>()
        .map_err(|_| RuleError::MissingContextField("gas price"))?;

    let fee = calculate_token_fee(&FeeInputs {
        decimals,
        quotes: &quotes,
        gas_price_wei,
        eth_price: base.price_oracle_value,
        gas_limit,
        markup: settings.fee_markup,
    })?;

    let fee_recipient = settings
        .fee_recipient
        .clone()
        .unwrap_or_else(|| env.ledger.delegate_address().to_checksum(None));

    let lifetime = i64::try_from(settings.signature_lifetime_seconds).unwrap_or(i64::MAX);

    Ok(ContextFields {
        gas_limit: Some(gas_limit),
        signature_id: Some(random_signature_id()),
        expires_at: Some(env.now.saturating_add(lifetime)),
        calculated_token_fee: Some(fee),
        fee_recipient: Some(fee_recipient),
    })
}

async fn estimate_original(
    original: &FunctionSignature,
    base: &RequestContext,
    env: &RuleEnv<'_>,
) -> Result<u64, RuleError> {
    let data = original.encode_call(&base.function_arguments)?;
    let from = Address::from_str(&base.signer)
        .map_err(|e| RuleError::Estimation(format!("invalid signer: {e}")))?;
    let to = Address::from_str(&base.contract.address)
        .map_err(|e| RuleError::Estimation(format!("invalid contract: {e}")))?;

    env.ledger
        .estimate_gas(&CallRequest { from, to, data })
        .await
        .map_err(|e| RuleError::Estimation(e.to_string()))
}

/// Values every signature payload includes, in order.
struct SignedTerms<'a> {
    contract: &'a str,
    signer: &'a str,
    fee: &'a str,
    fee_recipient: &'a str,
    expires_at: String,
    signature_id: &'a str,
}

impl<'a> SignedTerms<'a> {
    fn from_context(ctx: &'a RequestContext) -> Result<Self, RuleError> {
        Ok(Self {
            contract: &ctx.contract.address,
            signer: &ctx.signer,
            fee: ctx
                .calculated_token_fee
                .as_deref()
                .ok_or(RuleError::MissingContextField("calculatedTokenFee"))?,
            fee_recipient: ctx
                .fee_recipient
                .as_deref()
                .ok_or(RuleError::MissingContextField("feeRecipient"))?,
            expires_at: ctx
                .expires_at
                .ok_or(RuleError::MissingContextField("expiresAt"))?
                .to_string(),
            signature_id: ctx
                .signature_id
                .as_deref()
                .ok_or(RuleError::MissingContextField("signatureId"))?,
        })
    }
}

fn fee_quote(ctx: &RequestContext, settings: &RuleSettings, fee: &str) -> FeeQuote {
    match settings.fee_format {
        FeeFormat::Amount => FeeQuote::Amount(fee.to_string()),
        FeeFormat::Itemized => FeeQuote::Itemized(vec![FeeItem {
            address: ctx.contract.address.clone(),
            decimals: ctx.contract.decimals.unwrap_or_default(),
            symbol: ctx.contract.symbol.clone().unwrap_or_default(),
            value: fee.to_string(),
        }]),
    }
}

fn require_arguments(ctx: &RequestContext, expected: usize) -> Result<(), RuleError> {
    if ctx.function_arguments.len() != expected {
        return Err(AbiError::ArgumentCount {
            expected,
            actual: ctx.function_arguments.len(),
        }
        .into());
    }
    Ok(())
}

// =============================================================================
// transferViaSignature
// =============================================================================

pub const TRANSFER_VIA_SIGNATURE: &str = "transferViaSignature";

/// `transfer(to, value)` forwarded as `transferViaSignature`.
pub struct TransferViaSignature {
    original: FunctionSignature,
    delegated: FunctionSignature,
}

impl TransferViaSignature {
    pub fn new() -> Result<Self, AbiError> {
        Ok(Self {
            original: FunctionSignature::parse("transfer(address to,uint256 value)")?,
            delegated: FunctionSignature::parse(
                "transferViaSignature(address from,address to,uint256 value,uint256 fee,\
                 address feeRecipient,uint256 deadline,uint256 sigId,bytes sig,uint8 sigStd)",
            )?,
        })
    }
}

#[async_trait]
impl DelegationStrategy for TransferViaSignature {
    fn name(&self) -> &'static str {
        TRANSFER_VIA_SIGNATURE
    }

    fn original(&self) -> &FunctionSignature {
        &self.original
    }

    fn delegated(&self) -> &FunctionSignature {
        &self.delegated
    }

    fn default_overhead(&self) -> u64 {
        46_000
    }

    fn implements(&self) -> &'static [&'static str] {
        &["ERC20", TRANSFER_VIA_SIGNATURE]
    }

    fn build_response(
        &self,
        ctx: &RequestContext,
        settings: &RuleSettings,
    ) -> Result<RuleResponse, RuleError> {
        require_arguments(ctx, 2)?;
        let terms = SignedTerms::from_context(ctx)?;
        let (to, value) = (&ctx.function_arguments[0], &ctx.function_arguments[1]);

        let typed = vec![
            TypedDataField::new("address", "Token Contract Address", terms.contract),
            TypedDataField::new("address", "Sender's Address", terms.signer),
            TypedDataField::new("address", "Recipient's Address", to.as_str()),
            TypedDataField::new(
                "uint256",
                "Amount to Transfer (last six digits are decimals)",
                value.as_str(),
            ),
            TypedDataField::new(
                "uint256",
                "Fee in Tokens Paid to Executor (last six digits are decimals)",
                terms.fee,
            ),
            TypedDataField::new("address", "Account which Receives Fee", terms.fee_recipient),
            TypedDataField::new(
                "uint256",
                "Signature Expiration Timestamp (unix timestamp)",
                terms.expires_at.as_str(),
            ),
            TypedDataField::new("uint256", "Signature ID", terms.signature_id),
        ];
        let hash = packed_hash(&typed)?;

        Ok(RuleResponse {
            fee: fee_quote(ctx, settings, terms.fee),
            signature_options: vec![
                SignatureOption {
                    standard: SignatureStandard::TypedData,
                    data_to_sign: DataToSign::TypedData(typed),
                },
                SignatureOption {
                    standard: SignatureStandard::PersonalSign,
                    data_to_sign: DataToSign::Hash(hash),
                },
            ],
        })
    }

    fn forwarding_arguments(
        &self,
        ctx: &RequestContext,
        signature: &SubmittedSignature,
    ) -> Result<Vec<String>, RuleError> {
        require_arguments(ctx, 2)?;
        let terms = SignedTerms::from_context(ctx)?;
        Ok(vec![
            terms.signer.to_string(),
            ctx.function_arguments[0].clone(),
            ctx.function_arguments[1].clone(),
            terms.fee.to_string(),
            terms.fee_recipient.to_string(),
            terms.expires_at,
            terms.signature_id.to_string(),
            signature.signature.clone(),
            signature.standard.contract_code().to_string(),
        ])
    }
}

// =============================================================================
// approveAndCallViaSignature
// =============================================================================

pub const APPROVE_AND_CALL_VIA_SIGNATURE: &str = "approveAndCallViaSignature";

/// `approveAndCall(spender, value, extraData)` forwarded as
/// `approveAndCallViaSignature`.
pub struct ApproveAndCallViaSignature {
    original: FunctionSignature,
    delegated: FunctionSignature,
}

impl ApproveAndCallViaSignature {
    pub fn new() -> Result<Self, AbiError> {
        Ok(Self {
            original: FunctionSignature::parse(
                "approveAndCall(address spender,uint256 value,bytes extraData)",
            )?,
            delegated: FunctionSignature::parse(
                "approveAndCallViaSignature(address from,address to,uint256 value,bytes extraData,\
                 uint256 fee,address feeRecipient,uint256 deadline,uint256 sigId,bytes sig,\
                 uint8 sigStd)",
            )?,
        })
    }
}

#[async_trait]
impl DelegationStrategy for ApproveAndCallViaSignature {
    fn name(&self) -> &'static str {
        APPROVE_AND_CALL_VIA_SIGNATURE
    }

    fn original(&self) -> &FunctionSignature {
        &self.original
    }

    fn delegated(&self) -> &FunctionSignature {
        &self.delegated
    }

    fn default_overhead(&self) -> u64 {
        52_000
    }

    fn implements(&self) -> &'static [&'static str] {
        &["ERC20", APPROVE_AND_CALL_VIA_SIGNATURE]
    }

    fn build_response(
        &self,
        ctx: &RequestContext,
        settings: &RuleSettings,
    ) -> Result<RuleResponse, RuleError> {
        require_arguments(ctx, 3)?;
        let terms = SignedTerms::from_context(ctx)?;
        let args = &ctx.function_arguments;

        let typed = vec![
            TypedDataField::new("address", "Token Contract Address", terms.contract),
            TypedDataField::new("address", "Withdrawal Approval Address", terms.signer),
            TypedDataField::new("address", "Withdrawal Recipient Address", args[0].as_str()),
            TypedDataField::new(
                "uint256",
                "Amount to Transfer (last six digits are decimals)",
                args[1].as_str(),
            ),
            TypedDataField::new("bytes", "Data to Transfer", args[2].as_str()),
            TypedDataField::new(
                "uint256",
                "Fee in Tokens Paid to Executor (last six digits are decimals)",
                terms.fee,
            ),
            TypedDataField::new("address", "Account which Receives Fee", terms.fee_recipient),
            TypedDataField::new(
                "uint256",
                "Signature Expiration Timestamp (unix timestamp)",
                terms.expires_at.as_str(),
            ),
            TypedDataField::new("uint256", "Signature ID", terms.signature_id),
        ];
        let hash = packed_hash(&typed)?;

        Ok(RuleResponse {
            fee: fee_quote(ctx, settings, terms.fee),
            signature_options: vec![
                SignatureOption {
                    standard: SignatureStandard::TypedData,
                    data_to_sign: DataToSign::TypedData(typed),
                },
                SignatureOption {
                    standard: SignatureStandard::PersonalSign,
                    data_to_sign: DataToSign::Hash(hash),
                },
            ],
        })
    }

    fn forwarding_arguments(
        &self,
        ctx: &RequestContext,
        signature: &SubmittedSignature,
    ) -> Result<Vec<String>, RuleError> {
        require_arguments(ctx, 3)?;
        let terms = SignedTerms::from_context(ctx)?;
        Ok(vec![
            terms.signer.to_string(),
            ctx.function_arguments[0].clone(),
            ctx.function_arguments[1].clone(),
            ctx.function_arguments[2].clone(),
            terms.fee.to_string(),
            terms.fee_recipient.to_string(),
            terms.expires_at,
            terms.signature_id.to_string(),
            signature.signature.clone(),
            signature.standard.contract_code().to_string(),
        ])
    }
}

/// Personal-sign payload: packed keccak over the typed-data values.
fn packed_hash(fields: &[TypedDataField]) -> Result<String, RuleError> {
    let types: Vec<&str> = fields.iter().map(|f| f.ty.as_str()).collect();
    let values: Vec<String> = fields.iter().map(|f| f.value.clone()).collect();
    Ok(crate::blockchain::abi::solidity_keccak256(&types, &values)?)
}
