// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger client used by the relay engine.
//!
//! The engine only talks to the chain through [`LedgerClient`]: read nonces,
//! gas prices and receipts, estimate gas, and broadcast transactions signed by
//! the single delegate key. [`AlloyLedger`] is the production implementation
//! backed by one or more JSON-RPC endpoints.

use std::future::Future;
use std::str::FromStr;

use alloy::{
    consensus::Transaction as _,
    network::{EthereumWallet, ReceiptResponse, TransactionBuilder},
    primitives::{Address, TxHash, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
};
use async_trait::async_trait;

use super::erc20;
use super::types::*;

/// Capabilities the relay needs from the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Chain ID transactions are signed for.
    fn chain_id(&self) -> u64;

    /// Address of the delegate account that signs and pays for transactions.
    fn delegate_address(&self) -> Address;

    /// Current block height.
    async fn block_number(&self) -> Result<u64, LedgerError>;

    /// Confirmed transaction count (next usable nonce) for an address.
    async fn transaction_count(&self, address: Address) -> Result<u64, LedgerError>;

    /// Current network gas price in wei.
    async fn gas_price(&self) -> Result<u128, LedgerError>;

    /// Dry-run gas estimation.
    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, LedgerError>;

    /// Sign the parameters with the delegate key and broadcast. Returns the
    /// transaction hash.
    async fn send_transaction(&self, params: &TransactionParams) -> Result<String, LedgerError>;

    /// Hash the parameters would have once signed by the delegate key,
    /// without broadcasting.
    async fn transaction_hash(&self, params: &TransactionParams) -> Result<String, LedgerError>;

    /// Receipt for a transaction, `None` while it is not yet included.
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, LedgerError>;

    /// Nonce a broadcast transaction was actually mined with.
    async fn transaction_nonce(&self, tx_hash: &str) -> Result<Option<u64>, LedgerError>;

    /// ERC-20 `symbol()` and `decimals()`.
    async fn token_metadata(&self, contract: Address) -> Result<TokenMetadata, LedgerError>;
}

/// JSON-RPC ledger client signing with the delegate key.
pub struct AlloyLedger {
    /// Network configuration
    network: NetworkConfig,
    /// One provider per configured endpoint, in priority order
    providers: Vec<DynProvider>,
    /// Delegate account address
    delegate: Address,
    /// Delegate key, for hashing without a round trip
    wallet: EthereumWallet,
}

impl AlloyLedger {
    /// Create a client for the network, signing with `signer`.
    pub fn new(network: NetworkConfig, signer: PrivateKeySigner) -> Result<Self, LedgerError> {
        let delegate = signer.address();
        let wallet = EthereumWallet::from(signer);

        let mut providers = Vec::with_capacity(network.rpc_urls.len());
        for rpc_url in &network.rpc_urls {
            let url: url::Url = rpc_url
                .parse()
                .map_err(|e: url::ParseError| LedgerError::InvalidRpcUrl(e.to_string()))?;
            let provider = ProviderBuilder::new()
                .wallet(wallet.clone())
                .connect_http(url)
                .erased();
            providers.push(provider);
        }

        if providers.is_empty() {
            return Err(LedgerError::InvalidRpcUrl(
                "no RPC endpoints configured".to_string(),
            ));
        }

        Ok(Self {
            network,
            providers,
            delegate,
            wallet,
        })
    }

    fn build_request(&self, params: &TransactionParams) -> Result<TransactionRequest, LedgerError> {
        let to = Address::from_str(&params.to)
            .map_err(|e| LedgerError::InvalidAddress(format!("Invalid to address: {}", e)))?;
        let data = alloy::hex::decode(&params.data)
            .map_err(|e| LedgerError::TransactionFailed(format!("Invalid calldata: {}", e)))?;
        let gas_price = params
            .gas_price
            .parse::<u128>()
            .map_err(|e| LedgerError::TransactionFailed(format!("Invalid gas price: {}", e)))?;
        let value = U256::from_str(&params.value)
            .map_err(|e| LedgerError::TransactionFailed(format!("Invalid value: {}", e)))?;

        let mut tx = TransactionRequest::default()
            .from(self.delegate)
            .to(to)
            .input(data.into())
            .value(value)
            .nonce(params.nonce)
            .gas_limit(params.gas_limit)
            .gas_price(gas_price);
        tx.chain_id = Some(params.chain_id);
        Ok(tx)
    }

    /// Run `op` against each endpoint in order until one answers.
    ///
    /// Only transport-level failures fall through to the next endpoint; a
    /// classified answer (revert, nonce too low, ...) is returned as is.
    async fn with_fallback<T, F, Fut>(&self, what: &str, op: F) -> Result<T, LedgerError>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut last_error = None;
        for (index, provider) in self.providers.iter().enumerate() {
            match op(provider.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transport() => {
                    tracing::warn!(
                        endpoint = index,
                        operation = what,
                        error = %e,
                        "RPC endpoint failed, trying next"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| LedgerError::RpcError(format!("{what}: no endpoints"))))
    }
}

#[async_trait]
impl LedgerClient for AlloyLedger {
    fn chain_id(&self) -> u64 {
        self.network.chain_id
    }

    fn delegate_address(&self) -> Address {
        self.delegate
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        self.with_fallback("block_number", |p| async move {
            p.get_block_number()
                .await
                .map_err(|e| LedgerError::RpcError(e.to_string()))
        })
        .await
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, LedgerError> {
        self.with_fallback("transaction_count", |p| async move {
            p.get_transaction_count(address)
                .await
                .map_err(|e| LedgerError::RpcError(e.to_string()))
        })
        .await
    }

    async fn gas_price(&self) -> Result<u128, LedgerError> {
        self.with_fallback("gas_price", |p| async move {
            p.get_gas_price()
                .await
                .map_err(|e| LedgerError::RpcError(e.to_string()))
        })
        .await
    }

    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, LedgerError> {
        let tx = TransactionRequest::default()
            .from(call.from)
            .to(call.to)
            .input(call.data.clone().into());

        self.with_fallback("estimate_gas", |p| {
            let tx = tx.clone();
            async move {
                p.estimate_gas(tx)
                    .await
                    .map_err(|e| LedgerError::classify(e.to_string()))
            }
        })
        .await
    }

    async fn send_transaction(&self, params: &TransactionParams) -> Result<String, LedgerError> {
        let tx = self.build_request(params)?;

        self.with_fallback("send_transaction", |p| {
            let tx = tx.clone();
            async move {
                let pending = p
                    .send_transaction(tx)
                    .await
                    .map_err(|e| LedgerError::classify(e.to_string()))?;
                Ok(format!("{:#x}", pending.tx_hash()))
            }
        })
        .await
    }

    async fn transaction_hash(&self, params: &TransactionParams) -> Result<String, LedgerError> {
        // legacy signatures are deterministic, so this matches the broadcast hash
        let envelope = self
            .build_request(params)?
            .build(&self.wallet)
            .await
            .map_err(|e| LedgerError::TransactionFailed(format!("Signing failed: {}", e)))?;
        Ok(format!("{:#x}", envelope.tx_hash()))
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, LedgerError> {
        let hash = parse_tx_hash(tx_hash)?;

        let receipt = self
            .with_fallback("transaction_receipt", |p| async move {
                p.get_transaction_receipt(hash)
                    .await
                    .map_err(|e| LedgerError::RpcError(format!("Failed to get receipt: {}", e)))
            })
            .await?;

        let Some(receipt) = receipt else {
            return Ok(None);
        };
        let Some(block_number) = receipt.block_number else {
            return Ok(None);
        };

        let head = self.block_number().await?;

        Ok(Some(TxReceipt {
            transaction_hash: format!("{:#x}", receipt.transaction_hash),
            block_number,
            block_hash: receipt.block_hash.map(|h| format!("{h:#x}")),
            gas_used: receipt.gas_used,
            cumulative_gas_used: ReceiptResponse::cumulative_gas_used(&receipt),
            effective_gas_price: receipt.effective_gas_price.to_string(),
            success: receipt.status(),
            confirmations: confirmations(head, block_number),
        }))
    }

    async fn transaction_nonce(&self, tx_hash: &str) -> Result<Option<u64>, LedgerError> {
        let hash = parse_tx_hash(tx_hash)?;

        let tx = self
            .with_fallback("transaction_nonce", |p| async move {
                p.get_transaction_by_hash(hash)
                    .await
                    .map_err(|e| LedgerError::RpcError(e.to_string()))
            })
            .await?;

        Ok(tx.map(|tx| tx.nonce()))
    }

    async fn token_metadata(&self, contract: Address) -> Result<TokenMetadata, LedgerError> {
        self.with_fallback("token_metadata", |p| erc20::read_constants(p, contract))
            .await
    }
}

fn parse_tx_hash(tx_hash: &str) -> Result<TxHash, LedgerError> {
    TxHash::from_str(tx_hash)
        .map_err(|e| LedgerError::InvalidTxHash(format!("{}: {}", tx_hash, e)))
}

/// Number of blocks on top of and including the inclusion block.
pub fn confirmations(head: u64, block_number: u64) -> u64 {
    if head < block_number {
        0
    } else {
        head - block_number + 1
    }
}

/// Create a signer from a private key (hex string, optional 0x prefix).
pub fn create_signer(private_key_hex: &str) -> Result<PrivateKeySigner, LedgerError> {
    let key_bytes = alloy::hex::decode(private_key_hex.trim())
        .map_err(|e| LedgerError::InvalidPrivateKey(e.to_string()))?;

    PrivateKeySigner::from_slice(&key_bytes)
        .map_err(|e| LedgerError::InvalidPrivateKey(e.to_string()))
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid transaction hash: {0}")]
    InvalidTxHash(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// The nonce was already consumed or the replacement was underpriced.
    #[error("Nonce too low: {0}")]
    NonceTooLow(String),

    /// The node already holds this exact transaction.
    #[error("Transaction already known: {0}")]
    AlreadyKnown(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Execution reverted: {0}")]
    Reverted(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Contract error: {0}")]
    ContractError(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
}

impl LedgerError {
    /// Classify a node error message.
    ///
    /// Nodes and client libraries word these differently, so matching is
    /// done on lowercase fragments.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("already known")
            || lower.contains("known transaction")
            || lower.contains("same hash")
        {
            LedgerError::AlreadyKnown(message)
        } else if lower.contains("replacement transaction underpriced")
            || (lower.contains("nonce")
                && (lower.contains("too low")
                    || lower.contains("used")
                    || lower.contains("already")
                    || lower.contains("expired")))
        {
            LedgerError::NonceTooLow(message)
        } else if lower.contains("insufficient funds") {
            LedgerError::InsufficientFunds(message)
        } else if lower.contains("revert") {
            LedgerError::Reverted(message)
        } else {
            LedgerError::RpcError(message)
        }
    }

    /// The transaction's nonce is taken, by this very transaction or another.
    pub fn is_nonce_contention(&self) -> bool {
        matches!(self, LedgerError::NonceTooLow(_) | LedgerError::AlreadyKnown(_))
    }

    /// Unclassified RPC failure that another endpoint may not have.
    pub fn is_transport(&self) -> bool {
        matches!(self, LedgerError::RpcError(_))
    }
}
