// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Scripted in-memory ledger for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use alloy::primitives::{keccak256, Address};
use async_trait::async_trait;

use super::client::{LedgerClient, LedgerError};
use super::types::*;

pub const MOCK_CHAIN_ID: u64 = 1337;

#[derive(Default)]
struct MockState {
    transaction_count: u64,
    block_number: u64,
    gas_price: u128,
    gas_price_calls: usize,
    estimate: Option<Result<u64, LedgerError>>,
    estimate_calls: Vec<CallRequest>,
    /// Nonces the network already has, mapped to the hash that took them
    used_nonces: HashMap<u64, String>,
    known_hashes: HashSet<String>,
    send_failures: VecDeque<LedgerError>,
    sent: Vec<TransactionParams>,
    receipts: HashMap<String, TxReceipt>,
    nonce_overrides: HashMap<String, u64>,
    tokens: HashMap<Address, TokenMetadata>,
    fail_reads: bool,
}

/// Ledger that records submissions and answers from scripted state.
///
/// Submitting a nonce that is already taken answers "nonce too low", and
/// resubmitting identical parameters answers "already known", the way a
/// node does.
pub struct MockLedger {
    delegate: Address,
    state: Mutex<MockState>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::with_delegate(Address::repeat_byte(0xde))
    }

    pub fn with_delegate(delegate: Address) -> Self {
        Self {
            delegate,
            state: Mutex::new(MockState {
                gas_price: 20_000_000_000,
                estimate: Some(Ok(60_000)),
                block_number: 100,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn set_transaction_count(&self, count: u64) {
        self.state().transaction_count = count;
    }

    pub fn set_block_number(&self, block: u64) {
        self.state().block_number = block;
    }

    pub fn set_gas_price(&self, wei: u128) {
        self.state().gas_price = wei;
    }

    pub fn gas_price_calls(&self) -> usize {
        self.state().gas_price_calls
    }

    pub fn set_estimate(&self, result: Result<u64, LedgerError>) {
        self.state().estimate = Some(result);
    }

    pub fn estimate_calls(&self) -> Vec<CallRequest> {
        self.state().estimate_calls.clone()
    }

    /// Mark a nonce as consumed by a transaction this relay never saw.
    pub fn occupy_nonce(&self, nonce: u64) {
        self.state()
            .used_nonces
            .insert(nonce, format!("0xexternal{nonce}"));
    }

    /// Fail the next submission with `error`, before any nonce check.
    pub fn fail_next_send(&self, error: LedgerError) {
        self.state().send_failures.push_back(error);
    }

    pub fn sent(&self) -> Vec<TransactionParams> {
        self.state().sent.clone()
    }

    /// Include `tx_hash` in block `block`.
    pub fn mine(&self, tx_hash: &str, block: u64) {
        let receipt = TxReceipt {
            transaction_hash: tx_hash.to_string(),
            block_number: block,
            block_hash: Some(format!("{:#x}", keccak256(block.to_be_bytes()))),
            gas_used: 55_000,
            cumulative_gas_used: 155_000,
            effective_gas_price: "20000000000".to_string(),
            success: true,
            confirmations: 0,
        };
        self.state().receipts.insert(tx_hash.to_string(), receipt);
    }

    pub fn set_transaction_nonce(&self, tx_hash: &str, nonce: u64) {
        self.state()
            .nonce_overrides
            .insert(tx_hash.to_string(), nonce);
    }

    pub fn set_token(&self, contract: Address, symbol: &str, decimals: u8) {
        self.state().tokens.insert(
            contract,
            TokenMetadata {
                symbol: symbol.to_string(),
                decimals,
            },
        );
    }

    /// Make read calls (block number, receipts, token constants) fail with an RPC error.
    pub fn fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }

    /// Deterministic hash of the parameters, like a signed transaction.
    pub fn hash_of(params: &TransactionParams) -> String {
        let encoded = serde_json::to_vec(params).unwrap();
        format!("{:#x}", keccak256(encoded))
    }

    fn read_guard(&self) -> Result<(), LedgerError> {
        if self.state().fail_reads {
            return Err(LedgerError::RpcError("connection refused".to_string()));
        }
        Ok(())
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn chain_id(&self) -> u64 {
        MOCK_CHAIN_ID
    }

    fn delegate_address(&self) -> Address {
        self.delegate
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        self.read_guard()?;
        Ok(self.state().block_number)
    }

    async fn transaction_count(&self, _address: Address) -> Result<u64, LedgerError> {
        self.read_guard()?;
        Ok(self.state().transaction_count)
    }

    async fn gas_price(&self) -> Result<u128, LedgerError> {
        let mut state = self.state();
        state.gas_price_calls += 1;
        Ok(state.gas_price)
    }

    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, LedgerError> {
        let mut state = self.state();
        state.estimate_calls.push(call.clone());
        state.estimate.clone().unwrap_or(Ok(21_000))
    }

    async fn send_transaction(&self, params: &TransactionParams) -> Result<String, LedgerError> {
        let mut state = self.state();
        if let Some(error) = state.send_failures.pop_front() {
            return Err(error);
        }

        let hash = Self::hash_of(params);
        if state.known_hashes.contains(&hash) {
            return Err(LedgerError::AlreadyKnown("already known".to_string()));
        }
        if state.used_nonces.contains_key(&params.nonce) {
            return Err(LedgerError::NonceTooLow("nonce too low".to_string()));
        }

        state.used_nonces.insert(params.nonce, hash.clone());
        state.known_hashes.insert(hash.clone());
        state.sent.push(params.clone());
        if state.transaction_count <= params.nonce {
            state.transaction_count = params.nonce + 1;
        }
        Ok(hash)
    }

    async fn transaction_hash(&self, params: &TransactionParams) -> Result<String, LedgerError> {
        Ok(Self::hash_of(params))
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, LedgerError> {
        self.read_guard()?;
        let state = self.state();
        Ok(state.receipts.get(tx_hash).map(|receipt| {
            let mut receipt = receipt.clone();
            receipt.confirmations =
                super::client::confirmations(state.block_number, receipt.block_number);
            receipt
        }))
    }

    async fn transaction_nonce(&self, tx_hash: &str) -> Result<Option<u64>, LedgerError> {
        self.read_guard()?;
        let state = self.state();
        if let Some(nonce) = state.nonce_overrides.get(tx_hash) {
            return Ok(Some(*nonce));
        }
        Ok(state
            .used_nonces
            .iter()
            .find(|(_, hash)| hash.as_str() == tx_hash)
            .map(|(nonce, _)| *nonce))
    }

    async fn token_metadata(&self, contract: Address) -> Result<TokenMetadata, LedgerError> {
        self.read_guard()?;
        self.state()
            .tokens
            .get(&contract)
            .cloned()
            .ok_or_else(|| LedgerError::ContractError(format!("no token at {contract}")))
    }
}
