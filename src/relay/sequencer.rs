// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Nonce Sequencer
//!
//! Single writer of the delegate account's nonces. One cycle walks the
//! requests created since the last mined one, in creation order:
//!
//! ```text
//!   [mined] -> [mined] -> [mining] -> [mining] -> [confirmed] -> [confirmed]
//!    nonce 3    nonce 4    poll        poll        publish 7      publish 8
//! ```
//!
//! - `mined` requests only move the next nonce past their own
//! - `mining` requests are polled for a receipt, republished when stuck,
//!   and marked `mined` once deep enough; those published by another
//!   delegate key are polled but leave the next nonce alone
//! - `confirmed` requests are published at the next nonce
//!
//! Every cycle derives its starting nonce from persisted state, so a
//! crashed or skipped cycle is repaired by the next one.
//!
//! Only one cycle runs at a time in a process. Running two relay processes
//! on the same delegate key is not supported; the database file lock keeps
//! two processes off the same store.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use super::error::RelayError;
use super::RelaySettings;
use crate::blockchain::{LedgerClient, LedgerError, TransactionParams};
use crate::manifest::rules::DEFAULT_GAS_LIMIT;
use crate::manifest::ManifestRegistry;
use crate::storage::{DelegateRequest, QueuedRequest, RequestDatabase, RequestStatus, UpdateOutcome};

/// Failure reason recorded when the delegate cannot pay for gas.
pub const NO_FUNDS_REASON: &str = "Delegate account has no Ether on its balance";

const QUEUE_STATUSES: &[RequestStatus] = &[
    RequestStatus::Confirmed,
    RequestStatus::Mining,
    RequestStatus::Mined,
];

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub queued: usize,
    pub published: usize,
    pub republished: usize,
    pub mined: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Nonce the next publish would use
    pub next_nonce: u64,
}

pub struct NonceSequencer {
    registry: Arc<ManifestRegistry>,
    db: Arc<RequestDatabase>,
    ledger: Arc<dyn LedgerClient>,
    required_confirmations: u64,
    republish_after: Duration,
    max_nonce_retries: u32,
    cycle_lock: Mutex<()>,
}

impl NonceSequencer {
    pub fn new(
        registry: Arc<ManifestRegistry>,
        db: Arc<RequestDatabase>,
        ledger: Arc<dyn LedgerClient>,
        settings: &RelaySettings,
    ) -> Self {
        Self {
            registry,
            db,
            ledger,
            required_confirmations: settings.required_confirmations,
            republish_after: settings.republish_after,
            max_nonce_retries: settings.max_nonce_retries,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Run one cycle. Waits for a cycle already in progress to finish.
    pub async fn sync_and_publish(&self) -> Result<CycleReport, RelayError> {
        let _cycle = self.cycle_lock.lock().await;
        let delegate = self.ledger.delegate_address();

        // Step 1: starting nonce
        let last_mined = self.db.last_with_status(RequestStatus::Mined)?;
        let (from_sequence, mut next_nonce) = match last_mined {
            Some((sequence, last)) => match last.nonce {
                Some(nonce) if published_by(&last, delegate) => (sequence, nonce + 1),
                _ => (sequence, self.ledger.transaction_count(delegate).await?),
            },
            None => (0, self.ledger.transaction_count(delegate).await?),
        };
        tracing::debug!(next_nonce, from_sequence, "Sync and publish started");

        // Step 2: queue
        let queue = self.db.queue_from(from_sequence, QUEUE_STATUSES)?;
        let mut report = CycleReport {
            queued: queue.len(),
            ..Default::default()
        };

        // Step 3: walk
        for entry in queue {
            let request = match entry {
                QueuedRequest::Known { request, .. } => request,
                QueuedRequest::Unreadable { sequence, id, reason } => {
                    tracing::warn!(request_id = %id, sequence, reason = %reason, "Skipping unreadable request");
                    report.skipped += 1;
                    continue;
                }
            };

            match request.status {
                RequestStatus::Mined => match request.nonce {
                    Some(nonce) if published_by(&request, delegate) => next_nonce = nonce + 1,
                    // another delegate's nonce sequence
                    Some(_) => {}
                    None => {
                        tracing::warn!(request_id = %request.id, "Mined request has no nonce");
                        report.skipped += 1;
                    }
                },
                RequestStatus::Mining => {
                    self.poll(&request, delegate, &mut next_nonce, &mut report)
                        .await;
                }
                RequestStatus::Confirmed => {
                    self.publish(&request, delegate, &mut next_nonce, &mut report)
                        .await;
                }
                other => {
                    tracing::warn!(request_id = %request.id, status = other.name(), "Unexpected status in queue, skipped");
                    report.skipped += 1;
                }
            }
        }

        report.next_nonce = next_nonce;
        tracing::info!(
            queued = report.queued,
            published = report.published,
            republished = report.republished,
            mined = report.mined,
            failed = report.failed,
            skipped = report.skipped,
            next_nonce = report.next_nonce,
            "Sync and publish finished"
        );
        Ok(report)
    }

    // =========================================================================
    // Mining
    // =========================================================================

    async fn poll(
        &self,
        request: &DelegateRequest,
        delegate: Address,
        next_nonce: &mut u64,
        report: &mut CycleReport,
    ) {
        // another delegate's transactions are tracked but never advance our nonce
        let mut foreign_nonce = *next_nonce;
        let next_nonce = if published_by(request, delegate) {
            next_nonce
        } else {
            &mut foreign_nonce
        };

        let Some(tx_hash) = request.transaction_hash.as_deref() else {
            tracing::warn!(request_id = %request.id, "Mining request has no transaction hash");
            report.skipped += 1;
            *next_nonce += 1;
            return;
        };

        let receipt = match self.ledger.transaction_receipt(tx_hash).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!(request_id = %request.id, tx_hash, error = %e, "Receipt poll failed");
                report.skipped += 1;
                *next_nonce += 1;
                return;
            }
        };

        let Some(receipt) = receipt else {
            if self.republish(request, delegate).await {
                report.republished += 1;
            }
            *next_nonce += 1;
            return;
        };

        if receipt.confirmations < self.required_confirmations {
            tracing::debug!(
                request_id = %request.id,
                tx_hash,
                confirmations = receipt.confirmations,
                "Waiting for confirmations"
            );
            *next_nonce = request.nonce.map_or(*next_nonce + 1, |n| n + 1);
            return;
        }

        let nonce = match self.ledger.transaction_nonce(tx_hash).await {
            Ok(Some(nonce)) => nonce,
            Ok(None) => match request.nonce {
                Some(nonce) => nonce,
                None => {
                    tracing::warn!(request_id = %request.id, tx_hash, "Mined transaction nonce unknown");
                    report.skipped += 1;
                    *next_nonce += 1;
                    return;
                }
            },
            Err(e) => {
                tracing::warn!(request_id = %request.id, tx_hash, error = %e, "Transaction lookup failed");
                report.skipped += 1;
                *next_nonce += 1;
                return;
            }
        };
        if !receipt.success {
            tracing::warn!(request_id = %request.id, tx_hash, "Transaction mined but reverted");
        }

        let outcome = self.db.compare_and_update(&request.id, RequestStatus::Mining, None, |r| {
            r.status = RequestStatus::Mined;
            r.nonce = Some(nonce);
            r.tx_receipt = Some(receipt);
        });
        match outcome {
            Ok(UpdateOutcome::Updated(_)) => {
                tracing::info!(request_id = %request.id, tx_hash, nonce, "Transaction mined");
                report.mined += 1;
            }
            Ok(other) => {
                tracing::warn!(request_id = %request.id, outcome = ?other, "Request changed while polling");
                report.skipped += 1;
            }
            Err(e) => {
                tracing::error!(request_id = %request.id, error = %e, "Failed to record mined transaction");
                report.skipped += 1;
            }
        }
        *next_nonce = nonce + 1;
    }

    /// Broadcast the recorded transaction again. Signing is deterministic,
    /// so this never creates a second transaction for the nonce.
    async fn republish(&self, request: &DelegateRequest, delegate: Address) -> bool {
        if !published_by(request, delegate) {
            return false;
        }
        let Some(params) = request.last_published_transaction_params.as_ref() else {
            return false;
        };
        let last_attempt = match (request.published_at, request.republished_at) {
            (Some(published), Some(republished)) => Some(published.max(republished)),
            (published, republished) => published.or(republished),
        };
        let now = Utc::now();
        if !elapsed_at_least(last_attempt, now, self.republish_after) {
            return false;
        }

        match self.ledger.send_transaction(params).await {
            Ok(_) => {}
            Err(e) if e.is_nonce_contention() => {
                tracing::debug!(request_id = %request.id, error = %e, "Republish already known to the node");
            }
            Err(e) => {
                tracing::warn!(request_id = %request.id, error = %e, "Republish failed");
                return false;
            }
        }

        if let Err(e) = self.db.compare_and_update(&request.id, RequestStatus::Mining, None, |r| {
            r.republished_at = Some(now);
        }) {
            tracing::warn!(request_id = %request.id, error = %e, "Failed to record republish time");
        }
        tracing::info!(
            request_id = %request.id,
            nonce = params.nonce,
            tx_hash = request.transaction_hash.as_deref().unwrap_or_default(),
            "Transaction republished"
        );
        true
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    async fn publish(
        &self,
        request: &DelegateRequest,
        delegate: Address,
        next_nonce: &mut u64,
        report: &mut CycleReport,
    ) {
        let data = match self.forwarding_calldata(request) {
            Ok(data) => data,
            Err(reason) => {
                self.mark_failed(request, format!("Transaction error when publishing: {reason}"), report);
                return;
            }
        };

        let mut params = TransactionParams {
            chain_id: self.ledger.chain_id(),
            data,
            gas_limit: request.context.gas_limit.unwrap_or(DEFAULT_GAS_LIMIT),
            gas_price: request.context.gas_price.clone(),
            nonce: *next_nonce,
            to: request.context.contract.address.clone(),
            value: "0".to_string(),
        };

        let mut retries = 0;
        let sent = loop {
            match self.ledger.send_transaction(&params).await {
                Ok(tx_hash) => break Ok(tx_hash),
                // the node already holds this exact transaction at this nonce
                Err(LedgerError::AlreadyKnown(_)) => match self.ledger.transaction_hash(&params).await {
                    Ok(tx_hash) => break Ok(tx_hash),
                    Err(e) => {
                        tracing::error!(request_id = %request.id, nonce = params.nonce, error = %e, "Cannot hash already known transaction");
                        report.skipped += 1;
                        return;
                    }
                },
                Err(e @ LedgerError::NonceTooLow(_)) => {
                    if retries >= self.max_nonce_retries {
                        break Err(e);
                    }
                    tracing::info!(request_id = %request.id, nonce = params.nonce, "Nonce taken, trying the next one");
                    retries += 1;
                    params.nonce += 1;
                }
                Err(e) => break Err(e),
            }
        };

        match sent {
            Ok(tx_hash) => {
                let nonce = params.nonce;
                let publisher = delegate.to_checksum(None);
                let now = Utc::now();
                let outcome = self.db.compare_and_update(
                    &request.id,
                    RequestStatus::Confirmed,
                    None,
                    |r| {
                        r.status = RequestStatus::Mining;
                        r.transaction_hash = Some(tx_hash.clone());
                        r.nonce = Some(nonce);
                        r.published_by = Some(publisher);
                        r.published_at = Some(now);
                        r.last_published_transaction_params = Some(params);
                    },
                );
                match outcome {
                    Ok(UpdateOutcome::Updated(_)) => {
                        tracing::info!(request_id = %request.id, tx_hash = %tx_hash, nonce, "Transaction published");
                        report.published += 1;
                    }
                    Ok(other) => {
                        tracing::error!(request_id = %request.id, tx_hash = %tx_hash, outcome = ?other, "Published request changed concurrently");
                        report.skipped += 1;
                    }
                    Err(e) => {
                        tracing::error!(request_id = %request.id, tx_hash = %tx_hash, error = %e, "Failed to record published transaction");
                        report.skipped += 1;
                    }
                }
                // the nonce is spent on the ledger either way
                *next_nonce = nonce + 1;
            }
            Err(LedgerError::NonceTooLow(_)) => {
                tracing::warn!(
                    request_id = %request.id,
                    retries,
                    "Nonce retries exhausted, leaving request for the next cycle"
                );
                report.skipped += 1;
            }
            Err(e) => self.mark_failed(request, failure_reason(&e), report),
        }
    }

    fn forwarding_calldata(&self, request: &DelegateRequest) -> Result<String, String> {
        let context = &request.context;
        let entry = self
            .registry
            .resolve(&context.contract.address)
            .map_err(|e| e.to_string())?;
        let function = entry
            .function(&context.function_name)
            .ok_or_else(|| format!("function `{}` is not delegatable", context.function_name))?;
        let delegated = function.strategy.delegated();
        if request.delegated_function_name.as_deref() != Some(delegated.name()) {
            return Err(format!(
                "request was confirmed for {:?}, manifest forwards to {}",
                request.delegated_function_name,
                delegated.name()
            ));
        }
        let data = delegated
            .encode_call(&request.delegated_function_arguments)
            .map_err(|e| e.to_string())?;
        Ok(format!("0x{}", alloy::hex::encode(data)))
    }

    fn mark_failed(&self, request: &DelegateRequest, reason: String, report: &mut CycleReport) {
        let outcome = self.db.compare_and_update(&request.id, RequestStatus::Confirmed, None, |r| {
            r.status = RequestStatus::Failed;
            r.reason = Some(reason.clone());
        });
        match outcome {
            Ok(UpdateOutcome::Updated(_)) => {
                tracing::warn!(request_id = %request.id, reason = %reason, "Request failed");
                report.failed += 1;
            }
            Ok(other) => {
                tracing::warn!(request_id = %request.id, outcome = ?other, "Request changed before it could be failed");
                report.skipped += 1;
            }
            Err(e) => {
                tracing::error!(request_id = %request.id, error = %e, "Failed to record failure");
                report.skipped += 1;
            }
        }
    }
}

fn published_by(request: &DelegateRequest, delegate: Address) -> bool {
    request
        .published_by
        .as_deref()
        .and_then(|p| Address::from_str(p).ok())
        .is_some_and(|p| p == delegate)
}

fn elapsed_at_least(since: Option<DateTime<Utc>>, now: DateTime<Utc>, threshold: Duration) -> bool {
    let Some(since) = since else {
        return true;
    };
    match (now - since).to_std() {
        Ok(elapsed) => elapsed >= threshold,
        // clock went backwards
        Err(_) => threshold.is_zero(),
    }
}

fn failure_reason(error: &LedgerError) -> String {
    match error {
        LedgerError::InsufficientFunds(_) => NO_FUNDS_REASON.to_string(),
        other => format!("Transaction error when publishing: {other}"),
    }
}
