// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request confirmation.
//!
//! Checks a user's signature submission against the composed request, dry
//! runs the forwarding call from the delegate account and promotes the
//! request from `new` to `confirmed`. The promotion and the signer's
//! pending-cap check happen in one store write, so racing confirmations
//! neither double-confirm a request nor overshoot the cap.

use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::Address;
use chrono::Utc;

use super::error::RelayError;
use super::PENDING_STATUSES;
use crate::blockchain::{CallRequest, LedgerClient};
use crate::manifest::{ManifestRegistry, SignatureStandard, SubmittedSignature};
use crate::storage::{DelegateRequest, PendingCap, RequestDatabase, RequestStatus, UpdateOutcome};

pub struct ConfirmationHandler {
    registry: Arc<ManifestRegistry>,
    db: Arc<RequestDatabase>,
    ledger: Arc<dyn LedgerClient>,
    max_pending_per_account: usize,
}

impl ConfirmationHandler {
    pub fn new(
        registry: Arc<ManifestRegistry>,
        db: Arc<RequestDatabase>,
        ledger: Arc<dyn LedgerClient>,
        max_pending_per_account: usize,
    ) -> Self {
        Self {
            registry,
            db,
            ledger,
            max_pending_per_account,
        }
    }

    pub async fn confirm(
        &self,
        request_id: &str,
        signature_standard: &str,
        signature: &str,
    ) -> Result<DelegateRequest, RelayError> {
        if !is_hex_signature(signature) {
            return Err(RelayError::InvalidSignature(signature.to_string()));
        }

        let request = self
            .db
            .find_active(request_id, Utc::now())?
            .ok_or_else(|| RelayError::NotFoundOrExpired(request_id.to_string()))?;

        if request.signature_options.is_empty() || request.status != RequestStatus::New {
            return Err(RelayError::AlreadyConfirmed(request.id));
        }

        let standard = SignatureStandard::from_str(signature_standard)
            .ok()
            .filter(|s| request.offers(*s))
            .ok_or_else(|| RelayError::UnsupportedSignatureStandard {
                id: request.id.clone(),
                standard: signature_standard.to_string(),
            })?;

        let broken = |reason: String| RelayError::BrokenContext {
            id: request.id.clone(),
            reason,
        };
        let context = &request.context;
        let entry = self
            .registry
            .resolve(&context.contract.address)
            .map_err(|e| broken(e.to_string()))?;
        let function = entry.function(&context.function_name).ok_or_else(|| {
            broken(format!(
                "function `{}` is not delegatable anymore",
                context.function_name
            ))
        })?;

        let forwarding_arguments = function
            .strategy
            .forwarding_arguments(
                context,
                &SubmittedSignature {
                    standard,
                    signature: signature.to_string(),
                },
            )
            .map_err(|e| broken(e.to_string()))?;
        let delegated = function.strategy.delegated();
        let data = delegated
            .encode_call(&forwarding_arguments)
            .map_err(|e| broken(e.to_string()))?;
        let contract =
            Address::from_str(&context.contract.address).map_err(|e| broken(e.to_string()))?;

        let estimate = self
            .ledger
            .estimate_gas(&CallRequest {
                from: self.ledger.delegate_address(),
                to: contract,
                data,
            })
            .await
            .map_err(|e| RelayError::EstimationFailed(e.to_string()))?;
        if let Some(limit) = context.gas_limit {
            if estimate > limit {
                return Err(RelayError::GasLimitExceeded { estimate, limit });
            }
        }

        let limit = entry.pending_cap(self.max_pending_per_account);
        let pending = self.db.count_by_signer(&request.signer, PENDING_STATUSES)?;
        if pending >= limit {
            return Err(RelayError::TooManyPendingTransactions {
                signer: request.signer.clone(),
                pending,
                limit,
            });
        }

        let delegated_name = delegated.name().to_string();
        let outcome = self.db.compare_and_update(
            &request.id,
            RequestStatus::New,
            Some(PendingCap {
                statuses: PENDING_STATUSES,
                limit,
            }),
            |r| {
                r.status = RequestStatus::Confirmed;
                r.signature = Some(signature.to_string());
                r.signature_standard = Some(standard);
                r.delegated_function_name = Some(delegated_name);
                r.delegated_function_arguments = forwarding_arguments;
            },
        )?;

        match outcome {
            UpdateOutcome::Updated(confirmed) => {
                tracing::info!(
                    request_id = %confirmed.id,
                    signer = %confirmed.signer,
                    standard = %standard,
                    gas_estimate = estimate,
                    "Request confirmed"
                );
                Ok(confirmed)
            }
            UpdateOutcome::NotFound => Err(RelayError::NotFoundOrExpired(request.id)),
            UpdateOutcome::StatusMismatch(_) => Err(RelayError::AlreadyConfirmed(request.id)),
            UpdateOutcome::PendingLimitReached(pending) => {
                Err(RelayError::TooManyPendingTransactions {
                    signer: request.signer,
                    pending,
                    limit,
                })
            }
        }
    }
}

fn is_hex_signature(signature: &str) -> bool {
    signature
        .strip_prefix("0x")
        .is_some_and(|hex| !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()))
}
