// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Delegate request document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{TransactionParams, TxReceipt};
use crate::manifest::context::{FeeItem, RequestContext, SignatureOption, SignatureStandard};

/// Request lifecycle status.
///
/// Ordinals are persisted in the status index and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Composed, waiting for the user's signature
    New,
    /// Signed and validated, waiting to be published
    Confirmed,
    /// Published, waiting for enough confirmations
    Mining,
    /// Included with enough confirmations
    Mined,
    /// Publishing failed; not retried
    Failed,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 5] = [
        RequestStatus::New,
        RequestStatus::Confirmed,
        RequestStatus::Mining,
        RequestStatus::Mined,
        RequestStatus::Failed,
    ];

    pub fn ordinal(self) -> u8 {
        match self {
            RequestStatus::New => 0,
            RequestStatus::Confirmed => 1,
            RequestStatus::Mining => 2,
            RequestStatus::Mined => 3,
            RequestStatus::Failed => 4,
        }
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.ordinal() == ordinal)
    }

    pub fn name(self) -> &'static str {
        match self {
            RequestStatus::New => "new",
            RequestStatus::Confirmed => "confirmed",
            RequestStatus::Mining => "mining",
            RequestStatus::Mined => "mined",
            RequestStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Mined | RequestStatus::Failed)
    }

    /// Allowed lifecycle edges. `Mining -> Mining` covers republishing.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (New, Confirmed)
                | (Confirmed, Mining)
                | (Confirmed, Failed)
                | (Mining, Mining)
                | (Mining, Mined)
                | (Mining, Failed)
        )
    }
}

/// A delegated call, from composition to its final ledger outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateRequest {
    pub id: String,
    pub status: RequestStatus,
    /// End-user address (lowercase)
    pub signer: String,
    pub context: RequestContext,
    pub signature_options: Vec<SignatureOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fees: Option<Vec<FeeItem>>,

    // Set by confirmation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_standard: Option<SignatureStandard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_function_name: Option<String>,
    #[serde(default)]
    pub delegated_function_arguments: Vec<String>,

    // Set by the sequencer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub republished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_published_transaction_params: Option<TransactionParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_receipt: Option<TxReceipt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub request_expires_at: DateTime<Utc>,
}

impl DelegateRequest {
    /// Create a freshly composed request in `new` status.
    pub fn new_composed(
        id: String,
        context: RequestContext,
        signature_options: Vec<SignatureOption>,
        fee: Option<String>,
        fees: Option<Vec<FeeItem>>,
        created_at: DateTime<Utc>,
        request_expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: RequestStatus::New,
            signer: context.signer.clone(),
            context,
            signature_options,
            fee,
            fees,
            signature: None,
            signature_standard: None,
            delegated_function_name: None,
            delegated_function_arguments: Vec::new(),
            nonce: None,
            transaction_hash: None,
            published_by: None,
            published_at: None,
            republished_at: None,
            last_published_transaction_params: None,
            tx_receipt: None,
            reason: None,
            created_at,
            updated_at: created_at,
            request_expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.request_expires_at < now
    }

    /// Whether the request offers `standard` among its signature options.
    pub fn offers(&self, standard: SignatureStandard) -> bool {
        self.signature_options.iter().any(|o| o.standard == standard)
    }
}
