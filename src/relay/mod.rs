// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Relay Engine
//!
//! ```text
//!   POST /request ──► RequestComposer ──┐
//!                                       ├──► RequestDatabase ◄── NonceSequencer ◄── RelayWorker
//!   POST /confirm ──► ConfirmationHandler┘                           │
//!                                                                     └──► LedgerClient
//! ```
//!
//! Composer and confirmation run per HTTP call and may run concurrently.
//! The sequencer is the only writer of nonces; the components talk to each
//! other only through persisted request state.

pub mod composer;
pub mod confirmation;
pub mod error;
pub mod sequencer;
pub mod worker;

use std::time::Duration;

pub use composer::{ComposeInput, RequestComposer};
pub use confirmation::ConfirmationHandler;
pub use error::RelayError;
pub use sequencer::{CycleReport, NonceSequencer};
pub use worker::RelayWorker;

use crate::storage::RequestStatus;

/// Statuses counted against a signer's pending cap.
pub const PENDING_STATUSES: &[RequestStatus] = &[RequestStatus::Confirmed, RequestStatus::Mining];

/// Tunables shared by the relay components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// How long a composed request can be confirmed, unless the rule sets
    /// its own deadline
    pub request_ttl: Duration,
    /// Global per-signer cap on pending requests
    pub max_pending_per_account: usize,
    /// Confirmations before a transaction counts as mined
    pub required_confirmations: u64,
    /// Minimum time between publishing a transaction and republishing it
    pub republish_after: Duration,
    /// Nonce increments tried when a publish hits a taken nonce
    pub max_nonce_retries: u32,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            request_ttl: Duration::from_secs(60 * 60),
            max_pending_per_account: 5,
            required_confirmations: 2,
            republish_after: Duration::from_secs(5 * 60),
            max_nonce_retries: 32,
        }
    }
}
