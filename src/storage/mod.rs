// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Request Storage
//!
//! Persistent storage for delegate requests using an embedded redb database
//! under `DATA_DIR`.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   requests.redb    # Delegate requests and their indexes
//! ```
//!
//! The store enforces id uniqueness, maintains the creation-order and
//! status/signer indexes, and offers an atomic compare-and-swap. Lifecycle
//! rules live in the relay layer.

pub mod request;
pub mod request_db;

pub use request::{DelegateRequest, RequestStatus};
pub use request_db::{
    PendingCap, QueuedRequest, RequestDatabase, RequestDbError, RequestDbResult, UpdateOutcome,
};

/// File name of the request database inside the data directory.
pub const REQUEST_DB_FILE: &str = "requests.redb";
