// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Delegated Transaction Relay - Gasless Meta-Transaction Service
//!
//! Users sign an off-chain message authorizing a token call; a single
//! delegate account publishes the forwarding call on-chain, pays the gas and
//! collects a fee in the token.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `blockchain` - EVM ledger integration
//! - `manifest` - Per-contract delegation rules
//! - `oracle` - Cached price feeds
//! - `relay` - Composing, confirming and publishing requests
//! - `storage` - Request persistence (redb)

pub mod api;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod manifest;
pub mod metadata;
pub mod models;
pub mod oracle;
pub mod relay;
pub mod state;
pub mod storage;
#[cfg(test)]
pub mod test_support;
