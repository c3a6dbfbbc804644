// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM ledger integration.
//!
//! This module provides:
//! - The [`LedgerClient`] capability used by the relay engine
//! - ERC-20 token introspection
//! - Runtime ABI encoding of delegated calls
//! - Delegate key loading and the gas price cache

pub mod abi;
pub mod client;
pub mod erc20;
pub mod gas_price;
#[cfg(test)]
pub mod mock;
pub mod signing;
pub mod types;

pub use client::{AlloyLedger, LedgerClient, LedgerError};
pub use gas_price::GasPriceCache;
pub use types::*;
