// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Short-lived cache of the delegate's gas price.
//!
//! The observed network gas price is multiplied by a configured percentage
//! and kept for a few seconds so bursts of compose calls do not each hit
//! the RPC endpoint.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::client::{LedgerClient, LedgerError};

/// Default TTL for a cached gas price.
pub const DEFAULT_GAS_PRICE_TTL: Duration = Duration::from_secs(15);

struct CachedGasPrice {
    wei: u128,
    fetched_at: Instant,
}

/// Gas price cache with a flat markup.
pub struct GasPriceCache {
    entry: Mutex<Option<CachedGasPrice>>,
    ttl: Duration,
    /// Percentage applied to the observed price (100 = unchanged)
    markup_percent: u32,
}

impl GasPriceCache {
    pub fn new(ttl: Duration, markup_percent: u32) -> Self {
        Self {
            entry: Mutex::new(None),
            ttl,
            markup_percent,
        }
    }

    /// Current gas price in wei, markup applied.
    pub async fn get(&self, ledger: &dyn LedgerClient) -> Result<u128, LedgerError> {
        if let Some(wei) = self.cached() {
            return Ok(wei);
        }

        let observed = ledger.gas_price().await?;
        let wei = apply_markup(observed, self.markup_percent);
        tracing::debug!(observed, wei, "Refreshed gas price");

        if let Ok(mut entry) = self.entry.lock() {
            *entry = Some(CachedGasPrice {
                wei,
                fetched_at: Instant::now(),
            });
        }
        Ok(wei)
    }

    /// Drop the cached value; the next `get` hits the ledger.
    pub fn invalidate(&self) {
        if let Ok(mut entry) = self.entry.lock() {
            *entry = None;
        }
    }

    fn cached(&self) -> Option<u128> {
        let entry = self.entry.lock().ok()?;
        entry
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| cached.wei)
    }
}

fn apply_markup(wei: u128, percent: u32) -> u128 {
    wei.saturating_mul(u128::from(percent)) / 100
}
