// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::blockchain::{GasPriceCache, LedgerClient};
use crate::manifest::ManifestRegistry;
use crate::metadata::ContractCatalog;
use crate::oracle::PriceOracle;
use crate::relay::{ConfirmationHandler, NonceSequencer, RelaySettings, RequestComposer};
use crate::storage::RequestDatabase;

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    /// Network name reported by discovery
    pub network_name: String,
    pub registry: Arc<ManifestRegistry>,
    pub db: Arc<RequestDatabase>,
    pub ledger: Arc<dyn LedgerClient>,
    pub catalog: Arc<ContractCatalog>,
    pub composer: Arc<RequestComposer>,
    pub confirmation: Arc<ConfirmationHandler>,
    /// Also driven by the background worker
    pub sequencer: Arc<NonceSequencer>,
}

impl AppState {
    pub fn new(
        network_name: impl Into<String>,
        registry: Arc<ManifestRegistry>,
        db: Arc<RequestDatabase>,
        ledger: Arc<dyn LedgerClient>,
        oracle: Arc<PriceOracle>,
        gas_price: Arc<GasPriceCache>,
        settings: &RelaySettings,
    ) -> Self {
        let catalog = Arc::new(ContractCatalog::new());
        let composer = RequestComposer::new(
            registry.clone(),
            db.clone(),
            ledger.clone(),
            oracle,
            gas_price,
            catalog.clone(),
            settings.request_ttl,
        );
        let confirmation = ConfirmationHandler::new(
            registry.clone(),
            db.clone(),
            ledger.clone(),
            settings.max_pending_per_account,
        );
        let sequencer = NonceSequencer::new(registry.clone(), db.clone(), ledger.clone(), settings);

        Self {
            network_name: network_name.into(),
            registry,
            db,
            ledger,
            catalog,
            composer: Arc::new(composer),
            confirmation: Arc::new(confirmation),
            sequencer: Arc::new(sequencer),
        }
    }
}
