// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use delegated_tx_relay::{
    api::router,
    blockchain::{
        gas_price::DEFAULT_GAS_PRICE_TTL, signing::load_delegate_signer, AlloyLedger,
        GasPriceCache, LedgerClient,
    },
    config::{LogFormat, RelayConfig},
    manifest::ManifestRegistry,
    oracle::{HttpJsonFetcher, PriceOracle},
    relay::RelayWorker,
    state::AppState,
    storage::{RequestDatabase, REQUEST_DB_FILE},
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const PRICE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(config.log_format);

    let registry = ManifestRegistry::load(&config.manifest_path).expect("Failed to load manifest");
    if registry.is_empty() {
        tracing::warn!(path = %config.manifest_path.display(), "Manifest lists no contracts");
    }

    std::fs::create_dir_all(&config.data_dir).expect("Failed to create data directory");
    let db = RequestDatabase::open(&config.data_dir.join(REQUEST_DB_FILE))
        .expect("Failed to open request database");

    let signer = load_delegate_signer(
        config.delegate_private_key.as_deref(),
        config.delegate_key_path.as_deref(),
    )
    .expect("Failed to load delegate key");
    let ledger: Arc<dyn LedgerClient> = Arc::new(
        AlloyLedger::new(config.network.clone(), signer).expect("Failed to create ledger client"),
    );

    let fetcher = HttpJsonFetcher::new(PRICE_FETCH_TIMEOUT).expect("Failed to build HTTP client");
    let oracle = PriceOracle::new(Arc::new(fetcher), config.price_sources.clone());
    let gas_price = GasPriceCache::new(DEFAULT_GAS_PRICE_TTL, config.gas_price_markup_percent);

    let state = AppState::new(
        config.network.name.clone(),
        Arc::new(registry),
        Arc::new(db),
        ledger.clone(),
        Arc::new(oracle),
        Arc::new(gas_price),
        &config.relay,
    );

    let shutdown = CancellationToken::new();
    let worker = RelayWorker::new(state.sequencer.clone(), config.sync_interval);
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    let app = router(state, &config.allowed_origins);
    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .expect("Failed to bind address");

    tracing::info!(
        address = %config.bind_address(),
        network = %config.network.name,
        chain_id = config.network.chain_id,
        delegate = %ledger.delegate_address(),
        "Delegated transaction relay listening (docs at /docs)"
    );

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
    {
        tracing::error!(error = %e, "HTTP server failed");
    }

    shutdown.cancel();
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Relay worker ended abnormally");
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Resolves on Ctrl-C or SIGTERM and cancels background work.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
