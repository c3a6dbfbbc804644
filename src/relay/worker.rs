// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Relay Worker
//!
//! Background task running [`NonceSequencer::sync_and_publish`] every
//! `SYNC_INTERVAL_SECONDS` (default 10 s).
//!
//! ## Failure handling
//!
//! A cycle that errors or panics is logged and the next one runs on
//! schedule. Each cycle runs in its own task so a panic cannot take the
//! loop down with it.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`. Cancellation is observed
//! between cycles only; a running cycle always completes.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::sequencer::NonceSequencer;

/// Default interval between cycles.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Periodic driver of the nonce sequencer.
pub struct RelayWorker {
    sequencer: Arc<NonceSequencer>,
    interval: Duration,
}

impl RelayWorker {
    pub fn new(sequencer: Arc<NonceSequencer>, interval: Duration) -> Self {
        Self {
            sequencer,
            interval,
        }
    }

    /// Run cycles until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(worker.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Relay worker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Relay worker shutting down");
                return;
            }

            self.cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Relay worker shutting down");
                    return;
                }
            }
        }
    }

    /// One sync-and-publish cycle, isolated in its own task.
    async fn cycle(&self) {
        let sequencer = self.sequencer.clone();
        let handle = tokio::spawn(async move { sequencer.sync_and_publish().await });

        match handle.await {
            Ok(Ok(_report)) => {}
            Ok(Err(e)) => warn!(error = %e, "Relay cycle failed"),
            Err(e) if e.is_panic() => error!("Relay cycle panicked"),
            Err(e) => warn!(error = %e, "Relay cycle task cancelled"),
        }
    }
}
