// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Price Oracle Cache
//!
//! Prices are read from public JSON endpoints. Each source names the URL, a
//! JSON pointer to the price inside the response and how long a fetched
//! value stays fresh. Sources are tried in order; a failing source is
//! logged and the next one is tried.
//!
//! Two lookups are offered:
//! - [`PriceOracle::get_price`] for the native coin price, which degrades to
//!   [`PRICE_UNAVAILABLE`] when every source fails. A huge native price
//!   makes fees safely high.
//! - [`PriceOracle::try_get_price`] for token quote feeds, which fails
//!   instead. A huge quote would make the fee unsafely low.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};

/// Returned by [`PriceOracle::get_price`] when no source answers.
pub const PRICE_UNAVAILABLE: f64 = 1e9;

/// Default time-to-live of a fetched price.
pub const DEFAULT_PRICE_TTL_SECONDS: u64 = 300;

const CACHE_CAPACITY: usize = 256;

/// Errors from the price oracle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OracleError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("No price at {pointer} in response from {url}")]
    MissingValue { url: String, pointer: String },

    #[error("Invalid price {value} from {url}")]
    InvalidValue { url: String, value: String },

    #[error("All price sources failed")]
    AllSourcesFailed,
}

/// A price endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSource {
    pub url: String,
    /// JSON pointer (RFC 6901) to the price, e.g. `/result/ethusd`
    pub pointer: String,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_ttl_seconds() -> u64 {
    DEFAULT_PRICE_TTL_SECONDS
}

impl PriceSource {
    pub fn new(url: impl Into<String>, pointer: impl Into<String>, ttl_seconds: u64) -> Self {
        Self {
            url: url.into(),
            pointer: pointer.into(),
            ttl_seconds,
        }
    }

    fn cache_key(&self) -> String {
        format!("{}#{}", self.url, self.pointer)
    }
}

/// Default ETH/USD sources.
pub fn default_native_sources() -> Vec<PriceSource> {
    vec![
        PriceSource::new(
            "https://api.coinmarketcap.com/v1/ticker/ethereum/",
            "/0/price_usd",
            DEFAULT_PRICE_TTL_SECONDS,
        ),
        PriceSource::new(
            "https://api.etherscan.io/api?module=stats&action=ethprice",
            "/result/ethusd",
            DEFAULT_PRICE_TTL_SECONDS,
        ),
    ]
}

// =============================================================================
// Fetching
// =============================================================================

/// Fetches a JSON document.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, OracleError>;
}

/// reqwest-backed fetcher.
pub struct HttpJsonFetcher {
    client: reqwest::Client,
}

impl HttpJsonFetcher {
    pub fn new(timeout: Duration) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl JsonFetcher for HttpJsonFetcher {
    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, OracleError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| OracleError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OracleError::Http(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        response
            .json()
            .await
            .map_err(|e| OracleError::Http(e.to_string()))
    }
}

/// Pull a positive, finite price out of a JSON document.
pub fn extract_price(
    document: &serde_json::Value,
    source: &PriceSource,
) -> Result<f64, OracleError> {
    let raw = document
        .pointer(&source.pointer)
        .ok_or_else(|| OracleError::MissingValue {
            url: source.url.clone(),
            pointer: source.pointer.clone(),
        })?;

    let value = match raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match value {
        Some(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(OracleError::InvalidValue {
            url: source.url.clone(),
            value: raw.to_string(),
        }),
    }
}

// =============================================================================
// Cache
// =============================================================================

/// Cached price for one source.
#[derive(Debug, Clone)]
pub struct PriceCacheEntry {
    pub url: String,
    pub cached_at: Instant,
    pub value: f64,
}

/// Price lookups with a per-source TTL cache.
pub struct PriceOracle {
    fetcher: Arc<dyn JsonFetcher>,
    native_sources: Vec<PriceSource>,
    cache: Mutex<LruCache<String, PriceCacheEntry>>,
}

impl PriceOracle {
    pub fn new(fetcher: Arc<dyn JsonFetcher>, native_sources: Vec<PriceSource>) -> Self {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            fetcher,
            native_sources,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Native coin price, or [`PRICE_UNAVAILABLE`] when every source fails.
    pub async fn get_price(&self) -> f64 {
        match self.try_get_price(&self.native_sources).await {
            Ok(price) => price,
            Err(e) => {
                tracing::error!(error = %e, sentinel = PRICE_UNAVAILABLE, "Price oracle unavailable");
                PRICE_UNAVAILABLE
            }
        }
    }

    /// First price any of `sources` yields.
    pub async fn try_get_price(&self, sources: &[PriceSource]) -> Result<f64, OracleError> {
        for source in sources {
            if let Some(value) = self.cached(source) {
                return Ok(value);
            }

            let fetched = match self.fetcher.fetch_json(&source.url).await {
                Ok(document) => extract_price(&document, source),
                Err(e) => Err(e),
            };

            match fetched {
                Ok(value) => {
                    self.store(source, value);
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(url = %source.url, error = %e, "Price source failed");
                }
            }
        }
        Err(OracleError::AllSourcesFailed)
    }

    /// Drop every cached price.
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn cached(&self, source: &PriceSource) -> Option<f64> {
        let key = source.cache_key();
        let ttl = Duration::from_secs(source.ttl_seconds);
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(&key) {
            if entry.cached_at.elapsed() < ttl {
                return Some(entry.value);
            }
            cache.pop(&key);
        }
        None
    }

    fn store(&self, source: &PriceSource, value: f64) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                source.cache_key(),
                PriceCacheEntry {
                    url: source.url.clone(),
                    cached_at: Instant::now(),
                    value,
                },
            );
        }
    }
}
