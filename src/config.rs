// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is read once at startup into a
//! [`RelayConfig`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding `requests.redb` | `./data` |
//! | `NETWORK_NAME` | Network name; known names preset chain ID and RPC | `sepolia` |
//! | `CHAIN_ID` | Chain ID, required for unknown networks | From preset |
//! | `RPC_PROVIDERS` | Comma-separated RPC URLs, tried in order | From preset |
//! | `REQUIRED_CONFIRMATIONS` | Confirmations before a request is mined | `2` |
//! | `MAX_PENDING_TX_PER_ACCOUNT` | Pending requests allowed per signer | `5` |
//! | `REQUEST_EXPIRES_AFTER_SECONDS` | Lifetime of an unconfirmed request | `3600` |
//! | `REPUBLISH_AFTER_SECONDS` | Delay before a stuck transaction is rebroadcast | `300` |
//! | `SYNC_INTERVAL_SECONDS` | Pause between publisher cycles | `10` |
//! | `MAX_NONCE_RETRIES` | Nonce increments tried on contention | `32` |
//! | `GAS_PRICE_MARKUP_PERCENT` | Percentage applied to the network gas price | `100` |
//! | `PRICE_ORACLE_ENDPOINTS` | Comma-separated `url#/json/pointer` native price sources | Built-in list |
//! | `MANIFEST_PATH` | Manifest JSON file | `manifest.json` |
//! | `DELEGATE_PRIVATE_KEY` | Hex private key of the delegate account | One of the two is required |
//! | `DELEGATE_KEY_PATH` | PEM file with the delegate key | One of the two is required |
//! | `ALLOWED_ORIGINS` | Comma-separated CORS origins | Any origin |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::time::Duration;

use crate::blockchain::NetworkConfig;
use crate::oracle::{default_native_sources, PriceSource, DEFAULT_PRICE_TTL_SECONDS};
use crate::relay::worker::DEFAULT_SYNC_INTERVAL;
use crate::relay::RelaySettings;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const NETWORK_NAME_ENV: &str = "NETWORK_NAME";
pub const CHAIN_ID_ENV: &str = "CHAIN_ID";
pub const RPC_PROVIDERS_ENV: &str = "RPC_PROVIDERS";
pub const REQUIRED_CONFIRMATIONS_ENV: &str = "REQUIRED_CONFIRMATIONS";
pub const MAX_PENDING_TX_PER_ACCOUNT_ENV: &str = "MAX_PENDING_TX_PER_ACCOUNT";
pub const REQUEST_EXPIRES_AFTER_SECONDS_ENV: &str = "REQUEST_EXPIRES_AFTER_SECONDS";
pub const REPUBLISH_AFTER_SECONDS_ENV: &str = "REPUBLISH_AFTER_SECONDS";
pub const SYNC_INTERVAL_SECONDS_ENV: &str = "SYNC_INTERVAL_SECONDS";
pub const MAX_NONCE_RETRIES_ENV: &str = "MAX_NONCE_RETRIES";
pub const GAS_PRICE_MARKUP_PERCENT_ENV: &str = "GAS_PRICE_MARKUP_PERCENT";
pub const PRICE_ORACLE_ENDPOINTS_ENV: &str = "PRICE_ORACLE_ENDPOINTS";
pub const MANIFEST_PATH_ENV: &str = "MANIFEST_PATH";
pub const DELEGATE_PRIVATE_KEY_ENV: &str = "DELEGATE_PRIVATE_KEY";
pub const DELEGATE_KEY_PATH_ENV: &str = "DELEGATE_KEY_PATH";
pub const ALLOWED_ORIGINS_ENV: &str = "ALLOWED_ORIGINS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_NETWORK: &str = "sepolia";
const DEFAULT_MANIFEST_PATH: &str = "manifest.json";
const DEFAULT_GAS_PRICE_MARKUP_PERCENT: u32 = 100;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid {var}={value}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Everything the service reads from the environment.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub network: NetworkConfig,
    pub relay: RelaySettings,
    pub sync_interval: Duration,
    pub gas_price_markup_percent: u32,
    pub price_sources: Vec<PriceSource>,
    pub manifest_path: PathBuf,
    pub delegate_private_key: Option<String>,
    pub delegate_key_path: Option<String>,
    /// Empty means any origin
    pub allowed_origins: Vec<String>,
    pub log_format: LogFormat,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = RelaySettings::default();

        let network = resolve_network(
            var(NETWORK_NAME_ENV).as_deref(),
            parse_opt(CHAIN_ID_ENV, var(CHAIN_ID_ENV))?,
            var(RPC_PROVIDERS_ENV).map(|v| split_list(&v)),
        )?;

        let relay = RelaySettings {
            request_ttl: seconds(
                REQUEST_EXPIRES_AFTER_SECONDS_ENV,
                var(REQUEST_EXPIRES_AFTER_SECONDS_ENV),
                defaults.request_ttl,
            )?,
            max_pending_per_account: parse_opt(
                MAX_PENDING_TX_PER_ACCOUNT_ENV,
                var(MAX_PENDING_TX_PER_ACCOUNT_ENV),
            )?
            .unwrap_or(defaults.max_pending_per_account),
            required_confirmations: parse_opt(
                REQUIRED_CONFIRMATIONS_ENV,
                var(REQUIRED_CONFIRMATIONS_ENV),
            )?
            .unwrap_or(defaults.required_confirmations),
            republish_after: seconds(
                REPUBLISH_AFTER_SECONDS_ENV,
                var(REPUBLISH_AFTER_SECONDS_ENV),
                defaults.republish_after,
            )?,
            max_nonce_retries: parse_opt(MAX_NONCE_RETRIES_ENV, var(MAX_NONCE_RETRIES_ENV))?
                .unwrap_or(defaults.max_nonce_retries),
        };
        if relay.max_pending_per_account == 0 {
            return Err(ConfigError::Invalid {
                var: MAX_PENDING_TX_PER_ACCOUNT_ENV,
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let delegate_private_key = var(DELEGATE_PRIVATE_KEY_ENV);
        let delegate_key_path = var(DELEGATE_KEY_PATH_ENV);
        if delegate_private_key.is_none() && delegate_key_path.is_none() {
            return Err(ConfigError::Missing(DELEGATE_PRIVATE_KEY_ENV));
        }

        let price_sources = match var(PRICE_ORACLE_ENDPOINTS_ENV) {
            Some(value) => parse_price_sources(&value)?,
            None => default_native_sources(),
        };

        let log_format = match var(LOG_FORMAT_ENV).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: LOG_FORMAT_ENV,
                    value: other.to_string(),
                    reason: "expected `json` or `pretty`".to_string(),
                })
            }
        };

        Ok(Self {
            host: var(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_opt(PORT_ENV, var(PORT_ENV))?.unwrap_or(DEFAULT_PORT),
            data_dir: PathBuf::from(var(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            network,
            relay,
            sync_interval: seconds(
                SYNC_INTERVAL_SECONDS_ENV,
                var(SYNC_INTERVAL_SECONDS_ENV),
                DEFAULT_SYNC_INTERVAL,
            )?,
            gas_price_markup_percent: parse_opt(
                GAS_PRICE_MARKUP_PERCENT_ENV,
                var(GAS_PRICE_MARKUP_PERCENT_ENV),
            )?
            .unwrap_or(DEFAULT_GAS_PRICE_MARKUP_PERCENT),
            price_sources,
            manifest_path: PathBuf::from(
                var(MANIFEST_PATH_ENV).unwrap_or_else(|| DEFAULT_MANIFEST_PATH.to_string()),
            ),
            delegate_private_key,
            delegate_key_path,
            allowed_origins: var(ALLOWED_ORIGINS_ENV)
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            log_format,
        })
    }

    /// `host:port` to bind the HTTP server to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Known network names supply defaults; explicit values always win.
fn resolve_network(
    name: Option<&str>,
    chain_id: Option<u64>,
    rpc_urls: Option<Vec<String>>,
) -> Result<NetworkConfig, ConfigError> {
    let name = name.unwrap_or(DEFAULT_NETWORK);
    let preset = NetworkConfig::preset(name);

    let chain_id = chain_id
        .or_else(|| preset.as_ref().map(|p| p.chain_id))
        .ok_or(ConfigError::Missing(CHAIN_ID_ENV))?;
    let rpc_urls = rpc_urls
        .filter(|urls| !urls.is_empty())
        .or_else(|| preset.map(|p| p.rpc_urls))
        .ok_or(ConfigError::Missing(RPC_PROVIDERS_ENV))?;

    Ok(NetworkConfig {
        name: name.to_ascii_lowercase(),
        chain_id,
        rpc_urls,
    })
}

/// `url#/pointer` entries, e.g. `https://x.example/eth#/result/ethusd`.
fn parse_price_sources(value: &str) -> Result<Vec<PriceSource>, ConfigError> {
    split_list(value)
        .into_iter()
        .map(|entry| match entry.rsplit_once('#') {
            Some((url, pointer)) if !url.is_empty() && pointer.starts_with('/') => {
                Ok(PriceSource::new(url, pointer, DEFAULT_PRICE_TTL_SECONDS))
            }
            _ => Err(ConfigError::Invalid {
                var: PRICE_ORACLE_ENDPOINTS_ENV,
                value: entry,
                reason: "expected `url#/json/pointer`".to_string(),
            }),
        })
        .collect()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_opt<T>(var: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                var,
                value: v.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn seconds(
    var: &'static str,
    value: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    Ok(parse_opt::<u64>(var, value)?
        .map(Duration::from_secs)
        .unwrap_or(default))
}
