// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Delegate key loading.
//!
//! The delegate private key can be supplied as raw hex or as a PEM file
//! (PKCS#8 or SEC1 "EC PRIVATE KEY").

use alloy::signers::local::PrivateKeySigner;
use k256::SecretKey;

use super::client::{create_signer, LedgerError};

/// Parse a PEM-encoded secp256k1 private key into a hex string (no 0x prefix).
pub fn pem_to_hex(pem_bytes: &[u8]) -> Result<String, LedgerError> {
    let pem_str = std::str::from_utf8(pem_bytes)
        .map_err(|e| LedgerError::InvalidPrivateKey(format!("Invalid UTF-8: {}", e)))?;

    let pem = pem::parse(pem_str)
        .map_err(|e| LedgerError::InvalidPrivateKey(format!("Invalid PEM: {}", e)))?;

    let secret_key = SecretKey::from_sec1_der(pem.contents())
        .or_else(|_| parse_pkcs8_to_secret_key(pem.contents()))
        .map_err(|e| LedgerError::InvalidPrivateKey(format!("Invalid key format: {}", e)))?;

    Ok(alloy::hex::encode(secret_key.to_bytes()))
}

fn parse_pkcs8_to_secret_key(der: &[u8]) -> Result<SecretKey, String> {
    use k256::pkcs8::DecodePrivateKey;
    SecretKey::from_pkcs8_der(der).map_err(|e| e.to_string())
}

/// Create a signer from a PEM-encoded private key.
pub fn signer_from_pem(pem_bytes: &[u8]) -> Result<PrivateKeySigner, LedgerError> {
    let hex_key = pem_to_hex(pem_bytes)?;
    create_signer(&hex_key)
}

/// Load the delegate signer from either a hex key or a PEM file on disk.
///
/// `key` wins when both are set.
pub fn load_delegate_signer(
    key: Option<&str>,
    pem_path: Option<&str>,
) -> Result<PrivateKeySigner, LedgerError> {
    if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
        return create_signer(key);
    }

    let path = pem_path.ok_or_else(|| {
        LedgerError::InvalidPrivateKey("no delegate key configured".to_string())
    })?;
    let bytes = std::fs::read(path).map_err(|e| {
        LedgerError::InvalidPrivateKey(format!("Failed to read key file {}: {}", path, e))
    })?;
    signer_from_pem(&bytes)
}
