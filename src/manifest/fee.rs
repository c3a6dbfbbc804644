// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token fee arithmetic.
//!
//! ```text
//! fee = 10^decimals × Π(1 / quote_i) × gasPriceInEth × ethPrice × gasLimit × markup
//! ```
//!
//! Prices arrive as floating point numbers from JSON endpoints. They are
//! converted once, through their shortest decimal representation, into
//! 18-decimal fixed point; every multiplication and division after that is
//! exact integer math over `U256` that truncates. The result is truncated
//! to an integer number of token units, never rounded up.

use alloy::primitives::U256;

/// 18 decimal places.
const SCALE_DECIMALS: usize = 18;

fn scale() -> U256 {
    U256::from(10u64).pow(U256::from(SCALE_DECIMALS))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeeError {
    #[error("Invalid {what}: {value}")]
    InvalidInput { what: &'static str, value: String },

    #[error("Fee calculation overflowed")]
    Overflow,
}

/// Inputs of the fee formula.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeInputs<'a> {
    /// Token decimals
    pub decimals: u8,
    /// Token price in each quote step
    pub quotes: &'a [f64],
    /// Gas price in wei
    pub gas_price_wei: u128,
    /// Native coin price in the final quote unit
    pub eth_price: f64,
    pub gas_limit: u64,
    pub markup: f64,
}

/// Fee in the token's smallest unit, as a decimal string.
pub fn calculate_token_fee(inputs: &FeeInputs<'_>) -> Result<String, FeeError> {
    let scale = scale();

    // fee is carried with 18 extra decimals until the end
    let mut fee = U256::from(10u64)
        .checked_pow(U256::from(inputs.decimals))
        .and_then(|unit| unit.checked_mul(scale))
        .ok_or(FeeError::Overflow)?;

    for quote in inputs.quotes {
        let quote = to_fixed(*quote, "quote")?;
        fee = mul_div(fee, scale, quote)?;
    }

    fee = mul_div(fee, U256::from(inputs.gas_price_wei), scale)?;
    fee = mul_div(fee, to_fixed(inputs.eth_price, "native coin price")?, scale)?;
    fee = fee
        .checked_mul(U256::from(inputs.gas_limit))
        .ok_or(FeeError::Overflow)?;
    fee = mul_div(fee, to_fixed(inputs.markup, "markup")?, scale)?;

    Ok((fee / scale).to_string())
}

fn mul_div(value: U256, mul: U256, div: U256) -> Result<U256, FeeError> {
    value
        .checked_mul(mul)
        .and_then(|v| v.checked_div(div))
        .ok_or(FeeError::Overflow)
}

/// Convert a positive finite number to 18-decimal fixed point, truncating
/// digits past the 18th decimal.
fn to_fixed(value: f64, what: &'static str) -> Result<U256, FeeError> {
    let invalid = || FeeError::InvalidInput {
        what,
        value: value.to_string(),
    };
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid());
    }

    // f64 Display never uses exponent notation
    let text = value.to_string();
    let parsed = parse_decimal(&text).ok_or_else(invalid)?;
    if parsed.is_zero() {
        return Err(invalid());
    }
    Ok(parsed)
}

/// Parse a plain decimal string into 18-decimal fixed point.
pub fn parse_decimal(text: &str) -> Option<U256> {
    let parts: Vec<&str> = text.trim().split('.').collect();
    if parts.is_empty() || parts.len() > 2 {
        return None;
    }

    let whole_part = parts[0];
    if whole_part.is_empty() || !whole_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole = U256::from_str_radix(whole_part, 10).ok()?;

    let fraction_part = if parts.len() == 2 { parts[1] } else { "" };
    if !fraction_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let truncated = &fraction_part[..fraction_part.len().min(SCALE_DECIMALS)];
    let padded = format!("{:0<width$}", truncated, width = SCALE_DECIMALS);
    let fraction = U256::from_str_radix(&padded, 10).ok()?;

    whole.checked_mul(scale())?.checked_add(fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_scenario() {
        // 10^6 × (1/0.5) × (1/2) × 0.00002 × 100000 × 2
        let fee = calculate_token_fee(&FeeInputs {
            decimals: 6,
            quotes: &[0.5, 2.0],
            gas_price_wei: 20_000_000_000_000,
            eth_price: 1.0,
            gas_limit: 100_000,
            markup: 2.0,
        })
        .unwrap();
        assert_eq!(fee, "4000000");
    }

    #[test]
    fn fee_is_truncated_not_rounded() {
        // 10^0 × (1/3) × 1 gwei × 1 × 21000 × 1 = 0.000007 → 0
        let fee = calculate_token_fee(&FeeInputs {
            decimals: 0,
            quotes: &[3.0],
            gas_price_wei: 1_000_000_000,
            eth_price: 1.0,
            gas_limit: 21_000,
            markup: 1.0,
        })
        .unwrap();
        assert_eq!(fee, "0");

        // 10^6 × (1/3) × 0.001 ETH × 1 × 1 × 1 = 333.33… → 333
        let fee = calculate_token_fee(&FeeInputs {
            decimals: 6,
            quotes: &[3.0],
            gas_price_wei: 1_000_000_000_000_000,
            eth_price: 1.0,
            gas_limit: 1,
            markup: 1.0,
        })
        .unwrap();
        assert_eq!(fee, "333");
    }

    #[test]
    fn eth_price_scales_the_fee() {
        // 10^2 × 1e-9 × 2000 × 100000 × 1 = 20
        let fee = calculate_token_fee(&FeeInputs {
            decimals: 2,
            quotes: &[],
            gas_price_wei: 1_000_000_000,
            eth_price: 2000.0,
            gas_limit: 100_000,
            markup: 1.0,
        })
        .unwrap();
        assert_eq!(fee, "20");
    }

    #[test]
    fn invalid_prices_are_rejected() {
        let inputs = |quote: f64| FeeInputs {
            decimals: 6,
            quotes: &[],
            gas_price_wei: 1,
            eth_price: quote,
            gas_limit: 1,
            markup: 1.0,
        };
        assert!(calculate_token_fee(&inputs(0.0)).is_err());
        assert!(calculate_token_fee(&inputs(-1.0)).is_err());
        assert!(calculate_token_fee(&inputs(f64::NAN)).is_err());
        assert!(calculate_token_fee(&inputs(f64::INFINITY)).is_err());
    }

    #[test]
    fn parse_decimal_fixed_point() {
        assert_eq!(parse_decimal("1"), Some(scale()));
        assert_eq!(
            parse_decimal("0.5"),
            Some(U256::from(500_000_000_000_000_000u64))
        );
        assert_eq!(parse_decimal("0.0000000000000000001"), Some(U256::ZERO));
        assert_eq!(parse_decimal("1.2.3"), None);
        assert_eq!(parse_decimal(".5"), None);
    }
}
