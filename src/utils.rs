use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use crate::entity::{parse_wei, LedgerError, Result, Wei};

lazy_static! {
    static ref ADDRESS_RE: Regex = Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap();
}

// Validate an account address (0x followed by 20 bytes of hex)
pub fn validate_address(address: &str) -> bool {
    ADDRESS_RE.is_match(address.trim())
}

// Addresses compare case-insensitively, checksummed or not
pub fn same_address(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Parses a human amount such as `"1.5"` into the smallest unit without
/// passing through a float.
pub fn parse_amount(amount_text: &str, decimals: u32) -> Result<Wei> {
    let amount_text = amount_text.trim();
    if amount_text.is_empty() {
        return Err(LedgerError::validation("Please enter a valid amount"));
    }

    let amount = Decimal::from_str(amount_text)
        .map_err(|_| LedgerError::validation(format!("Invalid amount: {}", amount_text)))?;
    if amount <= Decimal::ZERO {
        return Err(LedgerError::validation("Please enter a valid amount"));
    }
    if amount.scale() > decimals {
        return Err(LedgerError::validation(format!(
            "Amount has more than {} decimal places",
            decimals
        )));
    }

    let mantissa = amount
        .mantissa()
        .to_u128()
        .ok_or_else(|| LedgerError::validation("Please enter a valid amount"))?;
    let scale_up = Wei::exp10((decimals - amount.scale()) as usize);
    Wei::from(mantissa)
        .checked_mul(scale_up)
        .ok_or_else(|| LedgerError::validation("Amount is too large"))
}

/// Validates the send form: recipient first, then amount.
pub fn parse_transfer(to: &str, amount_text: &str, decimals: u32) -> Result<(String, Wei)> {
    let to = to.trim();
    if to.is_empty() {
        return Err(LedgerError::validation("Please enter a recipient address"));
    }
    if !validate_address(to) {
        return Err(LedgerError::validation(format!(
            "Invalid recipient address: {}",
            to
        )));
    }
    let value = parse_amount(amount_text, decimals)?;
    Ok((to.to_string(), value))
}

/// Exact decimal rendering of an integer amount, trailing zeros trimmed.
pub fn format_units(value: Wei, decimals: u32) -> String {
    let digits = value.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = format!("{:0>width$}", digits, width = decimals + 1);
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

/// Rounded display amount. Lossy, for presentation only.
pub fn format_amount(value: Wei, decimals: u32, places: u32) -> String {
    let exact = format_units(value, decimals);
    match Decimal::from_str(&exact) {
        Ok(amount) => {
            let rounded =
                amount.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
            format!("{:.*}", places as usize, rounded)
        }
        // Beyond Decimal's range, fall back to the exact integer part
        Err(_) => exact.split('.').next().unwrap_or_default().to_string(),
    }
}

// Parse a JSON-RPC quantity ("0x..." hex)
pub fn parse_hex_quantity(quantity: &str) -> Result<Wei> {
    if !quantity.trim().starts_with("0x") {
        return Err(LedgerError::Unknown(format!(
            "Unexpected quantity format: {}",
            quantity
        )));
    }
    parse_wei(quantity).map_err(LedgerError::Unknown)
}

pub fn to_hex_quantity(value: Wei) -> String {
    format!("0x{:x}", value)
}

pub fn now_timestamp() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

// Shorten address for display
pub fn shorten_address(address: &str) -> String {
    let count = address.chars().count();
    if count <= 12 {
        return address.to_string();
    }

    let start: String = address.chars().take(6).collect();
    let end: String = address.chars().skip(count - 4).collect();

    format!("{}...{}", start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "0x8ba1f109551bD432803012645Ac136ddd64DBA72";

    #[test]
    fn test_validate_address() {
        assert!(validate_address(ADDRESS));
        assert!(validate_address(&ADDRESS.to_lowercase()));
        assert!(!validate_address("0x1234"));
        assert!(!validate_address("8ba1f109551bD432803012645Ac136ddd64DBA72"));
    }

    #[test]
    fn test_parse_amount_is_lossless() {
        assert_eq!(parse_amount("1", 18).unwrap(), Wei::exp10(18));
        assert_eq!(
            parse_amount("0.1", 18).unwrap(),
            Wei::from(100_000_000_000_000_000u64)
        );
        assert_eq!(
            parse_amount("1.000000000000000001", 18).unwrap(),
            Wei::exp10(18) + Wei::one()
        );
    }

    #[test]
    fn test_parse_amount_rejects_bad_input() {
        assert!(parse_amount("", 18).is_err());
        assert!(parse_amount("0", 18).is_err());
        assert!(parse_amount("-1", 18).is_err());
        assert!(parse_amount("abc", 18).is_err());
        assert!(parse_amount("0.0000000000000000001", 18).is_err());
    }

    #[test]
    fn test_parse_transfer_checks_recipient_first() {
        let err = parse_transfer("", "abc", 18).unwrap_err();
        assert_eq!(err.to_string(), "Please enter a recipient address");
        let (to, value) = parse_transfer(&format!(" {} ", ADDRESS), "2", 18).unwrap();
        assert_eq!(to, ADDRESS);
        assert_eq!(value, Wei::from(2u64) * Wei::exp10(18));
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(Wei::exp10(18), 18), "1");
        assert_eq!(format_units(Wei::from(1_500_000_000_000_000_000u64), 18), "1.5");
        assert_eq!(format_units(Wei::from(1u64), 18), "0.000000000000000001");
        assert_eq!(format_units(Wei::zero(), 18), "0");
    }

    #[test]
    fn test_format_amount_rounds_for_display() {
        assert_eq!(format_amount(Wei::from(1_234_560_000_000_000_000u64), 18, 4), "1.2346");
        assert_eq!(format_amount(Wei::zero(), 18, 1), "0.0");
    }

    #[test]
    fn test_hex_quantities() {
        assert_eq!(parse_hex_quantity("0x5208").unwrap(), Wei::from(21_000u64));
        assert!(parse_hex_quantity("21000").is_err());
        assert_eq!(to_hex_quantity(Wei::from(21_000u64)), "0x5208");
        assert_eq!(to_hex_quantity(Wei::zero()), "0x0");
    }

    #[test]
    fn test_shorten_address() {
        assert_eq!(shorten_address(ADDRESS), "0x8ba1...BA72");
        assert_eq!(shorten_address("0xAA"), "0xAA");
        assert_eq!(shorten_address("0xé1234567890ü"), "0xé123...890ü");
        assert_eq!(shorten_address("ééééééééééé"), "ééééééééééé");
    }
}
