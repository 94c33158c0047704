//! Integer amounts in the smallest network unit.
//!
//! Values are persisted as decimal strings so that stored ledgers stay
//! readable and never pass through a floating point type. Legacy data
//! may contain `0x` quantities or plain JSON numbers, both are accepted.

use primitive_types::U256;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serializer};

/// Amount in wei.
pub type Wei = U256;

#[derive(Deserialize)]
#[serde(untagged)]
enum WeiRepr {
    Text(String),
    Number(u64),
}

impl WeiRepr {
    fn into_wei(self) -> Result<Option<Wei>, String> {
        match self {
            WeiRepr::Number(n) => Ok(Some(Wei::from(n))),
            WeiRepr::Text(text) if text.trim().is_empty() => Ok(None),
            WeiRepr::Text(text) => parse_wei(&text).map(Some),
        }
    }
}

/// Parses a decimal or `0x`-prefixed hexadecimal integer.
pub fn parse_wei(text: &str) -> Result<Wei, String> {
    let text = text.trim();
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        if hex.is_empty() {
            return Ok(Wei::zero());
        }
        return Wei::from_str_radix(hex, 16)
            .map_err(|e| format!("invalid hex quantity {}: {:?}", text, e));
    }
    Wei::from_dec_str(text).map_err(|e| format!("invalid integer amount {}: {:?}", text, e))
}

pub mod wei_string {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Wei, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Wei, D::Error> {
        WeiRepr::deserialize(deserializer)?
            .into_wei()
            .map_err(de::Error::custom)
            .map(|value| value.unwrap_or_default())
    }
}

pub mod option_wei_string {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<Wei>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_str(&value.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Wei>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<WeiRepr>::deserialize(deserializer)? {
            Some(repr) => repr.into_wei().map_err(de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal_and_hex() {
        assert_eq!(parse_wei("1000000000000000000").unwrap(), Wei::exp10(18));
        assert_eq!(parse_wei("0xde0b6b3a7640000").unwrap(), Wei::exp10(18));
        assert_eq!(parse_wei("0x").unwrap(), Wei::zero());
        assert!(parse_wei("1.5").is_err());
        assert!(parse_wei("-1").is_err());
    }

    #[test]
    fn test_values_beyond_u128_survive() {
        let huge = "340282366920938463463374607431768211456"; // u128::MAX + 1
        assert_eq!(parse_wei(huge).unwrap().to_string(), huge);
    }
}
