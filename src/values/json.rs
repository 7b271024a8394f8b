//! Helpers for wire fields that registration servers send either as JSON
//! numbers or as decimal strings.

use std::fmt;

use serde::{
    de::{self, Visitor},
    Deserializer,
};

use crate::errors::ParseError;

struct LenientI64;

impl Visitor<'_> for LenientI64 {
    type Value = i64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a signed 64-bit integer or a decimal string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
        i64::try_from(v)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
        v.parse()
            .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
    }
}

/// Deserializes a priority-like signed value.
pub fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    d.deserialize_any(LenientI64)
}

struct LenientU64;

impl Visitor<'_> for LenientU64 {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative integer or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
        u64::try_from(v)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
        v.parse()
            .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
    }
}

/// Deserializes a count or value field.
pub fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    d.deserialize_any(LenientU64)
}

/// Parses a `0x`-prefixed hex aggregation key piece of at most 128 bits.
pub fn parse_key_piece(text: &str) -> Result<u128, ParseError> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .ok_or_else(|| ParseError::InvalidKeyPiece(text.to_string()))?;
    if digits.is_empty() || digits.len() > 32 {
        return Err(ParseError::InvalidKeyPiece(text.to_string()));
    }
    u128::from_str_radix(digits, 16)
        .map_err(|_| ParseError::InvalidKeyPiece(text.to_string()))
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Deserialize)]
    struct Wire {
        #[serde(deserialize_with = "lenient_i64")]
        priority: i64,
        #[serde(deserialize_with = "lenient_u64")]
        value: u64,
    }

    #[test]
    fn test_lenient_numbers() -> Result<(), anyhow::Error> {
        let wire: Wire =
            serde_json::from_str(r#"{"priority": "-12", "value": 1000}"#)?;
        assert_eq!(wire.priority, -12);
        assert_eq!(wire.value, 1000);

        let wire: Wire =
            serde_json::from_str(r#"{"priority": 3, "value": "7"}"#)?;
        assert_eq!(wire.priority, 3);
        assert_eq!(wire.value, 7);

        assert!(serde_json::from_str::<Wire>(r#"{"priority": 1, "value": -1}"#)
            .is_err());
        Ok(())
    }

    #[test]
    fn test_parse_key_piece() -> Result<(), anyhow::Error> {
        assert_eq!(parse_key_piece("0x400")?, 0x400);
        assert_eq!(parse_key_piece("0X159")?, 0x159);
        assert_eq!(
            parse_key_piece("0xffffffffffffffffffffffffffffffff")?,
            u128::MAX
        );
        assert!(parse_key_piece("400").is_err());
        assert!(parse_key_piece("0x").is_err());
        assert!(parse_key_piece("0xg1").is_err());
        let too_wide = "0x1ffffffffffffffffffffffffffffffff";
        assert!(parse_key_piece(too_wide).is_err());
        Ok(())
    }
}
