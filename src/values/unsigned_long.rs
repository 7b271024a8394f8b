use std::{fmt, str::FromStr};

use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};

use crate::errors::ParseError;

/// Non-negative 64-bit value used for trigger data, dedup keys, event ids
/// and debug keys. Equality, hashing and ordering follow the numeric value.
///
/// On the wire it may appear either as a JSON number or as a decimal
/// string; it is always serialized back as a decimal string so that values
/// above 2^53 survive JSON consumers that use doubles.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct UnsignedLong(u64);

impl UnsignedLong {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Parses a plain decimal string. Signs, whitespace and hex prefixes
    /// are rejected.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::InvalidUnsignedLong(text.to_string()));
        }
        text.parse::<u64>()
            .map(Self)
            .map_err(|_| ParseError::InvalidUnsignedLong(text.to_string()))
    }
}

impl From<u64> for UnsignedLong {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<UnsignedLong> for u64 {
    fn from(value: UnsignedLong) -> Self {
        value.0
    }
}

impl FromStr for UnsignedLong {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UnsignedLong {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for UnsignedLong {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

struct UnsignedLongVisitor;

impl Visitor<'_> for UnsignedLongVisitor {
    type Value = UnsignedLong;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative integer or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(UnsignedLong(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v)
            .map(UnsignedLong)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        UnsignedLong::parse(v)
            .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
    }
}

impl<'de> Deserialize<'de> for UnsignedLong {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        deserializer.deserialize_any(UnsignedLongVisitor)
    }
}
