//! Money Conversion Module
//!
//! Amounts are `rust_decimal::Decimal` inside the crate. The gateway speaks
//! `google.type.Money`: whole `units` (an int64, usually JSON-encoded as a
//! string) plus `nanos` (10^-9 units, same sign as `units`). Conversion
//! happens only at the wire edge, through this module.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Gateway money carries at most nine fractional digits
pub const MAX_SCALE: u32 = 9;

const NANOS_PER_UNIT: i64 = 1_000_000_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid money: units and nanos have different signs")]
    SignMismatch,

    #[error("Invalid money: nanos {0} out of range")]
    NanosOutOfRange(i32),
}

/// `google.type.Money` as sent to and received from the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMoney {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub currency_code: String,
    #[serde(
        default,
        serialize_with = "int64::serialize",
        deserialize_with = "int64::deserialize"
    )]
    pub units: i64,
    #[serde(default)]
    pub nanos: i32,
}

impl WireMoney {
    /// Convert a decimal amount to units/nanos
    pub fn from_decimal(currency_code: &str, amount: Decimal) -> Result<Self, MoneyError> {
        if amount.scale() > MAX_SCALE {
            let normalized = amount.normalize();
            if normalized.scale() > MAX_SCALE {
                return Err(MoneyError::PrecisionOverflow {
                    provided: normalized.scale(),
                    max: MAX_SCALE,
                });
            }
        }

        let units = amount.trunc();
        let fraction = amount - units;
        let nanos = (fraction * Decimal::from(NANOS_PER_UNIT))
            .to_i32()
            .ok_or(MoneyError::Overflow)?;
        let units = units.to_i64().ok_or(MoneyError::Overflow)?;

        Ok(Self {
            currency_code: currency_code.to_string(),
            units,
            nanos,
        })
    }

    /// Convert units/nanos back to a decimal amount
    pub fn to_decimal(&self) -> Result<Decimal, MoneyError> {
        if self.nanos.unsigned_abs() as i64 >= NANOS_PER_UNIT {
            return Err(MoneyError::NanosOutOfRange(self.nanos));
        }
        if (self.units > 0 && self.nanos < 0) || (self.units < 0 && self.nanos > 0) {
            return Err(MoneyError::SignMismatch);
        }

        let units = Decimal::from(self.units);
        let nanos = Decimal::new(self.nanos as i64, MAX_SCALE);
        Ok((units + nanos).normalize())
    }
}

/// The gateway encodes int64 fields (money units, band limits, timestamps) as
/// JSON strings; payloads coming from the console may use plain numbers.
pub(crate) mod int64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn serialize_option<S: Serializer>(
        value: &Option<i64>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        Str(String),
        Num(i64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match StringOrNumber::deserialize(deserializer)? {
            StringOrNumber::Num(n) => Ok(n),
            StringOrNumber::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
        }
    }

    pub fn deserialize_option<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<i64>, D::Error> {
        match Option::<StringOrNumber>::deserialize(deserializer)? {
            None => Ok(None),
            Some(StringOrNumber::Num(n)) => Ok(Some(n)),
            Some(StringOrNumber::Str(s)) if s.trim().is_empty() => Ok(None),
            Some(StringOrNumber::Str(s)) => {
                s.trim().parse().map(Some).map_err(serde::de::Error::custom)
            }
        }
    }
}
