//! Lenient (de)serializers for numbers that cross JSON boundaries as either
//! numbers or decimal strings.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serializer};
use serde_json::Value;

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(serde_json::Number),
    String(String),
}

pub fn value_to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(string) => string.trim().parse().ok(),
        _ => None,
    }
}

pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(string) => string.trim().parse().ok(),
        _ => None,
    }
}

/// `u64` written as a decimal string, read from a string or a number
pub mod u64_string {
    use super::*;

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        super::lenient_u64::deserialize(deserializer)
    }
}

pub mod lenient_u64 {
    use super::*;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(number) => number
                .as_u64()
                .ok_or_else(|| de::Error::custom(format!("{number} is not an unsigned integer"))),
            NumberOrString::String(string) => string
                .trim()
                .parse()
                .map_err(|_| de::Error::custom(format!("{string:?} is not an unsigned integer"))),
        }
    }
}

pub mod lenient_option_f64 {
    use super::*;

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<f64>, D::Error> {
        match Option::<NumberOrString>::deserialize(deserializer)? {
            None => Ok(None),
            Some(NumberOrString::Number(number)) => Ok(number.as_f64()),
            Some(NumberOrString::String(string)) => string
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("{string:?} is not a number"))),
        }
    }
}
