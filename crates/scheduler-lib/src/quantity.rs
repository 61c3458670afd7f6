//! Fixed-point resource quantities
//!
//! Quantities are stored as signed milli-units so CPU (`500m`) and memory
//! (`200Mi`) share one exact integer representation. Parsing accepts the
//! Kubernetes suffix grammar used in pod specs and node status.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Resource name as it appears in resource lists (`cpu`, `memory`, extended names)
pub type ResourceName = String;

/// Ordered map of resource name to quantity
pub type ResourceList = BTreeMap<ResourceName, Quantity>;

/// Errors produced while parsing a quantity
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid number in quantity {0:?}")]
    InvalidNumber(String),

    #[error("unknown suffix {suffix:?} in quantity {input:?}")]
    UnknownSuffix { input: String, suffix: String },

    #[error("negative quantity {0:?} is not supported")]
    Negative(String),

    #[error("quantity {0:?} overflows")]
    Overflow(String),
}

/// A resource amount with milli-unit precision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity {
    milli: i64,
}

impl Quantity {
    pub const ZERO: Quantity = Quantity { milli: 0 };

    pub const fn from_milli(milli: i64) -> Self {
        Self { milli }
    }

    pub const fn from_value(value: i64) -> Self {
        Self {
            milli: value.saturating_mul(1000),
        }
    }

    /// Exact amount in milli-units
    pub fn milli_value(&self) -> i64 {
        self.milli
    }

    /// Amount in whole units, rounded up
    pub fn value(&self) -> i64 {
        let whole = self.milli / 1000;
        if self.milli % 1000 > 0 {
            whole + 1
        } else {
            whole
        }
    }

    pub fn is_zero(&self) -> bool {
        self.milli == 0
    }

    pub fn saturating_add(self, other: Quantity) -> Quantity {
        Quantity {
            milli: self.milli.saturating_add(other.milli),
        }
    }

    /// Subtract, flooring at zero
    pub fn saturating_sub(self, other: Quantity) -> Quantity {
        Quantity {
            milli: self.milli.saturating_sub(other.milli).max(0),
        }
    }
}

/// Suffix multiplier expressed as a rational number of base units
fn suffix_multiplier(suffix: &str) -> Option<(i128, i128)> {
    let m = match suffix {
        "" => (1, 1),
        "m" => (1, 1000),
        "k" => (1_000, 1),
        "M" => (1_000_000, 1),
        "G" => (1_000_000_000, 1),
        "T" => (1_000_000_000_000, 1),
        "P" => (1_000_000_000_000_000, 1),
        "E" => (1_000_000_000_000_000_000, 1),
        "Ki" => (1 << 10, 1),
        "Mi" => (1 << 20, 1),
        "Gi" => (1 << 30, 1),
        "Ti" => (1 << 40, 1),
        "Pi" => (1 << 50, 1),
        "Ei" => (1 << 60, 1),
        _ => return decimal_exponent(suffix),
    };
    Some(m)
}

/// `e3`, `E-2`: a power of ten following the number
fn decimal_exponent(suffix: &str) -> Option<(i128, i128)> {
    let exponent = suffix.strip_prefix(['e', 'E'])?;
    let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let power = 10i128.checked_pow(digits.parse().ok()?)?;
    if exponent.starts_with('-') {
        Some((1, power))
    } else {
        Some((power, 1))
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let s = input.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }
        if s.starts_with('-') {
            return Err(QuantityError::Negative(input.to_string()));
        }
        let s = s.strip_prefix('+').unwrap_or(s);

        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (number, suffix) = s.split_at(split);

        let (num, den) =
            suffix_multiplier(suffix).ok_or_else(|| QuantityError::UnknownSuffix {
                input: input.to_string(),
                suffix: suffix.to_string(),
            })?;

        let (int_part, frac_part) = match number.split_once('.') {
            Some((i, f)) => (i, f),
            None => (number, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(QuantityError::InvalidNumber(input.to_string()));
        }
        if frac_part.contains('.') || frac_part.len() > 18 {
            return Err(QuantityError::InvalidNumber(input.to_string()));
        }

        let digits = format!("{}{}", int_part, frac_part);
        let mantissa: i128 = digits
            .parse()
            .map_err(|_| QuantityError::InvalidNumber(input.to_string()))?;
        let scale = 10i128.pow(frac_part.len() as u32);

        // milli = ceil(mantissa / scale * num / den * 1000)
        let numerator = mantissa
            .checked_mul(num)
            .and_then(|v| v.checked_mul(1000))
            .ok_or_else(|| QuantityError::Overflow(input.to_string()))?;
        let denominator = scale * den;
        let mut milli = numerator / denominator;
        if numerator % denominator != 0 {
            milli += 1;
        }

        let milli = i64::try_from(milli).map_err(|_| QuantityError::Overflow(input.to_string()))?;
        Ok(Quantity { milli })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.milli % 1000 == 0 {
            write!(f, "{}", self.milli / 1000)
        } else {
            write!(f, "{}m", self.milli)
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuantityRepr {
    Int(i64),
    Float(f64),
    Str(String),
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match QuantityRepr::deserialize(deserializer)? {
            QuantityRepr::Int(v) if v < 0 => Err(serde::de::Error::custom(
                QuantityError::Negative(v.to_string()),
            )),
            QuantityRepr::Int(v) => Ok(Quantity::from_value(v)),
            QuantityRepr::Float(v) => v.to_string().parse().map_err(serde::de::Error::custom),
            QuantityRepr::Str(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl Serialize for Quantity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
