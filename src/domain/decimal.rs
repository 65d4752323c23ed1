//! Lossless decimal numeric type backed by rust_decimal.
//!
//! Premiums, strikes and quantities all flow through this type so chain
//! aggregates never drift the way float sums do.

use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

/// Lossless decimal numeric type for premium and strike arithmetic.
///
/// Serializes to a JSON number (not string).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::float")] RustDecimal);

impl Decimal {
    /// Parse a Decimal from a string losslessly.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s.trim()).map(Decimal)
    }

    /// Parse a JSON scalar (string or number) into a Decimal.
    ///
    /// Broker payloads are inconsistent about quoting numeric fields, so both
    /// forms are accepted. Anything else yields `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Self::from_str_canonical(s).ok(),
            serde_json::Value::Number(n) => Self::from_str_canonical(&n.to_string()).ok(),
            _ => None,
        }
    }

    /// Format the Decimal as a canonical string (no exponent, no trailing zeros).
    pub fn to_canonical_string(&self) -> String {
        let normalized = self.0.normalize();
        format!("{}", normalized)
    }

    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn abs(&self) -> Self {
        Decimal(self.0.abs())
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

impl Sum for Decimal {
    fn sum<I: Iterator<Item = Decimal>>(iter: I) -> Self {
        iter.fold(Decimal::zero(), |acc, d| acc + d)
    }
}

impl<'a> Sum<&'a Decimal> for Decimal {
    fn sum<I: Iterator<Item = &'a Decimal>>(iter: I) -> Self {
        iter.fold(Decimal::zero(), |acc, d| acc + *d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_canonical_strips_trailing_zeros() {
        let d = Decimal::from_str_canonical("150.000").unwrap();
        assert_eq!(d.to_canonical_string(), "150");
        assert_eq!(
            Decimal::from_str_canonical("1.50").unwrap(),
            Decimal::from_str_canonical("1.5").unwrap()
        );
    }

    #[test]
    fn test_decimal_from_json_accepts_string_and_number() {
        let from_str = Decimal::from_json(&serde_json::json!("125.50")).unwrap();
        let from_num = Decimal::from_json(&serde_json::json!(125.5)).unwrap();
        assert_eq!(from_str, from_num);
        assert!(Decimal::from_json(&serde_json::json!(null)).is_none());
        assert!(Decimal::from_json(&serde_json::json!("abc")).is_none());
    }

    #[test]
    fn test_decimal_sum_is_exact() {
        let values: Vec<Decimal> = ["0.1", "0.2", "0.3"]
            .iter()
            .map(|s| Decimal::from_str_canonical(s).unwrap())
            .collect();
        let total: Decimal = values.iter().sum();
        assert_eq!(total.to_canonical_string(), "0.6");
    }

    #[test]
    fn test_decimal_arithmetic() {
        let a = Decimal::from_str_canonical("210").unwrap();
        let b = Decimal::from_str_canonical("95.5").unwrap();
        assert_eq!((a - b).to_canonical_string(), "114.5");
        assert_eq!((b - a).to_canonical_string(), "-114.5");
        assert_eq!(-(a - b), b - a);
        assert_eq!(-Decimal::zero(), Decimal::zero());
        assert_eq!((b - a).abs(), a - b);
    }

    #[test]
    fn test_decimal_json_serialization() {
        let decimal = Decimal::from_str_canonical("123.45").unwrap();
        let json = serde_json::to_value(decimal).unwrap();
        assert!(json.is_number());
        assert_eq!(json.to_string(), "123.45");
    }
}
