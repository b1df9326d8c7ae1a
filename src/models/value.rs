//! Value types shared by every pipeline stage.
//!
//! `Money` keeps currency exact in minor units. `Field<T>` makes "unknown" a
//! first-class value, so a missing amount is never confused with zero.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ═══════════════════════════════════════════════════════════
// Money
// ═══════════════════════════════════════════════════════════

/// Exact decimal currency amount, stored in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money {
    cents: i64,
}

impl Money {
    pub const ZERO: Money = Money { cents: 0 };

    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Round a float to the nearest cent (half away from zero).
    /// Returns `None` for NaN and infinities.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let cents = (value * 100.0).round();
        if cents.abs() > i64::MAX as f64 {
            return None;
        }
        Some(Self {
            cents: cents as i64,
        })
    }

    pub fn cents(&self) -> i64 {
        self.cents
    }

    pub fn as_f64(&self) -> f64 {
        self.cents as f64 / 100.0
    }

    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    pub fn abs(&self) -> Self {
        Self {
            cents: self.cents.abs(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money::from_cents(self.cents.saturating_add(rhs.cents))
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money::from_cents(self.cents.saturating_sub(rhs.cents))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Money::from_f64(value).ok_or_else(|| serde::de::Error::custom("amount is not finite"))
    }
}

/// Parse a money string as written on bills: `"$1,204.50"`, `"120.5"`, `" 80 "`.
///
/// Only non-negative amounts are accepted. Accounting negatives such as
/// `"(12.00)"` and `"-12"` are rejected.
pub fn parse_amount(raw: &str) -> Option<Money> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches("USD")
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();

    if cleaned.is_empty() || cleaned.starts_with('-') || cleaned.starts_with('(') {
        return None;
    }
    if !cleaned.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }

    let value: f64 = cleaned.parse().ok()?;
    if value < 0.0 {
        return None;
    }
    Money::from_f64(value)
}

// ═══════════════════════════════════════════════════════════
// Field
// ═══════════════════════════════════════════════════════════

/// An extracted value that is either known or explicitly unknown.
///
/// Serializes as the bare value, or `null` when unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field<T> {
    Known(T),
    Unknown,
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Unknown
    }
}

impl<T> Field<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Field::Known(_))
    }

    pub fn known(&self) -> Option<&T> {
        match self {
            Field::Known(v) => Some(v),
            Field::Unknown => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Known(v) => Some(v),
            Field::Unknown => None,
        }
    }

    pub fn as_ref(&self) -> Field<&T> {
        match self {
            Field::Known(v) => Field::Known(v),
            Field::Unknown => Field::Unknown,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Field::Known(v) => Field::Known(f(v)),
            Field::Unknown => Field::Unknown,
        }
    }

    /// First known value of `self` and `other`.
    pub fn or(self, other: Field<T>) -> Field<T> {
        match self {
            Field::Known(_) => self,
            Field::Unknown => other,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Known(v),
            None => Field::Unknown,
        }
    }
}

impl<T: Copy> Field<T> {
    pub fn get(&self) -> Option<T> {
        self.known().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_amount_accepts_bill_formats() {
        assert_eq!(parse_amount("120.5"), Some(Money::from_cents(12050)));
        assert_eq!(parse_amount("$1,204.50"), Some(Money::from_cents(120450)));
        assert_eq!(parse_amount(" 80 "), Some(Money::from_cents(8000)));
        assert_eq!(parse_amount("USD 15.25"), Some(Money::from_cents(1525)));
        assert_eq!(parse_amount("0"), Some(Money::ZERO));
    }

    #[test]
    fn parse_amount_rejects_negative_and_garbage() {
        assert_eq!(parse_amount("-12.00"), None);
        assert_eq!(parse_amount("(12.00)"), None);
        assert_eq!(parse_amount("N/A"), None);
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("12.3.4"), None);
        assert_eq!(parse_amount("inf"), None);
    }

    #[test]
    fn money_display_has_two_decimals() {
        assert_eq!(Money::from_cents(12050).to_string(), "120.50");
        assert_eq!(Money::from_cents(-7).to_string(), "-0.07");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn money_rounds_half_away_from_zero() {
        assert_eq!(Money::from_f64(0.125).unwrap().cents(), 13);
        assert_eq!(Money::from_f64(2.0 / 3.0).unwrap().cents(), 67);
        assert!(Money::from_f64(f64::NAN).is_none());
    }

    #[test]
    fn money_serializes_as_number() {
        let json = serde_json::to_string(&Money::from_cents(1700)).unwrap();
        assert_eq!(json, "17.0");
    }

    #[test]
    fn unknown_field_serializes_as_null() {
        let known: Field<Money> = Field::Known(Money::from_cents(12050));
        let unknown: Field<Money> = Field::Unknown;
        assert_eq!(serde_json::to_string(&known).unwrap(), "120.5");
        assert_eq!(serde_json::to_string(&unknown).unwrap(), "null");

        let back: Field<Money> = serde_json::from_str("null").unwrap();
        assert_eq!(back, Field::Unknown);
    }

    #[test]
    fn field_or_prefers_known() {
        let a: Field<i32> = Field::Unknown;
        assert_eq!(a.or(Field::Known(3)), Field::Known(3));
        assert_eq!(Field::Known(1).or(Field::Known(3)), Field::Known(1));
    }
}
