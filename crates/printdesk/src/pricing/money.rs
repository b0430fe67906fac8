use std::fmt;
use std::iter::Sum;
use std::ops::Add;

use serde::{Serialize, Serializer};

/// An amount of money in cents.
///
/// Displays and serializes with two decimals (`1400` cents is `"14.00"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: u64) -> Self {
        Money(cents)
    }

    /// Converts a decimal currency amount (e.g. a per-page rate of `0.70`)
    /// to cents, rounding to the nearest cent. Negative and non-finite
    /// inputs become zero.
    pub fn from_decimal(amount: f64) -> Self {
        if !amount.is_finite() || amount <= 0.0 {
            return Money::ZERO;
        }
        Money((amount * 100.0).round() as u64)
    }

    pub fn cents(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn times(self, factor: u64) -> Self {
        Money(self.0.saturating_mul(factor))
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_pads_cents() {
        assert_eq!(Money::from_cents(1400).to_string(), "14.00");
        assert_eq!(Money::from_cents(420).to_string(), "4.20");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn test_from_decimal_rounds() {
        assert_eq!(Money::from_decimal(0.70).cents(), 70);
        assert_eq!(Money::from_decimal(0.2).cents(), 20);
        assert_eq!(Money::from_decimal(0.125).cents(), 13);
        assert_eq!(Money::from_decimal(-1.0), Money::ZERO);
        assert_eq!(Money::from_decimal(f64::NAN), Money::ZERO);
    }

    #[test]
    fn test_sum() {
        let total: Money = [Money::from_cents(100), Money::from_cents(250)]
            .into_iter()
            .sum();
        assert_eq!(total, Money::from_cents(350));
    }

    #[test]
    fn test_serializes_as_decimal_string() {
        let json = serde_json::to_string(&Money::from_cents(1400)).unwrap();
        assert_eq!(json, "\"14.00\"");
    }
}
