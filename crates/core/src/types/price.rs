//! Type-safe price representation using decimal arithmetic.
//!
//! Prices are stored remotely as plain numbers in the shop currency. Inside the
//! application they are carried as [`Decimal`] so cart totals never pick up
//! floating point drift.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// ISO 4217 currency codes the storefront can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    VND,
    USD,
}

impl CurrencyCode {
    /// Number of decimal places shown for this currency.
    #[must_use]
    pub const fn minor_digits(self) -> u32 {
        match self {
            Self::VND => 0,
            Self::USD => 2,
        }
    }

    /// Display suffix placed after the amount.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::VND => "đ",
            Self::USD => "$",
        }
    }
}

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit.
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// A whole-dong amount.
    #[must_use]
    pub fn vnd(amount: i64) -> Self {
        Self::new(Decimal::from(amount), CurrencyCode::VND)
    }

    /// Zero in the default currency.
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(Decimal::ZERO, CurrencyCode::VND)
    }

    /// Whether the amount is strictly greater than zero.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// Price of `quantity` units.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self::new(self.amount * Decimal::from(quantity), self.currency_code)
    }

    /// Format the amount with Vietnamese digit grouping (`1.250.000 đ`).
    #[must_use]
    pub fn display(&self) -> String {
        let rounded = self.amount.round_dp_with_strategy(
            self.currency_code.minor_digits(),
            RoundingStrategy::MidpointAwayFromZero,
        );
        let text = rounded.abs().to_string();
        let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, ch) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }

        let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
            "-"
        } else {
            ""
        };
        if fraction.is_empty() {
            format!("{sign}{grouped} {}", self.currency_code.symbol())
        } else {
            format!("{sign}{grouped},{fraction} {}", self.currency_code.symbol())
        }
    }
}

impl Default for Price {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl Add for Price {
    type Output = Self;

    /// Adds amounts. The left-hand currency wins; the storefront prices
    /// everything in a single currency.
    fn add(self, rhs: Self) -> Self {
        Self::new(self.amount + rhs.amount, self.currency_code)
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_groups_thousands() {
        assert_eq!(Price::vnd(250_000).display(), "250.000 đ");
        assert_eq!(Price::vnd(1_250_000).display(), "1.250.000 đ");
        assert_eq!(Price::vnd(999).display(), "999 đ");
        assert_eq!(Price::vnd(0).display(), "0 đ");
    }

    #[test]
    fn test_display_rounds_to_currency_digits() {
        let price = Price::new(Decimal::new(19_995, 1), CurrencyCode::VND);
        assert_eq!(price.display(), "2.000 đ");

        let usd = Price::new(Decimal::new(123_456, 2), CurrencyCode::USD);
        assert_eq!(usd.display(), "1.234,56 $");
    }

    #[test]
    fn test_times_and_sum() {
        let total: Price = [Price::vnd(1000).times(3), Price::vnd(250)]
            .into_iter()
            .sum();
        assert_eq!(total, Price::vnd(3250));
    }

    #[test]
    fn test_is_positive() {
        assert!(Price::vnd(1).is_positive());
        assert!(!Price::zero().is_positive());
        assert!(!Price::vnd(-5).is_positive());
    }
}
