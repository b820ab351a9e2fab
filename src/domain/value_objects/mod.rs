//! Value Objects for the shop

use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Error;

/// Places kept when two amounts are compared.
pub const CURRENCY_PRECISION: u32 = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("quantity must be greater than zero, got {0}")]
    NonPositiveQuantity(i64),
    #[error("day_of_week must be between 0 and 6, got {0}")]
    DayOutOfRange(i64),
    #[error("unknown payment method {0:?}")]
    UnknownPaymentMethod(String),
    #[error("amount must not be negative")]
    NegativeAmount,
}

impl From<ValueError> for Error {
    fn from(err: ValueError) -> Self {
        Error::invalid_argument(err.to_string())
    }
}

// =============================================================================
// Money
// =============================================================================

/// Fixed-point amount in the shop currency (naira).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(amount) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }

    pub fn times(&self, qty: Quantity) -> Money { Money(self.0 * Decimal::from(qty.value())) }

    pub fn to_currency_precision(&self) -> Money {
        Money(self.0.round_dp_with_strategy(CURRENCY_PRECISION, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Equality after rounding both sides to kobo.
    pub fn matches(&self, other: &Money) -> bool {
        self.to_currency_precision() == other.to_currency_precision()
    }

    /// Amount in kobo, as the payment gateway expects it. `None` when it does not fit.
    pub fn to_minor_units(&self) -> Option<i64> {
        use rust_decimal::prelude::ToPrimitive;
        self.to_currency_precision().0.checked_mul(Decimal::ONE_HUNDRED)?.to_i64()
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, Add::add) }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self { Self(amount) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.to_currency_precision().0) }
}

// =============================================================================
// Quantity
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: i64) -> Result<Self, ValueError> {
        u32::try_from(value)
            .ok()
            .filter(|v| *v > 0)
            .map(Self)
            .ok_or(ValueError::NonPositiveQuantity(value))
    }

    pub fn value(&self) -> u32 { self.0 }

    /// Remaining stock after taking this quantity, or `None` when stock is short.
    pub fn deduct_from(&self, stock: i32) -> Option<i32> {
        let qty = i32::try_from(self.0).ok()?;
        stock.checked_sub(qty).filter(|left| *left >= 0)
    }
}

// =============================================================================
// Payment method
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Normal,
    Subscription,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Subscription => "subscription",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for PaymentMethod {
    type Err = ValueError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "subscription" => Ok(Self::Subscription),
            other => Err(ValueError::UnknownPaymentMethod(other.to_string())),
        }
    }
}

impl TryFrom<String> for PaymentMethod {
    type Error = ValueError;
    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

// =============================================================================
// Day of week
// =============================================================================

/// Delivery weekday, 0 = Sunday through 6 = Saturday.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DayOfWeek(i16);

impl DayOfWeek {
    pub fn new(value: i64) -> Result<Self, ValueError> {
        match value {
            0..=6 => Ok(Self(value as i16)),
            other => Err(ValueError::DayOutOfRange(other)),
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.weekday().num_days_from_sunday() as i16)
    }

    pub fn value(&self) -> i16 { self.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_sum_and_times() {
        let unit = Money::new(Decimal::new(1250, 2));
        let qty = Quantity::new(3).unwrap();
        let total: Money = [unit.times(qty), Money::new(Decimal::new(5, 0))].into_iter().sum();
        assert_eq!(total.amount(), Decimal::new(4250, 2));
    }

    #[test]
    fn test_money_matches_at_currency_precision() {
        let server = Money::new(Decimal::new(3000, 2));
        assert!(server.matches(&Money::new(Decimal::new(30, 0))));
        assert!(server.matches(&Money::new(Decimal::new(300001, 4))));
        assert!(!server.matches(&Money::new(Decimal::new(3001, 2))));
    }

    #[test]
    fn test_money_minor_units() {
        assert_eq!(Money::new(Decimal::new(150050, 2)).to_minor_units(), Some(150050));
    }

    #[test]
    fn test_money_minor_units_out_of_range() {
        let huge: Money = serde_json::from_str("\"79000000000000000000000000000\"").unwrap();
        assert_eq!(huge.to_minor_units(), None);
        let beyond_i64: Money = serde_json::from_str("\"100000000000000000000\"").unwrap();
        assert_eq!(beyond_i64.to_minor_units(), None);
    }

    #[test]
    fn test_money_deserializes_numbers_and_strings() {
        let from_number: Money = serde_json::from_str("19.99").unwrap();
        let from_string: Money = serde_json::from_str("\"19.99\"").unwrap();
        assert!(from_number.matches(&from_string));
    }

    #[test]
    fn test_quantity_rejects_zero_and_negative() {
        assert_eq!(Quantity::new(0), Err(ValueError::NonPositiveQuantity(0)));
        assert!(Quantity::new(-2).is_err());
        assert_eq!(Quantity::new(4).unwrap().value(), 4);
    }

    #[test]
    fn test_quantity_deduct_from() {
        let qty = Quantity::new(3).unwrap();
        assert_eq!(qty.deduct_from(3), Some(0));
        assert_eq!(qty.deduct_from(2), None);
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!("subscription".parse::<PaymentMethod>().unwrap(), PaymentMethod::Subscription);
        assert!(PaymentMethod::try_from("card".to_string()).is_err());
    }

    #[test]
    fn test_day_of_week_from_date() {
        let sunday = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        let saturday = NaiveDate::from_ymd_opt(2024, 6, 8).unwrap();
        assert_eq!(DayOfWeek::from_date(sunday).value(), 0);
        assert_eq!(DayOfWeek::from_date(saturday).value(), 6);
        assert!(DayOfWeek::new(7).is_err());
    }
}
