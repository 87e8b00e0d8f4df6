//! Value Objects for the commerce engine

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Non-negative monetary amount in the store currency, kept to two decimal places.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(amount.round_dp(2)) }
    pub fn from_major(units: i64) -> Self { Self(Decimal::from(units)) }
    pub fn from_cents(cents: i64) -> Self { Self(Decimal::new(cents, 2)) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }
    pub fn multiply(&self, qty: u32) -> Money { Money(self.0 * Decimal::from(qty)) }

    /// `rate` percent of this amount, rounded half-up to cents.
    pub fn percent(&self, rate: Decimal) -> Money {
        Money((self.0 * rate / HUNDRED).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Whole units of `rate` percent, rounded down.
    pub fn percent_floor(&self, rate: Decimal) -> u64 {
        (self.0 * rate / HUNDRED).floor().to_u64().unwrap_or(0)
    }

    pub fn min(self, other: Money) -> Money { if other < self { other } else { self } }

    /// Subtraction that refuses to go below zero.
    pub fn checked_sub(&self, other: Money) -> Option<Money> {
        if other > *self { None } else { Some(Money(self.0 - other.0)) }
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) { self.0 += rhs.0; }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money { Money(self.0 - rhs.0) }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, Add::add) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_add() {
        let a = Money::from_major(100);
        let b = Money::from_major(50);
        assert_eq!((a + b).amount(), Decimal::new(150, 0));
    }

    #[test]
    fn test_percent_rounds_to_cents() {
        assert_eq!(Money::from_major(1000).percent(Decimal::from(5)), Money::from_major(50));
        assert_eq!(Money::from_cents(1999).percent(Decimal::from(3)), Money::from_cents(60));
    }

    #[test]
    fn test_percent_floor() {
        assert_eq!(Money::from_cents(19999).percent_floor(Decimal::ONE), 1);
        assert_eq!(Money::from_major(1000).percent_floor(Decimal::ONE), 10);
        assert_eq!(Money::from_cents(99).percent_floor(Decimal::ONE), 0);
    }

    #[test]
    fn test_checked_sub_never_negative() {
        assert_eq!(Money::from_major(5).checked_sub(Money::from_major(6)), None);
        assert_eq!(Money::from_major(5).checked_sub(Money::from_major(5)), Some(Money::ZERO));
    }
}
