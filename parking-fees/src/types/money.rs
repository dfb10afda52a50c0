use std::{
    fmt::Display,
    ops::{Add, AddAssign, Mul},
};

use serde::{Deserialize, Serialize};

/// A monetary amount in the minor unit of the tariff's currency.
#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    pub(crate) fn zero() -> Self {
        Self(0)
    }

    /// Construct an amount from a value in minor units.
    #[must_use]
    pub fn from_minor(value: u64) -> Self {
        Self(value)
    }

    /// The amount in minor units.
    #[must_use]
    pub fn minor(self) -> u64 {
        self.0
    }

    /// Saturating addition
    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Limit this amount to `cap`, if any.
    #[must_use]
    pub fn capped(self, cap: Option<Money>) -> Self {
        cap.map_or(self, |cap| self.min(cap))
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = self.saturating_add(rhs);
    }
}

impl Mul<u64> for Money {
    type Output = Money;

    fn mul(self, rhs: u64) -> Self::Output {
        Self(self.0.saturating_mul(rhs))
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Add::add)
    }
}

impl From<u64> for Money {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The outcome of pricing a parking stay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "amount")]
pub enum Fee {
    /// The fee owed for the stay.
    Amount(Money),
    /// No applicable rate was found for any part of the stay.
    Undetermined,
}

impl Fee {
    /// The amount owed, `None` if the fee is undetermined.
    #[must_use]
    pub fn amount(self) -> Option<Money> {
        match self {
            Self::Amount(money) => Some(money),
            Self::Undetermined => None,
        }
    }
}

impl Display for Fee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Amount(money) => money.fmt(f),
            Self::Undetermined => f.write_str("undetermined"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Fee, Money};

    #[test]
    fn capped_limits_only_when_cap_is_lower() {
        let amount = Money::from_minor(2400);

        assert_eq!(amount.capped(Some(Money::from_minor(2000))), Money::from_minor(2000));
        assert_eq!(amount.capped(Some(Money::from_minor(3000))), amount);
        assert_eq!(amount.capped(None), amount);
    }

    #[test]
    fn addition_saturates() {
        let amount = Money::from_minor(u64::MAX) + Money::from_minor(1);
        assert_eq!(amount, Money::from_minor(u64::MAX));
    }

    #[test]
    fn undetermined_has_no_amount() {
        assert_eq!(Fee::Undetermined.amount(), None);
        assert_eq!(
            Fee::Amount(Money::from_minor(5)).amount(),
            Some(Money::from_minor(5))
        );
    }
}
