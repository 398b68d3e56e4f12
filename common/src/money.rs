//! [`Money`]-related definitions.

use std::fmt;

use rust_decimal::{prelude::ToPrimitive as _, Decimal, RoundingStrategy};

use crate::define_kind;

/// Amount of money in some [`Currency`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Money {
    /// Amount of this [`Money`].
    pub amount: Decimal,

    /// [`Currency`] of this amount.
    pub currency: Currency,
}

impl Money {
    /// Creates a zero [`Money`] amount in the provided [`Currency`].
    #[must_use]
    pub const fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Returns this [`Money`] amount expressed in the minor units of its
    /// [`Currency`] (paise for [`Currency::Inr`], cents for
    /// [`Currency::Usd`], etc.), rounded half away from zero.
    ///
    /// [`None`] is returned if the amount doesn't fit into an [`i64`].
    #[must_use]
    pub fn minor_units(&self) -> Option<i64> {
        self.amount
            .checked_mul(Decimal::ONE_HUNDRED)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
    }

    /// Adds the `other` [`Money`] amount to this one.
    ///
    /// [`None`] is returned if the currencies differ or the result overflows.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        (self.currency == other.currency).then_some(())?;
        Some(Self {
            amount: self.amount.checked_add(other.amount)?,
            currency: self.currency,
        })
    }

    /// Multiplies this [`Money`] amount by the provided `times`.
    ///
    /// [`None`] is returned if the result overflows.
    #[must_use]
    pub fn checked_mul(self, times: u32) -> Option<Self> {
        Some(Self {
            amount: self.amount.checked_mul(Decimal::from(times))?,
            currency: self.currency,
        })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount.normalize(), self.currency)
    }
}

define_kind! {
    #[doc = "Currency of a [`Money`] amount."]
    #[case = "UPPERCASE"]
    enum Currency {
        #[doc = "Indian Rupee."]
        Inr = 1,

        #[doc = "US Dollar."]
        Usd = 2,

        #[doc = "Euro."]
        Eur = 3,
    }
}

#[cfg(test)]
mod spec {
    use rust_decimal::Decimal;

    use super::{Currency, Money};

    fn decimal(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn inr(s: &str) -> Money {
        Money {
            amount: decimal(s),
            currency: Currency::Inr,
        }
    }

    #[test]
    fn to_string() {
        assert_eq!(inr("123.45").to_string(), "123.45INR");
        assert_eq!(inr("123.00").to_string(), "123INR");
        assert_eq!(inr("123").to_string(), "123INR");
    }

    #[test]
    fn minor_units() {
        assert_eq!(inr("5100").minor_units(), Some(510_000));
        assert_eq!(inr("299.99").minor_units(), Some(29_999));
        assert_eq!(inr("0.005").minor_units(), Some(1));
        assert_eq!(inr("0").minor_units(), Some(0));
        assert_eq!(Money::zero(Currency::Inr).minor_units(), Some(0));
        assert_eq!(inr("79228162514264337593543950335").minor_units(), None);
    }

    #[test]
    fn arithmetic() {
        let rent = inr("300").checked_mul(12).unwrap();
        assert_eq!(rent, inr("3600"));

        let total = inr("1000")
            .checked_add(inr("500"))
            .and_then(|m| m.checked_add(rent))
            .unwrap();
        assert_eq!(total, inr("5100"));

        let usd = Money {
            amount: decimal("1"),
            currency: Currency::Usd,
        };
        assert_eq!(inr("1").checked_add(usd), None);
    }
}
