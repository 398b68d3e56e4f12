//! [`Product`] definitions.

use common::{money::Currency, Money};
use derive_more::{Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rentable product with its pricing.
#[derive(Clone, Debug)]
pub struct Product {
    /// ID of this [`Product`].
    pub id: Id,

    /// Human-readable name of this [`Product`].
    pub name: String,

    /// Refundable deposit taken once per rental.
    pub security_deposit: Decimal,

    /// One-time installation fee.
    pub installation_fee: Decimal,

    /// Rent charged every month.
    pub monthly_rent: Decimal,

    /// [`Currency`] all the prices of this [`Product`] are expressed in.
    pub currency: Currency,
}

impl Product {
    /// Returns the security deposit of this [`Product`] as [`Money`].
    #[must_use]
    pub fn security_deposit(&self) -> Money {
        self.money(self.security_deposit)
    }

    /// Returns the installation fee of this [`Product`] as [`Money`].
    #[must_use]
    pub fn installation_fee(&self) -> Money {
        self.money(self.installation_fee)
    }

    /// Returns the monthly rent of this [`Product`] as [`Money`].
    #[must_use]
    pub fn monthly_rent(&self) -> Money {
        self.money(self.monthly_rent)
    }

    fn money(&self, amount: Decimal) -> Money {
        Money {
            amount,
            currency: self.currency,
        }
    }
}

/// ID of a [`Product`].
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    From,
    FromStr,
    Hash,
    Into,
    PartialEq,
    Serialize,
)]
#[cfg_attr(feature = "postgres", derive(ToSql, FromSql), postgres(transparent))]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random [`Id`].
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}
