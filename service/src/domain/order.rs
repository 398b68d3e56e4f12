//! [`Order`] definitions.

#[cfg(doc)]
use common::DateTime;
use common::{define_kind, unit, DateTimeOf, Money};
use derive_more::{AsRef, Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{franchise, product, user, Product};
#[cfg(doc)]
use crate::domain::{Franchise, User};

/// Rental purchase intent of a customer.
#[derive(Clone, Debug)]
pub struct Order {
    /// ID of this [`Order`].
    pub id: Id,

    /// ID of the customer [`User`] who placed this [`Order`].
    pub customer_id: user::Id,

    /// ID of the ordered [`Product`].
    pub product_id: product::Id,

    /// ID of the [`Franchise`] fulfilling this [`Order`].
    pub franchise_id: franchise::Id,

    /// [`Kind`] of this [`Order`].
    pub kind: Kind,

    /// [`Status`] of this [`Order`].
    pub status: Status,

    /// [`Address`] to deliver the [`Product`] to.
    pub shipping_address: Address,

    /// [`Address`] to bill.
    pub billing_address: Address,

    /// For how long the [`Product`] is rented.
    pub rental_duration: RentalDuration,

    /// Security deposit taken for this [`Order`].
    pub security_deposit: Money,

    /// Installation fee taken for this [`Order`].
    pub installation_fee: Money,

    /// Amount to be paid upfront, as computed by [`Order::total()`].
    pub total_initial_amount: Money,

    /// Free-form notes left by the customer.
    pub notes: Option<String>,

    /// ID of the service agent [`User`] assigned to this [`Order`], if any.
    pub service_agent_id: Option<user::Id>,

    /// [`DateTime`] when this [`Order`] was created.
    pub created_at: CreationDateTime,

    /// [`DateTime`] when this [`Order`] was last modified.
    pub updated_at: ModificationDateTime,
}

impl Order {
    /// Computes the initial amount to be paid for renting the provided
    /// [`Product`] for the provided [`RentalDuration`].
    ///
    /// [`None`] is returned on arithmetic overflow.
    #[must_use]
    pub fn total(product: &Product, duration: RentalDuration) -> Option<Money> {
        let rent = product
            .monthly_rent()
            .checked_mul(u32::from(duration.months()))?;
        product
            .security_deposit()
            .checked_add(product.installation_fee())?
            .checked_add(rent)
    }
}

/// ID of an [`Order`].
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

/// Postal address of an [`Order`].
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Address(String);

impl Address {
    /// Creates a new [`Address`] if the given `address` is valid.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Option<Self> {
        let address = address.into();
        Self::check(&address).then_some(Self(address))
    }

    /// Checks whether the given `address` is a valid [`Address`].
    fn check(address: impl AsRef<str>) -> bool {
        let address = address.as_ref();
        !address.trim().is_empty() && address.len() <= 1024
    }
}

/// Number of months an [`Order`] rents a [`Product`] for.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub struct RentalDuration(u16);

impl RentalDuration {
    /// Creates a new [`RentalDuration`] of at least one month.
    #[must_use]
    pub fn new(months: u16) -> Option<Self> {
        (months >= 1).then_some(Self(months))
    }

    /// Returns the number of months.
    #[must_use]
    pub fn months(self) -> u16 {
        self.0
    }
}

#[cfg(feature = "postgres")]
impl<'a> FromSql<'a> for RentalDuration {
    postgres_types::accepts!(INT4);

    fn from_sql(
        ty: &postgres_types::Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        let months = u16::try_from(i32::from_sql(ty, raw)?)?;
        Self::new(months).ok_or_else(|| "invalid `RentalDuration`".into())
    }
}

#[cfg(feature = "postgres")]
impl ToSql for RentalDuration {
    postgres_types::accepts!(INT4);
    postgres_types::to_sql_checked!();

    fn to_sql(
        &self,
        ty: &postgres_types::Type,
        w: &mut postgres_types::private::BytesMut,
    ) -> Result<postgres_types::IsNull, Box<dyn std::error::Error + Sync + Send>>
    {
        i32::from(self.0).to_sql(ty, w)
    }
}

define_kind! {
    #[doc = "Kind of an [`Order`]."]
    #[case = "snake_case"]
    enum Kind {
        #[doc = "[`Product`] is rented on a monthly basis."]
        Rental = 1,
    }
}

define_kind! {
    #[doc = "Status of an [`Order`]."]
    #[case = "snake_case"]
    enum Status {
        #[doc = "Awaiting the initial payment."]
        Pending = 1,

        #[doc = "Initial payment has been verified."]
        Approved = 2,

        #[doc = "Rejected by the [`Franchise`]."]
        Rejected = 3,

        #[doc = "Cancelled before being fulfilled."]
        Cancelled = 4,

        #[doc = "Rental has finished."]
        Completed = 5,
    }
}

/// [`DateTime`] when an [`Order`] was created.
pub type CreationDateTime = DateTimeOf<(Order, unit::Creation)>;

/// [`DateTime`] when an [`Order`] was last modified.
pub type ModificationDateTime = DateTimeOf<(Order, unit::Modification)>;

#[cfg(test)]
mod spec {
    use common::money::Currency;

    use crate::domain::{product, Product};

    use super::{Order, RentalDuration};

    fn product(deposit: &str, fee: &str, rent: &str) -> Product {
        Product {
            id: product::Id::new(),
            name: "RO purifier".into(),
            security_deposit: deposit.parse().unwrap(),
            installation_fee: fee.parse().unwrap(),
            monthly_rent: rent.parse().unwrap(),
            currency: Currency::Inr,
        }
    }

    #[test]
    fn total_follows_pricing_formula() {
        let p = product("1000", "500", "300");
        let total = Order::total(&p, RentalDuration::new(12).unwrap()).unwrap();
        assert_eq!(total.amount, "5100".parse().unwrap());
        assert_eq!(total.currency, Currency::Inr);
        assert_eq!(total.minor_units(), Some(510_000));
    }

    #[test]
    fn total_keeps_fractional_prices_exact() {
        let p = product("999.99", "0.01", "299.995");
        let total = Order::total(&p, RentalDuration::new(3).unwrap()).unwrap();
        assert_eq!(total.amount, "1899.985".parse().unwrap());
        assert_eq!(total.minor_units(), Some(189_999));
    }

    #[test]
    fn rental_duration_is_at_least_one_month() {
        assert!(RentalDuration::new(0).is_none());
        assert_eq!(RentalDuration::new(1).unwrap().months(), 1);
    }
}
