//! [`Subscription`] definitions.

#[cfg(doc)]
use common::DateTime;
use common::{define_kind, unit, DateTimeOf, Money};
use derive_more::{Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{franchise, order, product, user};
#[cfg(doc)]
use crate::domain::{Franchise, Order, Product, User};

/// Recurring billing contract of an [`Order`].
#[derive(Clone, Debug)]
pub struct Subscription {
    /// ID of this [`Subscription`].
    pub id: Id,

    /// ID of the customer [`User`] owning this [`Subscription`].
    pub customer_id: user::Id,

    /// ID of the [`Order`] this [`Subscription`] originates from.
    pub order_id: order::Id,

    /// ID of the [`Franchise`] serving this [`Subscription`].
    pub franchise_id: franchise::Id,

    /// ID of the rented [`Product`].
    pub product_id: product::Id,

    /// Amount billed every month.
    pub monthly_rent: Money,

    /// [`Status`] of this [`Subscription`].
    pub status: Status,

    /// [`DateTime`] of the next billing.
    pub next_billing_at: BillingDateTime,

    /// [`DateTime`] when this [`Subscription`] was created.
    pub created_at: CreationDateTime,

    /// [`DateTime`] when this [`Subscription`] was last modified.
    pub updated_at: ModificationDateTime,
}

impl Subscription {
    /// Indicates whether this [`Subscription`] is [`Status::Active`].
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }
}

/// ID of a [`Subscription`].
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

define_kind! {
    #[doc = "Status of a [`Subscription`]."]
    #[case = "snake_case"]
    enum Status {
        #[doc = "Billed monthly and eligible for service."]
        Active = 1,

        #[doc = "Temporarily suspended."]
        Inactive = 2,

        #[doc = "Terminated for good."]
        Cancelled = 3,
    }
}

/// [`DateTime`] of a [`Subscription`] billing.
pub type BillingDateTime = DateTimeOf<(Subscription, unit::Billing)>;

/// [`DateTime`] when a [`Subscription`] was created.
pub type CreationDateTime = DateTimeOf<(Subscription, unit::Creation)>;

/// [`DateTime`] when a [`Subscription`] was last modified.
pub type ModificationDateTime = DateTimeOf<(Subscription, unit::Modification)>;
