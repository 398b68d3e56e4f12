//! [`Franchise`] definitions.

use derive_more::{Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user;
#[cfg(doc)]
use crate::domain::User;

/// Regional operating unit of the rental business.
#[derive(Clone, Debug)]
pub struct Franchise {
    /// ID of this [`Franchise`].
    pub id: Id,

    /// Human-readable name of this [`Franchise`].
    pub name: String,

    /// ID of the [`User`] owning this [`Franchise`], if any.
    pub owner_id: Option<user::Id>,
}

impl Franchise {
    /// Indicates whether the provided [`User`] owns this [`Franchise`].
    #[must_use]
    pub fn is_owned_by(&self, user_id: user::Id) -> bool {
        self.owner_id == Some(user_id)
    }
}

/// ID of a [`Franchise`].
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
