//! [`User`] definitions.

pub mod session;

#[cfg(doc)]
use common::DateTime;
use common::{define_kind, unit, DateTimeOf};
use derive_more::{AsRef, Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::franchise;
#[cfg(doc)]
use crate::domain::Franchise;

pub use self::session::Session;

/// Platform user.
#[derive(Clone, Debug)]
pub struct User {
    /// ID of this [`User`]
    pub id: Id,

    /// [`Name`] of this [`User`].
    pub name: Name,

    /// [`Role`] of this [`User`].
    pub role: Role,

    /// ID of the [`Franchise`] this [`User`] works for, if any.
    ///
    /// Only meaningful for [`Role::ServiceAgent`]s.
    pub franchise_id: Option<franchise::Id>,

    /// [`DateTime`] when this [`User`] was created.
    pub created_at: CreationDateTime,
}

impl User {
    /// Returns the [`Actor`] acting on behalf of this [`User`].
    #[must_use]
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
        }
    }
}

/// ID of a [`User`].
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

/// Name of a [`User`].
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Name(String);

impl Name {
    /// Creates a new [`Name`].
    ///
    /// # Safety
    ///
    /// The caller must ensure that the given `name` matches the format.
    #[expect(unsafe_code, reason = "bypass")]
    #[must_use]
    pub unsafe fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Creates a new [`Name`] if the given `name` is valid.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        Self::check(&name).then_some(Self(name))
    }

    /// Checks whether the given `name` is a valid [`Name`].
    fn check(name: impl AsRef<str>) -> bool {
        let name = name.as_ref();
        name.trim() == name && !name.is_empty() && name.len() <= 512
    }
}

impl FromStr for Name {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Name`")
    }
}

define_kind! {
    #[doc = "Role of a [`User`] on the platform."]
    #[case = "snake_case"]
    enum Role {
        #[doc = "Platform administrator."]
        Admin = 1,

        #[doc = "Owner of one or more [`Franchise`]s."]
        FranchiseOwner = 2,

        #[doc = "Field agent performing service visits."]
        ServiceAgent = 3,

        #[doc = "Customer renting products."]
        Customer = 4,
    }
}

/// Already authenticated [`User`] performing an operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Actor {
    /// ID of the acting [`User`].
    pub id: Id,

    /// [`Role`] the [`User`] acts in.
    pub role: Role,
}

impl Actor {
    /// Indicates whether this [`Actor`] acts as a [`Role::Customer`].
    #[must_use]
    pub fn is_customer(&self) -> bool {
        self.role == Role::Customer
    }
}

/// [`DateTime`] when a [`User`] was created.
pub type CreationDateTime = DateTimeOf<(User, unit::Creation)>;
