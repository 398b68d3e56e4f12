//! [`Notification`] definitions.

#[cfg(doc)]
use common::DateTime;
use common::{define_kind, unit, DateTimeOf};
use derive_more::{Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{order, service_request, user};
#[cfg(doc)]
use crate::domain::{Order, ServiceRequest, User};

/// User-facing message emitted on a state transition.
///
/// Append-only: never mutated except its read flag.
#[derive(Clone, Debug)]
pub struct Notification {
    /// ID of this [`Notification`].
    pub id: Id,

    /// ID of the [`User`] this [`Notification`] is addressed to.
    pub user_id: user::Id,

    /// Title of this [`Notification`].
    pub title: String,

    /// Message of this [`Notification`].
    pub message: String,

    /// [`Kind`] of this [`Notification`].
    pub kind: Kind,

    /// Entity this [`Notification`] is about, if any.
    pub related: Option<Related>,

    /// Indicator whether the [`User`] has read this [`Notification`].
    pub is_read: bool,

    /// [`DateTime`] when this [`Notification`] was created.
    pub created_at: CreationDateTime,
}

impl Notification {
    /// Creates a new unread [`Notification`].
    #[must_use]
    pub fn new(
        user_id: user::Id,
        kind: Kind,
        title: impl Into<String>,
        message: impl Into<String>,
        related: Option<Related>,
    ) -> Self {
        Self {
            id: Id::new(),
            user_id,
            title: title.into(),
            message: message.into(),
            kind,
            related,
            is_read: false,
            created_at: DateTimeOf::now(),
        }
    }
}

/// ID of a [`Notification`].
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

/// Entity a [`Notification`] relates to.
#[derive(Clone, Copy, Debug, Eq, From, PartialEq)]
pub enum Related {
    /// [`Order`] related to the [`Notification`].
    Order(order::Id),

    /// [`ServiceRequest`] related to the [`Notification`].
    ServiceRequest(service_request::Id),
}

impl Related {
    /// Returns the name of the related entity type.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Order(_) => "order",
            Self::ServiceRequest(_) => "service_request",
        }
    }

    /// Returns the raw ID of the related entity.
    #[must_use]
    pub fn id(&self) -> Uuid {
        match *self {
            Self::Order(id) => id.into(),
            Self::ServiceRequest(id) => id.into(),
        }
    }
}

define_kind! {
    #[doc = "Kind of a [`Notification`]."]
    #[case = "snake_case"]
    enum Kind {
        #[doc = "Payment-related."]
        Payment = 1,

        #[doc = "[`ServiceRequest`]-related."]
        ServiceRequest = 2,

        #[doc = "Feedback on a completed [`ServiceRequest`]."]
        ServiceFeedback = 3,
    }
}

/// Policy of delivering a [`Notification`] along with the state transition
/// it accompanies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Delivery {
    /// Failure to record the [`Notification`] aborts the transition.
    Required,

    /// Failure to record the [`Notification`] is logged and ignored.
    BestEffort,
}

/// [`DateTime`] when a [`Notification`] was created.
pub type CreationDateTime = DateTimeOf<(Notification, unit::Creation)>;
