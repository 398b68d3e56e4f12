//! [`ServiceRequest`] definitions.

#[cfg(doc)]
use common::DateTime;
use common::{define_kind, unit, DateTimeOf};
use derive_more::{Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{subscription, user, user::Role};
#[cfg(doc)]
use crate::domain::{Subscription, User};

/// Post-sale service visit of a [`Subscription`].
#[derive(Clone, Debug)]
pub struct ServiceRequest {
    /// ID of this [`ServiceRequest`].
    pub id: Id,

    /// ID of the customer [`User`] who requested the service.
    pub customer_id: user::Id,

    /// ID of the [`Subscription`] the service is requested for.
    pub subscription_id: subscription::Id,

    /// [`Kind`] of the requested service.
    pub kind: Kind,

    /// [`Status`] of this [`ServiceRequest`].
    pub status: Status,

    /// Problem description left by the customer.
    pub description: String,

    /// [`DateTime`] the visit is scheduled for, if any.
    pub scheduled_at: Option<ScheduleDateTime>,

    /// [`DateTime`] the visit has been completed at, if it has.
    pub completed_at: Option<CompletionDateTime>,

    /// ID of the service agent [`User`] assigned, if any.
    pub service_agent_id: Option<user::Id>,

    /// [`Rating`] given by the customer after completion, if any.
    pub rating: Option<Rating>,

    /// Feedback left by the customer after completion, if any.
    pub feedback: Option<String>,

    /// Internal notes of the staff.
    pub notes: Option<String>,

    /// [`DateTime`] when this [`ServiceRequest`] was created.
    pub created_at: CreationDateTime,

    /// [`DateTime`] when this [`ServiceRequest`] was last modified.
    pub updated_at: ModificationDateTime,
}

/// ID of a [`ServiceRequest`].
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

/// Customer rating of a completed [`ServiceRequest`], from 1 to 5 stars.
#[derive(Clone, Copy, Debug, Display, Eq, Into, PartialEq)]
pub struct Rating(u8);

impl Rating {
    /// Creates a new [`Rating`] if the given number of `stars` is in `1..=5`.
    #[must_use]
    pub fn new(stars: u8) -> Option<Self> {
        (1..=5).contains(&stars).then_some(Self(stars))
    }

    /// Returns the number of stars.
    #[must_use]
    pub fn stars(self) -> u8 {
        self.0
    }
}

#[cfg(feature = "postgres")]
impl<'a> FromSql<'a> for Rating {
    postgres_types::accepts!(INT2);

    fn from_sql(
        ty: &postgres_types::Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        let stars = u8::try_from(i16::from_sql(ty, raw)?)?;
        Self::new(stars).ok_or_else(|| "invalid `Rating`".into())
    }
}

#[cfg(feature = "postgres")]
impl ToSql for Rating {
    postgres_types::accepts!(INT2);
    postgres_types::to_sql_checked!();

    fn to_sql(
        &self,
        ty: &postgres_types::Type,
        w: &mut postgres_types::private::BytesMut,
    ) -> Result<postgres_types::IsNull, Box<dyn std::error::Error + Sync + Send>>
    {
        i16::from(self.0).to_sql(ty, w)
    }
}

define_kind! {
    #[doc = "Kind of a requested service."]
    #[case = "snake_case"]
    enum Kind {
        #[doc = "Initial installation."]
        Installation = 1,

        #[doc = "Periodic maintenance."]
        Maintenance = 2,

        #[doc = "Repair of a malfunction."]
        Repair = 3,

        #[doc = "Removal at the end of the rental."]
        Uninstallation = 4,
    }
}

define_kind! {
    #[doc = "Status of a [`ServiceRequest`]."]
    #[case = "snake_case"]
    enum Status {
        #[doc = "Waiting for a service agent."]
        Pending = 1,

        #[doc = "Service agent has been assigned."]
        Assigned = 2,

        #[doc = "Visit has been scheduled."]
        Scheduled = 3,

        #[doc = "Visit has been performed."]
        Completed = 4,

        #[doc = "Cancelled before completion."]
        Cancelled = 5,
    }
}

impl Status {
    /// Indicates whether no further transitions are possible from this
    /// [`Status`].
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Indicates whether a [`ServiceRequest`] in this [`Status`] may be
    /// cancelled.
    #[must_use]
    pub fn is_cancellable(self) -> bool {
        !self.is_terminal()
    }

    /// Indicates whether a [`ServiceRequest`] may move from this [`Status`]
    /// into the `next` one.
    ///
    /// Transitions only go forward along
    /// `pending -> assigned -> scheduled -> completed`, while `cancelled` is
    /// reachable from any non-terminal [`Status`]. Staying in the same
    /// non-terminal [`Status`] is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Cancelled || next.u8() >= self.u8()
    }
}

/// Field of a [`ServiceRequest`] an update may touch.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Field {
    /// [`ServiceRequest::status`].
    #[display("status")]
    Status,

    /// [`ServiceRequest::scheduled_at`].
    #[display("scheduled_at")]
    ScheduledAt,

    /// [`ServiceRequest::completed_at`].
    #[display("completed_at")]
    CompletedAt,

    /// [`ServiceRequest::notes`].
    #[display("notes")]
    Notes,

    /// [`ServiceRequest::service_agent_id`].
    #[display("agent_id")]
    Agent,
}

impl Field {
    /// Returns the [`Field`]s the provided [`Role`] may update.
    #[must_use]
    pub fn editable_by(role: Role) -> &'static [Self] {
        match role {
            Role::Admin | Role::FranchiseOwner => &[
                Self::Status,
                Self::ScheduledAt,
                Self::CompletedAt,
                Self::Notes,
                Self::Agent,
            ],
            Role::ServiceAgent => &[
                Self::Status,
                Self::ScheduledAt,
                Self::CompletedAt,
                Self::Notes,
            ],
            Role::Customer => &[Self::Status],
        }
    }
}

/// Requested changes of a [`ServiceRequest`].
#[derive(Clone, Debug, Default)]
pub struct Changes {
    /// New [`Status`].
    pub status: Option<Status>,

    /// New [`DateTime`] of the visit.
    pub scheduled_at: Option<ScheduleDateTime>,

    /// [`DateTime`] the visit has been completed at.
    pub completed_at: Option<CompletionDateTime>,

    /// New notes.
    pub notes: Option<String>,

    /// ID of the service agent [`User`] to assign.
    pub agent_id: Option<user::Id>,
}

impl Changes {
    /// Returns the [`Field`]s touched by these [`Changes`].
    pub fn fields(&self) -> impl Iterator<Item = Field> {
        [
            self.status.map(|_| Field::Status),
            self.scheduled_at.map(|_| Field::ScheduledAt),
            self.completed_at.map(|_| Field::CompletedAt),
            self.notes.as_ref().map(|_| Field::Notes),
            self.agent_id.map(|_| Field::Agent),
        ]
        .into_iter()
        .flatten()
    }

    /// Indicates whether these [`Changes`] touch nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields().next().is_none()
    }

    /// Checks whether the provided [`Role`] may apply these [`Changes`] to a
    /// [`ServiceRequest`] in the `current` [`Status`].
    ///
    /// Only checks the role-wide permission table. Ownership and franchise
    /// scoping are checked separately.
    #[must_use]
    pub fn permitted_for(&self, role: Role, current: Status) -> bool {
        let editable = Field::editable_by(role);
        if !self.fields().all(|f| editable.contains(&f)) {
            return false;
        }
        match role {
            Role::Customer => {
                current == Status::Pending
                    && self.status == Some(Status::Cancelled)
            }
            Role::Admin | Role::FranchiseOwner | Role::ServiceAgent => true,
        }
    }
}

/// [`DateTime`] a [`ServiceRequest`] visit is scheduled for.
pub type ScheduleDateTime = DateTimeOf<(ServiceRequest, unit::Schedule)>;

/// [`DateTime`] a [`ServiceRequest`] visit has been completed at.
pub type CompletionDateTime = DateTimeOf<(ServiceRequest, unit::Completion)>;

/// [`DateTime`] when a [`ServiceRequest`] was created.
pub type CreationDateTime = DateTimeOf<(ServiceRequest, unit::Creation)>;

/// [`DateTime`] when a [`ServiceRequest`] was last modified.
pub type ModificationDateTime =
    DateTimeOf<(ServiceRequest, unit::Modification)>;

#[cfg(test)]
mod spec {
    use common::DateTime;

    use crate::domain::user::{self, Role};

    use super::{Changes, Rating, Status};

    const ALL_STATUSES: [Status; 5] = [
        Status::Pending,
        Status::Assigned,
        Status::Scheduled,
        Status::Completed,
        Status::Cancelled,
    ];

    #[test]
    fn cancelled_is_final() {
        for next in ALL_STATUSES {
            assert!(!Status::Cancelled.can_transition_to(next), "{next}");
        }
    }

    #[test]
    fn transitions_go_forward() {
        assert!(Status::Pending.can_transition_to(Status::Assigned));
        assert!(Status::Assigned.can_transition_to(Status::Scheduled));
        assert!(Status::Scheduled.can_transition_to(Status::Completed));
        assert!(Status::Scheduled.can_transition_to(Status::Cancelled));
        assert!(!Status::Scheduled.can_transition_to(Status::Pending));
        assert!(!Status::Completed.can_transition_to(Status::Cancelled));
    }

    #[test]
    fn customer_may_only_cancel_pending() {
        let cancel = Changes {
            status: Some(Status::Cancelled),
            ..Changes::default()
        };
        assert!(cancel.permitted_for(Role::Customer, Status::Pending));
        assert!(!cancel.permitted_for(Role::Customer, Status::Assigned));

        let schedule = Changes {
            status: Some(Status::Scheduled),
            ..Changes::default()
        };
        assert!(!schedule.permitted_for(Role::Customer, Status::Pending));

        let cancel_with_notes = Changes {
            status: Some(Status::Cancelled),
            notes: Some("please hurry".into()),
            ..Changes::default()
        };
        assert!(
            !cancel_with_notes.permitted_for(Role::Customer, Status::Pending)
        );

        let reschedule = Changes {
            scheduled_at: Some(DateTime::now().coerce()),
            ..Changes::default()
        };
        assert!(!reschedule.permitted_for(Role::Customer, Status::Pending));
    }

    #[test]
    fn only_managers_assign_agents() {
        let assign = Changes {
            agent_id: Some(user::Id::new()),
            ..Changes::default()
        };
        assert!(assign.permitted_for(Role::Admin, Status::Pending));
        assert!(assign.permitted_for(Role::FranchiseOwner, Status::Pending));
        assert!(!assign.permitted_for(Role::ServiceAgent, Status::Pending));
        assert!(!assign.permitted_for(Role::Customer, Status::Pending));
    }

    #[test]
    fn empty_changes() {
        assert!(Changes::default().is_empty());
        assert!(!Changes {
            notes: Some(String::new()),
            ..Changes::default()
        }
        .is_empty());
    }

    #[test]
    fn rating_bounds() {
        assert!(Rating::new(0).is_none());
        assert_eq!(Rating::new(1).unwrap().stars(), 1);
        assert_eq!(Rating::new(5).unwrap().stars(), 5);
        assert!(Rating::new(6).is_none());
    }
}
