//! Read entities definitions.

pub mod payment;

use crate::domain::user::{self, Actor, Role};
#[cfg(doc)]
use crate::domain::{Franchise, User};

/// Visibility scope of the entities an [`Actor`] is allowed to read.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scope {
    /// Everything is visible.
    All,

    /// Entities of the [`Franchise`]s owned by the [`User`] are visible.
    FranchiseOwner(user::Id),

    /// Entities assigned to the service agent [`User`] are visible.
    ServiceAgent(user::Id),

    /// Entities of the customer [`User`] are visible.
    Customer(user::Id),
}

impl From<Actor> for Scope {
    fn from(actor: Actor) -> Self {
        match actor.role {
            Role::Admin => Self::All,
            Role::FranchiseOwner => Self::FranchiseOwner(actor.id),
            Role::ServiceAgent => Self::ServiceAgent(actor.id),
            Role::Customer => Self::Customer(actor.id),
        }
    }
}

/// Identifier of an entity to be read within some [`Scope`].
#[derive(Clone, Copy, Debug)]
pub struct Scoped<T> {
    /// Identifier of the entity.
    pub id: T,

    /// [`Scope`] the entity must be visible in.
    pub scope: Scope,
}

impl<T> Scoped<T> {
    /// Scopes the provided `id` to the provided [`Scope`].
    #[must_use]
    pub fn new(id: T, scope: impl Into<Scope>) -> Self {
        Self {
            id,
            scope: scope.into(),
        }
    }
}
