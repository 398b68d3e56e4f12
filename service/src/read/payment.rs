//! [`Payment`] read model definition.

use derive_more::From;

use crate::domain::{order, subscription};
#[cfg(doc)]
use crate::domain::{
    payment::{Kind, Status, TransactionId},
    Order, Payment, Subscription,
};

/// Wrapper around [`Payment`] indicating it's in [`Status::Success`].
///
/// Selected by its [`TransactionId`].
#[derive(Clone, Debug)]
pub struct Succeeded<T>(pub T);

/// Wrapper around [`Payment`] indicating it's in [`Status::Pending`].
///
/// Selected by its [`Purpose`].
#[derive(Clone, Debug)]
pub struct Pending<T>(pub T);

/// What a [`Payment`] pays for.
#[derive(Clone, Copy, Debug, Eq, From, PartialEq)]
pub enum Purpose {
    /// [`Kind::Initial`] payment of an [`Order`].
    Initial(order::Id),

    /// [`Kind::Monthly`] payment of a [`Subscription`].
    Monthly(subscription::Id),
}

pub mod list {
    //! [`Payment`]s list definitions.

    use crate::read::Scope;
    #[cfg(doc)]
    use crate::domain::Payment;

    /// Maximum number of [`Payment`]s returned for wide [`Scope`]s.
    pub const LIMIT: u16 = 100;

    /// Selector of the [`Payment`]s list, newest first.
    #[derive(Clone, Copy, Debug)]
    pub struct Selector {
        /// [`Scope`] the [`Payment`]s must be visible in.
        pub scope: Scope,

        /// Maximum number of [`Payment`]s to select, if any.
        pub limit: Option<u16>,
    }
}
