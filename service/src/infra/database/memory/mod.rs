//! In-memory [`Database`] implementation.
//!
//! Transactions are serialized by a single lock held for the whole lifetime
//! of a [`Tx`]. Writes of a [`Tx`] are staged on a copy of the [`State`] and
//! published only on [`Commit`], so dropping a [`Tx`] discards them.

mod impls;

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use common::operations::{Commit, Transact};
use derive_more::{Display, Error as StdError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracerr::Traced;

use crate::{
    domain::{
        franchise, order, payment, product, service_request, subscription,
        user, Franchise, Notification, Order, Payment, Product,
        ServiceRequest, Subscription, User,
    },
    infra::database,
    read::Scope,
};
#[cfg(doc)]
use crate::infra::Database;

/// In-memory [`Database`] client.
#[derive(Clone, Debug, Default)]
pub struct Memory<T = NonTx>(T);

impl Memory {
    /// Creates a new empty [`Memory`] client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Populates the committed [`State`] with the provided function.
    pub async fn seed(&self, f: impl FnOnce(&mut State)) {
        f(&mut *self.0.shared.state.lock().await);
    }

    /// Inspects the committed [`State`] with the provided function.
    pub async fn inspect<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        f(&*self.0.shared.state.lock().await)
    }

    /// Returns [`Faults`] to be injected into this [`Memory`] client.
    #[must_use]
    pub fn faults(&self) -> &Faults {
        &self.0.shared.faults
    }
}

/// Data stored by a [`Memory`] client.
#[derive(Clone, Debug, Default)]
pub struct State {
    /// Stored [`User`]s.
    pub users: HashMap<user::Id, User>,

    /// Stored [`Franchise`]s.
    pub franchises: HashMap<franchise::Id, Franchise>,

    /// Stored [`Product`]s.
    pub products: HashMap<product::Id, Product>,

    /// Stored [`Order`]s.
    pub orders: HashMap<order::Id, Order>,

    /// Stored [`Payment`]s.
    pub payments: HashMap<payment::Id, Payment>,

    /// Stored [`Subscription`]s.
    pub subscriptions: HashMap<subscription::Id, Subscription>,

    /// Stored [`ServiceRequest`]s.
    pub service_requests: HashMap<service_request::Id, ServiceRequest>,

    /// Stored [`Notification`]s, in insertion order.
    pub notifications: Vec<Notification>,
}

impl State {
    /// Returns the owner of the [`Franchise`] with the provided ID, if any.
    fn franchise_owner(&self, id: franchise::Id) -> Option<user::Id> {
        self.franchises.get(&id).and_then(|f| f.owner_id)
    }

    /// Indicates whether the provided [`Payment`] is visible in the provided
    /// [`Scope`].
    fn is_payment_visible(&self, payment: &Payment, scope: Scope) -> bool {
        match scope {
            Scope::All => true,
            Scope::Customer(id) => payment.customer_id == id,
            Scope::FranchiseOwner(owner) => {
                let by_order = payment
                    .order_id
                    .and_then(|id| self.orders.get(&id))
                    .map(|o| o.franchise_id);
                let by_subscription = payment
                    .subscription_id
                    .and_then(|id| self.subscriptions.get(&id))
                    .map(|s| s.franchise_id);
                [by_order, by_subscription]
                    .into_iter()
                    .flatten()
                    .any(|f| self.franchise_owner(f) == Some(owner))
            }
            Scope::ServiceAgent(_) => false,
        }
    }

    /// Indicates whether the provided [`ServiceRequest`] is visible in the
    /// provided [`Scope`].
    fn is_service_request_visible(
        &self,
        request: &ServiceRequest,
        scope: Scope,
    ) -> bool {
        match scope {
            Scope::All => true,
            Scope::Customer(id) => request.customer_id == id,
            Scope::ServiceAgent(id) => request.service_agent_id == Some(id),
            Scope::FranchiseOwner(owner) => self
                .subscriptions
                .get(&request.subscription_id)
                .and_then(|s| self.franchise_owner(s.franchise_id))
                == Some(owner),
        }
    }
}

/// Faults to be injected into a [`Memory`] client.
#[derive(Debug, Default)]
pub struct Faults {
    /// Indicator whether inserting a [`Notification`] fails.
    notifications: AtomicBool,
}

impl Faults {
    /// Makes every subsequent [`Notification`] insertion fail (or succeed
    /// again).
    pub fn fail_notifications(&self, fail: bool) {
        self.notifications.store(fail, Ordering::SeqCst);
    }

    /// Indicates whether inserting a [`Notification`] should fail.
    fn notifications_fail(&self) -> bool {
        self.notifications.load(Ordering::SeqCst)
    }
}

/// Data shared between all the [`Memory`] clients.
#[derive(Debug, Default)]
struct Shared {
    /// Committed [`State`].
    state: Arc<Mutex<State>>,

    /// [`Faults`] to be injected.
    faults: Faults,
}

/// Non-transactional [`Memory`] client.
#[derive(Clone, Debug, Default)]
pub struct NonTx {
    /// [`Shared`] data.
    shared: Arc<Shared>,
}

/// Transactional [`Memory`] client.
#[derive(Clone, Debug)]
pub struct Tx {
    /// [`Shared`] data.
    shared: Arc<Shared>,

    /// [`Staged`] changes, unless already committed.
    staged: Arc<Mutex<Option<Staged>>>,
}

/// Changes staged by a [`Tx`].
#[derive(Debug)]
struct Staged {
    /// Guard of the committed [`State`] held till the [`Tx`] finishes.
    committed: OwnedMutexGuard<State>,

    /// [`State`] being modified by the [`Tx`].
    working: State,
}

/// Generic access to a [`State`].
pub trait Connection {
    /// Runs the provided function over the accessible [`State`].
    ///
    /// # Errors
    ///
    /// If the [`State`] is not accessible anymore.
    fn with<R>(
        &self,
        f: impl FnOnce(&mut State) -> R,
    ) -> impl Future<Output = Result<R, Traced<database::Error>>>;

    /// Returns [`Faults`] to be injected.
    fn faults(&self) -> &Faults;
}

impl Connection for NonTx {
    async fn with<R>(
        &self,
        f: impl FnOnce(&mut State) -> R,
    ) -> Result<R, Traced<database::Error>> {
        Ok(f(&mut *self.shared.state.lock().await))
    }

    fn faults(&self) -> &Faults {
        &self.shared.faults
    }
}

impl Connection for Tx {
    async fn with<R>(
        &self,
        f: impl FnOnce(&mut State) -> R,
    ) -> Result<R, Traced<database::Error>> {
        let mut staged = self.staged.lock().await;
        let staged = staged
            .as_mut()
            .ok_or(Error::TransactionFinished)
            .map_err(tracerr::from_and_wrap!(=> database::Error))?;
        Ok(f(&mut staged.working))
    }

    fn faults(&self) -> &Faults {
        &self.shared.faults
    }
}

impl<C: Connection> Connection for Memory<C> {
    fn with<R>(
        &self,
        f: impl FnOnce(&mut State) -> R,
    ) -> impl Future<Output = Result<R, Traced<database::Error>>> {
        self.0.with(f)
    }

    fn faults(&self) -> &Faults {
        self.0.faults()
    }
}

impl database::Database<Transact> for Memory<NonTx> {
    type Ok = Memory<Tx>;
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Transact) -> Result<Self::Ok, Self::Err> {
        let committed = Arc::clone(&self.0.shared.state).lock_owned().await;
        let working = committed.clone();
        Ok(Memory(Tx {
            shared: Arc::clone(&self.0.shared),
            staged: Arc::new(Mutex::new(Some(Staged { committed, working }))),
        }))
    }
}

impl database::Database<Transact> for Memory<Tx> {
    type Ok = Self;
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Transact) -> Result<Self::Ok, Self::Err> {
        Ok(self.clone())
    }
}

impl database::Database<Commit> for Memory<Tx> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Commit) -> Result<Self::Ok, Self::Err> {
        let Staged {
            mut committed,
            working,
        } = self
            .0
            .staged
            .lock()
            .await
            .take()
            .ok_or(Error::TransactionFinished)
            .map_err(tracerr::from_and_wrap!(=> database::Error))?;
        *committed = working;
        Ok(())
    }
}

/// [`Memory`] database [`Error`].
#[derive(Clone, Copy, Debug, Display, StdError)]
pub enum Error {
    /// [`Tx`] has been committed already.
    #[display("Transaction is already finished")]
    TransactionFinished,

    /// Failure injected through [`Faults`].
    #[display("Injected failure of `{_0}`")]
    Injected(#[error(not(source))] &'static str),
}
