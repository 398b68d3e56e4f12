//! [`Database`] implementations of [`Memory`] client.

use common::operations::{By, Guarded, Insert, Lock, Select, Update};
use tracerr::Traced;

use crate::{
    domain::{
        franchise, order, payment, product, service_request, subscription,
        user, Franchise, Notification, Order, Payment, Product,
        ServiceRequest, Subscription, User,
    },
    infra::{database, Database},
    read::{
        payment::{list, Pending, Purpose, Succeeded},
        Scope, Scoped,
    },
};

use super::{Connection, Error, Memory};

/// Implements selecting an entity by its ID from the provided [`State`]
/// collection.
///
/// [`State`]: super::State
macro_rules! impl_select_by_id {
    ($entity:ty, $id:ty, $field:ident) => {
        impl<C: Connection> Database<Select<By<Option<$entity>, $id>>>
            for Memory<C>
        {
            type Ok = Option<$entity>;
            type Err = Traced<database::Error>;

            async fn execute(
                &self,
                Select(by): Select<By<Option<$entity>, $id>>,
            ) -> Result<Self::Ok, Self::Err> {
                let id = by.into_inner();
                self.with(|s| s.$field.get(&id).cloned())
                    .await
                    .map_err(tracerr::wrap!())
            }
        }
    };
}

/// Implements upserting an entity into the provided [`State`] collection.
///
/// [`State`]: super::State
macro_rules! impl_upsert {
    ($entity:ty, $field:ident) => {
        impl<C: Connection> Database<Insert<$entity>> for Memory<C> {
            type Ok = ();
            type Err = Traced<database::Error>;

            async fn execute(
                &self,
                Insert(v): Insert<$entity>,
            ) -> Result<Self::Ok, Self::Err> {
                self.execute(Update(v)).await.map_err(tracerr::wrap!())
            }
        }

        impl<C: Connection> Database<Update<$entity>> for Memory<C> {
            type Ok = ();
            type Err = Traced<database::Error>;

            async fn execute(
                &self,
                Update(v): Update<$entity>,
            ) -> Result<Self::Ok, Self::Err> {
                self.with(|s| drop(s.$field.insert(v.id, v)))
                    .await
                    .map_err(tracerr::wrap!())
            }
        }
    };
}

/// Implements a conditional update of an entity, which only succeeds while
/// the stored one is in the expected status.
macro_rules! impl_guarded_update {
    ($entity:ty, $status:ty, $field:ident) => {
        impl<C: Connection> Database<Update<Guarded<$entity, $status>>>
            for Memory<C>
        {
            type Ok = u64;
            type Err = Traced<database::Error>;

            async fn execute(
                &self,
                Update(guarded): Update<Guarded<$entity, $status>>,
            ) -> Result<Self::Ok, Self::Err> {
                let Guarded { value, expected } = guarded;
                let id = value.id;
                self.with(|s| match s.$field.get_mut(&id) {
                    Some(stored) if stored.status == expected => {
                        *stored = value;
                        1
                    }
                    Some(_) | None => 0,
                })
                .await
                .map_err(tracerr::wrap!())
            }
        }
    };
}

/// Implements locking an entity, which is a no-op, because [`Memory`]
/// transactions are serialized already.
macro_rules! impl_lock {
    ($entity:ty, $id:ty) => {
        impl<C: Connection> Database<Lock<By<$entity, $id>>> for Memory<C> {
            type Ok = ();
            type Err = Traced<database::Error>;

            async fn execute(
                &self,
                _: Lock<By<$entity, $id>>,
            ) -> Result<Self::Ok, Self::Err> {
                Ok(())
            }
        }
    };
}

impl_select_by_id!(User, user::Id, users);
impl_select_by_id!(Franchise, franchise::Id, franchises);
impl_select_by_id!(Product, product::Id, products);
impl_select_by_id!(Order, order::Id, orders);
impl_select_by_id!(Subscription, subscription::Id, subscriptions);
impl_select_by_id!(ServiceRequest, service_request::Id, service_requests);

impl_upsert!(Order, orders);
impl_upsert!(Payment, payments);
impl_upsert!(ServiceRequest, service_requests);

impl_guarded_update!(Order, order::Status, orders);
impl_guarded_update!(Payment, payment::Status, payments);
impl_guarded_update!(Subscription, subscription::Status, subscriptions);

impl_lock!(Order, order::Id);
impl_lock!(Subscription, subscription::Id);
impl_lock!(ServiceRequest, service_request::Id);

impl<C: Connection> Database<Insert<Notification>> for Memory<C> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(notification): Insert<Notification>,
    ) -> Result<Self::Ok, Self::Err> {
        if self.faults().notifications_fail() {
            return Err(tracerr::map_from(tracerr::new!(Error::Injected(
                "Insert<Notification>"
            ))));
        }
        self.with(|s| s.notifications.push(notification))
            .await
            .map_err(tracerr::wrap!())
    }
}

impl<C: Connection>
    Database<Select<By<Option<Succeeded<Payment>>, payment::TransactionId>>>
    for Memory<C>
{
    type Ok = Option<Succeeded<Payment>>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<Option<Succeeded<Payment>>, payment::TransactionId>,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let tx_id = by.into_inner();
        self.with(|s| {
            s.payments
                .values()
                .find(|p| {
                    p.status == payment::Status::Success
                        && p.transaction_id.as_ref() == Some(&tx_id)
                })
                .cloned()
                .map(Succeeded)
        })
        .await
        .map_err(tracerr::wrap!())
    }
}

impl<C: Connection> Database<Select<By<Option<Pending<Payment>>, Purpose>>>
    for Memory<C>
{
    type Ok = Option<Pending<Payment>>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Pending<Payment>>, Purpose>>,
    ) -> Result<Self::Ok, Self::Err> {
        let purpose = by.into_inner();
        self.with(|s| {
            s.payments
                .values()
                .filter(|p| p.status == payment::Status::Pending)
                .find(|p| match purpose {
                    Purpose::Initial(id) => {
                        p.kind == payment::Kind::Initial
                            && p.order_id == Some(id)
                    }
                    Purpose::Monthly(id) => {
                        p.kind == payment::Kind::Monthly
                            && p.subscription_id == Some(id)
                    }
                })
                .cloned()
                .map(Pending)
        })
        .await
        .map_err(tracerr::wrap!())
    }
}

impl<C: Connection> Database<Select<By<Vec<Payment>, list::Selector>>>
    for Memory<C>
{
    type Ok = Vec<Payment>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<Payment>, list::Selector>>,
    ) -> Result<Self::Ok, Self::Err> {
        let list::Selector { scope, limit } = by.into_inner();
        self.with(|s| {
            let s = &*s;
            let mut payments = s
                .payments
                .values()
                .filter(|p| s.is_payment_visible(p, scope))
                .cloned()
                .collect::<Vec<_>>();
            payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            if let Some(limit) = limit {
                payments.truncate(usize::from(limit));
            }
            payments
        })
        .await
        .map_err(tracerr::wrap!())
    }
}

impl<C: Connection> Database<Select<By<Option<Payment>, Scoped<payment::Id>>>>
    for Memory<C>
{
    type Ok = Option<Payment>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Payment>, Scoped<payment::Id>>>,
    ) -> Result<Self::Ok, Self::Err> {
        let Scoped { id, scope } = by.into_inner();
        self.with(|s| {
            let s = &*s;
            s.payments
                .get(&id)
                .filter(|p| s.is_payment_visible(p, scope))
                .cloned()
        })
        .await
        .map_err(tracerr::wrap!())
    }
}

impl<C: Connection>
    Database<Select<By<Option<ServiceRequest>, Scoped<service_request::Id>>>>
    for Memory<C>
{
    type Ok = Option<ServiceRequest>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<Option<ServiceRequest>, Scoped<service_request::Id>>,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let Scoped { id, scope } = by.into_inner();
        self.with(|s| {
            let s = &*s;
            s.service_requests
                .get(&id)
                .filter(|r| s.is_service_request_visible(r, scope))
                .cloned()
        })
        .await
        .map_err(tracerr::wrap!())
    }
}

impl<C: Connection> Database<Select<By<Vec<ServiceRequest>, Scope>>>
    for Memory<C>
{
    type Ok = Vec<ServiceRequest>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<ServiceRequest>, Scope>>,
    ) -> Result<Self::Ok, Self::Err> {
        let scope = by.into_inner();
        self.with(|s| {
            let s = &*s;
            let mut requests = s
                .service_requests
                .values()
                .filter(|r| s.is_service_request_visible(r, scope))
                .cloned()
                .collect::<Vec<_>>();
            requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            requests
        })
        .await
        .map_err(tracerr::wrap!())
    }
}
