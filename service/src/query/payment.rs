//! [`Query`] collection related to [`Payment`]s.

use common::operations::{By, Select};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{
        payment,
        user::{Actor, Role},
        Payment,
    },
    infra::{database, Database},
    read::{payment::list, Scope, Scoped},
    Service,
};

use super::Query;

/// Queries the latest [`Payment`]s visible to an [`Actor`], newest first.
///
/// Customers see all of their own [`Payment`]s, while wider scopes are capped
/// by [`list::LIMIT`].
#[derive(Clone, Copy, Debug)]
pub struct History {
    /// [`Actor`] performing the [`Query`].
    pub actor: Actor,
}

impl<Db, Gw> Query<History> for Service<Db, Gw>
where
    Db: Database<
        Select<By<Vec<Payment>, list::Selector>>,
        Ok = Vec<Payment>,
        Err = Traced<database::Error>,
    >,
{
    type Ok = Vec<Payment>;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, query: History) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let History { actor } = query;

        let limit = match actor.role {
            Role::ServiceAgent => {
                return Err(tracerr::new!(E::PermissionDenied));
            }
            Role::Customer => None,
            Role::Admin | Role::FranchiseOwner => Some(list::LIMIT),
        };

        self.database()
            .execute(Select(By::new(list::Selector {
                scope: Scope::from(actor),
                limit,
            })))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
    }
}

/// Queries a single [`Payment`] visible to an [`Actor`].
#[derive(Clone, Copy, Debug)]
pub struct ById {
    /// [`Actor`] performing the [`Query`].
    pub actor: Actor,

    /// ID of the [`Payment`] to query.
    pub id: payment::Id,
}

impl<Db, Gw> Query<ById> for Service<Db, Gw>
where
    Db: Database<
        Select<By<Option<Payment>, Scoped<payment::Id>>>,
        Ok = Option<Payment>,
        Err = Traced<database::Error>,
    >,
{
    type Ok = Payment;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, query: ById) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let ById { actor, id } = query;

        if actor.role == Role::ServiceAgent {
            return Err(tracerr::new!(E::PermissionDenied));
        }

        self.database()
            .execute(Select(By::new(Scoped::new(id, actor))))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::NotExists(id))
            .map_err(tracerr::wrap!())
    }
}

/// Error of [`Payment`] [`Query`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Actor`] is not allowed to see [`Payment`]s.
    #[display("Permission denied")]
    PermissionDenied,

    /// [`Payment`] doesn't exist or is not visible to the [`Actor`].
    #[display("`Payment(id: {_0})` does not exist")]
    NotExists(#[error(not(source))] payment::Id),
}

#[cfg(test)]
mod spec {
    use common::DateTime;

    use crate::{
        domain::{payment, Payment},
        fixture::{self, World},
        read::payment::list,
    };

    use super::{ById, ExecutionError, History, Query as _};

    /// Seeds a successful monthly [`Payment`] of the `customer`'s
    /// subscription.
    async fn seed_payment(w: &World, seconds_ago: u64) -> payment::Id {
        let sub = w.subscription(w.subscription).await;
        let at = DateTime::now()
            - std::time::Duration::from_secs(seconds_ago);
        let p = Payment {
            id: payment::Id::new(),
            customer_id: w.customer.id,
            order_id: None,
            subscription_id: Some(sub.id),
            amount: sub.monthly_rent,
            kind: payment::Kind::Monthly,
            status: payment::Status::Success,
            method: payment::Method::Razorpay,
            transaction_id: None,
            details: payment::Details::default(),
            invoice_number: None,
            created_at: at.coerce(),
            updated_at: at.coerce(),
        };
        let id = p.id;
        w.db.seed(|s| drop(s.payments.insert(id, p))).await;
        id
    }

    #[tokio::test]
    async fn history_is_scoped_and_ordered() {
        let w = fixture::world().await;
        let older = seed_payment(&w, 60).await;
        let newer = seed_payment(&w, 1).await;

        for actor in [w.admin, w.owner, w.customer] {
            let ids = w
                .service
                .execute(History { actor })
                .await
                .unwrap()
                .into_iter()
                .map(|p| p.id)
                .collect::<Vec<_>>();
            assert_eq!(ids, [newer, older], "{actor:?}");
        }

        for actor in [w.other_owner, w.other_customer] {
            let payments =
                w.service.execute(History { actor }).await.unwrap();
            assert!(payments.is_empty(), "{actor:?}");
        }

        let err = w
            .service
            .execute(History { actor: w.agent })
            .await
            .unwrap_err();
        assert!(matches!(err.as_ref(), ExecutionError::PermissionDenied));
    }

    #[tokio::test]
    async fn history_caps_wide_scopes() {
        let w = fixture::world().await;
        for i in 0..=u64::from(list::LIMIT) {
            _ = seed_payment(&w, i).await;
        }

        let admin = w
            .service
            .execute(History { actor: w.admin })
            .await
            .unwrap();
        assert_eq!(admin.len(), usize::from(list::LIMIT));

        let customer = w
            .service
            .execute(History { actor: w.customer })
            .await
            .unwrap();
        assert_eq!(customer.len(), usize::from(list::LIMIT) + 1);
    }

    #[tokio::test]
    async fn by_id_hides_foreign_payments() {
        let w = fixture::world().await;
        let id = seed_payment(&w, 1).await;

        let p = w
            .service
            .execute(ById {
                actor: w.customer,
                id,
            })
            .await
            .unwrap();
        assert_eq!(p.id, id);

        for actor in [w.other_customer, w.other_owner] {
            let err = w
                .service
                .execute(ById { actor, id })
                .await
                .unwrap_err();
            assert!(
                matches!(err.as_ref(), ExecutionError::NotExists(_)),
                "{actor:?}",
            );
        }
    }
}
