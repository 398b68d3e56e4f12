//! [`Command`] for generating a monthly [`Payment`] intent of a
//! [`Subscription`].

use common::{
    operations::{
        By, Commit, Create, Insert, Lock, Select, Transact, Transacted, Update,
    },
    DateTime, Money,
};
use derive_more::{Display, Error, From};
use serde_json::json;
use tracerr::Traced;

use crate::{
    domain::{payment, subscription, user::Actor, Payment, Subscription},
    infra::{
        database,
        gateway::{self, Intent, IntentId, NewIntent},
        Database, Gateway,
    },
    read::payment::{Pending, Purpose},
    Service,
};

use super::Command;

/// [`Command`] for generating a [`payment::Kind::Monthly`] [`Payment`]
/// intent of a [`Subscription`].
///
/// Reuses the [`payment::Status::Pending`] [`Payment`] of the
/// [`Subscription`], if any, instead of creating another one.
#[derive(Clone, Copy, Debug)]
pub struct GenerateMonthlyPayment {
    /// [`Actor`] paying.
    pub actor: Actor,

    /// ID of the [`Subscription`] to pay for.
    pub subscription_id: subscription::Id,
}

/// Result of [`GenerateMonthlyPayment`] [`Command`] execution.
#[derive(Clone, Debug)]
pub struct Output {
    /// [`payment::Status::Pending`] [`Payment`] awaiting its verification.
    pub payment: Payment,

    /// ID of the payment intent to be completed by the customer in the
    /// [`Gateway`].
    pub gateway_order_id: IntentId,

    /// Public key ID of the [`Gateway`] to complete the intent with.
    pub key: String,
}

impl Output {
    /// Returns the amount to be paid.
    #[must_use]
    pub fn amount(&self) -> Money {
        self.payment.amount
    }
}

impl<Db, Gw> Command<GenerateMonthlyPayment> for Service<Db, Gw>
where
    Db: Database<Transact, Err = Traced<database::Error>>,
    Transacted<Db>: Database<
            Lock<By<Subscription, subscription::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Subscription>, subscription::Id>>,
            Ok = Option<Subscription>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Pending<Payment>>, Purpose>>,
            Ok = Option<Pending<Payment>>,
            Err = Traced<database::Error>,
        > + Database<Insert<Payment>, Err = Traced<database::Error>>
        + Database<Update<Payment>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
    Gw: Gateway<
        Create<NewIntent>,
        Ok = Intent,
        Err = Traced<gateway::Error>,
    >,
{
    type Ok = Output;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: GenerateMonthlyPayment,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let GenerateMonthlyPayment {
            actor,
            subscription_id,
        } = cmd;

        if !actor.is_customer() {
            return Err(tracerr::new!(E::NotCustomer));
        }

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent actions upon the same `Subscription`.
        tx.execute(Lock(By::<Subscription, _>::new(subscription_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let sub = tx
            .execute(Select(By::new(subscription_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .filter(|s: &Subscription| s.customer_id == actor.id)
            .ok_or(E::SubscriptionNotExists(subscription_id))
            .map_err(tracerr::wrap!())?;
        if !sub.is_active() {
            return Err(tracerr::new!(E::SubscriptionNotActive(sub.status)));
        }
        let amount = sub
            .monthly_rent
            .minor_units()
            .ok_or(E::AmountOverflow)
            .map_err(tracerr::wrap!())?;

        let intent = self
            .gateway()
            .execute(Create(NewIntent {
                amount,
                currency: sub.monthly_rent.currency,
                receipt: format!("subscription_{}", sub.id),
                notes: json!({
                    "customer_id": actor.id.to_string(),
                    "subscription_id": sub.id.to_string(),
                    "payment_type": payment::Kind::Monthly.as_str(),
                }),
            }))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        let details = payment::Details::from(json!({
            "razorpay_order_id": intent.id.to_string(),
        }));
        let transaction_id = payment::TransactionId::new(intent.id.clone());

        let pending = tx
            .execute(Select(By::new(Purpose::Monthly(sub.id))))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        let now = DateTime::now();
        let payment = if let Some(Pending(pending)) = pending {
            let payment = Payment {
                amount: sub.monthly_rent,
                transaction_id,
                details,
                updated_at: now.coerce(),
                ..pending
            };
            tx.execute(Update(payment.clone()))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
            payment
        } else {
            let payment = Payment {
                id: payment::Id::new(),
                customer_id: actor.id,
                order_id: None,
                subscription_id: Some(sub.id),
                amount: sub.monthly_rent,
                kind: payment::Kind::Monthly,
                status: payment::Status::Pending,
                method: payment::Method::Razorpay,
                transaction_id,
                details,
                invoice_number: Some(payment::InvoiceNumber::monthly(
                    sub.id, now,
                )),
                created_at: now.coerce(),
                updated_at: now.coerce(),
            };
            tx.execute(Insert(payment.clone()))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
            payment
        };

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(Output {
            payment,
            gateway_order_id: intent.id,
            key: self.config().gateway_key_id.clone(),
        })
    }
}

/// Error of [`GenerateMonthlyPayment`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Gateway`] error.
    #[display("`Gateway` operation failed: {_0}")]
    #[from]
    Gateway(gateway::Error),

    /// Only customers may pay for their [`Subscription`]s.
    #[display("Only customers may pay subscriptions")]
    NotCustomer,

    /// [`Subscription`] doesn't exist or belongs to another customer.
    #[display("`Subscription(id: {_0})` does not exist")]
    SubscriptionNotExists(#[error(not(source))] subscription::Id),

    /// [`Subscription`] is not [`subscription::Status::Active`].
    #[display("Subscription is not active: {_0}")]
    SubscriptionNotActive(#[error(not(source))] subscription::Status),

    /// Monthly rent doesn't fit into the supported range.
    #[display("Monthly rent overflows")]
    AmountOverflow,
}

#[cfg(test)]
mod spec {
    use crate::{
        domain::{payment, subscription},
        fixture,
    };

    use super::{Command as _, ExecutionError, GenerateMonthlyPayment};

    #[tokio::test]
    async fn creates_pending_monthly_payment() {
        let w = fixture::world().await;

        let out = w
            .service
            .execute(GenerateMonthlyPayment {
                actor: w.customer,
                subscription_id: w.subscription,
            })
            .await
            .unwrap();

        assert_eq!(out.amount().amount, "300".parse().unwrap());
        assert_eq!(out.key, fixture::GATEWAY_KEY_ID);

        let payment = w.payment(out.payment.id).await;
        assert_eq!(payment.kind, payment::Kind::Monthly);
        assert_eq!(payment.status, payment::Status::Pending);
        assert_eq!(payment.subscription_id, Some(w.subscription));
        assert_eq!(payment.order_id, None);
        let invoice = payment.invoice_number.unwrap().to_string();
        assert!(invoice.starts_with("INV-M-"), "{invoice}");
        assert!(invoice.ends_with(&w.subscription.to_string()), "{invoice}");
        assert_eq!(
            payment.details.as_json()["razorpay_order_id"],
            out.gateway_order_id.to_string().as_str(),
        );
    }

    #[tokio::test]
    async fn reuses_pending_payment() {
        let w = fixture::world().await;
        let cmd = GenerateMonthlyPayment {
            actor: w.customer,
            subscription_id: w.subscription,
        };

        let first = w.service.execute(cmd).await.unwrap();
        let second = w.service.execute(cmd).await.unwrap();

        assert_eq!(first.payment.id, second.payment.id);
        assert_ne!(first.gateway_order_id, second.gateway_order_id);

        let pending = w
            .db
            .inspect(|s| {
                s.payments
                    .values()
                    .filter(|p| {
                        p.subscription_id == Some(w.subscription)
                            && p.status == payment::Status::Pending
                    })
                    .count()
            })
            .await;
        assert_eq!(pending, 1);
        assert_eq!(
            w.payment(first.payment.id)
                .await
                .transaction_id
                .map(|id| id.to_string()),
            Some(second.gateway_order_id.to_string()),
        );
    }

    #[tokio::test]
    async fn reused_payment_follows_current_rent() {
        let w = fixture::world().await;
        let cmd = GenerateMonthlyPayment {
            actor: w.customer,
            subscription_id: w.subscription,
        };
        let first = w.service.execute(cmd).await.unwrap();

        w.db.seed(|s| {
            let sub = s.subscriptions.get_mut(&w.subscription).unwrap();
            sub.monthly_rent.amount = "450".parse().unwrap();
        })
        .await;
        let second = w.service.execute(cmd).await.unwrap();

        assert_eq!(first.payment.id, second.payment.id);
        assert_eq!(second.amount().amount, "450".parse().unwrap());
        assert_eq!(
            w.payment(first.payment.id).await.amount.amount,
            "450".parse().unwrap(),
        );
    }

    #[tokio::test]
    async fn rejects_foreign_and_inactive_subscriptions() {
        let w = fixture::world().await;

        let err = w
            .service
            .execute(GenerateMonthlyPayment {
                actor: w.other_customer,
                subscription_id: w.subscription,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_ref(),
            ExecutionError::SubscriptionNotExists(_),
        ));

        let err = w
            .service
            .execute(GenerateMonthlyPayment {
                actor: w.customer,
                subscription_id: w.inactive_subscription,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_ref(),
            ExecutionError::SubscriptionNotActive(
                subscription::Status::Inactive
            ),
        ));
        assert_eq!(w.gateway.issued(), 0);
    }
}
