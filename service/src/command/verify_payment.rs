//! [`Command`] for verifying a [`Payment`] confirmation reported by a
//! customer.

use common::{
    operations::{
        By, Commit, Guarded, Insert, Lock, Select, Transact, Transacted,
        Update,
    },
    DateTime,
};
use derive_more::{Display, Error, From};
use secrecy::ExposeSecret as _;
use serde_json::json;
use tracerr::Traced;

use crate::{
    domain::{
        notification::{self, Delivery, Related},
        order, payment, subscription,
        user::Actor,
        Notification, Order, Payment, Subscription,
    },
    infra::{database, Database},
    read::payment::{Pending, Purpose, Succeeded},
    Service,
};

use super::{notify, Command};

/// [`Command`] for verifying a [`Payment`] confirmation reported by a
/// customer after completing a payment intent in the payment gateway.
///
/// Succeeds at most once per gateway payment ID.
#[derive(Clone, Debug)]
pub struct VerifyPayment {
    /// [`Actor`] reporting the confirmation.
    pub actor: Actor,

    /// ID of the payment intent in the payment gateway.
    pub gateway_order_id: String,

    /// ID of the captured payment in the payment gateway.
    pub gateway_payment_id: String,

    /// [`payment::Signature`] of the confirmation.
    pub signature: payment::Signature,

    /// What the [`Payment`] has been made for.
    pub target: Target,
}

/// Entity a verified [`Payment`] settles.
#[derive(Clone, Copy, Debug, Eq, From, PartialEq)]
pub enum Target {
    /// [`payment::Kind::Initial`] payment of an [`Order`].
    Order(order::Id),

    /// [`payment::Kind::Monthly`] payment of a [`Subscription`].
    Subscription(subscription::Id),
}

/// Entity being settled by a [`VerifyPayment`] [`Command`].
#[derive(Debug)]
enum Settled {
    /// [`Order`] awaiting its initial [`Payment`].
    Order(Order),

    /// [`Subscription`] awaiting its monthly [`Payment`].
    Subscription(Subscription),
}

/// Result of [`VerifyPayment`] [`Command`] execution.
#[derive(Clone, Debug)]
pub struct Output {
    /// ID of the [`Order`] the verified [`Payment`] relates to.
    pub order_id: order::Id,

    /// Verified [`Payment`].
    pub payment: Payment,
}

impl<Db, Gw> Command<VerifyPayment> for Service<Db, Gw>
where
    Db: Database<
            Select<By<Option<Succeeded<Payment>>, payment::TransactionId>>,
            Ok = Option<Succeeded<Payment>>,
            Err = Traced<database::Error>,
        > + Database<Transact, Err = Traced<database::Error>>,
    Transacted<Db>: Database<
            Select<By<Option<Succeeded<Payment>>, payment::TransactionId>>,
            Ok = Option<Succeeded<Payment>>,
            Err = Traced<database::Error>,
        > + Database<Lock<By<Order, order::Id>>, Err = Traced<database::Error>>
        + Database<
            Lock<By<Subscription, subscription::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Order>, order::Id>>,
            Ok = Option<Order>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Subscription>, subscription::Id>>,
            Ok = Option<Subscription>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Pending<Payment>>, Purpose>>,
            Ok = Option<Pending<Payment>>,
            Err = Traced<database::Error>,
        > + Database<
            Update<Guarded<Payment, payment::Status>>,
            Ok = u64,
            Err = Traced<database::Error>,
        > + Database<
            Update<Guarded<Order, order::Status>>,
            Ok = u64,
            Err = Traced<database::Error>,
        > + Database<
            Update<Guarded<Subscription, subscription::Status>>,
            Ok = u64,
            Err = Traced<database::Error>,
        > + Database<Insert<Notification>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = Output;
    type Err = Traced<ExecutionError>;

    #[expect(clippy::too_many_lines, reason = "single transaction")]
    async fn execute(
        &self,
        cmd: VerifyPayment,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let VerifyPayment {
            actor,
            gateway_order_id,
            gateway_payment_id,
            signature,
            target,
        } = cmd;

        if !actor.is_customer() {
            return Err(tracerr::new!(E::NotCustomer));
        }

        let signature_str: &str = signature.as_ref();
        if gateway_order_id.trim().is_empty() || signature_str.is_empty() {
            return Err(tracerr::new!(E::MissingIdentifiers));
        }
        let transaction_id =
            payment::TransactionId::new(gateway_payment_id.clone())
                .ok_or(E::MissingIdentifiers)
                .map_err(tracerr::wrap!())?;

        if !signature.verify(
            &gateway_order_id,
            &gateway_payment_id,
            self.config().gateway_key_secret.expose_secret().as_bytes(),
        ) {
            tracing::warn!(
                actor.id = %actor.id,
                gateway.order_id = %gateway_order_id,
                gateway.payment_id = %gateway_payment_id,
                ?target,
                "payment signature mismatch",
            );
            return Err(tracerr::new!(E::InvalidSignature));
        }

        let processed = self
            .database()
            .execute(Select(By::new(transaction_id.clone())))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if processed.is_some() {
            tracing::info!(
                gateway.payment_id = %transaction_id,
                "payment is already processed",
            );
            return Err(tracerr::new!(E::AlreadyProcessed(transaction_id)));
        }

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent verifications of the same `Order` or
        // `Subscription`.
        match target {
            Target::Order(id) => tx
                .execute(Lock(By::<Order, _>::new(id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?,
            Target::Subscription(id) => tx
                .execute(Lock(By::<Subscription, _>::new(id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?,
        }

        // Concurrent verification might have committed while waiting for the
        // lock.
        let processed = tx
            .execute(Select(By::new(transaction_id.clone())))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if processed.is_some() {
            tracing::info!(
                gateway.payment_id = %transaction_id,
                "payment is already processed concurrently",
            );
            return Err(tracerr::new!(E::AlreadyProcessed(transaction_id)));
        }

        let now = DateTime::now();
        let settled = match target {
            Target::Order(id) => {
                let order = tx
                    .execute(Select(By::new(id)))
                    .await
                    .map_err(tracerr::map_from_and_wrap!(=> E))?
                    .filter(|o: &Order| o.customer_id == actor.id)
                    .ok_or(E::OrderNotExists(id))
                    .map_err(tracerr::wrap!())?;
                if order.status != order::Status::Pending {
                    return Err(tracerr::new!(E::OrderNotPending(
                        order.status
                    )));
                }
                Settled::Order(order)
            }
            Target::Subscription(id) => {
                let sub = tx
                    .execute(Select(By::new(id)))
                    .await
                    .map_err(tracerr::map_from_and_wrap!(=> E))?
                    .filter(|s: &Subscription| s.customer_id == actor.id)
                    .ok_or(E::SubscriptionNotExists(id))
                    .map_err(tracerr::wrap!())?;
                if !sub.is_active() {
                    return Err(tracerr::new!(E::SubscriptionNotActive(
                        sub.status
                    )));
                }
                Settled::Subscription(sub)
            }
        };
        let (order_id, purpose) = match &settled {
            Settled::Order(o) => (o.id, Purpose::Initial(o.id)),
            Settled::Subscription(s) => (s.order_id, Purpose::Monthly(s.id)),
        };

        let Pending(pending) = tx
            .execute(Select(By::new(purpose)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::PendingPaymentNotExists)
            .map_err(tracerr::wrap!())?;
        // Pending payment holds the handle of the gateway intent it has been
        // requested with.
        let intent = pending.transaction_id.as_ref().map(AsRef::<str>::as_ref);
        if intent != Some(gateway_order_id.as_str()) {
            tracing::warn!(
                actor.id = %actor.id,
                gateway.order_id = %gateway_order_id,
                payment.id = %pending.id,
                ?target,
                "payment confirmation doesn't match the pending intent",
            );
            return Err(tracerr::new!(E::IntentMismatch));
        }
        let payment = Payment {
            status: payment::Status::Success,
            transaction_id: Some(transaction_id),
            details: json!({
                "razorpay_order_id": gateway_order_id,
                "razorpay_payment_id": gateway_payment_id,
                "verified_at": now.to_rfc3339(),
            })
            .into(),
            updated_at: now.coerce(),
            ..pending
        };
        let updated = tx
            .execute(Update(Guarded::new(
                payment.clone(),
                payment::Status::Pending,
            )))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if updated == 0 {
            return Err(tracerr::new!(E::ConcurrentModification));
        }

        let updated = match settled {
            Settled::Order(order) => tx
                .execute(Update(Guarded::new(
                    Order {
                        status: order::Status::Approved,
                        updated_at: now.coerce(),
                        ..order
                    },
                    order::Status::Pending,
                )))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?,
            Settled::Subscription(sub) => {
                let next_billing_at = sub
                    .next_billing_at
                    .checked_add_months(1)
                    .ok_or(E::BillingDateOverflow)
                    .map_err(tracerr::wrap!())?;
                tx.execute(Update(Guarded::new(
                    Subscription {
                        next_billing_at,
                        updated_at: now.coerce(),
                        ..sub
                    },
                    subscription::Status::Active,
                )))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
            }
        };
        if updated == 0 {
            return Err(tracerr::new!(E::ConcurrentModification));
        }

        let kind = match payment.kind {
            payment::Kind::Initial => "Initial",
            payment::Kind::Monthly => "Monthly",
        };
        notify(
            &tx,
            Notification::new(
                actor.id,
                notification::Kind::Payment,
                "Payment Successful",
                format!("{kind} payment has been processed successfully."),
                Some(Related::Order(order_id)),
            ),
            Delivery::BestEffort,
        )
        .await
        .map_err(tracerr::map_from_and_wrap!(=> E))?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tracing::info!(
            payment.id = %payment.id,
            order.id = %order_id,
            payment.kind = %payment.kind,
            "payment verified",
        );

        Ok(Output { order_id, payment })
    }
}

/// Error of [`VerifyPayment`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// Only customers may verify their payments.
    #[display("Only customers may verify payments")]
    NotCustomer,

    /// Gateway order ID, payment ID or signature is missing.
    #[display("Missing required payment verification fields")]
    MissingIdentifiers,

    /// [`payment::Signature`] doesn't match the reported identifiers.
    #[display("Invalid payment signature")]
    InvalidSignature,

    /// [`Payment`] with the provided gateway payment ID has succeeded
    /// already.
    #[display("Payment `{_0}` has already been processed")]
    AlreadyProcessed(#[error(not(source))] payment::TransactionId),

    /// [`Order`] doesn't exist or belongs to another customer.
    #[display("`Order(id: {_0})` does not exist")]
    OrderNotExists(#[error(not(source))] order::Id),

    /// [`Order`] has left [`order::Status::Pending`] already.
    #[display("Invalid order status: {_0}")]
    OrderNotPending(#[error(not(source))] order::Status),

    /// [`Subscription`] doesn't exist or belongs to another customer.
    #[display("`Subscription(id: {_0})` does not exist")]
    SubscriptionNotExists(#[error(not(source))] subscription::Id),

    /// [`Subscription`] is not [`subscription::Status::Active`].
    #[display("Subscription is not active: {_0}")]
    SubscriptionNotActive(#[error(not(source))] subscription::Status),

    /// No [`payment::Status::Pending`] [`Payment`] to settle.
    #[display("Pending payment record not found")]
    PendingPaymentNotExists,

    /// Confirmed gateway order is not the intent of the pending
    /// [`Payment`].
    #[display("Payment confirmation doesn't match the pending payment")]
    IntentMismatch,

    /// Conditional update lost a race with a concurrent modification.
    #[display("Concurrent modification detected")]
    ConcurrentModification,

    /// Next billing [`DateTime`] is out of the supported range.
    #[display("Next billing date overflows")]
    BillingDateOverflow,
}

#[cfg(test)]
mod spec {
    use common::DateTime;

    use crate::{
        command::{create_order, CreateOrder, GenerateMonthlyPayment},
        domain::{order, payment, subscription, user::Actor},
        fixture::{self, World},
    };

    use super::{Command as _, ExecutionError, Target, VerifyPayment};

    async fn create_order(w: &World) -> create_order::Output {
        w.service
            .execute(CreateOrder {
                actor: w.customer,
                product_id: w.product,
                franchise_id: w.franchise,
                shipping_address: order::Address::new("7 Park St").unwrap(),
                billing_address: order::Address::new("7 Park St").unwrap(),
                rental_duration: order::RentalDuration::new(12).unwrap(),
                notes: None,
            })
            .await
            .unwrap()
    }

    fn confirm(
        actor: Actor,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        target: impl Into<Target>,
    ) -> VerifyPayment {
        VerifyPayment {
            actor,
            gateway_order_id: gateway_order_id.into(),
            gateway_payment_id: gateway_payment_id.into(),
            signature: payment::Signature::sign(
                gateway_order_id,
                gateway_payment_id,
                fixture::GATEWAY_SECRET.as_bytes(),
            ),
            target: target.into(),
        }
    }

    #[tokio::test]
    async fn approves_order() {
        let w = fixture::world().await;
        let created = create_order(&w).await;
        let gw_order = created.gateway_order_id.to_string();

        let out = w
            .service
            .execute(confirm(w.customer, &gw_order, "pay_1", created.order.id))
            .await
            .unwrap();

        assert_eq!(out.order_id, created.order.id);
        assert_eq!(out.payment.kind, payment::Kind::Initial);

        let order = w.order(created.order.id).await;
        assert_eq!(order.status, order::Status::Approved);
        assert_eq!(order.total_initial_amount.amount, "5100".parse().unwrap());

        let payment = w.payment(created.payment.id).await;
        assert_eq!(payment.status, payment::Status::Success);
        assert_eq!(
            payment.transaction_id.as_ref().map(ToString::to_string),
            Some("pay_1".into()),
        );
        let details = payment.details.as_json();
        assert_eq!(details["razorpay_order_id"], gw_order.as_str());
        assert_eq!(details["razorpay_payment_id"], "pay_1");
        assert!(details["verified_at"].is_string());

        assert_eq!(w.notifications_of(w.customer).await, 1);
    }

    #[tokio::test]
    async fn second_verification_is_already_processed() {
        let w = fixture::world().await;
        let created = create_order(&w).await;
        let gw_order = created.gateway_order_id.to_string();
        let cmd = confirm(w.customer, &gw_order, "pay_1", created.order.id);

        w.service.execute(cmd.clone()).await.unwrap();
        let err = w.service.execute(cmd).await.unwrap_err();

        assert!(matches!(
            err.as_ref(),
            ExecutionError::AlreadyProcessed(id) if id.to_string() == "pay_1",
        ));
        assert_eq!(
            w.order(created.order.id).await.status,
            order::Status::Approved,
        );
        assert_eq!(w.notifications_of(w.customer).await, 1);
    }

    #[tokio::test]
    async fn concurrent_verifications_succeed_once() {
        let w = fixture::world().await;
        let created = create_order(&w).await;
        let gw_order = created.gateway_order_id.to_string();
        let cmd = confirm(w.customer, &gw_order, "pay_1", created.order.id);

        let (a, b) = tokio::join!(
            w.service.execute(cmd.clone()),
            w.service.execute(cmd),
        );

        let (ok, err) = match (a, b) {
            (Ok(ok), Err(err)) | (Err(err), Ok(ok)) => (ok, err),
            (a, b) => panic!("expected exactly one success: {a:?}, {b:?}"),
        };
        assert_eq!(ok.order_id, created.order.id);
        assert!(matches!(
            err.as_ref(),
            ExecutionError::AlreadyProcessed(_),
        ));
        assert_eq!(
            w.order(created.order.id).await.status,
            order::Status::Approved,
        );
        assert_eq!(w.notifications_of(w.customer).await, 1);
    }

    #[tokio::test]
    async fn tampered_signature_changes_nothing() {
        let w = fixture::world().await;
        let created = create_order(&w).await;
        let gw_order = created.gateway_order_id.to_string();
        let mut cmd = confirm(w.customer, &gw_order, "pay_1", created.order.id);
        let sig = cmd.signature.to_string();
        let flipped = if sig.starts_with('0') { "1" } else { "0" };
        cmd.signature =
            payment::Signature::new(format!("{flipped}{}", &sig[1..]));

        let err = w.service.execute(cmd).await.unwrap_err();

        assert!(matches!(err.as_ref(), ExecutionError::InvalidSignature));
        assert_eq!(
            w.order(created.order.id).await.status,
            order::Status::Pending,
        );
        assert_eq!(
            w.payment(created.payment.id).await.status,
            payment::Status::Pending,
        );
        assert_eq!(w.notifications_of(w.customer).await, 0);
    }

    #[tokio::test]
    async fn rejects_missing_identifiers_and_non_customers() {
        let w = fixture::world().await;
        let created = create_order(&w).await;
        let gw_order = created.gateway_order_id.to_string();

        let err = w
            .service
            .execute(confirm(w.customer, &gw_order, "", created.order.id))
            .await
            .unwrap_err();
        assert!(matches!(err.as_ref(), ExecutionError::MissingIdentifiers));

        let err = w
            .service
            .execute(confirm(w.admin, &gw_order, "pay_1", created.order.id))
            .await
            .unwrap_err();
        assert!(matches!(err.as_ref(), ExecutionError::NotCustomer));
    }

    #[tokio::test]
    async fn foreign_order_is_not_found() {
        let w = fixture::world().await;
        let created = create_order(&w).await;
        let gw_order = created.gateway_order_id.to_string();

        let err = w
            .service
            .execute(confirm(
                w.other_customer,
                &gw_order,
                "pay_1",
                created.order.id,
            ))
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_ref(),
            ExecutionError::OrderNotExists(id) if *id == created.order.id,
        ));
        assert_eq!(
            w.payment(created.payment.id).await.status,
            payment::Status::Pending,
        );
    }

    #[tokio::test]
    async fn approved_order_is_not_pending() {
        let w = fixture::world().await;

        let err = w
            .service
            .execute(confirm(w.customer, "order_x", "pay_x", w.order))
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_ref(),
            ExecutionError::OrderNotPending(order::Status::Approved),
        ));
    }

    #[tokio::test]
    async fn notification_failure_does_not_abort() {
        let w = fixture::world().await;
        let created = create_order(&w).await;
        let gw_order = created.gateway_order_id.to_string();
        w.db.faults().fail_notifications(true);

        w.service
            .execute(confirm(w.customer, &gw_order, "pay_1", created.order.id))
            .await
            .unwrap();

        assert_eq!(
            w.order(created.order.id).await.status,
            order::Status::Approved,
        );
        assert_eq!(
            w.payment(created.payment.id).await.status,
            payment::Status::Success,
        );
        assert_eq!(w.notifications_of(w.customer).await, 0);
    }

    #[tokio::test]
    async fn confirmation_of_another_intent_changes_nothing() {
        let w = fixture::world().await;
        let cheap = create_order(&w).await;
        let target = create_order(&w).await;
        assert_ne!(cheap.gateway_order_id, target.gateway_order_id);
        let gw_order = cheap.gateway_order_id.to_string();

        let err = w
            .service
            .execute(confirm(w.customer, &gw_order, "pay_1", target.order.id))
            .await
            .unwrap_err();

        assert!(matches!(err.as_ref(), ExecutionError::IntentMismatch));
        for created in [&cheap, &target] {
            assert_eq!(
                w.order(created.order.id).await.status,
                order::Status::Pending,
            );
            assert_eq!(
                w.payment(created.payment.id).await.status,
                payment::Status::Pending,
            );
        }
        assert_eq!(w.notifications_of(w.customer).await, 0);
    }

    #[tokio::test]
    async fn monthly_confirmation_of_stale_intent_is_rejected() {
        let w = fixture::world().await;
        let generated = w
            .service
            .execute(GenerateMonthlyPayment {
                actor: w.customer,
                subscription_id: w.subscription,
            })
            .await
            .unwrap();
        let stale = generated.gateway_order_id.to_string();
        let refreshed = w
            .service
            .execute(GenerateMonthlyPayment {
                actor: w.customer,
                subscription_id: w.subscription,
            })
            .await
            .unwrap();
        assert_ne!(refreshed.gateway_order_id.to_string(), stale);

        let err = w
            .service
            .execute(confirm(w.customer, &stale, "pay_m", w.subscription))
            .await
            .unwrap_err();

        assert!(matches!(err.as_ref(), ExecutionError::IntentMismatch));
        assert_eq!(
            w.payment(refreshed.payment.id).await.status,
            payment::Status::Pending,
        );
    }

    #[tokio::test]
    async fn settles_monthly_payment() {
        let w = fixture::world().await;
        let before = w.subscription(w.subscription).await;
        let generated = w
            .service
            .execute(GenerateMonthlyPayment {
                actor: w.customer,
                subscription_id: w.subscription,
            })
            .await
            .unwrap();
        let gw_order = generated.gateway_order_id.to_string();

        let out = w
            .service
            .execute(confirm(w.customer, &gw_order, "pay_m", w.subscription))
            .await
            .unwrap();

        assert_eq!(out.order_id, before.order_id);
        assert_eq!(out.payment.kind, payment::Kind::Monthly);
        assert_eq!(
            w.payment(generated.payment.id).await.status,
            payment::Status::Success,
        );
        let after = w.subscription(w.subscription).await;
        assert_eq!(after.status, subscription::Status::Active);
        assert_eq!(
            after.next_billing_at,
            DateTime::from_rfc3339("2024-02-29T00:00:00Z").unwrap().coerce(),
        );
        assert_eq!(w.notifications_of(w.customer).await, 1);
    }

    #[tokio::test]
    async fn inactive_subscription_is_rejected() {
        let w = fixture::world().await;

        let err = w
            .service
            .execute(confirm(
                w.customer,
                "order_x",
                "pay_x",
                w.inactive_subscription,
            ))
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_ref(),
            ExecutionError::SubscriptionNotActive(
                subscription::Status::Inactive
            ),
        ));
    }
}
