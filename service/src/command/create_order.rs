//! [`Command`] for creating a new rental [`Order`].

use common::{
    money::Currency,
    operations::{By, Commit, Create, Insert, Select, Transact, Transacted},
    DateTime, Money,
};
use derive_more::{Display, Error, From};
use serde_json::json;
use tracerr::Traced;

use crate::{
    domain::{
        franchise, order, payment, product, user::Actor, Franchise, Order,
        Payment, Product,
    },
    infra::{
        database,
        gateway::{self, Intent, IntentId, NewIntent},
        Database, Gateway,
    },
    Service,
};

use super::Command;

/// [`Command`] for creating a new rental [`Order`] along with its
/// [`payment::Kind::Initial`] [`Payment`] intent.
#[derive(Clone, Debug)]
pub struct CreateOrder {
    /// [`Actor`] placing the [`Order`].
    pub actor: Actor,

    /// ID of the [`Product`] to rent.
    pub product_id: product::Id,

    /// ID of the [`Franchise`] to fulfill the [`Order`].
    pub franchise_id: franchise::Id,

    /// [`order::Address`] to deliver the [`Product`] to.
    pub shipping_address: order::Address,

    /// [`order::Address`] to bill.
    pub billing_address: order::Address,

    /// For how long the [`Product`] is rented.
    pub rental_duration: order::RentalDuration,

    /// Free-form notes of the customer.
    pub notes: Option<String>,
}

/// Result of [`CreateOrder`] [`Command`] execution.
#[derive(Clone, Debug)]
pub struct Output {
    /// Created [`Order`].
    pub order: Order,

    /// Created [`payment::Status::Pending`] [`Payment`].
    pub payment: Payment,

    /// ID of the payment intent to be completed by the customer in the
    /// [`Gateway`].
    pub gateway_order_id: IntentId,

    /// Public key ID of the [`Gateway`] to complete the intent with.
    pub key: String,
}

impl<Db, Gw> Command<CreateOrder> for Service<Db, Gw>
where
    Db: Database<
            Select<By<Option<Product>, product::Id>>,
            Ok = Option<Product>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Franchise>, franchise::Id>>,
            Ok = Option<Franchise>,
            Err = Traced<database::Error>,
        > + Database<Transact, Err = Traced<database::Error>>,
    Transacted<Db>: Database<Insert<Order>, Err = Traced<database::Error>>
        + Database<Insert<Payment>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
    Gw: Gateway<
        Create<NewIntent>,
        Ok = Intent,
        Err = Traced<gateway::Error>,
    >,
{
    type Ok = Output;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, cmd: CreateOrder) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CreateOrder {
            actor,
            product_id,
            franchise_id,
            shipping_address,
            billing_address,
            rental_duration,
            notes,
        } = cmd;

        if !actor.is_customer() {
            return Err(tracerr::new!(E::NotCustomer));
        }

        let product = self
            .database()
            .execute(Select(By::new(product_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ProductNotExists(product_id))
            .map_err(tracerr::wrap!())?;
        _ = self
            .database()
            .execute(Select(By::new(franchise_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::FranchiseNotExists(franchise_id))
            .map_err(tracerr::wrap!())?;

        if product.currency != self.config().currency {
            return Err(tracerr::new!(E::UnsupportedCurrency(
                product.currency
            )));
        }
        let total = Order::total(&product, rental_duration)
            .ok_or(E::AmountOverflow)
            .map_err(tracerr::wrap!())?;
        let minor_units = total
            .minor_units()
            .ok_or(E::AmountOverflow)
            .map_err(tracerr::wrap!())?;

        let now = DateTime::now();
        let order = Order {
            id: order::Id::new(),
            customer_id: actor.id,
            product_id,
            franchise_id,
            kind: order::Kind::Rental,
            status: order::Status::Pending,
            shipping_address,
            billing_address,
            rental_duration,
            security_deposit: product.security_deposit(),
            installation_fee: product.installation_fee(),
            total_initial_amount: total,
            notes,
            service_agent_id: None,
            created_at: now.coerce(),
            updated_at: now.coerce(),
        };

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        tx.execute(Insert(order.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        // Dropping `tx` on failure discards the `Order` as well.
        let intent = self
            .gateway()
            .execute(Create(NewIntent {
                amount: minor_units,
                currency: total.currency,
                receipt: format!("order_{}", order.id),
                notes: json!({
                    "aquahome_order_id": order.id.to_string(),
                    "order_id": order.id.to_string(),
                    "customer_id": actor.id.to_string(),
                    "payment_type": payment::Kind::Initial.as_str(),
                }),
            }))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        let payment = Payment {
            id: payment::Id::new(),
            customer_id: actor.id,
            order_id: Some(order.id),
            subscription_id: None,
            amount: total,
            kind: payment::Kind::Initial,
            status: payment::Status::Pending,
            method: payment::Method::Razorpay,
            transaction_id: payment::TransactionId::new(intent.id.clone()),
            details: intent.raw.into(),
            invoice_number: None,
            created_at: now.coerce(),
            updated_at: now.coerce(),
        };
        tx.execute(Insert(payment.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;
        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tracing::info!(
            order.id = %order.id,
            customer.id = %actor.id,
            amount = %total,
            "`Order` created",
        );

        Ok(Output {
            order,
            payment,
            gateway_order_id: intent.id,
            key: self.config().gateway_key_id.clone(),
        })
    }
}

impl Output {
    /// Returns the amount to be paid for the created [`Order`].
    #[must_use]
    pub fn amount(&self) -> Money {
        self.order.total_initial_amount
    }
}

/// Error of [`CreateOrder`] [`Command`] execution.
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

    /// Only customers may place [`Order`]s.
    #[display("Only customers may place orders")]
    NotCustomer,

    /// [`Product`] with the provided ID does not exist.
    #[display("`Product(id: {_0})` does not exist")]
    ProductNotExists(#[error(not(source))] product::Id),

    /// [`Franchise`] with the provided ID does not exist.
    #[display("`Franchise(id: {_0})` does not exist")]
    FranchiseNotExists(#[error(not(source))] franchise::Id),

    /// [`Product`] is priced in a [`Currency`] payments are not accepted in.
    #[display("Payments in `{_0}` are not accepted")]
    UnsupportedCurrency(#[error(not(source))] Currency),

    /// [`Order`] total doesn't fit into the supported range.
    #[display("`Order` amount overflows")]
    AmountOverflow,
}

#[cfg(test)]
mod spec {
    use crate::{
        domain::{franchise, order, payment, product, Order},
        fixture,
    };

    use super::{Command as _, CreateOrder, ExecutionError};

    fn create_order(w: &fixture::World) -> CreateOrder {
        CreateOrder {
            actor: w.customer,
            product_id: w.product,
            franchise_id: w.franchise,
            shipping_address: order::Address::new("7 Park Street").unwrap(),
            billing_address: order::Address::new("7 Park Street").unwrap(),
            rental_duration: order::RentalDuration::new(12).unwrap(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn creates_pending_order_with_initial_payment() {
        let w = fixture::world().await;

        let out = w.service.execute(create_order(&w)).await.unwrap();

        assert_eq!(out.amount().amount, "5100".parse().unwrap());
        assert_eq!(out.key, fixture::GATEWAY_KEY_ID);
        assert_eq!(w.gateway.issued(), 1);

        let order = w.order(out.order.id).await;
        assert_eq!(order.status, order::Status::Pending);
        assert_eq!(order.kind, order::Kind::Rental);
        assert_eq!(order.customer_id, w.customer.id);

        let payment = w.payment(out.payment.id).await;
        assert_eq!(payment.status, payment::Status::Pending);
        assert_eq!(payment.kind, payment::Kind::Initial);
        assert_eq!(payment.order_id, Some(order.id));
        assert_eq!(payment.amount, order.total_initial_amount);
        assert_eq!(
            payment.transaction_id.as_ref().map(AsRef::<str>::as_ref),
            Some(out.gateway_order_id.as_ref()),
        );
        assert_eq!(
            payment.details.as_json()["amount"],
            serde_json::json!(510_000),
        );
        assert_eq!(
            payment.details.as_json()["notes"]["payment_type"],
            serde_json::json!("initial"),
        );
    }

    #[tokio::test]
    async fn gateway_failure_rolls_order_back() {
        let w = fixture::world().await;
        w.gateway.fail(true);
        let orders_before = w.db.inspect(|s| s.orders.len()).await;

        let err = w.service.execute(create_order(&w)).await.unwrap_err();

        assert!(matches!(err.as_ref(), ExecutionError::Gateway(_)));
        let (orders, payments) = w
            .db
            .inspect(|s| (s.orders.len(), s.payments.len()))
            .await;
        assert_eq!(orders, orders_before);
        assert_eq!(payments, 0);
    }

    #[tokio::test]
    async fn only_customers_order() {
        let w = fixture::world().await;

        for actor in [w.admin, w.owner, w.agent] {
            let err = w
                .service
                .execute(CreateOrder {
                    actor,
                    ..create_order(&w)
                })
                .await
                .unwrap_err();

            assert!(matches!(err.as_ref(), ExecutionError::NotCustomer));
        }
        assert_eq!(w.gateway.issued(), 0);
    }

    #[tokio::test]
    async fn requires_existing_product_and_franchise() {
        let w = fixture::world().await;

        let err = w
            .service
            .execute(CreateOrder {
                product_id: product::Id::new(),
                ..create_order(&w)
            })
            .await
            .unwrap_err();
        assert!(matches!(err.as_ref(), ExecutionError::ProductNotExists(_)));

        let err = w
            .service
            .execute(CreateOrder {
                franchise_id: franchise::Id::new(),
                ..create_order(&w)
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_ref(),
            ExecutionError::FranchiseNotExists(_),
        ));

        let orders: Vec<Order> = w
            .db
            .inspect(|s| s.orders.values().cloned().collect())
            .await;
        assert!(orders.iter().all(|o| o.id == w.order));
    }
}
