//! Shared fixtures of [`Command`] and [`Query`] tests.
//!
//! [`Command`]: crate::Command
//! [`Query`]: crate::Query

use common::{money::Currency, DateTime, DateTimeOf, Money};
use secrecy::SecretString;

use crate::{
    domain::{
        franchise, order, payment, product, service_request, subscription,
        user::{self, Actor, Role},
        Franchise, Order, Payment, Product, ServiceRequest, Subscription,
        User,
    },
    infra::{gateway::Stub, Memory},
    Config, Service,
};

/// Secret the [`Session`] tokens are signed with.
///
/// [`Session`]: crate::domain::user::Session
pub(crate) const JWT_SECRET: &[u8] = b"jwt_test_secret";

/// Secret the payment gateway signs confirmations with.
pub(crate) const GATEWAY_SECRET: &str = "rzp_test_secret";

/// Public key ID of the payment gateway.
pub(crate) const GATEWAY_KEY_ID: &str = "rzp_test_key";

/// Seeded [`Service`] along with the handles to its infrastructure.
#[derive(Debug)]
pub(crate) struct World {
    pub(crate) service: Service<Memory, Stub>,
    pub(crate) db: Memory,
    pub(crate) gateway: Stub,

    pub(crate) admin: Actor,
    pub(crate) owner: Actor,
    pub(crate) other_owner: Actor,
    pub(crate) agent: Actor,
    pub(crate) foreign_agent: Actor,
    pub(crate) customer: Actor,
    pub(crate) other_customer: Actor,

    pub(crate) franchise: franchise::Id,
    pub(crate) product: product::Id,

    /// Approved [`Order`] of the `customer` backing the `subscription`.
    pub(crate) order: order::Id,

    /// Active [`Subscription`] of the `customer`.
    pub(crate) subscription: subscription::Id,

    /// Inactive [`Subscription`] of the `customer`.
    pub(crate) inactive_subscription: subscription::Id,
}

impl World {
    /// Returns the stored [`Order`].
    pub(crate) async fn order(&self, id: order::Id) -> Order {
        self.db.inspect(|s| s.orders[&id].clone()).await
    }

    /// Returns the stored [`Payment`].
    pub(crate) async fn payment(&self, id: payment::Id) -> Payment {
        self.db.inspect(|s| s.payments[&id].clone()).await
    }

    /// Returns the stored [`Subscription`].
    pub(crate) async fn subscription(
        &self,
        id: subscription::Id,
    ) -> Subscription {
        self.db.inspect(|s| s.subscriptions[&id].clone()).await
    }

    /// Returns the stored [`ServiceRequest`].
    pub(crate) async fn service_request(
        &self,
        id: service_request::Id,
    ) -> ServiceRequest {
        self.db.inspect(|s| s.service_requests[&id].clone()).await
    }

    /// Returns the number of stored [`Notification`]s addressed to the
    /// provided [`Actor`].
    ///
    /// [`Notification`]: crate::domain::Notification
    pub(crate) async fn notifications_of(&self, actor: Actor) -> usize {
        self.db
            .inspect(|s| {
                s.notifications.iter().filter(|n| n.user_id == actor.id).count()
            })
            .await
    }

    /// Stores a [`ServiceRequest`] of the `customer` in the provided
    /// [`service_request::Status`], assigned to the provided agent.
    pub(crate) async fn service_request_in(
        &self,
        status: service_request::Status,
        agent: Option<Actor>,
    ) -> service_request::Id {
        let id = service_request::Id::new();
        let now = DateTime::now();
        let request = ServiceRequest {
            id,
            customer_id: self.customer.id,
            subscription_id: self.subscription,
            kind: service_request::Kind::Repair,
            status,
            description: "Water tastes metallic".into(),
            scheduled_at: None,
            completed_at: None,
            service_agent_id: agent.map(|a| a.id),
            rating: None,
            feedback: None,
            notes: None,
            created_at: now.coerce(),
            updated_at: now.coerce(),
        };
        self.db
            .seed(|s| drop(s.service_requests.insert(id, request)))
            .await;
        id
    }
}

/// Creates a new [`User`] with the provided [`Role`].
fn user(name: &str, role: Role, franchise_id: Option<franchise::Id>) -> User {
    User {
        id: user::Id::new(),
        name: user::Name::new(name).unwrap(),
        role,
        franchise_id,
        created_at: DateTime::now().coerce(),
    }
}

/// Creates a new [`Subscription`] of the provided customer.
fn subscription(
    customer: &User,
    order: &Order,
    status: subscription::Status,
) -> Subscription {
    let now = DateTime::now();
    Subscription {
        id: subscription::Id::new(),
        customer_id: customer.id,
        order_id: order.id,
        franchise_id: order.franchise_id,
        product_id: order.product_id,
        monthly_rent: Money {
            amount: "300".parse().unwrap(),
            currency: Currency::Inr,
        },
        status,
        next_billing_at: DateTimeOf::from_rfc3339("2024-01-31T00:00:00Z")
            .unwrap(),
        created_at: now.coerce(),
        updated_at: now.coerce(),
    }
}

/// Seeds a [`World`]:
/// - a franchise owned by `owner` with a service `agent`;
/// - another franchise owned by `other_owner` with a `foreign_agent`;
/// - a product priced 1000 deposit, 500 installation and 300 monthly;
/// - an approved order of the `customer` with an active and an inactive
///   subscription.
pub(crate) async fn world() -> World {
    let admin = user("Admin", Role::Admin, None);
    let owner = user("Owner", Role::FranchiseOwner, None);
    let other_owner = user("Other Owner", Role::FranchiseOwner, None);
    let customer = user("Customer", Role::Customer, None);
    let other_customer = user("Other Customer", Role::Customer, None);

    let franchise = Franchise {
        id: franchise::Id::new(),
        name: "Pune Central".into(),
        owner_id: Some(owner.id),
    };
    let other_franchise = Franchise {
        id: franchise::Id::new(),
        name: "Mumbai West".into(),
        owner_id: Some(other_owner.id),
    };
    let agent = user("Agent", Role::ServiceAgent, Some(franchise.id));
    let foreign_agent =
        user("Foreign Agent", Role::ServiceAgent, Some(other_franchise.id));

    let product = Product {
        id: product::Id::new(),
        name: "RO purifier".into(),
        security_deposit: "1000".parse().unwrap(),
        installation_fee: "500".parse().unwrap(),
        monthly_rent: "300".parse().unwrap(),
        currency: Currency::Inr,
    };

    let duration = order::RentalDuration::new(12).unwrap();
    let now = DateTime::now();
    let order = Order {
        id: order::Id::new(),
        customer_id: customer.id,
        product_id: product.id,
        franchise_id: franchise.id,
        kind: order::Kind::Rental,
        status: order::Status::Approved,
        shipping_address: order::Address::new("12 MG Road, Pune").unwrap(),
        billing_address: order::Address::new("12 MG Road, Pune").unwrap(),
        rental_duration: duration,
        security_deposit: product.security_deposit(),
        installation_fee: product.installation_fee(),
        total_initial_amount: Order::total(&product, duration).unwrap(),
        notes: None,
        service_agent_id: None,
        created_at: now.coerce(),
        updated_at: now.coerce(),
    };
    let active = subscription(&customer, &order, subscription::Status::Active);
    let inactive =
        subscription(&customer, &order, subscription::Status::Inactive);

    let world = World {
        service: Service::new(
            Config {
                jwt_decoding_key: jsonwebtoken::DecodingKey::from_secret(
                    JWT_SECRET,
                ),
                gateway_key_id: GATEWAY_KEY_ID.into(),
                gateway_key_secret: SecretString::from(GATEWAY_SECRET),
                currency: Currency::Inr,
            },
            Memory::new(),
            Stub::new(),
        ),
        db: Memory::new(),
        gateway: Stub::new(),
        admin: admin.actor(),
        owner: owner.actor(),
        other_owner: other_owner.actor(),
        agent: agent.actor(),
        foreign_agent: foreign_agent.actor(),
        customer: customer.actor(),
        other_customer: other_customer.actor(),
        franchise: franchise.id,
        product: product.id,
        order: order.id,
        subscription: active.id,
        inactive_subscription: inactive.id,
    };
    let world = World {
        db: world.service.database().clone(),
        gateway: world.service.gateway().clone(),
        ..world
    };

    world
        .db
        .seed(|s| {
            for u in [
                admin,
                owner,
                other_owner,
                agent,
                foreign_agent,
                customer,
                other_customer,
            ] {
                drop(s.users.insert(u.id, u));
            }
            for f in [franchise, other_franchise] {
                drop(s.franchises.insert(f.id, f));
            }
            drop(s.products.insert(product.id, product));
            drop(s.orders.insert(order.id, order));
            for sub in [active, inactive] {
                drop(s.subscriptions.insert(sub.id, sub));
            }
        })
        .await;

    world
}
