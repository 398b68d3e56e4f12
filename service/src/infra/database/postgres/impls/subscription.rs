//! [`Subscription`]-related [`Database`] implementations.

use common::{
    operations::{By, Guarded, Lock, Select, Update},
    Money,
};
use tracerr::Traced;

use crate::{
    domain::{subscription, Subscription},
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
};

impl<C> Database<Select<By<Option<Subscription>, subscription::Id>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Subscription>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Subscription>, subscription::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();

        const SQL: &str = "\
            SELECT id, customer_id, order_id, franchise_id, product_id, \
                   monthly_rent, currency, status, next_billing_at, \
                   created_at, updated_at \
            FROM subscriptions \
            WHERE id = $1::UUID";
        Ok(self
            .query_opt(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())?
            .map(|row| Subscription {
                id: row.get("id"),
                customer_id: row.get("customer_id"),
                order_id: row.get("order_id"),
                franchise_id: row.get("franchise_id"),
                product_id: row.get("product_id"),
                monthly_rent: Money {
                    amount: row.get("monthly_rent"),
                    currency: row.get("currency"),
                },
                status: row.get("status"),
                next_billing_at: row.get("next_billing_at"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            }))
    }
}

impl<C> Database<Update<Guarded<Subscription, subscription::Status>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = u64;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(guarded): Update<Guarded<Subscription, subscription::Status>>,
    ) -> Result<Self::Ok, Self::Err> {
        let Guarded {
            value: subscription,
            expected,
        } = guarded;

        const SQL: &str = "\
            UPDATE subscriptions \
            SET status = $2::INT2, \
                next_billing_at = $3::TIMESTAMPTZ, \
                updated_at = $4::TIMESTAMPTZ \
            WHERE id = $1::UUID \
              AND status = $5::INT2";
        self.exec(
            SQL,
            &[
                &subscription.id,
                &subscription.status,
                &subscription.next_billing_at,
                &subscription.updated_at,
                &expected,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
    }
}

impl<C> Database<Lock<By<Subscription, subscription::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Lock(by): Lock<By<Subscription, subscription::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: subscription::Id = by.into_inner();

        const SQL: &str = "\
            INSERT INTO subscriptions_lock \
            VALUES ($1::UUID) \
            ON CONFLICT (id) DO UPDATE SET id = EXCLUDED.id";
        self.exec(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}
