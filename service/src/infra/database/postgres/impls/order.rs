//! [`Order`]-related [`Database`] implementations.

use common::{
    operations::{By, Guarded, Insert, Lock, Select, Update},
    Money,
};
use tokio_postgres::Row;
use tracerr::Traced;

use crate::{
    domain::{order, Order},
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
};

/// Reads an [`Order`] from the provided `orders` table [`Row`].
fn from_row(row: &Row) -> Order {
    let currency = row.get("currency");
    let money = |column: &str| Money {
        amount: row.get(column),
        currency,
    };
    Order {
        id: row.get("id"),
        customer_id: row.get("customer_id"),
        product_id: row.get("product_id"),
        franchise_id: row.get("franchise_id"),
        kind: row.get("kind"),
        status: row.get("status"),
        shipping_address: row.get("shipping_address"),
        billing_address: row.get("billing_address"),
        rental_duration: row.get("rental_duration"),
        security_deposit: money("security_deposit"),
        installation_fee: money("installation_fee"),
        total_initial_amount: money("total_initial_amount"),
        notes: row.get("notes"),
        service_agent_id: row.get("service_agent_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl<C> Database<Select<By<Option<Order>, order::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Order>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Order>, order::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();

        const SQL: &str = "\
            SELECT id, customer_id, product_id, franchise_id, \
                   kind, status, \
                   shipping_address, billing_address, rental_duration, \
                   security_deposit, installation_fee, total_initial_amount, \
                   currency, notes, service_agent_id, \
                   created_at, updated_at \
            FROM orders \
            WHERE id = $1::UUID";
        Ok(self
            .query_opt(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())?
            .as_ref()
            .map(from_row))
    }
}

impl<C> Database<Insert<Order>> for Postgres<C>
where
    C: Connection,
    Self: Database<Update<Order>, Ok = (), Err = Traced<database::Error>>,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(order): Insert<Order>,
    ) -> Result<Self::Ok, Self::Err> {
        self.execute(Update(order)).await.map_err(tracerr::wrap!())
    }
}

impl<C> Database<Update<Order>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(order): Update<Order>,
    ) -> Result<Self::Ok, Self::Err> {
        let Order {
            id,
            customer_id,
            product_id,
            franchise_id,
            kind,
            status,
            shipping_address,
            billing_address,
            rental_duration,
            security_deposit,
            installation_fee,
            total_initial_amount,
            notes,
            service_agent_id,
            created_at,
            updated_at,
        } = order;

        const SQL: &str = "\
            INSERT INTO orders (\
                id, customer_id, product_id, franchise_id, \
                kind, status, \
                shipping_address, billing_address, rental_duration, \
                security_deposit, installation_fee, total_initial_amount, \
                currency, notes, service_agent_id, \
                created_at, updated_at\
            ) \
            VALUES (\
                $1::UUID, $2::UUID, $3::UUID, $4::UUID, \
                $5::INT2, $6::INT2, \
                $7::VARCHAR, $8::VARCHAR, $9::INT4, \
                $10::NUMERIC, $11::NUMERIC, $12::NUMERIC, \
                $13::INT2, $14::TEXT, $15::UUID, \
                $16::TIMESTAMPTZ, $17::TIMESTAMPTZ\
            ) \
            ON CONFLICT (id) DO UPDATE \
            SET status = EXCLUDED.status, \
                shipping_address = EXCLUDED.shipping_address, \
                billing_address = EXCLUDED.billing_address, \
                notes = EXCLUDED.notes, \
                service_agent_id = EXCLUDED.service_agent_id, \
                updated_at = EXCLUDED.updated_at";
        self.exec(
            SQL,
            &[
                &id,
                &customer_id,
                &product_id,
                &franchise_id,
                &kind,
                &status,
                &shipping_address,
                &billing_address,
                &rental_duration,
                &security_deposit.amount,
                &installation_fee.amount,
                &total_initial_amount.amount,
                &total_initial_amount.currency,
                &notes,
                &service_agent_id,
                &created_at,
                &updated_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)
    }
}

impl<C> Database<Update<Guarded<Order, order::Status>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = u64;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(guarded): Update<Guarded<Order, order::Status>>,
    ) -> Result<Self::Ok, Self::Err> {
        let Guarded {
            value: order,
            expected,
        } = guarded;

        const SQL: &str = "\
            UPDATE orders \
            SET status = $2::INT2, \
                notes = $3::TEXT, \
                service_agent_id = $4::UUID, \
                updated_at = $5::TIMESTAMPTZ \
            WHERE id = $1::UUID \
              AND status = $6::INT2";
        self.exec(
            SQL,
            &[
                &order.id,
                &order.status,
                &order.notes,
                &order.service_agent_id,
                &order.updated_at,
                &expected,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
    }
}

impl<C> Database<Lock<By<Order, order::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Lock(by): Lock<By<Order, order::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: order::Id = by.into_inner();

        // Upserting takes the row lock even when the row exists already.
        const SQL: &str = "\
            INSERT INTO orders_lock \
            VALUES ($1::UUID) \
            ON CONFLICT (id) DO UPDATE SET id = EXCLUDED.id";
        self.exec(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}
