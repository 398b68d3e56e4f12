//! [`Payment`]-related [`Database`] implementations.

use common::{
    operations::{By, Guarded, Insert, Select, Update},
    Money,
};
use tokio_postgres::Row;
use tracerr::Traced;

use crate::{
    domain::{payment, Payment},
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
    read::{
        payment::{list, Pending, Purpose, Succeeded},
        Scoped,
    },
};

use super::scope_params;

/// Columns of the `payments` table read by [`from_row()`].
macro_rules! columns {
    () => {
        "p.id, p.customer_id, p.order_id, p.subscription_id, \
         p.amount, p.currency, p.kind, p.status, p.method, \
         p.transaction_id, p.details, p.invoice_number, \
         p.created_at, p.updated_at"
    };
}

/// Visibility condition of a `payments` row for the [`scope_params()`] in
/// `$S` and `$U` (replaced with the actual parameter numbers).
macro_rules! visible {
    ($s:literal, $u:literal) => {
        concat!(
            "($", $s, "::INT2 = 0 \
              OR ($", $s, " = 1 AND (\
                  EXISTS (SELECT 1 FROM orders o \
                          JOIN franchises f ON f.id = o.franchise_id \
                          WHERE o.id = p.order_id \
                            AND f.owner_id = $", $u, "::UUID) \
                  OR EXISTS (SELECT 1 FROM subscriptions s \
                             JOIN franchises f ON f.id = s.franchise_id \
                             WHERE s.id = p.subscription_id \
                               AND f.owner_id = $", $u, "::UUID))) \
              OR ($", $s, " = 3 AND p.customer_id = $", $u, "::UUID))",
        )
    };
}

/// Reads a [`Payment`] from the provided `payments` table [`Row`].
fn from_row(row: &Row) -> Payment {
    Payment {
        id: row.get("id"),
        customer_id: row.get("customer_id"),
        order_id: row.get("order_id"),
        subscription_id: row.get("subscription_id"),
        amount: Money {
            amount: row.get("amount"),
            currency: row.get("currency"),
        },
        kind: row.get("kind"),
        status: row.get("status"),
        method: row.get("method"),
        transaction_id: row.get("transaction_id"),
        details: row.get("details"),
        invoice_number: row.get("invoice_number"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl<C> Database<Select<By<Option<Succeeded<Payment>>, payment::TransactionId>>>
    for Postgres<C>
where
    C: Connection,
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

        const SQL: &str = concat!(
            "SELECT ",
            columns!(),
            " FROM payments p \
              WHERE p.transaction_id = $1::VARCHAR \
                AND p.status = $2::INT2 \
              LIMIT 1",
        );
        Ok(self
            .query_opt(SQL, &[&tx_id, &payment::Status::Success])
            .await
            .map_err(tracerr::wrap!())?
            .as_ref()
            .map(from_row)
            .map(Succeeded))
    }
}

impl<C> Database<Select<By<Option<Pending<Payment>>, Purpose>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Pending<Payment>>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Pending<Payment>>, Purpose>>,
    ) -> Result<Self::Ok, Self::Err> {
        let row = match by.into_inner() {
            Purpose::Initial(order_id) => {
                const SQL: &str = concat!(
                    "SELECT ",
                    columns!(),
                    " FROM payments p \
                      WHERE p.order_id = $1::UUID \
                        AND p.kind = $2::INT2 \
                        AND p.status = $3::INT2 \
                      ORDER BY p.created_at DESC \
                      LIMIT 1",
                );
                self.query_opt(
                    SQL,
                    &[
                        &order_id,
                        &payment::Kind::Initial,
                        &payment::Status::Pending,
                    ],
                )
                .await
            }
            Purpose::Monthly(subscription_id) => {
                const SQL: &str = concat!(
                    "SELECT ",
                    columns!(),
                    " FROM payments p \
                      WHERE p.subscription_id = $1::UUID \
                        AND p.kind = $2::INT2 \
                        AND p.status = $3::INT2 \
                      ORDER BY p.created_at DESC \
                      LIMIT 1",
                );
                self.query_opt(
                    SQL,
                    &[
                        &subscription_id,
                        &payment::Kind::Monthly,
                        &payment::Status::Pending,
                    ],
                )
                .await
            }
        }
        .map_err(tracerr::wrap!())?;
        Ok(row.as_ref().map(from_row).map(Pending))
    }
}

impl<C> Database<Select<By<Vec<Payment>, list::Selector>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Vec<Payment>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<Payment>, list::Selector>>,
    ) -> Result<Self::Ok, Self::Err> {
        let list::Selector { scope, limit } = by.into_inner();
        let (scope, user_id) = scope_params(scope);
        let limit = limit.map(i64::from);

        const SQL: &str = concat!(
            "SELECT ",
            columns!(),
            " FROM payments p \
              WHERE ",
            visible!("1", "2"),
            " ORDER BY p.created_at DESC \
              LIMIT $3::INT8",
        );
        Ok(self
            .query(SQL, &[&scope, &user_id, &limit])
            .await
            .map_err(tracerr::wrap!())?
            .iter()
            .map(from_row)
            .collect())
    }
}

impl<C> Database<Select<By<Option<Payment>, Scoped<payment::Id>>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Payment>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Payment>, Scoped<payment::Id>>>,
    ) -> Result<Self::Ok, Self::Err> {
        let Scoped { id, scope } = by.into_inner();
        let (scope, user_id) = scope_params(scope);

        const SQL: &str = concat!(
            "SELECT ",
            columns!(),
            " FROM payments p \
              WHERE p.id = $3::UUID \
                AND ",
            visible!("1", "2"),
        );
        Ok(self
            .query_opt(SQL, &[&scope, &user_id, &id])
            .await
            .map_err(tracerr::wrap!())?
            .as_ref()
            .map(from_row))
    }
}

impl<C> Database<Insert<Payment>> for Postgres<C>
where
    C: Connection,
    Self: Database<Update<Payment>, Ok = (), Err = Traced<database::Error>>,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(payment): Insert<Payment>,
    ) -> Result<Self::Ok, Self::Err> {
        self.execute(Update(payment)).await.map_err(tracerr::wrap!())
    }
}

impl<C> Database<Update<Payment>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(payment): Update<Payment>,
    ) -> Result<Self::Ok, Self::Err> {
        let Payment {
            id,
            customer_id,
            order_id,
            subscription_id,
            amount,
            kind,
            status,
            method,
            transaction_id,
            details,
            invoice_number,
            created_at,
            updated_at,
        } = payment;

        const SQL: &str = "\
            INSERT INTO payments (\
                id, customer_id, order_id, subscription_id, \
                amount, currency, kind, status, method, \
                transaction_id, details, invoice_number, \
                created_at, updated_at\
            ) \
            VALUES (\
                $1::UUID, $2::UUID, $3::UUID, $4::UUID, \
                $5::NUMERIC, $6::INT2, $7::INT2, $8::INT2, $9::INT2, \
                $10::VARCHAR, $11::JSONB, $12::VARCHAR, \
                $13::TIMESTAMPTZ, $14::TIMESTAMPTZ\
            ) \
            ON CONFLICT (id) DO UPDATE \
            SET amount = EXCLUDED.amount, \
                currency = EXCLUDED.currency, \
                status = EXCLUDED.status, \
                method = EXCLUDED.method, \
                transaction_id = EXCLUDED.transaction_id, \
                details = EXCLUDED.details, \
                invoice_number = EXCLUDED.invoice_number, \
                updated_at = EXCLUDED.updated_at";
        self.exec(
            SQL,
            &[
                &id,
                &customer_id,
                &order_id,
                &subscription_id,
                &amount.amount,
                &amount.currency,
                &kind,
                &status,
                &method,
                &transaction_id,
                &details,
                &invoice_number,
                &created_at,
                &updated_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)
    }
}

impl<C> Database<Update<Guarded<Payment, payment::Status>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = u64;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(guarded): Update<Guarded<Payment, payment::Status>>,
    ) -> Result<Self::Ok, Self::Err> {
        let Guarded {
            value: payment,
            expected,
        } = guarded;

        const SQL: &str = "\
            UPDATE payments \
            SET status = $2::INT2, \
                method = $3::INT2, \
                transaction_id = $4::VARCHAR, \
                details = $5::JSONB, \
                updated_at = $6::TIMESTAMPTZ \
            WHERE id = $1::UUID \
              AND status = $7::INT2";
        self.exec(
            SQL,
            &[
                &payment.id,
                &payment.status,
                &payment.method,
                &payment.transaction_id,
                &payment.details,
                &payment.updated_at,
                &expected,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
    }
}
