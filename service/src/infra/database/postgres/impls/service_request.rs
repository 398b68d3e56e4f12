//! [`ServiceRequest`]-related [`Database`] implementations.

use common::operations::{By, Insert, Lock, Select, Update};
use tokio_postgres::Row;
use tracerr::Traced;

use crate::{
    domain::{service_request, ServiceRequest},
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
    read::{Scope, Scoped},
};

use super::scope_params;

/// Columns of the `service_requests` table read by [`from_row()`].
macro_rules! columns {
    () => {
        "r.id, r.customer_id, r.subscription_id, r.kind, r.status, \
         r.description, r.scheduled_at, r.completed_at, r.service_agent_id, \
         r.rating, r.feedback, r.notes, r.created_at, r.updated_at"
    };
}

/// Visibility condition of a `service_requests` row for the
/// [`scope_params()`] in `$1` and `$2`.
macro_rules! visible {
    () => {
        "($1::INT2 = 0 \
          OR ($1 = 1 AND EXISTS (\
              SELECT 1 FROM subscriptions s \
              JOIN franchises f ON f.id = s.franchise_id \
              WHERE s.id = r.subscription_id \
                AND f.owner_id = $2::UUID)) \
          OR ($1 = 2 AND r.service_agent_id = $2::UUID) \
          OR ($1 = 3 AND r.customer_id = $2::UUID))"
    };
}

/// Reads a [`ServiceRequest`] from the provided `service_requests` table
/// [`Row`].
fn from_row(row: &Row) -> ServiceRequest {
    ServiceRequest {
        id: row.get("id"),
        customer_id: row.get("customer_id"),
        subscription_id: row.get("subscription_id"),
        kind: row.get("kind"),
        status: row.get("status"),
        description: row.get("description"),
        scheduled_at: row.get("scheduled_at"),
        completed_at: row.get("completed_at"),
        service_agent_id: row.get("service_agent_id"),
        rating: row.get("rating"),
        feedback: row.get("feedback"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl<C> Database<Select<By<Option<ServiceRequest>, service_request::Id>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<ServiceRequest>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<ServiceRequest>, service_request::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();

        const SQL: &str = concat!(
            "SELECT ",
            columns!(),
            " FROM service_requests r \
              WHERE r.id = $1::UUID",
        );
        Ok(self
            .query_opt(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())?
            .as_ref()
            .map(from_row))
    }
}

impl<C>
    Database<Select<By<Option<ServiceRequest>, Scoped<service_request::Id>>>>
    for Postgres<C>
where
    C: Connection,
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
        let (scope, user_id) = scope_params(scope);

        const SQL: &str = concat!(
            "SELECT ",
            columns!(),
            " FROM service_requests r \
              WHERE r.id = $3::UUID \
                AND ",
            visible!(),
        );
        Ok(self
            .query_opt(SQL, &[&scope, &user_id, &id])
            .await
            .map_err(tracerr::wrap!())?
            .as_ref()
            .map(from_row))
    }
}

impl<C> Database<Select<By<Vec<ServiceRequest>, Scope>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Vec<ServiceRequest>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<ServiceRequest>, Scope>>,
    ) -> Result<Self::Ok, Self::Err> {
        let (scope, user_id) = scope_params(by.into_inner());

        const SQL: &str = concat!(
            "SELECT ",
            columns!(),
            " FROM service_requests r \
              WHERE ",
            visible!(),
            " ORDER BY r.created_at DESC",
        );
        Ok(self
            .query(SQL, &[&scope, &user_id])
            .await
            .map_err(tracerr::wrap!())?
            .iter()
            .map(from_row)
            .collect())
    }
}

impl<C> Database<Insert<ServiceRequest>> for Postgres<C>
where
    C: Connection,
    Self: Database<
        Update<ServiceRequest>,
        Ok = (),
        Err = Traced<database::Error>,
    >,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(request): Insert<ServiceRequest>,
    ) -> Result<Self::Ok, Self::Err> {
        self.execute(Update(request)).await.map_err(tracerr::wrap!())
    }
}

impl<C> Database<Update<ServiceRequest>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(request): Update<ServiceRequest>,
    ) -> Result<Self::Ok, Self::Err> {
        let ServiceRequest {
            id,
            customer_id,
            subscription_id,
            kind,
            status,
            description,
            scheduled_at,
            completed_at,
            service_agent_id,
            rating,
            feedback,
            notes,
            created_at,
            updated_at,
        } = request;

        const SQL: &str = "\
            INSERT INTO service_requests (\
                id, customer_id, subscription_id, kind, status, \
                description, scheduled_at, completed_at, service_agent_id, \
                rating, feedback, notes, \
                created_at, updated_at\
            ) \
            VALUES (\
                $1::UUID, $2::UUID, $3::UUID, $4::INT2, $5::INT2, \
                $6::TEXT, $7::TIMESTAMPTZ, $8::TIMESTAMPTZ, $9::UUID, \
                $10::INT2, $11::TEXT, $12::TEXT, \
                $13::TIMESTAMPTZ, $14::TIMESTAMPTZ\
            ) \
            ON CONFLICT (id) DO UPDATE \
            SET status = EXCLUDED.status, \
                description = EXCLUDED.description, \
                scheduled_at = EXCLUDED.scheduled_at, \
                completed_at = EXCLUDED.completed_at, \
                service_agent_id = EXCLUDED.service_agent_id, \
                rating = EXCLUDED.rating, \
                feedback = EXCLUDED.feedback, \
                notes = EXCLUDED.notes, \
                updated_at = EXCLUDED.updated_at";
        self.exec(
            SQL,
            &[
                &id,
                &customer_id,
                &subscription_id,
                &kind,
                &status,
                &description,
                &scheduled_at,
                &completed_at,
                &service_agent_id,
                &rating,
                &feedback,
                &notes,
                &created_at,
                &updated_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)
    }
}

impl<C> Database<Lock<By<ServiceRequest, service_request::Id>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Lock(by): Lock<By<ServiceRequest, service_request::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: service_request::Id = by.into_inner();

        const SQL: &str = "\
            INSERT INTO service_requests_lock \
            VALUES ($1::UUID) \
            ON CONFLICT (id) DO UPDATE SET id = EXCLUDED.id";
        self.exec(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}
