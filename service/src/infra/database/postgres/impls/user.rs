//! [`User`]-related [`Database`] implementations.
//!
//! Also covers [`Franchise`]s and [`Product`]s, which are only read by the
//! engine.

use common::operations::{By, Select};
use tracerr::Traced;

use crate::{
    domain::{franchise, product, user, Franchise, Product, User},
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
};

impl<C> Database<Select<By<Option<User>, user::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<User>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<User>, user::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();

        const SQL: &str = "\
            SELECT id, name, role, franchise_id, created_at \
            FROM users \
            WHERE id = $1::UUID";
        Ok(self
            .query_opt(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())?
            .map(|row| User {
                id: row.get("id"),
                name: row.get("name"),
                role: row.get("role"),
                franchise_id: row.get("franchise_id"),
                created_at: row.get("created_at"),
            }))
    }
}

impl<C> Database<Select<By<Option<Franchise>, franchise::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Franchise>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Franchise>, franchise::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();

        const SQL: &str = "\
            SELECT id, name, owner_id \
            FROM franchises \
            WHERE id = $1::UUID";
        Ok(self
            .query_opt(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())?
            .map(|row| Franchise {
                id: row.get("id"),
                name: row.get("name"),
                owner_id: row.get("owner_id"),
            }))
    }
}

impl<C> Database<Select<By<Option<Product>, product::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Product>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Product>, product::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();

        const SQL: &str = "\
            SELECT id, name, \
                   security_deposit, installation_fee, monthly_rent, \
                   currency \
            FROM products \
            WHERE id = $1::UUID";
        Ok(self
            .query_opt(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())?
            .map(|row| Product {
                id: row.get("id"),
                name: row.get("name"),
                security_deposit: row.get("security_deposit"),
                installation_fee: row.get("installation_fee"),
                monthly_rent: row.get("monthly_rent"),
                currency: row.get("currency"),
            }))
    }
}
