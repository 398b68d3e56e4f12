//! Postgres database clients.

use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard};
use tokio_postgres::{types::ToSql, Row, ToStatement};
use tracerr::Traced;

use crate::infra::database::{
    self,
    postgres::{self, connection, Connection},
};

/// Non-transactional Postgres database client.
///
/// Every operation is performed on a separate [`connection::Pool`]ed
/// [`Connection`].
#[derive(Clone, Debug)]
pub struct NonTx {
    /// [`connection::Pool`] to retrieve [`Connection`]s from.
    pub(crate) pool: connection::Pool,
}

impl NonTx {
    /// Creates a new [`NonTx`] client from the provided [`connection::Pool`].
    #[must_use]
    pub(crate) fn from_pool(pool: connection::Pool) -> Self {
        Self { pool }
    }

    /// Retrieves a [`connection::NonTx`] from the [`connection::Pool`].
    async fn connection(
        &self,
    ) -> Result<connection::NonTx, Traced<database::Error>> {
        self.pool
            .get()
            .await
            .map_err(tracerr::from_and_wrap!(=> postgres::Error))
            .map_err(tracerr::map_from)
    }
}

impl Connection for NonTx {
    async fn query<T>(
        &self,
        stmt: &T,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, Traced<database::Error>>
    where
        T: ToStatement + ?Sized,
    {
        let conn = self.connection().await.map_err(tracerr::wrap!())?;
        conn.query(stmt, params).await.map_err(tracerr::wrap!())
    }

    async fn query_opt<T>(
        &self,
        stmt: &T,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<Row>, Traced<database::Error>>
    where
        T: ToStatement + ?Sized,
    {
        let conn = self.connection().await.map_err(tracerr::wrap!())?;
        conn.query_opt(stmt, params).await.map_err(tracerr::wrap!())
    }

    async fn exec<T>(
        &self,
        stmt: &T,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, Traced<database::Error>>
    where
        T: ToStatement + ?Sized,
    {
        let conn = self.connection().await.map_err(tracerr::wrap!())?;
        conn.exec(stmt, params).await.map_err(tracerr::wrap!())
    }

    async fn batch_exec(
        &self,
        query: &str,
    ) -> Result<(), Traced<database::Error>> {
        let conn = self.connection().await.map_err(tracerr::wrap!())?;
        conn.batch_exec(query).await.map_err(tracerr::wrap!())
    }
}

/// Transactional Postgres database client.
///
/// The transaction is started lazily on the first operation and is rolled
/// back if this client is dropped without being [`Tx::commit()`]ted.
#[derive(Clone, Debug)]
pub struct Tx {
    /// [`connection::Pool`] to retrieve the [`Connection`] from.
    pool: connection::Pool,

    /// Lazily started [`connection::Tx`], unless already committed.
    tx: Arc<RwLock<Option<connection::Tx>>>,
}

impl Tx {
    /// Creates a new [`Tx`] client from the provided [`NonTx`] client.
    #[must_use]
    pub fn from_non_tx(client: &NonTx) -> Self {
        Self {
            pool: client.pool.clone(),
            tx: Arc::new(RwLock::new(None)),
        }
    }

    /// Returns the underlying [`connection::Tx`], starting it if necessary.
    async fn connection(
        &self,
    ) -> Result<RwLockReadGuard<'_, connection::Tx>, Traced<database::Error>>
    {
        if self.tx.read().await.is_none() {
            let mut tx = self.tx.write().await;
            if tx.is_none() {
                let conn = self
                    .pool
                    .get()
                    .await
                    .map_err(tracerr::from_and_wrap!(=> postgres::Error))
                    .map_err(tracerr::map_from)?;
                *tx = Some(
                    connection::Tx::from_non_tx(conn)
                        .await
                        .map_err(tracerr::wrap!())?,
                );
            }
        }

        RwLockReadGuard::try_map(self.tx.read().await, Option::as_ref)
            .map_err(|_| postgres::Error::TransactionFinished)
            .map_err(tracerr::from_and_wrap!(=> database::Error))
    }

    /// Commits this [`Tx`] client.
    ///
    /// # Errors
    ///
    /// If failed to commit transaction of this [`Tx`] client.
    pub async fn commit(&self) -> Result<(), Traced<database::Error>> {
        match self.tx.write().await.take() {
            Some(tx) => tx.commit().await.map_err(tracerr::wrap!()),
            // Nothing has been written.
            None => Ok(()),
        }
    }
}

impl Connection for Tx {
    async fn query<T>(
        &self,
        stmt: &T,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, Traced<database::Error>>
    where
        T: ToStatement + ?Sized,
    {
        self.connection()
            .await
            .map_err(tracerr::wrap!())?
            .query(stmt, params)
            .await
            .map_err(tracerr::wrap!())
    }

    async fn query_opt<T>(
        &self,
        stmt: &T,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<Row>, Traced<database::Error>>
    where
        T: ToStatement + ?Sized,
    {
        self.connection()
            .await
            .map_err(tracerr::wrap!())?
            .query_opt(stmt, params)
            .await
            .map_err(tracerr::wrap!())
    }

    async fn exec<T>(
        &self,
        stmt: &T,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, Traced<database::Error>>
    where
        T: ToStatement + ?Sized,
    {
        self.connection()
            .await
            .map_err(tracerr::wrap!())?
            .exec(stmt, params)
            .await
            .map_err(tracerr::wrap!())
    }

    async fn batch_exec(
        &self,
        query: &str,
    ) -> Result<(), Traced<database::Error>> {
        self.connection()
            .await
            .map_err(tracerr::wrap!())?
            .batch_exec(query)
            .await
            .map_err(tracerr::wrap!())
    }
}
