//! [`Notification`]-related [`Database`] implementations.

use common::operations::Insert;
use tracerr::Traced;

use crate::{
    domain::Notification,
    infra::{
        database::{
            self,
            postgres::{Connection, Tx},
            Postgres,
        },
        Database,
    },
};

/// Inserting is isolated under a `SAVEPOINT`, so a failed insert can be
/// ignored without aborting the surrounding transaction.
impl Database<Insert<Notification>> for Postgres<Tx> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(notification): Insert<Notification>,
    ) -> Result<Self::Ok, Self::Err> {
        let Notification {
            id,
            user_id,
            title,
            message,
            kind,
            related,
            is_read,
            created_at,
        } = notification;
        let related_id = related.map(|r| r.id());
        let related_type = related.map(|r| r.kind());

        const SQL: &str = "\
            INSERT INTO notifications (\
                id, user_id, title, message, kind, \
                related_id, related_type, is_read, created_at\
            ) \
            VALUES (\
                $1::UUID, $2::UUID, $3::VARCHAR, $4::TEXT, $5::INT2, \
                $6::UUID, $7::VARCHAR, $8::BOOLEAN, $9::TIMESTAMPTZ\
            )";
        self.exec_isolated(
            "notification",
            SQL,
            &[
                &id,
                &user_id,
                &title,
                &message,
                &kind,
                &related_id,
                &related_type,
                &is_read,
                &created_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)
    }
}
