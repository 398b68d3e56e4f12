//! [`Command`] for cancelling a [`ServiceRequest`] by its customer.

use common::{
    operations::{
        By, Commit, Insert, Lock, Select, Transact, Transacted, Update,
    },
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{
        notification::{self, Delivery, Related},
        service_request,
        user::Actor,
        Notification, ServiceRequest,
    },
    infra::{database, Database},
    Service,
};

use super::{notify, Command};

/// [`Command`] for cancelling a not yet completed [`ServiceRequest`] by its
/// customer.
#[derive(Clone, Copy, Debug)]
pub struct CancelServiceRequest {
    /// [`Actor`] cancelling the [`ServiceRequest`].
    pub actor: Actor,

    /// ID of the [`ServiceRequest`] to cancel.
    pub id: service_request::Id,
}

impl<Db, Gw> Command<CancelServiceRequest> for Service<Db, Gw>
where
    Db: Database<Transact, Err = Traced<database::Error>>,
    Transacted<Db>: Database<
            Lock<By<ServiceRequest, service_request::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<ServiceRequest>, service_request::Id>>,
            Ok = Option<ServiceRequest>,
            Err = Traced<database::Error>,
        > + Database<Update<ServiceRequest>, Err = Traced<database::Error>>
        + Database<Insert<Notification>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = ServiceRequest;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: CancelServiceRequest,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CancelServiceRequest { actor, id } = cmd;

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent actions upon the same `ServiceRequest`.
        tx.execute(Lock(By::<ServiceRequest, _>::new(id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let request = tx
            .execute(Select(By::new(id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .filter(|r: &ServiceRequest| r.customer_id == actor.id)
            .ok_or(E::NotExists(id))
            .map_err(tracerr::wrap!())?;
        if !request.status.is_cancellable() {
            return Err(tracerr::new!(E::NotCancellable(request.status)));
        }

        let cancelled = ServiceRequest {
            status: service_request::Status::Cancelled,
            updated_at: DateTime::now().coerce(),
            ..request
        };
        tx.execute(Update(cancelled.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let related = Some(Related::ServiceRequest(id));
        notify(
            &tx,
            Notification::new(
                cancelled.customer_id,
                notification::Kind::ServiceRequest,
                "Service Request Cancelled",
                "Your service request has been cancelled.",
                related,
            ),
            Delivery::Required,
        )
        .await
        .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if let Some(agent_id) = cancelled.service_agent_id {
            notify(
                &tx,
                Notification::new(
                    agent_id,
                    notification::Kind::ServiceRequest,
                    "Service Request Cancelled",
                    "A service request assigned to you has been cancelled by \
                     the customer.",
                    related,
                ),
                Delivery::Required,
            )
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        }

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(cancelled)
    }
}

/// Error of [`CancelServiceRequest`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`ServiceRequest`] doesn't exist or belongs to another customer.
    #[display("`ServiceRequest(id: {_0})` does not exist")]
    NotExists(#[error(not(source))] service_request::Id),

    /// [`ServiceRequest`] is not in a cancellable
    /// [`service_request::Status`].
    #[display("Service request cannot be cancelled when {_0}")]
    NotCancellable(#[error(not(source))] service_request::Status),
}

#[cfg(test)]
mod spec {
    use crate::{domain::service_request::Status, fixture};

    use super::{CancelServiceRequest, Command as _, ExecutionError};

    #[tokio::test]
    async fn cancels_and_notifies_agent() {
        let w = fixture::world().await;
        let id = w.service_request_in(Status::Scheduled, Some(w.agent)).await;

        let cancelled = w
            .service
            .execute(CancelServiceRequest {
                actor: w.customer,
                id,
            })
            .await
            .unwrap();

        assert_eq!(cancelled.status, Status::Cancelled);
        assert_eq!(w.service_request(id).await.status, Status::Cancelled);
        assert_eq!(w.notifications_of(w.customer).await, 1);
        assert_eq!(w.notifications_of(w.agent).await, 1);
    }

    #[tokio::test]
    async fn cancels_unassigned_request() {
        let w = fixture::world().await;
        let id = w.service_request_in(Status::Pending, None).await;

        w.service
            .execute(CancelServiceRequest {
                actor: w.customer,
                id,
            })
            .await
            .unwrap();

        assert_eq!(w.notifications_of(w.customer).await, 1);
        assert_eq!(w.notifications_of(w.agent).await, 0);
    }

    #[tokio::test]
    async fn terminal_requests_stay() {
        let w = fixture::world().await;

        for status in [Status::Completed, Status::Cancelled] {
            let id = w.service_request_in(status, Some(w.agent)).await;

            let err = w
                .service
                .execute(CancelServiceRequest {
                    actor: w.customer,
                    id,
                })
                .await
                .unwrap_err();

            assert!(matches!(
                err.as_ref(),
                ExecutionError::NotCancellable(s) if *s == status,
            ));
            assert_eq!(w.service_request(id).await.status, status);
        }
    }

    #[tokio::test]
    async fn foreign_request_is_not_found() {
        let w = fixture::world().await;
        let id = w.service_request_in(Status::Pending, None).await;

        let err = w
            .service
            .execute(CancelServiceRequest {
                actor: w.other_customer,
                id,
            })
            .await
            .unwrap_err();

        assert!(matches!(err.as_ref(), ExecutionError::NotExists(_)));
        assert_eq!(w.service_request(id).await.status, Status::Pending);
    }
}
