//! [`Command`] for submitting feedback on a completed [`ServiceRequest`].

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
        service_request::{self, Rating},
        user::Actor,
        Notification, ServiceRequest,
    },
    infra::{database, Database},
    Service,
};

use super::{notify, Command};

/// [`Command`] for rating a completed [`ServiceRequest`] by its customer.
///
/// Submitting again overwrites the previous [`Rating`] and feedback.
#[derive(Clone, Debug)]
pub struct SubmitServiceFeedback {
    /// [`Actor`] leaving the feedback.
    pub actor: Actor,

    /// ID of the rated [`ServiceRequest`].
    pub id: service_request::Id,

    /// [`Rating`] of the service.
    pub rating: Rating,

    /// Free-form feedback, if any.
    pub feedback: Option<String>,
}

impl<Db, Gw> Command<SubmitServiceFeedback> for Service<Db, Gw>
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
        cmd: SubmitServiceFeedback,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let SubmitServiceFeedback {
            actor,
            id,
            rating,
            feedback,
        } = cmd;

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
        if request.status != service_request::Status::Completed {
            return Err(tracerr::new!(E::NotCompleted(request.status)));
        }

        let rated = ServiceRequest {
            rating: Some(rating),
            feedback,
            updated_at: DateTime::now().coerce(),
            ..request
        };
        tx.execute(Update(rated.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        if let Some(agent_id) = rated.service_agent_id {
            notify(
                &tx,
                Notification::new(
                    agent_id,
                    notification::Kind::ServiceFeedback,
                    "Service Feedback Received",
                    format!(
                        "You received a {}-star rating for your service.",
                        rating.stars(),
                    ),
                    Some(Related::ServiceRequest(id)),
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

        Ok(rated)
    }
}

/// Error of [`SubmitServiceFeedback`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`ServiceRequest`] doesn't exist or belongs to another customer.
    #[display("`ServiceRequest(id: {_0})` does not exist")]
    NotExists(#[error(not(source))] service_request::Id),

    /// [`ServiceRequest`] is not [`service_request::Status::Completed`] yet.
    #[display("Can only rate completed service requests, current: {_0}")]
    NotCompleted(#[error(not(source))] service_request::Status),
}

#[cfg(test)]
mod spec {
    use crate::{
        domain::service_request::{Rating, Status},
        fixture,
    };

    use super::{Command as _, ExecutionError, SubmitServiceFeedback};

    #[tokio::test]
    async fn resubmission_overwrites() {
        let w = fixture::world().await;
        let id = w.service_request_in(Status::Completed, Some(w.agent)).await;

        w.service
            .execute(SubmitServiceFeedback {
                actor: w.customer,
                id,
                rating: Rating::new(2).unwrap(),
                feedback: Some("Late".into()),
            })
            .await
            .unwrap();
        w.service
            .execute(SubmitServiceFeedback {
                actor: w.customer,
                id,
                rating: Rating::new(5).unwrap(),
                feedback: None,
            })
            .await
            .unwrap();

        let stored = w.service_request(id).await;
        assert_eq!(stored.rating, Rating::new(5));
        assert_eq!(stored.feedback, None);
        assert_eq!(stored.status, Status::Completed);
        assert_eq!(w.notifications_of(w.agent).await, 2);
    }

    #[tokio::test]
    async fn requires_completed_own_request() {
        let w = fixture::world().await;
        let scheduled =
            w.service_request_in(Status::Scheduled, Some(w.agent)).await;
        let completed =
            w.service_request_in(Status::Completed, Some(w.agent)).await;

        let err = w
            .service
            .execute(SubmitServiceFeedback {
                actor: w.customer,
                id: scheduled,
                rating: Rating::new(4).unwrap(),
                feedback: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_ref(),
            ExecutionError::NotCompleted(Status::Scheduled),
        ));

        let err = w
            .service
            .execute(SubmitServiceFeedback {
                actor: w.other_customer,
                id: completed,
                rating: Rating::new(4).unwrap(),
                feedback: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err.as_ref(), ExecutionError::NotExists(_)));
        assert_eq!(w.service_request(completed).await.rating, None);
    }
}
