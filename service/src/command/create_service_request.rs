//! [`Command`] for creating a new [`ServiceRequest`].

use common::{
    operations::{By, Commit, Insert, Select, Transact, Transacted},
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{
        franchise,
        notification::{self, Delivery, Related},
        service_request, subscription,
        user::Actor,
        Franchise, Notification, ServiceRequest, Subscription,
    },
    infra::{database, Database},
    Service,
};

use super::{notify, Command};

/// [`Command`] for creating a new [`ServiceRequest`] for an active
/// [`Subscription`] of the customer.
#[derive(Clone, Debug)]
pub struct CreateServiceRequest {
    /// [`Actor`] requesting the service.
    pub actor: Actor,

    /// ID of the [`Subscription`] to request the service for.
    pub subscription_id: subscription::Id,

    /// [`service_request::Kind`] of the requested service.
    pub kind: service_request::Kind,

    /// Problem description.
    pub description: String,

    /// Preferred [`DateTime`] of the visit, if any.
    pub scheduled_at: Option<service_request::ScheduleDateTime>,
}

impl<Db, Gw> Command<CreateServiceRequest> for Service<Db, Gw>
where
    Db: Database<Transact, Err = Traced<database::Error>>,
    Transacted<Db>: Database<
            Select<By<Option<Subscription>, subscription::Id>>,
            Ok = Option<Subscription>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Franchise>, franchise::Id>>,
            Ok = Option<Franchise>,
            Err = Traced<database::Error>,
        > + Database<Insert<ServiceRequest>, Err = Traced<database::Error>>
        + Database<Insert<Notification>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = ServiceRequest;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: CreateServiceRequest,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CreateServiceRequest {
            actor,
            subscription_id,
            kind,
            description,
            scheduled_at,
        } = cmd;

        if !actor.is_customer() {
            return Err(tracerr::new!(E::NotCustomer));
        }
        if description.trim().is_empty() {
            return Err(tracerr::new!(E::MissingDescription));
        }

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        let sub = tx
            .execute(Select(By::new(subscription_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .filter(|s: &Subscription| s.customer_id == actor.id)
            .ok_or(E::SubscriptionNotExists(subscription_id))
            .map_err(tracerr::wrap!())?;
        if !sub.is_active() {
            return Err(tracerr::new!(E::SubscriptionNotActive(sub.status)));
        }

        let now = DateTime::now();
        let request = ServiceRequest {
            id: service_request::Id::new(),
            customer_id: actor.id,
            subscription_id,
            kind,
            status: service_request::Status::Pending,
            description,
            scheduled_at,
            completed_at: None,
            service_agent_id: None,
            rating: None,
            feedback: None,
            notes: None,
            created_at: now.coerce(),
            updated_at: now.coerce(),
        };
        tx.execute(Insert(request.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let related = Some(Related::ServiceRequest(request.id));
        notify(
            &tx,
            Notification::new(
                actor.id,
                notification::Kind::ServiceRequest,
                "Service Request Created",
                "Your service request has been created and is pending \
                 assignment.",
                related,
            ),
            Delivery::Required,
        )
        .await
        .map_err(tracerr::map_from_and_wrap!(=> E))?;

        let owner = tx
            .execute(Select(By::new(sub.franchise_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .and_then(|f: Franchise| f.owner_id);
        if let Some(owner) = owner {
            notify(
                &tx,
                Notification::new(
                    owner,
                    notification::Kind::ServiceRequest,
                    "New Service Request",
                    "A new service request has been created and needs your \
                     attention.",
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

        Ok(request)
    }
}

/// Error of [`CreateServiceRequest`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// Only customers may request services.
    #[display("Only customers may create service requests")]
    NotCustomer,

    /// Problem description is blank.
    #[display("Service request description is required")]
    MissingDescription,

    /// [`Subscription`] doesn't exist or belongs to another customer.
    #[display("`Subscription(id: {_0})` does not exist")]
    SubscriptionNotExists(#[error(not(source))] subscription::Id),

    /// [`Subscription`] is not [`subscription::Status::Active`].
    #[display("Subscription is not active: {_0}")]
    SubscriptionNotActive(#[error(not(source))] subscription::Status),
}
