//! [`Command`] for updating a [`ServiceRequest`].

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
        franchise,
        notification::{self, Delivery, Related},
        service_request::{self, Changes},
        subscription,
        user::{self, Actor, Role},
        Franchise, Notification, ServiceRequest, Subscription, User,
    },
    infra::{database, Database},
    Service,
};

use super::{notify, Command};

/// [`Command`] for updating a [`ServiceRequest`] according to the
/// permissions of the [`Actor`]'s [`Role`].
#[derive(Clone, Debug)]
pub struct UpdateServiceRequest {
    /// [`Actor`] performing the update.
    pub actor: Actor,

    /// ID of the [`ServiceRequest`] to update.
    pub id: service_request::Id,

    /// [`Changes`] to apply.
    pub changes: Changes,
}

impl<Db, Gw> Command<UpdateServiceRequest> for Service<Db, Gw>
where
    Db: Database<Transact, Err = Traced<database::Error>>,
    Transacted<Db>: Database<
            Lock<By<ServiceRequest, service_request::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<ServiceRequest>, service_request::Id>>,
            Ok = Option<ServiceRequest>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Subscription>, subscription::Id>>,
            Ok = Option<Subscription>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Franchise>, franchise::Id>>,
            Ok = Option<Franchise>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<User>, user::Id>>,
            Ok = Option<User>,
            Err = Traced<database::Error>,
        > + Database<Update<ServiceRequest>, Err = Traced<database::Error>>
        + Database<Insert<Notification>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = ServiceRequest;
    type Err = Traced<ExecutionError>;

    #[expect(clippy::too_many_lines, reason = "single transaction")]
    async fn execute(
        &self,
        cmd: UpdateServiceRequest,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let UpdateServiceRequest { actor, id, changes } = cmd;

        if changes.is_empty() {
            return Err(tracerr::new!(E::NoUpdates));
        }

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
            .ok_or(E::NotExists(id))
            .map_err(tracerr::wrap!())?;

        let in_scope = match actor.role {
            Role::Admin => true,
            Role::FranchiseOwner => {
                let franchise_id = tx
                    .execute(Select(By::new(request.subscription_id)))
                    .await
                    .map_err(tracerr::map_from_and_wrap!(=> E))?
                    .map(|s: Subscription| s.franchise_id);
                is_franchise_owner(&tx, franchise_id, actor)
                    .await
                    .map_err(tracerr::map_from_and_wrap!(=> E))?
            }
            Role::ServiceAgent => request.service_agent_id == Some(actor.id),
            Role::Customer => request.customer_id == actor.id,
        };
        if !in_scope || !changes.permitted_for(actor.role, request.status) {
            return Err(tracerr::new!(E::PermissionDenied));
        }
        if request.status.is_terminal() {
            return Err(tracerr::new!(E::Terminal(request.status)));
        }

        let agent = if let Some(agent_id) = changes.agent_id {
            let agent = tx
                .execute(Select(By::new(agent_id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
                .filter(|u: &User| u.role == Role::ServiceAgent)
                .ok_or(E::InvalidAgent(agent_id))
                .map_err(tracerr::wrap!())?;
            if actor.role == Role::FranchiseOwner
                && !is_franchise_owner(&tx, agent.franchise_id, actor)
                    .await
                    .map_err(tracerr::map_from_and_wrap!(=> E))?
            {
                return Err(tracerr::new!(E::ForeignAgent(agent_id)));
            }
            Some(agent.id)
        } else {
            None
        };

        // Assigning an agent to a pending request assigns it, unless another
        // status is requested explicitly.
        let status = match (changes.status, agent) {
            (None | Some(service_request::Status::Pending), Some(_))
                if request.status == service_request::Status::Pending =>
            {
                service_request::Status::Assigned
            }
            (Some(s), _) => s,
            (None, _) => request.status,
        };
        if !request.status.can_transition_to(status) {
            return Err(tracerr::new!(E::InvalidTransition {
                from: request.status,
                to: status,
            }));
        }

        let now = DateTime::now();
        let completed_at = changes.completed_at.or(request.completed_at).or(
            (status == service_request::Status::Completed)
                .then(|| now.coerce()),
        );
        let updated = ServiceRequest {
            status,
            scheduled_at: changes.scheduled_at.or(request.scheduled_at),
            completed_at,
            notes: changes.notes.or_else(|| request.notes.clone()),
            service_agent_id: agent.or(request.service_agent_id),
            updated_at: now.coerce(),
            ..request.clone()
        };
        tx.execute(Update(updated.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let related = Some(Related::ServiceRequest(id));
        let mut notifications = vec![];
        if status != request.status {
            notifications.push(Notification::new(
                request.customer_id,
                notification::Kind::ServiceRequest,
                "Service Request Updated",
                format!(
                    "Your service request status has been updated to \
                     {status}.",
                ),
                related,
            ));
        }
        if let Some(agent_id) = agent {
            notifications.push(Notification::new(
                request.customer_id,
                notification::Kind::ServiceRequest,
                "Service Agent Assigned",
                "A service agent has been assigned to your service request.",
                related,
            ));
            notifications.push(Notification::new(
                agent_id,
                notification::Kind::ServiceRequest,
                "New Service Assignment",
                format!("You have been assigned to service request #{id}."),
                related,
            ));
        }
        if let Some(at) = changes.scheduled_at {
            notifications.push(Notification::new(
                request.customer_id,
                notification::Kind::ServiceRequest,
                "Service Visit Scheduled",
                format!(
                    "Your service request has been scheduled for {}.",
                    at.to_rfc3339(),
                ),
                related,
            ));
        }
        for n in notifications {
            notify(&tx, n, Delivery::Required)
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;
        }

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tracing::info!(
            service_request.id = %id,
            actor.id = %actor.id,
            from = %request.status,
            to = %status,
            "`ServiceRequest` updated",
        );

        Ok(updated)
    }
}

/// Checks whether the [`Franchise`] with the provided ID is owned by the
/// provided [`Actor`].
async fn is_franchise_owner<Tx>(
    tx: &Tx,
    franchise_id: Option<franchise::Id>,
    actor: Actor,
) -> Result<bool, Traced<database::Error>>
where
    Tx: Database<
        Select<By<Option<Franchise>, franchise::Id>>,
        Ok = Option<Franchise>,
        Err = Traced<database::Error>,
    >,
{
    let Some(franchise_id) = franchise_id else {
        return Ok(false);
    };
    Ok(tx
        .execute(Select(By::new(franchise_id)))
        .await
        .map_err(tracerr::wrap!())?
        .is_some_and(|f| f.is_owned_by(actor.id)))
}

/// Error of [`UpdateServiceRequest`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Changes`] touch nothing.
    #[display("No valid updates provided")]
    NoUpdates,

    /// [`ServiceRequest`] with the provided ID does not exist.
    #[display("`ServiceRequest(id: {_0})` does not exist")]
    NotExists(#[error(not(source))] service_request::Id),

    /// [`Actor`] is not allowed to apply the [`Changes`].
    #[display("Permission denied")]
    PermissionDenied,

    /// [`ServiceRequest`] is in a terminal [`service_request::Status`].
    #[display("Service request is {_0} already")]
    Terminal(#[error(not(source))] service_request::Status),

    /// Requested [`service_request::Status`] cannot follow the current one.
    #[display("Cannot move service request from {from} to {to}")]
    InvalidTransition {
        /// Current [`service_request::Status`].
        from: service_request::Status,

        /// Requested [`service_request::Status`].
        to: service_request::Status,
    },

    /// [`User`] to assign doesn't exist or is not a service agent.
    #[display("Invalid service agent `{_0}`")]
    InvalidAgent(#[error(not(source))] user::Id),

    /// Service agent to assign works for a [`Franchise`] of someone else.
    #[display("Service agent `{_0}` belongs to another franchise")]
    ForeignAgent(#[error(not(source))] user::Id),
}

#[cfg(test)]
mod spec {
    use common::DateTime;

    use crate::{
        domain::{
            service_request::{Changes, Status},
            user::Actor,
        },
        fixture,
    };

    use super::{Command as _, ExecutionError, UpdateServiceRequest};

    fn status(s: Status) -> Changes {
        Changes {
            status: Some(s),
            ..Changes::default()
        }
    }

    fn assign(agent: Actor) -> Changes {
        Changes {
            agent_id: Some(agent.id),
            ..Changes::default()
        }
    }

    #[tokio::test]
    async fn assignment_advances_pending_request() {
        let w = fixture::world().await;
        let id = w.service_request_in(Status::Pending, None).await;

        let updated = w
            .service
            .execute(UpdateServiceRequest {
                actor: w.owner,
                id,
                changes: assign(w.agent),
            })
            .await
            .unwrap();

        assert_eq!(updated.status, Status::Assigned);
        assert_eq!(updated.service_agent_id, Some(w.agent.id));
        assert_eq!(w.service_request(id).await.status, Status::Assigned);
        // Status change and assignment notices.
        assert_eq!(w.notifications_of(w.customer).await, 2);
        assert_eq!(w.notifications_of(w.agent).await, 1);
    }

    #[tokio::test]
    async fn explicit_pending_status_does_not_block_assignment() {
        let w = fixture::world().await;
        let id = w.service_request_in(Status::Pending, None).await;

        let updated = w
            .service
            .execute(UpdateServiceRequest {
                actor: w.admin,
                id,
                changes: Changes {
                    status: Some(Status::Pending),
                    agent_id: Some(w.agent.id),
                    ..Changes::default()
                },
            })
            .await
            .unwrap();

        assert_eq!(updated.status, Status::Assigned);
        let stored = w.service_request(id).await;
        assert_eq!(stored.status, Status::Assigned);
        assert_eq!(stored.service_agent_id, Some(w.agent.id));
    }

    #[tokio::test]
    async fn agent_schedules_and_completes() {
        let w = fixture::world().await;
        let id = w.service_request_in(Status::Assigned, Some(w.agent)).await;
        let at = DateTime::from_rfc3339("2024-06-01T10:00:00Z").unwrap();

        let scheduled = w
            .service
            .execute(UpdateServiceRequest {
                actor: w.agent,
                id,
                changes: Changes {
                    status: Some(Status::Scheduled),
                    scheduled_at: Some(at.coerce()),
                    ..Changes::default()
                },
            })
            .await
            .unwrap();
        assert_eq!(scheduled.status, Status::Scheduled);
        assert_eq!(scheduled.scheduled_at, Some(at.coerce()));

        let completed = w
            .service
            .execute(UpdateServiceRequest {
                actor: w.agent,
                id,
                changes: status(Status::Completed),
            })
            .await
            .unwrap();
        assert_eq!(completed.status, Status::Completed);
        assert!(completed.completed_at.is_some());
        assert_eq!(completed.scheduled_at, Some(at.coerce()));
    }

    #[tokio::test]
    async fn customer_may_only_cancel_pending() {
        let w = fixture::world().await;
        let pending = w.service_request_in(Status::Pending, None).await;
        let assigned =
            w.service_request_in(Status::Assigned, Some(w.agent)).await;

        let err = w
            .service
            .execute(UpdateServiceRequest {
                actor: w.customer,
                id: assigned,
                changes: status(Status::Cancelled),
            })
            .await
            .unwrap_err();
        assert!(matches!(err.as_ref(), ExecutionError::PermissionDenied));

        let err = w
            .service
            .execute(UpdateServiceRequest {
                actor: w.customer,
                id: pending,
                changes: Changes {
                    notes: Some("come earlier".into()),
                    ..status(Status::Cancelled)
                },
            })
            .await
            .unwrap_err();
        assert!(matches!(err.as_ref(), ExecutionError::PermissionDenied));

        let cancelled = w
            .service
            .execute(UpdateServiceRequest {
                actor: w.customer,
                id: pending,
                changes: status(Status::Cancelled),
            })
            .await
            .unwrap();
        assert_eq!(cancelled.status, Status::Cancelled);
        assert_eq!(
            w.service_request(assigned).await.status,
            Status::Assigned,
        );
    }

    #[tokio::test]
    async fn cancelled_request_never_moves() {
        let w = fixture::world().await;
        let id = w.service_request_in(Status::Cancelled, None).await;

        for s in [
            Status::Pending,
            Status::Assigned,
            Status::Scheduled,
            Status::Completed,
        ] {
            let err = w
                .service
                .execute(UpdateServiceRequest {
                    actor: w.admin,
                    id,
                    changes: status(s),
                })
                .await
                .unwrap_err();
            assert!(
                matches!(
                    err.as_ref(),
                    ExecutionError::Terminal(Status::Cancelled),
                ),
                "{s}",
            );
        }
        assert_eq!(w.service_request(id).await.status, Status::Cancelled);
    }

    #[tokio::test]
    async fn transitions_only_go_forward() {
        let w = fixture::world().await;
        let id = w.service_request_in(Status::Scheduled, Some(w.agent)).await;

        let err = w
            .service
            .execute(UpdateServiceRequest {
                actor: w.admin,
                id,
                changes: status(Status::Pending),
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_ref(),
            ExecutionError::InvalidTransition {
                from: Status::Scheduled,
                to: Status::Pending,
            },
        ));
    }

    #[tokio::test]
    async fn scopes_franchise_owners_and_agents() {
        let w = fixture::world().await;
        let id = w.service_request_in(Status::Assigned, Some(w.agent)).await;

        for actor in [w.other_owner, w.foreign_agent] {
            let err = w
                .service
                .execute(UpdateServiceRequest {
                    actor,
                    id,
                    changes: status(Status::Scheduled),
                })
                .await
                .unwrap_err();
            assert!(matches!(err.as_ref(), ExecutionError::PermissionDenied));
        }
        assert_eq!(w.service_request(id).await.status, Status::Assigned);
    }

    #[tokio::test]
    async fn validates_assigned_agent() {
        let w = fixture::world().await;
        let id = w.service_request_in(Status::Pending, None).await;

        let err = w
            .service
            .execute(UpdateServiceRequest {
                actor: w.admin,
                id,
                changes: assign(w.customer),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_ref(),
            ExecutionError::InvalidAgent(u) if *u == w.customer.id,
        ));

        let err = w
            .service
            .execute(UpdateServiceRequest {
                actor: w.owner,
                id,
                changes: assign(w.foreign_agent),
            })
            .await
            .unwrap_err();
        assert!(matches!(err.as_ref(), ExecutionError::ForeignAgent(_)));

        let err = w
            .service
            .execute(UpdateServiceRequest {
                actor: w.agent,
                id,
                changes: assign(w.agent),
            })
            .await
            .unwrap_err();
        assert!(matches!(err.as_ref(), ExecutionError::PermissionDenied));
    }

    #[tokio::test]
    async fn rejects_empty_changes() {
        let w = fixture::world().await;
        let id = w.service_request_in(Status::Pending, None).await;

        let err = w
            .service
            .execute(UpdateServiceRequest {
                actor: w.admin,
                id,
                changes: Changes::default(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err.as_ref(), ExecutionError::NoUpdates));
    }

    #[tokio::test]
    async fn notification_failure_rolls_back() {
        let w = fixture::world().await;
        let id = w.service_request_in(Status::Pending, None).await;
        w.db.faults().fail_notifications(true);

        let err = w
            .service
            .execute(UpdateServiceRequest {
                actor: w.admin,
                id,
                changes: assign(w.agent),
            })
            .await
            .unwrap_err();

        assert!(matches!(err.as_ref(), ExecutionError::Db(_)));
        let stored = w.service_request(id).await;
        assert_eq!(stored.status, Status::Pending);
        assert_eq!(stored.service_agent_id, None);
    }
}
