//! [`Command`] for assigning a service agent to a [`ServiceRequest`].

use tracerr::Traced;

use crate::{
    domain::{
        service_request::{self, Changes},
        user::{self, Actor, Role},
        ServiceRequest,
    },
    Service,
};

use super::{
    update_service_request::ExecutionError, Command, UpdateServiceRequest,
};

/// [`Command`] for assigning a service agent to a [`ServiceRequest`].
///
/// Shortcut of an [`UpdateServiceRequest`] touching only the agent, available
/// to administrators and franchise owners.
#[derive(Clone, Copy, Debug)]
pub struct AssignServiceRequest {
    /// [`Actor`] performing the assignment.
    pub actor: Actor,

    /// ID of the [`ServiceRequest`] to assign.
    pub id: service_request::Id,

    /// ID of the service agent to assign.
    pub agent_id: user::Id,
}

impl<Db, Gw> Command<AssignServiceRequest> for Service<Db, Gw>
where
    Self: Command<
        UpdateServiceRequest,
        Ok = ServiceRequest,
        Err = Traced<ExecutionError>,
    >,
{
    type Ok = ServiceRequest;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: AssignServiceRequest,
    ) -> Result<Self::Ok, Self::Err> {
        let AssignServiceRequest {
            actor,
            id,
            agent_id,
        } = cmd;

        if !matches!(actor.role, Role::Admin | Role::FranchiseOwner) {
            return Err(tracerr::new!(ExecutionError::PermissionDenied));
        }

        self.execute(UpdateServiceRequest {
            actor,
            id,
            changes: Changes {
                agent_id: Some(agent_id),
                ..Changes::default()
            },
        })
        .await
        .map_err(tracerr::wrap!())
    }
}

#[cfg(test)]
mod spec {
    use crate::{
        command::update_service_request::ExecutionError,
        domain::service_request::Status,
        fixture,
    };

    use super::{AssignServiceRequest, Command as _};

    #[tokio::test]
    async fn assigns_agent() {
        let w = fixture::world().await;
        let id = w.service_request_in(Status::Pending, None).await;

        let updated = w
            .service
            .execute(AssignServiceRequest {
                actor: w.admin,
                id,
                agent_id: w.agent.id,
            })
            .await
            .unwrap();

        assert_eq!(updated.status, Status::Assigned);
        assert_eq!(
            w.service_request(id).await.service_agent_id,
            Some(w.agent.id),
        );
    }

    #[tokio::test]
    async fn only_managers_assign() {
        let w = fixture::world().await;
        let id = w.service_request_in(Status::Pending, None).await;

        for actor in [w.customer, w.agent] {
            let err = w
                .service
                .execute(AssignServiceRequest {
                    actor,
                    id,
                    agent_id: w.agent.id,
                })
                .await
                .unwrap_err();
            assert!(matches!(err.as_ref(), ExecutionError::PermissionDenied));
        }
        assert_eq!(w.service_request(id).await.service_agent_id, None);
    }
}
