//! [`Query`] collection related to [`ServiceRequest`]s.

use common::operations::{By, Select};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{service_request, user::Actor, ServiceRequest},
    infra::{database, Database},
    read::{Scope, Scoped},
    Service,
};

use super::{DatabaseQuery, Query};

/// Queries [`ServiceRequest`]s visible in a [`Scope`], newest first.
pub type List = DatabaseQuery<By<Vec<ServiceRequest>, Scope>>;

/// Queries a single [`ServiceRequest`] visible to an [`Actor`].
#[derive(Clone, Copy, Debug)]
pub struct ById {
    /// [`Actor`] performing the [`Query`].
    pub actor: Actor,

    /// ID of the [`ServiceRequest`] to query.
    pub id: service_request::Id,
}

impl<Db, Gw> Query<ById> for Service<Db, Gw>
where
    Db: Database<
            Select<By<Option<ServiceRequest>, service_request::Id>>,
            Ok = Option<ServiceRequest>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<ServiceRequest>, Scoped<service_request::Id>>>,
            Ok = Option<ServiceRequest>,
            Err = Traced<database::Error>,
        >,
{
    type Ok = ServiceRequest;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, query: ById) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let ById { actor, id } = query;

        let exists = self
            .database()
            .execute(Select(By::<Option<ServiceRequest>, _>::new(id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .is_some();
        if !exists {
            return Err(tracerr::new!(E::NotExists(id)));
        }

        self.database()
            .execute(Select(By::new(Scoped::new(id, actor))))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::PermissionDenied)
            .map_err(tracerr::wrap!())
    }
}

/// Error of [`ServiceRequest`] [`Query`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`ServiceRequest`] with the provided ID does not exist.
    #[display("`ServiceRequest(id: {_0})` does not exist")]
    NotExists(#[error(not(source))] service_request::Id),

    /// [`ServiceRequest`] is not visible to the [`Actor`].
    #[display("Permission denied")]
    PermissionDenied,
}

#[cfg(test)]
mod spec {
    use crate::{
        domain::{
            service_request::{Id, Status},
            user::Actor,
        },
        fixture::{self, World},
        read::Scope,
    };

    use super::{ById, ExecutionError, List, Query as _};

    /// Returns IDs of the [`ServiceRequest`]s visible to the [`Actor`],
    /// sorted for comparison.
    ///
    /// [`ServiceRequest`]: crate::domain::ServiceRequest
    async fn visible(w: &World, actor: Actor) -> Vec<Id> {
        let mut ids = w
            .service
            .execute(List::by(Scope::from(actor)))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect::<Vec<_>>();
        ids.sort_by_key(ToString::to_string);
        ids
    }

    #[tokio::test]
    async fn list_is_scoped() {
        let w = fixture::world().await;
        let assigned =
            w.service_request_in(Status::Assigned, Some(w.agent)).await;
        let pending = w.service_request_in(Status::Pending, None).await;

        let mut both = vec![assigned, pending];
        both.sort_by_key(ToString::to_string);

        assert_eq!(visible(&w, w.admin).await, both);
        assert_eq!(visible(&w, w.owner).await, both);
        assert_eq!(visible(&w, w.customer).await, both);
        assert_eq!(visible(&w, w.agent).await, [assigned]);
        assert!(visible(&w, w.other_owner).await.is_empty());
        assert!(visible(&w, w.foreign_agent).await.is_empty());
        assert!(visible(&w, w.other_customer).await.is_empty());
    }

    #[tokio::test]
    async fn by_id_denies_out_of_scope() {
        let w = fixture::world().await;
        let id = w.service_request_in(Status::Pending, None).await;

        let r = w
            .service
            .execute(ById {
                actor: w.owner,
                id,
            })
            .await
            .unwrap();
        assert_eq!(r.id, id);

        let err = w
            .service
            .execute(ById {
                actor: w.agent,
                id,
            })
            .await
            .unwrap_err();
        assert!(matches!(err.as_ref(), ExecutionError::PermissionDenied));

        let err = w
            .service
            .execute(ById {
                actor: w.admin,
                id: Id::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err.as_ref(), ExecutionError::NotExists(_)));
    }
}
