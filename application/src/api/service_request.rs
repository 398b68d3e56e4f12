//! [`ServiceRequest`]-related API definitions.

use std::str::FromStr as _;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path,
    },
    routing::{get, post},
    Json, Router,
};
use common::DateTimeOf;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use service::{
    command::{self, Command as _},
    domain::{
        self,
        service_request::{self, Changes, Rating},
        subscription, user,
    },
    query::{self, Query as _},
    read::Scope,
};

use crate::{api, define_error, AsError, Context, Error};

/// Creates a [`Router`] serving [`ServiceRequest`]s.
pub fn router() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(by_id).put(update))
        .route("/:id/assign", post(assign))
        .route("/:id/cancel", post(cancel))
        .route("/:id/feedback", post(feedback))
}

/// Post-sale service visit.
#[derive(Clone, Debug, Serialize)]
pub struct ServiceRequest {
    /// ID of this [`ServiceRequest`].
    pub id: service_request::Id,

    /// ID of the requesting customer.
    pub customer_id: user::Id,

    /// ID of the subscription the service is requested for.
    pub subscription_id: subscription::Id,

    /// Kind of the requested service.
    pub request_type: &'static str,

    /// Current status.
    pub status: &'static str,

    /// Problem description.
    pub description: String,

    /// RFC 3339 time the visit is scheduled for, if any.
    pub scheduled_time: Option<String>,

    /// RFC 3339 time the visit has been completed at, if any.
    pub completion_time: Option<String>,

    /// ID of the assigned service agent, if any.
    pub service_agent_id: Option<user::Id>,

    /// Rating in stars, if any.
    pub rating: Option<u8>,

    /// Customer feedback, if any.
    pub feedback: Option<String>,

    /// Staff notes, if any.
    pub notes: Option<String>,

    /// RFC 3339 creation time.
    pub created_at: String,

    /// RFC 3339 last modification time.
    pub updated_at: String,
}

impl From<domain::ServiceRequest> for ServiceRequest {
    fn from(r: domain::ServiceRequest) -> Self {
        Self {
            id: r.id,
            customer_id: r.customer_id,
            subscription_id: r.subscription_id,
            request_type: r.kind.as_str(),
            status: r.status.as_str(),
            description: r.description,
            scheduled_time: r.scheduled_at.map(api::rfc3339),
            completion_time: r.completed_at.map(api::rfc3339),
            service_agent_id: r.service_agent_id,
            rating: r.rating.map(Rating::stars),
            feedback: r.feedback,
            notes: r.notes,
            created_at: api::rfc3339(r.created_at),
            updated_at: api::rfc3339(r.updated_at),
        }
    }
}

/// Parses an optional RFC 3339 `input`, treating blank strings as absent.
fn parse_time<Of: ?Sized>(
    input: Option<&str>,
    err: ValidationError,
) -> Result<Option<DateTimeOf<Of>>, ValidationError> {
    input
        .filter(|s| !s.trim().is_empty())
        .map(|s| DateTimeOf::from_rfc3339(s.trim()).map_err(|_| err))
        .transpose()
}

/// Body of a service request creation.
#[derive(Clone, Debug, Deserialize)]
pub struct CreateRequest {
    /// ID of the subscription the service is requested for.
    pub subscription_id: subscription::Id,

    /// Kind of the requested service.
    pub request_type: String,

    /// Problem description.
    #[serde(default)]
    pub description: String,

    /// Desired RFC 3339 time of the visit.
    #[serde(default)]
    pub scheduled_time: Option<String>,
}

/// Lists the service requests visible to the caller.
async fn list(ctx: Context) -> Result<Json<Vec<ServiceRequest>>, Error> {
    ctx.service()
        .execute(query::service_request::List::by(Scope::from(ctx.actor())))
        .await
        .map(|rs| Json(rs.into_iter().map(Into::into).collect()))
        .map_err(AsError::into_error)
}

/// Opens a new service request on behalf of the customer.
async fn create(
    ctx: Context,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ServiceRequest>), Error> {
    let Json(req) = body.map_err(AsError::into_error)?;

    let kind = service_request::Kind::from_str(req.request_type.trim())
        .map_err(|_| ValidationError::RequestType)?;
    let scheduled_at = parse_time(
        req.scheduled_time.as_deref(),
        ValidationError::ScheduledTime,
    )?;

    ctx.service()
        .execute(command::CreateServiceRequest {
            actor: ctx.actor(),
            subscription_id: req.subscription_id,
            kind,
            description: req.description,
            scheduled_at,
        })
        .await
        .map(|r| (StatusCode::CREATED, Json(r.into())))
        .map_err(AsError::into_error)
}

/// Returns a single service request visible to the caller.
async fn by_id(
    ctx: Context,
    id: Result<Path<service_request::Id>, PathRejection>,
) -> Result<Json<ServiceRequest>, Error> {
    let Path(id) = id.map_err(AsError::into_error)?;

    ctx.service()
        .execute(query::service_request::ById {
            actor: ctx.actor(),
            id,
        })
        .await
        .map(|r| Json(r.into()))
        .map_err(AsError::into_error)
}

/// Body of a service request update.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UpdateRequest {
    /// New status.
    #[serde(default)]
    pub status: Option<String>,

    /// ID of the service agent to assign.
    #[serde(default)]
    pub agent_id: Option<user::Id>,

    /// New RFC 3339 time of the visit.
    #[serde(default)]
    pub scheduled_date: Option<String>,

    /// RFC 3339 time the visit has been completed at.
    #[serde(default)]
    pub completion_date: Option<String>,

    /// New staff notes.
    #[serde(default)]
    pub notes: Option<String>,
}

impl TryFrom<UpdateRequest> for Changes {
    type Error = ValidationError;

    fn try_from(req: UpdateRequest) -> Result<Self, Self::Error> {
        let status = req
            .status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                service_request::Status::from_str(s)
                    .map_err(|_| ValidationError::Status)
            })
            .transpose()?;

        Ok(Self {
            status,
            scheduled_at: parse_time(
                req.scheduled_date.as_deref(),
                ValidationError::ScheduledTime,
            )?,
            completed_at: parse_time(
                req.completion_date.as_deref(),
                ValidationError::CompletionTime,
            )?,
            notes: api::non_blank(req.notes),
            agent_id: req.agent_id,
        })
    }
}

/// Applies role-scoped changes to a service request.
async fn update(
    ctx: Context,
    id: Result<Path<service_request::Id>, PathRejection>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<ServiceRequest>, Error> {
    let Path(id) = id.map_err(AsError::into_error)?;
    let Json(req) = body.map_err(AsError::into_error)?;

    ctx.service()
        .execute(command::UpdateServiceRequest {
            actor: ctx.actor(),
            id,
            changes: req.try_into()?,
        })
        .await
        .map(|r| Json(r.into()))
        .map_err(AsError::into_error)
}

/// Body of a service agent assignment.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct AssignRequest {
    /// ID of the service agent to assign.
    pub service_agent_id: user::Id,
}

/// Assigns a service agent to a service request.
async fn assign(
    ctx: Context,
    id: Result<Path<service_request::Id>, PathRejection>,
    body: Result<Json<AssignRequest>, JsonRejection>,
) -> Result<Json<ServiceRequest>, Error> {
    let Path(id) = id.map_err(AsError::into_error)?;
    let Json(AssignRequest { service_agent_id }) =
        body.map_err(AsError::into_error)?;

    ctx.service()
        .execute(command::AssignServiceRequest {
            actor: ctx.actor(),
            id,
            agent_id: service_agent_id,
        })
        .await
        .map(|r| Json(r.into()))
        .map_err(AsError::into_error)
}

/// Cancels a service request of the customer.
async fn cancel(
    ctx: Context,
    id: Result<Path<service_request::Id>, PathRejection>,
) -> Result<Json<ServiceRequest>, Error> {
    let Path(id) = id.map_err(AsError::into_error)?;

    ctx.service()
        .execute(command::CancelServiceRequest {
            actor: ctx.actor(),
            id,
        })
        .await
        .map(|r| Json(r.into()))
        .map_err(AsError::into_error)
}

/// Body of a service feedback.
#[derive(Clone, Debug, Deserialize)]
pub struct FeedbackRequest {
    /// Rating in stars, from 1 to 5.
    pub rating: i64,

    /// Free-form feedback.
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Rates a completed service request.
async fn feedback(
    ctx: Context,
    id: Result<Path<service_request::Id>, PathRejection>,
    body: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<ServiceRequest>, Error> {
    let Path(id) = id.map_err(AsError::into_error)?;
    let Json(req) = body.map_err(AsError::into_error)?;

    let rating = u8::try_from(req.rating)
        .ok()
        .and_then(Rating::new)
        .ok_or(ValidationError::Rating)?;

    ctx.service()
        .execute(command::SubmitServiceFeedback {
            actor: ctx.actor(),
            id,
            rating,
            feedback: api::non_blank(req.feedback),
        })
        .await
        .map(|r| Json(r.into()))
        .map_err(AsError::into_error)
}

define_error! {
    enum ValidationError {
        #[code = "INVALID_REQUEST_TYPE"]
        #[status = BAD_REQUEST]
        #[message = "Unknown service request type"]
        RequestType,

        #[code = "INVALID_STATUS"]
        #[status = BAD_REQUEST]
        #[message = "Unknown service request status"]
        Status,

        #[code = "INVALID_SCHEDULED_TIME"]
        #[status = BAD_REQUEST]
        #[message = "Scheduled time must be an RFC 3339 date-time"]
        ScheduledTime,

        #[code = "INVALID_COMPLETION_TIME"]
        #[status = BAD_REQUEST]
        #[message = "Completion time must be an RFC 3339 date-time"]
        CompletionTime,

        #[code = "INVALID_RATING"]
        #[status = BAD_REQUEST]
        #[message = "Rating must be between 1 and 5"]
        Rating,
    }
}

define_error! {
    enum NotFoundError {
        #[code = "SERVICE_REQUEST_NOT_EXISTS"]
        #[status = NOT_FOUND]
        #[message = "Service request not found"]
        ServiceRequest,

        #[code = "SUBSCRIPTION_NOT_EXISTS"]
        #[status = NOT_FOUND]
        #[message = "Subscription not found or not yours"]
        Subscription,
    }
}

impl AsError for command::create_service_request::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        define_error! {
            enum Error {
                #[code = "MISSING_DESCRIPTION"]
                #[status = BAD_REQUEST]
                #[message = "Description must not be blank"]
                MissingDescription,
            }
        }

        Some(match self {
            Self::Db(e) => return e.try_as_error(),
            Self::NotCustomer => api::PrivilegeError::Customer.into(),
            Self::MissingDescription => Error::MissingDescription.into(),
            Self::SubscriptionNotExists(_) => {
                NotFoundError::Subscription.into()
            }
            Self::SubscriptionNotActive(_) => api::invalid_state(self),
        })
    }
}

impl AsError for command::update_service_request::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        define_error! {
            enum Error {
                #[code = "NO_UPDATES"]
                #[status = BAD_REQUEST]
                #[message = "No valid updates provided"]
                NoUpdates,

                #[code = "INVALID_AGENT"]
                #[status = BAD_REQUEST]
                #[message = "Invalid service agent"]
                InvalidAgent,

                #[code = "FOREIGN_AGENT"]
                #[status = FORBIDDEN]
                #[message = "Service agent belongs to another franchise"]
                ForeignAgent,
            }
        }

        Some(match self {
            Self::Db(e) => return e.try_as_error(),
            Self::NoUpdates => Error::NoUpdates.into(),
            Self::NotExists(_) => NotFoundError::ServiceRequest.into(),
            Self::PermissionDenied => api::PrivilegeError::Denied.into(),
            Self::Terminal(_) | Self::InvalidTransition { .. } => {
                api::invalid_state(self)
            }
            Self::InvalidAgent(_) => Error::InvalidAgent.into(),
            Self::ForeignAgent(_) => Error::ForeignAgent.into(),
        })
    }
}

impl AsError for command::cancel_service_request::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        Some(match self {
            Self::Db(e) => return e.try_as_error(),
            Self::NotExists(_) => NotFoundError::ServiceRequest.into(),
            Self::NotCancellable(_) => api::invalid_state(self),
        })
    }
}

impl AsError for command::submit_service_feedback::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        Some(match self {
            Self::Db(e) => return e.try_as_error(),
            Self::NotExists(_) => NotFoundError::ServiceRequest.into(),
            Self::NotCompleted(_) => api::invalid_state(self),
        })
    }
}

impl AsError for query::service_request::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        Some(match self {
            Self::Db(e) => return e.try_as_error(),
            Self::NotExists(_) => NotFoundError::ServiceRequest.into(),
            Self::PermissionDenied => api::PrivilegeError::Denied.into(),
        })
    }
}

#[cfg(test)]
mod spec {
    use service::{
        command::update_service_request::ExecutionError,
        domain::service_request::{Changes, Status},
    };

    use crate::AsError as _;

    use super::{UpdateRequest, ValidationError};

    #[test]
    fn parses_changes() {
        let changes = Changes::try_from(UpdateRequest {
            status: Some(" scheduled ".into()),
            scheduled_date: Some("2024-03-01T10:00:00Z".into()),
            completion_date: Some(String::new()),
            notes: Some("  ".into()),
            ..UpdateRequest::default()
        })
        .unwrap();

        assert_eq!(changes.status, Some(Status::Scheduled));
        assert_eq!(
            changes.scheduled_at.map(|t| t.to_rfc3339()).as_deref(),
            Some("2024-03-01T10:00:00Z"),
        );
        assert!(changes.completed_at.is_none());
        assert!(changes.notes.is_none());
        assert!(!changes.is_empty());
    }

    #[test]
    fn rejects_unknown_status() {
        let err = Changes::try_from(UpdateRequest {
            status: Some("archived".into()),
            ..UpdateRequest::default()
        })
        .unwrap_err();

        assert!(matches!(err, ValidationError::Status));
    }

    #[test]
    fn maps_transition_errors() {
        for (err, status) in [
            (ExecutionError::NoUpdates, 400),
            (ExecutionError::PermissionDenied, 403),
            (ExecutionError::Terminal(Status::Cancelled), 400),
            (
                ExecutionError::InvalidTransition {
                    from: Status::Scheduled,
                    to: Status::Assigned,
                },
                400,
            ),
        ] {
            assert_eq!(err.as_error().status_code.as_u16(), status, "{err}");
        }

        let e = ExecutionError::Terminal(Status::Cancelled).as_error();
        assert_eq!(e.code, "INVALID_STATE");
        assert!(e.message.contains("cancelled"), "{}", e.message);
    }
}
