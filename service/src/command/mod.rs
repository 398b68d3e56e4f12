//! [`Command`] definition.

pub mod assign_service_request;
pub mod authorize_user_session;
pub mod cancel_service_request;
pub mod create_order;
pub mod create_service_request;
pub mod generate_monthly_payment;
pub mod submit_service_feedback;
pub mod update_service_request;
pub mod verify_payment;

use common::operations::Insert;
use tracerr::Traced;

use crate::{
    domain::{notification::Delivery, Notification},
    infra::{database, Database},
};

/// [`Command`] of the [`Service`].
///
/// [`Service`]: crate::Service
pub use common::Handler as Command;

pub use self::{
    assign_service_request::AssignServiceRequest,
    authorize_user_session::AuthorizeUserSession,
    cancel_service_request::CancelServiceRequest, create_order::CreateOrder,
    create_service_request::CreateServiceRequest,
    generate_monthly_payment::GenerateMonthlyPayment,
    submit_service_feedback::SubmitServiceFeedback,
    update_service_request::UpdateServiceRequest,
    verify_payment::VerifyPayment,
};

/// Records the provided [`Notification`] in the provided transactional
/// [`Database`] according to the [`Delivery`] policy.
///
/// [`Delivery::BestEffort`] failures are logged and swallowed.
async fn notify<Tx>(
    tx: &Tx,
    notification: Notification,
    delivery: Delivery,
) -> Result<(), Traced<database::Error>>
where
    Tx: Database<Insert<Notification>, Err = Traced<database::Error>>,
{
    let (id, user_id) = (notification.id, notification.user_id);
    match tx.execute(Insert(notification)).await {
        Ok(_) => Ok(()),
        Err(e) => match delivery {
            Delivery::Required => Err(e).map_err(tracerr::wrap!()),
            Delivery::BestEffort => {
                tracing::warn!(
                    notification.id = %id,
                    user.id = %user_id,
                    "failed to record best-effort `Notification`: {e}",
                );
                Ok(())
            }
        },
    }
}
