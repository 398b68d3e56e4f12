//! [`Payment`]-related API definitions.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path,
    },
    routing::{get, post},
    Json, Router,
};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use service::{
    command::{self, verify_payment::Target, Command as _},
    domain::{
        self, franchise, order, payment, product, subscription, user,
    },
    query::{self, Query as _},
};

use crate::{api, define_error, AsError, Context, Error};

/// Creates a [`Router`] serving [`Payment`]s.
pub fn router() -> Router {
    Router::new()
        .route("/", get(history))
        .route("/:id", get(by_id))
        .route("/orders", post(create_order))
        .route("/verify", post(verify))
        .route("/monthly", post(generate_monthly))
}

/// One financial transaction attempt.
#[derive(Clone, Debug, Serialize)]
pub struct Payment {
    /// ID of this [`Payment`].
    pub id: payment::Id,

    /// ID of the paying customer.
    pub customer_id: user::Id,

    /// ID of the order this [`Payment`] is made for, if any.
    pub order_id: Option<order::Id>,

    /// ID of the subscription this [`Payment`] is made for, if any.
    pub subscription_id: Option<subscription::Id>,

    /// Paid amount.
    #[serde(flatten)]
    pub amount: api::Amount,

    /// `initial` or `monthly`.
    pub payment_type: &'static str,

    /// `pending`, `success` or `failed`.
    pub status: &'static str,

    /// Method this [`Payment`] is made with.
    pub payment_method: &'static str,

    /// ID of the transaction in the payment gateway, if any.
    pub transaction_id: Option<payment::TransactionId>,

    /// Gateway-specific details.
    pub payment_details: serde_json::Value,

    /// Invoice number, if any.
    pub invoice_number: Option<String>,

    /// RFC 3339 creation time.
    pub created_at: String,

    /// RFC 3339 last modification time.
    pub updated_at: String,
}

impl From<domain::Payment> for Payment {
    fn from(p: domain::Payment) -> Self {
        Self {
            id: p.id,
            customer_id: p.customer_id,
            order_id: p.order_id,
            subscription_id: p.subscription_id,
            amount: p.amount.into(),
            payment_type: p.kind.as_str(),
            status: p.status.as_str(),
            payment_method: p.method.as_str(),
            transaction_id: p.transaction_id,
            payment_details: p.details.as_json().clone(),
            invoice_number: p.invoice_number.map(|n| n.to_string()),
            created_at: api::rfc3339(p.created_at),
            updated_at: api::rfc3339(p.updated_at),
        }
    }
}

/// Body of a rental order creation request.
#[derive(Clone, Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// ID of the rented product.
    pub product_id: product::Id,

    /// ID of the franchise serving the order.
    pub franchise_id: franchise::Id,

    /// Address to deliver the product to.
    pub shipping_address: String,

    /// Address to bill.
    pub billing_address: String,

    /// Rental duration in months.
    pub rental_duration: u16,

    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Payment intent to be completed by the customer in the payment gateway.
#[derive(Clone, Debug, Serialize)]
pub struct Intent {
    /// ID of the intent in the payment gateway.
    pub gateway_order_id: String,

    /// Amount to be paid.
    #[serde(flatten)]
    pub amount: api::Amount,

    /// Public key of the payment gateway.
    pub key: String,

    /// ID of the created order, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<order::Id>,

    /// ID of the billed subscription, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<subscription::Id>,
}

/// Creates a rental order along with its initial payment intent.
async fn create_order(
    ctx: Context,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Intent>), Error> {
    let Json(req) = body.map_err(AsError::into_error)?;

    let shipping_address = order::Address::new(req.shipping_address)
        .ok_or(ValidationError::Address)?;
    let billing_address = order::Address::new(req.billing_address)
        .ok_or(ValidationError::Address)?;
    let rental_duration = order::RentalDuration::new(req.rental_duration)
        .ok_or(ValidationError::RentalDuration)?;

    let out = ctx
        .service()
        .execute(command::CreateOrder {
            actor: ctx.actor(),
            product_id: req.product_id,
            franchise_id: req.franchise_id,
            shipping_address,
            billing_address,
            rental_duration,
            notes: api::non_blank(req.notes),
        })
        .await
        .map_err(AsError::into_error)?;

    Ok((
        StatusCode::CREATED,
        Json(Intent {
            amount: out.amount().into(),
            gateway_order_id: out.gateway_order_id.into(),
            key: out.key,
            order_id: Some(out.order.id),
            subscription_id: None,
        }),
    ))
}

/// Body of a payment confirmation reported by the customer.
#[derive(Clone, Debug, Deserialize)]
pub struct VerifyRequest {
    /// ID of the intent in the payment gateway.
    #[serde(default)]
    pub razorpay_order_id: String,

    /// ID of the captured payment in the payment gateway.
    #[serde(default)]
    pub razorpay_payment_id: String,

    /// Signature of the confirmation issued by the payment gateway.
    #[serde(default)]
    pub razorpay_signature: String,

    /// ID of the order being paid for, if it's an initial payment.
    #[serde(default)]
    pub aquahome_order_id: Option<order::Id>,

    /// ID of the subscription being billed, if it's a monthly payment.
    #[serde(default)]
    pub subscription_id: Option<subscription::Id>,
}

/// Outcome of a successful payment verification.
#[derive(Clone, Debug, Serialize)]
pub struct Verified {
    /// Always `true`.
    pub success: bool,

    /// Human-readable outcome.
    pub message: &'static str,

    /// ID of the order the payment relates to.
    pub order_id: order::Id,

    /// `initial` or `monthly`.
    pub payment_type: &'static str,
}

/// Verifies a payment confirmation and settles the paid entity.
async fn verify(
    ctx: Context,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<Verified>, Error> {
    let Json(req) = body.map_err(AsError::into_error)?;

    let target = match (req.subscription_id, req.aquahome_order_id) {
        (Some(id), _) => Target::Subscription(id),
        (None, Some(id)) => Target::Order(id),
        (None, None) => return Err(ValidationError::Target.into()),
    };

    let out = ctx
        .service()
        .execute(command::VerifyPayment {
            actor: ctx.actor(),
            gateway_order_id: req.razorpay_order_id,
            gateway_payment_id: req.razorpay_payment_id,
            signature: payment::Signature::new(req.razorpay_signature),
            target,
        })
        .await
        .map_err(AsError::into_error)?;

    Ok(Json(Verified {
        success: true,
        message: "Payment verified successfully",
        order_id: out.order_id,
        payment_type: out.payment.kind.as_str(),
    }))
}

/// Body of a monthly payment request.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct MonthlyRequest {
    /// ID of the billed subscription.
    pub subscription_id: subscription::Id,
}

/// Creates or refreshes the monthly payment intent of a subscription.
async fn generate_monthly(
    ctx: Context,
    body: Result<Json<MonthlyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Intent>), Error> {
    let Json(MonthlyRequest { subscription_id }) =
        body.map_err(AsError::into_error)?;

    let out = ctx
        .service()
        .execute(command::GenerateMonthlyPayment {
            actor: ctx.actor(),
            subscription_id,
        })
        .await
        .map_err(AsError::into_error)?;

    Ok((
        StatusCode::CREATED,
        Json(Intent {
            amount: out.amount().into(),
            gateway_order_id: out.gateway_order_id.into(),
            key: out.key,
            order_id: None,
            subscription_id: Some(subscription_id),
        }),
    ))
}

/// Lists the latest payments visible to the caller.
async fn history(ctx: Context) -> Result<Json<Vec<Payment>>, Error> {
    ctx.service()
        .execute(query::payment::History { actor: ctx.actor() })
        .await
        .map(|ps| Json(ps.into_iter().map(Into::into).collect()))
        .map_err(AsError::into_error)
}

/// Returns a single payment visible to the caller.
async fn by_id(
    ctx: Context,
    id: Result<Path<payment::Id>, PathRejection>,
) -> Result<Json<Payment>, Error> {
    let Path(id) = id.map_err(AsError::into_error)?;

    ctx.service()
        .execute(query::payment::ById {
            actor: ctx.actor(),
            id,
        })
        .await
        .map(|p| Json(p.into()))
        .map_err(AsError::into_error)
}

define_error! {
    enum ValidationError {
        #[code = "INVALID_ADDRESS"]
        #[status = BAD_REQUEST]
        #[message = "Addresses must not be blank"]
        Address,

        #[code = "INVALID_RENTAL_DURATION"]
        #[status = BAD_REQUEST]
        #[message = "Rental duration must be at least one month"]
        RentalDuration,

        #[code = "MISSING_PAYMENT_TARGET"]
        #[status = BAD_REQUEST]
        #[message = "Either `aquahome_order_id` or `subscription_id` must be \
                     provided"]
        Target,
    }
}

impl AsError for command::create_order::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        define_error! {
            enum Error {
                #[code = "PRODUCT_NOT_EXISTS"]
                #[status = NOT_FOUND]
                #[message = "Product not found"]
                ProductNotExists,

                #[code = "FRANCHISE_NOT_EXISTS"]
                #[status = NOT_FOUND]
                #[message = "Franchise not found"]
                FranchiseNotExists,

                #[code = "UNSUPPORTED_CURRENCY"]
                #[status = BAD_REQUEST]
                #[message = "Product is priced in an unsupported currency"]
                UnsupportedCurrency,

                #[code = "AMOUNT_OVERFLOW"]
                #[status = BAD_REQUEST]
                #[message = "Order amount is too large"]
                AmountOverflow,
            }
        }

        Some(match self {
            Self::Db(e) => return e.try_as_error(),
            Self::Gateway(e) => return e.try_as_error(),
            Self::NotCustomer => api::PrivilegeError::Customer.into(),
            Self::ProductNotExists(_) => Error::ProductNotExists.into(),
            Self::FranchiseNotExists(_) => Error::FranchiseNotExists.into(),
            Self::UnsupportedCurrency(_) => Error::UnsupportedCurrency.into(),
            Self::AmountOverflow => Error::AmountOverflow.into(),
        })
    }
}

impl AsError for command::verify_payment::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        define_error! {
            enum Error {
                #[code = "MISSING_IDENTIFIERS"]
                #[status = BAD_REQUEST]
                #[message = "Gateway order ID, payment ID and signature are \
                             required"]
                MissingIdentifiers,

                #[code = "INVALID_SIGNATURE"]
                #[status = BAD_REQUEST]
                #[message = "Invalid payment signature"]
                InvalidSignature,

                #[code = "ALREADY_PROCESSED"]
                #[status = CONFLICT]
                #[message = "Payment has already been processed"]
                AlreadyProcessed,

                #[code = "ORDER_NOT_EXISTS"]
                #[status = NOT_FOUND]
                #[message = "Order not found"]
                OrderNotExists,

                #[code = "SUBSCRIPTION_NOT_EXISTS"]
                #[status = NOT_FOUND]
                #[message = "Subscription not found"]
                SubscriptionNotExists,

                #[code = "PENDING_PAYMENT_NOT_EXISTS"]
                #[status = NOT_FOUND]
                #[message = "Pending payment not found"]
                PendingPaymentNotExists,

                #[code = "INTENT_MISMATCH"]
                #[status = BAD_REQUEST]
                #[message = "Payment confirmation doesn't match the pending \
                             payment"]
                IntentMismatch,
            }
        }

        Some(match self {
            Self::Db(e) => return e.try_as_error(),
            Self::ConcurrentModification | Self::BillingDateOverflow => {
                return None
            }
            Self::NotCustomer => api::PrivilegeError::Customer.into(),
            Self::MissingIdentifiers => Error::MissingIdentifiers.into(),
            Self::InvalidSignature => Error::InvalidSignature.into(),
            Self::AlreadyProcessed(_) => Error::AlreadyProcessed.into(),
            Self::OrderNotExists(_) => Error::OrderNotExists.into(),
            Self::SubscriptionNotExists(_) => {
                Error::SubscriptionNotExists.into()
            }
            Self::PendingPaymentNotExists => {
                Error::PendingPaymentNotExists.into()
            }
            Self::IntentMismatch => Error::IntentMismatch.into(),
            Self::OrderNotPending(_) | Self::SubscriptionNotActive(_) => {
                api::invalid_state(self)
            }
        })
    }
}

impl AsError for command::generate_monthly_payment::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        define_error! {
            enum Error {
                #[code = "SUBSCRIPTION_NOT_EXISTS"]
                #[status = NOT_FOUND]
                #[message = "Subscription not found"]
                SubscriptionNotExists,

                #[code = "AMOUNT_OVERFLOW"]
                #[status = BAD_REQUEST]
                #[message = "Monthly rent is too large"]
                AmountOverflow,
            }
        }

        Some(match self {
            Self::Db(e) => return e.try_as_error(),
            Self::Gateway(e) => return e.try_as_error(),
            Self::NotCustomer => api::PrivilegeError::Customer.into(),
            Self::SubscriptionNotExists(_) => {
                Error::SubscriptionNotExists.into()
            }
            Self::SubscriptionNotActive(_) => api::invalid_state(self),
            Self::AmountOverflow => Error::AmountOverflow.into(),
        })
    }
}

impl AsError for query::payment::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        define_error! {
            enum Error {
                #[code = "PAYMENT_NOT_EXISTS"]
                #[status = NOT_FOUND]
                #[message = "Payment not found"]
                NotExists,
            }
        }

        Some(match self {
            Self::Db(e) => return e.try_as_error(),
            Self::PermissionDenied => api::PrivilegeError::Denied.into(),
            Self::NotExists(_) => Error::NotExists.into(),
        })
    }
}

#[cfg(test)]
mod spec {
    use service::{
        command::{create_order, verify_payment},
        domain::{order, payment},
        query,
    };

    use crate::AsError as _;

    use super::VerifyRequest;

    #[test]
    fn maps_reconciliation_errors() {
        use verify_payment::ExecutionError as E;

        for (err, status, code) in [
            (E::NotCustomer, 403, "NOT_CUSTOMER"),
            (E::MissingIdentifiers, 400, "MISSING_IDENTIFIERS"),
            (E::InvalidSignature, 400, "INVALID_SIGNATURE"),
            (E::IntentMismatch, 400, "INTENT_MISMATCH"),
            (
                E::AlreadyProcessed(
                    payment::TransactionId::new("pay_1").unwrap(),
                ),
                409,
                "ALREADY_PROCESSED",
            ),
            (E::OrderNotExists(order::Id::new()), 404, "ORDER_NOT_EXISTS"),
            (
                E::OrderNotPending(order::Status::Approved),
                400,
                "INVALID_STATE",
            ),
            (E::ConcurrentModification, 500, "INTERNAL_SERVER_ERROR"),
        ] {
            let e = err.as_error();
            assert_eq!(e.status_code.as_u16(), status, "{err}");
            assert_eq!(e.code, code, "{err}");
        }
    }

    #[test]
    fn invalid_state_reports_current_status() {
        let e = verify_payment::ExecutionError::OrderNotPending(
            order::Status::Approved,
        )
        .as_error();

        assert!(e.message.contains("approved"), "{}", e.message);
    }

    #[test]
    fn maps_order_creation_errors() {
        use create_order::ExecutionError as E;

        assert_eq!(E::NotCustomer.as_error().status_code.as_u16(), 403);
        assert_eq!(
            E::ProductNotExists(service::domain::product::Id::new())
                .as_error()
                .status_code
                .as_u16(),
            404,
        );
    }

    #[test]
    fn maps_payment_queries_errors() {
        use query::payment::ExecutionError as E;

        assert_eq!(E::PermissionDenied.as_error().status_code.as_u16(), 403);
        assert_eq!(
            E::NotExists(payment::Id::new()).as_error().status_code.as_u16(),
            404,
        );
    }

    #[test]
    fn missing_identifiers_reach_the_engine() {
        let req: VerifyRequest = serde_json::from_value(serde_json::json!({
            "aquahome_order_id": order::Id::new(),
        }))
        .unwrap();

        assert!(req.razorpay_order_id.is_empty());
        assert!(req.razorpay_signature.is_empty());
        assert!(req.subscription_id.is_none());
    }
}
