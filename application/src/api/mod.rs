//! JSON HTTP API definitions.

pub mod payment;
pub mod service_request;

use std::fmt;

use axum::Router;
use common::{DateTimeOf, Money};
use serde::Serialize;

use crate::{define_error, Error};

/// Creates a [`Router`] serving the whole API.
pub fn router() -> Router {
    Router::new()
        .nest("/api/payments", payment::router())
        .nest("/api/service-requests", service_request::router())
}

/// [`Money`] amount rendered into JSON.
#[derive(Clone, Debug, Serialize)]
pub struct Amount {
    /// Decimal amount in major units.
    pub amount: String,

    /// ISO 4217 code of the currency.
    pub currency: &'static str,
}

impl From<Money> for Amount {
    fn from(money: Money) -> Self {
        Self {
            amount: money.amount.to_string(),
            currency: money.currency.as_str(),
        }
    }
}

/// Renders the provided [`DateTimeOf`] as an [RFC 3339] string.
///
/// [RFC 3339]: https://datatracker.ietf.org/doc/html/rfc3339
fn rfc3339<Of: ?Sized>(dt: DateTimeOf<Of>) -> String {
    dt.to_rfc3339()
}

/// Returns [`None`] if the provided text is blank.
fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

/// Creates an [`Error`] reporting the current state of an entity, described
/// by the provided `reason`.
fn invalid_state(reason: impl fmt::Display) -> Error {
    Error::from(StateError::Invalid).with_message(reason)
}

define_error! {
    enum PrivilegeError {
        #[code = "NOT_CUSTOMER"]
        #[status = FORBIDDEN]
        #[message = "Authenticated `User` must be a customer"]
        Customer,

        #[code = "PERMISSION_DENIED"]
        #[status = FORBIDDEN]
        #[message = "Permission denied"]
        Denied,
    }
}

define_error! {
    enum StateError {
        #[code = "INVALID_STATE"]
        #[status = BAD_REQUEST]
        #[message = "Operation is not allowed in the current state"]
        Invalid,
    }
}

#[cfg(test)]
mod spec {
    use common::{money::Currency, Money};

    use super::{non_blank, Amount};

    #[test]
    fn renders_amount() {
        let amount = Amount::from(Money {
            amount: "5100.50".parse().unwrap(),
            currency: Currency::Inr,
        });

        assert_eq!(amount.amount, "5100.50");
        assert_eq!(amount.currency, "INR");
    }

    #[test]
    fn drops_blank_text() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some("note".into())), Some("note".into()));
    }
}
