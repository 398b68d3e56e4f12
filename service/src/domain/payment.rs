//! [`Payment`] definitions.

#[cfg(doc)]
use common::DateTime;
use common::{define_kind, unit, DateTimeOf, Money};
use derive_more::{AsRef, Display, From, FromStr, Into};
use hmac::{Hmac, Mac as _};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::domain::{order, subscription, user};
#[cfg(doc)]
use crate::domain::{Order, Subscription, User};

/// Single attempt of a financial transaction.
#[derive(Clone, Debug)]
pub struct Payment {
    /// ID of this [`Payment`].
    pub id: Id,

    /// ID of the customer [`User`] paying.
    pub customer_id: user::Id,

    /// ID of the [`Order`] this [`Payment`] is made for, if any.
    pub order_id: Option<order::Id>,

    /// ID of the [`Subscription`] this [`Payment`] is made for, if any.
    pub subscription_id: Option<subscription::Id>,

    /// Paid amount.
    pub amount: Money,

    /// [`Kind`] of this [`Payment`].
    pub kind: Kind,

    /// [`Status`] of this [`Payment`].
    pub status: Status,

    /// [`Method`] this [`Payment`] is made with.
    pub method: Method,

    /// ID of this [`Payment`] in the external payment gateway, if any.
    ///
    /// Holds the gateway order ID while [`Status::Pending`], and the gateway
    /// payment ID once [`Status::Success`].
    pub transaction_id: Option<TransactionId>,

    /// Opaque gateway-related [`Details`].
    pub details: Details,

    /// [`InvoiceNumber`] of this [`Payment`], if any.
    pub invoice_number: Option<InvoiceNumber>,

    /// [`DateTime`] when this [`Payment`] was created.
    pub created_at: CreationDateTime,

    /// [`DateTime`] when this [`Payment`] was last modified.
    pub updated_at: ModificationDateTime,
}

/// ID of a [`Payment`].
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    From,
    FromStr,
    Hash,
    Into,
    PartialEq,
    Serialize,
)]
#[cfg_attr(feature = "postgres", derive(ToSql, FromSql), postgres(transparent))]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random [`Id`].
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// ID of a transaction in the external payment gateway.
#[derive(
    AsRef, Clone, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct TransactionId(String);

impl TransactionId {
    /// Creates a new [`TransactionId`] if the given `id` is non-empty.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        (!id.trim().is_empty()).then_some(Self(id))
    }
}

/// Opaque JSON blob describing gateway-specific details of a [`Payment`].
#[derive(Clone, Debug, Default, Deserialize, From, PartialEq, Serialize)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Details(serde_json::Value);

impl Details {
    /// Returns the underlying JSON value.
    #[must_use]
    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Invoice number of a [`Payment`].
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct InvoiceNumber(String);

impl InvoiceNumber {
    /// Generates an [`InvoiceNumber`] of a [`Kind::Monthly`] [`Payment`] for
    /// the provided [`Subscription`] issued at the provided [`DateTime`].
    #[must_use]
    pub fn monthly<Of: ?Sized>(
        subscription_id: subscription::Id,
        issued_at: DateTimeOf<Of>,
    ) -> Self {
        Self(format!(
            "INV-M-{}-{subscription_id}",
            issued_at.to_compact_date(),
        ))
    }
}

/// Signature of a [`Payment`] confirmation issued by the payment gateway.
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
pub struct Signature(String);

impl Signature {
    /// Wraps the provided hex-encoded `signature`.
    #[must_use]
    pub fn new(signature: impl Into<String>) -> Self {
        Self(signature.into())
    }

    /// Verifies this [`Signature`] to be the hex-encoded HMAC-SHA256 of
    /// `<gateway_order_id>|<gateway_payment_id>` keyed with the `secret`.
    ///
    /// Comparison is performed in constant time.
    #[must_use]
    pub fn verify(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        secret: &[u8],
    ) -> bool {
        let Ok(expected) = hex::decode(&self.0) else {
            return false;
        };
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret) else {
            return false;
        };
        mac.update(gateway_order_id.as_bytes());
        mac.update(b"|");
        mac.update(gateway_payment_id.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }

    /// Signs the provided identifiers the same way the payment gateway does.
    #[expect(clippy::missing_panics_doc, reason = "infallible")]
    #[must_use]
    pub fn sign(
        gateway_order_id: &str,
        gateway_payment_id: &str,
        secret: &[u8],
    ) -> Self {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret)
            .expect("HMAC accepts keys of any size");
        mac.update(gateway_order_id.as_bytes());
        mac.update(b"|");
        mac.update(gateway_payment_id.as_bytes());
        Self(hex::encode(mac.finalize().into_bytes()))
    }
}

define_kind! {
    #[doc = "Kind of a [`Payment`]."]
    #[case = "snake_case"]
    enum Kind {
        #[doc = "Upfront payment of an [`Order`]."]
        Initial = 1,

        #[doc = "Recurring payment of a [`Subscription`]."]
        Monthly = 2,
    }
}

define_kind! {
    #[doc = "Status of a [`Payment`]."]
    #[case = "snake_case"]
    enum Status {
        #[doc = "Awaiting confirmation from the payment gateway."]
        Pending = 1,

        #[doc = "Confirmed and verified."]
        Success = 2,

        #[doc = "Declined or abandoned."]
        Failed = 3,
    }
}

define_kind! {
    #[doc = "Method a [`Payment`] is made with."]
    #[case = "snake_case"]
    enum Method {
        #[doc = "Razorpay payment gateway."]
        Razorpay = 1,
    }
}

/// [`DateTime`] when a [`Payment`] was created.
pub type CreationDateTime = DateTimeOf<(Payment, unit::Creation)>;

/// [`DateTime`] when a [`Payment`] was last modified.
pub type ModificationDateTime = DateTimeOf<(Payment, unit::Modification)>;

#[cfg(test)]
mod spec {
    use common::DateTime;

    use crate::domain::subscription;

    use super::{InvoiceNumber, Signature};

    const SECRET: &[u8] = b"rzp_test_secret";

    #[test]
    fn verifies_own_signature() {
        let sig = Signature::sign("order_Nx1", "pay_Qa7", SECRET);
        assert!(sig.verify("order_Nx1", "pay_Qa7", SECRET));
    }

    #[test]
    fn rejects_swapped_or_foreign_input() {
        let sig = Signature::sign("order_Nx1", "pay_Qa7", SECRET);
        assert!(!sig.verify("pay_Qa7", "order_Nx1", SECRET));
        assert!(!sig.verify("order_Nx1", "pay_Qa8", SECRET));
        assert!(!sig.verify("order_Nx1", "pay_Qa7", b"another secret"));
    }

    #[test]
    fn rejects_any_single_character_mutation() {
        let sig = Signature::sign("order_Nx1", "pay_Qa7", SECRET).to_string();
        for i in 0..sig.len() {
            let mut tampered = sig.clone().into_bytes();
            tampered[i] = if tampered[i] == b'0' { b'1' } else { b'0' };
            let tampered = Signature::new(String::from_utf8(tampered).unwrap());
            assert!(!tampered.verify("order_Nx1", "pay_Qa7", SECRET), "{i}");
        }
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(!Signature::new("zz").verify("a", "b", SECRET));
        assert!(!Signature::new("").verify("a", "b", SECRET));
    }

    #[test]
    fn monthly_invoice_number() {
        let id: subscription::Id =
            "6f1c2a4e-8d6b-4a7e-9d43-2b1f0c9e5a11".parse().unwrap();
        let at = DateTime::from_rfc3339("2024-07-09T08:00:00Z").unwrap();
        assert_eq!(
            InvoiceNumber::monthly(id, at).to_string(),
            "INV-M-20240709-6f1c2a4e-8d6b-4a7e-9d43-2b1f0c9e5a11",
        );
    }
}
