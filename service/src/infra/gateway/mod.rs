//! [`Gateway`]-related implementations.

#[cfg(feature = "razorpay")]
pub mod razorpay;
#[cfg(any(test, feature = "memory"))]
pub mod stub;

use common::money::Currency;
use derive_more::{AsRef, Display, Error as StdError, From, Into};
use serde::Deserialize;

#[cfg(feature = "razorpay")]
pub use self::razorpay::Razorpay;
#[cfg(any(test, feature = "memory"))]
pub use self::stub::Stub;
#[cfg(doc)]
use common::operations::Create;

/// Payment gateway operation.
pub use common::Handler as Gateway;

/// Payment intent to be [`Create`]d in a [`Gateway`].
#[derive(Clone, Debug)]
pub struct NewIntent {
    /// Amount to be paid, in minor units of the [`Currency`].
    pub amount: i64,

    /// [`Currency`] of the amount.
    pub currency: Currency,

    /// Merchant reference of the intent.
    pub receipt: String,

    /// Arbitrary key-value metadata attached to the intent, as a JSON object.
    pub notes: serde_json::Value,
}

/// Payment intent [`Create`]d in a [`Gateway`].
#[derive(Clone, Debug, Deserialize)]
pub struct Intent {
    /// ID of this [`Intent`] in the [`Gateway`].
    pub id: IntentId,

    /// Raw representation of this [`Intent`] as returned by the [`Gateway`].
    #[serde(skip)]
    pub raw: serde_json::Value,
}

/// ID of an [`Intent`] in a [`Gateway`].
#[derive(AsRef, Clone, Debug, Deserialize, Display, Eq, Into, PartialEq)]
#[as_ref(str)]
pub struct IntentId(String);

/// [`Gateway`] error.
#[derive(Debug, Display, From, StdError)]
pub enum Error {
    /// Transport failure.
    #[cfg(feature = "razorpay")]
    #[display("HTTP request failed: {_0}")]
    Http(reqwest::Error),

    /// [`Gateway`] rejected the request.
    #[display("`Gateway` responded with status {status}: {body}")]
    #[from(ignore)]
    Api {
        /// HTTP status code of the response.
        status: u16,

        /// Body of the response.
        body: String,
    },

    /// [`Gateway`] response cannot be understood.
    #[display("`Gateway` response is invalid: {_0}")]
    #[from(ignore)]
    InvalidResponse(#[error(not(source))] String),
}
