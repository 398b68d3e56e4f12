//! [Razorpay] [`Gateway`] implementation.
//!
//! [Razorpay]: https://razorpay.com/docs/api/orders

use std::time::Duration;

use common::operations::Create;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize as _, Serialize};
use tracerr::Traced;

use crate::infra::{gateway, Gateway};

use super::{Intent, NewIntent};

/// [Razorpay] API client.
///
/// [Razorpay]: https://razorpay.com
#[derive(Clone, Debug)]
pub struct Razorpay {
    /// HTTP client performing requests.
    client: reqwest::Client,

    /// [`Config`] of this [`Razorpay`] client.
    config: Config,
}

/// [`Razorpay`] client configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the API, without a trailing slash.
    pub base_url: String,

    /// Public ID of the API key.
    pub key_id: String,

    /// Secret of the API key.
    pub key_secret: SecretString,

    /// Timeout of a single request.
    pub timeout: Duration,
}

impl Razorpay {
    /// Creates a new [`Razorpay`] client with the provided [`Config`].
    ///
    /// # Errors
    ///
    /// If failed to build the underlying HTTP client.
    pub fn new(config: Config) -> Result<Self, Traced<gateway::Error>> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(tracerr::from_and_wrap!(=> gateway::Error))?;
        Ok(Self { client, config })
    }
}

/// Body of the [`Razorpay`] order creation request.
#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    /// Amount in minor units.
    amount: i64,

    /// ISO 4217 currency code.
    currency: &'static str,

    /// Merchant reference.
    receipt: &'a str,

    /// Arbitrary metadata.
    notes: &'a serde_json::Value,
}

impl Gateway<Create<NewIntent>> for Razorpay {
    type Ok = Intent;
    type Err = Traced<gateway::Error>;

    async fn execute(
        &self,
        Create(intent): Create<NewIntent>,
    ) -> Result<Self::Ok, Self::Err> {
        use gateway::Error as E;

        let NewIntent {
            amount,
            currency,
            receipt,
            notes,
        } = intent;

        let resp = self
            .client
            .post(format!("{}/v1/orders", self.config.base_url))
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&CreateOrderRequest {
                amount,
                currency: currency.as_str(),
                receipt: &receipt,
                notes: &notes,
            })
            .send()
            .await
            .map_err(tracerr::from_and_wrap!(=> E))?;

        let status = resp.status();
        let body = resp.text().await.map_err(tracerr::from_and_wrap!(=> E))?;
        if !status.is_success() {
            return Err(tracerr::new!(E::Api {
                status: status.as_u16(),
                body,
            }));
        }

        let raw = serde_json::from_str::<serde_json::Value>(&body)
            .map_err(|e| E::InvalidResponse(format!("{e}; body={body}")))
            .map_err(tracerr::wrap!())?;
        let mut intent = Intent::deserialize(&raw)
            .map_err(|e| E::InvalidResponse(format!("{e}; body={body}")))
            .map_err(tracerr::wrap!())?;
        intent.raw = raw;
        Ok(intent)
    }
}
