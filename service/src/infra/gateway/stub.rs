//! Deterministic [`Gateway`] implementation.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use common::operations::Create;
use serde_json::json;
use tracerr::Traced;

use crate::infra::{gateway, Gateway};

use super::{Intent, IntentId, NewIntent};

/// [`Gateway`] issuing sequential `order_stub_<n>` intents without any
/// network interaction.
#[derive(Clone, Debug, Default)]
pub struct Stub {
    /// Inner state shared between clones.
    inner: Arc<Inner>,
}

/// Inner state of a [`Stub`].
#[derive(Debug, Default)]
struct Inner {
    /// Number of [`Intent`]s issued so far.
    issued: AtomicU64,

    /// Indicator whether requests should fail.
    failing: AtomicBool,
}

impl Stub {
    /// Creates a new [`Stub`] gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent request fail (or succeed again).
    pub fn fail(&self, fail: bool) {
        self.inner.failing.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of [`Intent`]s issued so far.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.inner.issued.load(Ordering::SeqCst)
    }
}

impl Gateway<Create<NewIntent>> for Stub {
    type Ok = Intent;
    type Err = Traced<gateway::Error>;

    async fn execute(
        &self,
        Create(intent): Create<NewIntent>,
    ) -> Result<Self::Ok, Self::Err> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(tracerr::new!(gateway::Error::Api {
                status: 503,
                body: "stub gateway is unavailable".into(),
            }));
        }

        let n = self.inner.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("order_stub_{n}");
        Ok(Intent {
            raw: json!({
                "id": id,
                "entity": "order",
                "amount": intent.amount,
                "currency": intent.currency.as_str(),
                "receipt": intent.receipt,
                "notes": intent.notes,
                "status": "created",
            }),
            id: IntentId(id),
        })
    }
}
