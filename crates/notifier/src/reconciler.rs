//! Response reconciler: matches gateway responses to in-flight notifications.
//!
//! Responses arrive on the gateway's schedule: late, duplicated, or after the
//! correlation record expired. None of that is an error; every anomaly is logged
//! and absorbed so the response stream keeps flowing.
//!
//! Status 0 ("no error") is filtered here, before the store is consulted, so it
//! never triggers the missing-record warning.

use tokio::sync::mpsc;

use herald_common::types::ResponseEvent;

use crate::context::PushContext;
use crate::correlation::correlation_key;
use crate::status::GatewayStatus;
use crate::token::hex_to_b64;

/// What reconciling a single response did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Status 0; nothing to do
    NoError,
    /// No correlation record (expired or already handled)
    Expired,
    /// Delivery failed; record left to expire
    Transient(GatewayStatus),
    /// Token was invalid; registrations and record removed
    Deregistered { removed: u64 },
    /// A collaborator failed; the event was dropped
    Failed,
}

/// Applies remediation for gateway responses.
#[derive(Clone)]
pub struct Reconciler {
    ctx: PushContext,
}

impl Reconciler {
    pub fn new(ctx: PushContext) -> Self {
        Self { ctx }
    }

    /// Consume responses until the channel closes. Returns how many were handled.
    pub async fn run(&self, mut responses: mpsc::Receiver<ResponseEvent>) -> u64 {
        let mut handled = 0u64;
        while let Some(event) = responses.recv().await {
            self.on_response(event).await;
            handled += 1;
        }
        tracing::info!(handled, "Response channel closed, reconciler stopping");
        handled
    }

    pub async fn on_response(&self, event: ResponseEvent) -> Reconciliation {
        let status = GatewayStatus::from_code(event.status);
        if !status.is_error() {
            tracing::debug!(identifier = event.identifier, "Gateway reported no error");
            return Reconciliation::NoError;
        }

        let key = correlation_key(event.identifier);
        let record = match self.ctx.store.get(&key).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(key = %key, "APNs key, {}, doesn't exist", key);
                return Reconciliation::Expired;
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Correlation lookup failed");
                return Reconciliation::Failed;
            }
        };

        // Registrations and logs use the persisted base64 form
        let token = hex_to_b64(&record.token).unwrap_or_else(|_| record.token.clone());

        tracing::warn!(
            identifier = event.identifier,
            user_id = record.user_id,
            token = %token,
            reason = status.reason(),
            code = status.code(),
            "APNs: Failed to deliver APNs notification"
        );

        if !status.is_permanent() {
            return Reconciliation::Transient(status);
        }

        tracing::warn!(
            user_id = record.user_id,
            token = %token,
            "APNs: Removing token from database due to above failure"
        );

        let removed = match self.ctx.registry.deregister(record.user_id, &token).await {
            Ok(removed) => removed,
            Err(e) => {
                // record kept so a redelivered response can retry the removal
                tracing::error!(user_id = record.user_id, error = %e, "Device deregistration failed");
                return Reconciliation::Failed;
            }
        };

        if let Err(e) = self.ctx.store.delete(&key).await {
            tracing::error!(key = %key, error = %e, "Correlation record delete failed");
        }

        tracing::info!(user_id = record.user_id, removed, "Invalid device token deregistered");
        Reconciliation::Deregistered { removed }
    }
}
