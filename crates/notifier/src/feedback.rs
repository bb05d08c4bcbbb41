//! Feedback service processing.
//!
//! The feedback endpoint lists devices that stopped accepting pushes. A device
//! registered again after the reported time is kept.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use herald_common::error::AppError;

use crate::gateway;
use crate::registry::DeviceRegistry;
use crate::wire::FeedbackTuple;

pub struct FeedbackProcessor {
    registry: Arc<dyn DeviceRegistry>,
}

impl FeedbackProcessor {
    pub fn new(registry: Arc<dyn DeviceRegistry>) -> Self {
        Self { registry }
    }

    /// Fetch feedback from `addr` and prune the reported devices.
    pub async fn run(&self, addr: &str) -> Result<u64, AppError> {
        let tuples = gateway::fetch_feedback(addr).await?;
        self.apply(&tuples).await
    }

    /// Delete registrations for each reported token not refreshed since its timestamp.
    pub async fn apply(&self, tuples: &[FeedbackTuple]) -> Result<u64, AppError> {
        let mut removed = 0u64;

        for tuple in tuples {
            let token = STANDARD.encode(&tuple.token);
            let deleted = self.registry.delete_stale(&token, tuple.timestamp).await?;
            if deleted > 0 {
                tracing::info!(
                    token = %token,
                    reported_at = %tuple.timestamp,
                    deleted,
                    "Removed device reported by push feedback"
                );
            }
            removed += deleted;
        }

        Ok(removed)
    }
}
