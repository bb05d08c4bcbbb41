//! Message dispatcher: one gateway message per device token.
//!
//! For every token:
//! 1. Build the wire message (hex token → raw bytes, payload → gateway JSON)
//! 2. Reserve an identifier by writing `{token, user_id}` under `apns:<identifier>`,
//!    drawing again while the key is held by a live record
//! 3. Hand the message to the transport
//!
//! The record is written before the message leaves, so a gateway response can
//! never arrive ahead of it. Reservation is a single store operation, so
//! concurrent dispatchers never share an identifier.

use chrono::Utc;

use herald_common::error::AppError;
use herald_common::types::{CorrelationRecord, PushPayload};

use crate::context::PushContext;
use crate::correlation::correlation_key;
use crate::wire::WireMessage;

/// Result of dispatching to a single device token.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// Hex device token as supplied by the caller
    pub token: String,
    /// Notification identifier on success
    pub result: Result<u32, AppError>,
}

impl DispatchOutcome {
    pub fn is_sent(&self) -> bool {
        self.result.is_ok()
    }
}

/// Sends notifications and registers their correlation records.
#[derive(Clone)]
pub struct Dispatcher {
    ctx: PushContext,
}

impl Dispatcher {
    pub fn new(ctx: PushContext) -> Self {
        Self { ctx }
    }

    /// Send `payload` to every hex token in `tokens` on behalf of `user_id`.
    ///
    /// A failure on one token is reported in its outcome and does not stop the
    /// remaining tokens. Outcomes are returned in input order.
    pub async fn dispatch(
        &self,
        user_id: i64,
        tokens: &[String],
        payload: &PushPayload,
    ) -> Vec<DispatchOutcome> {
        let expiry = self.expiry_timestamp();
        let mut outcomes = Vec::with_capacity(tokens.len());

        for token in tokens {
            let result = self.dispatch_one(user_id, token, payload, expiry).await;
            if let Err(e) = &result {
                tracing::error!(
                    user_id,
                    token = %token,
                    error = %e,
                    "Failed to dispatch push notification"
                );
            }
            outcomes.push(DispatchOutcome {
                token: token.clone(),
                result,
            });
        }

        let sent = outcomes.iter().filter(|o| o.is_sent()).count();
        tracing::info!(
            user_id,
            sent,
            failed = outcomes.len() - sent,
            "Push notifications dispatched"
        );

        outcomes
    }

    async fn dispatch_one(
        &self,
        user_id: i64,
        token: &str,
        payload: &PushPayload,
        expiry: u32,
    ) -> Result<u32, AppError> {
        // a rejected token or payload never claims an identifier
        let mut message = WireMessage::build(0, token, payload, expiry)?;

        let record = CorrelationRecord {
            token: token.to_string(),
            user_id,
        };
        let identifier = self.reserve_identifier(&record).await?;
        message.identifier = identifier;

        self.ctx.transport.send(&message).await?;

        tracing::debug!(user_id, identifier, token = %token, "Push notification sent");
        Ok(identifier)
    }

    /// Draw identifiers until the store accepts `record` under one of them.
    async fn reserve_identifier(&self, record: &CorrelationRecord) -> Result<u32, AppError> {
        loop {
            let identifier = self.ctx.identifiers.generate();
            let reserved = self
                .ctx
                .store
                .reserve(
                    &correlation_key(identifier),
                    record,
                    self.ctx.settings.correlation_ttl,
                )
                .await?;
            if reserved {
                return Ok(identifier);
            }
            tracing::debug!(identifier, "Notification identifier in use, regenerating");
        }
    }

    /// Gateway expiry as a Unix timestamp; 0 asks the gateway not to store the message.
    fn expiry_timestamp(&self) -> u32 {
        let secs = self.ctx.settings.message_expiry.as_secs();
        if secs == 0 {
            return 0;
        }
        let at = Utc::now().timestamp().saturating_add(secs as i64);
        u32::try_from(at).unwrap_or(u32::MAX)
    }
}
