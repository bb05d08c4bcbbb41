//! Outbound transport seam.

use async_trait::async_trait;

use herald_common::error::AppError;

use crate::wire::WireMessage;

/// Send primitive of a gateway connection.
///
/// Returning `Ok` only means the message was handed to the connection; the
/// gateway reports failures later on the response channel.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, message: &WireMessage) -> Result<(), AppError>;
}
