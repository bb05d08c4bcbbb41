//! Push notification delivery core.
//!
//! Outbound notifications are tagged with a random identifier that is recorded in
//! a short-lived correlation store before the message is written to the gateway.
//! The gateway only answers when something went wrong; those answers are matched
//! back to the recorded device and, for invalid tokens, the device registration
//! is removed.
//!
//! - [`dispatcher::Dispatcher`] sends one message per device token
//! - [`reconciler::Reconciler`] consumes gateway responses
//! - [`feedback::FeedbackProcessor`] prunes devices reported by the feedback service

pub mod context;
pub mod correlation;
pub mod dispatcher;
pub mod feedback;
pub mod gateway;
pub mod identifier;
pub mod reconciler;
pub mod registry;
pub mod status;
pub mod token;
pub mod transport;
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;
