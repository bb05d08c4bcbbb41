//! Shared application state for the Axum API server.

use std::sync::Arc;

use herald_notifier::context::PushContext;
use herald_notifier::correlation::CorrelationStore;
use herald_notifier::dispatcher::Dispatcher;
use herald_notifier::registry::DeviceRegistry;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub registry: Arc<dyn DeviceRegistry>,
    pub store: Arc<dyn CorrelationStore>,
}

impl AppState {
    pub fn new(ctx: PushContext) -> Self {
        Self {
            registry: ctx.registry.clone(),
            store: ctx.store.clone(),
            dispatcher: Dispatcher::new(ctx),
        }
    }
}
