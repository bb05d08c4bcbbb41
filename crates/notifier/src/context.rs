//! Shared handles for the dispatcher and reconciler.

use std::sync::Arc;
use std::time::Duration;

use herald_common::config::AppConfig;

use crate::correlation::{CorrelationStore, DEFAULT_TTL_SECONDS};
use crate::identifier::{IdentifierGenerator, RandomIdentifierGenerator};
use crate::registry::DeviceRegistry;
use crate::transport::PushTransport;

/// Default gateway retention for undelivered messages (1 day).
const DEFAULT_MESSAGE_EXPIRY_SECONDS: u64 = 86_400;

/// Tunables for outbound delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliverySettings {
    /// How long a correlation record lives without a response
    pub correlation_ttl: Duration,
    /// How long the gateway may hold an undeliverable message
    pub message_expiry: Duration,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            correlation_ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
            message_expiry: Duration::from_secs(DEFAULT_MESSAGE_EXPIRY_SECONDS),
        }
    }
}

impl DeliverySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            correlation_ttl: Duration::from_secs(config.correlation_ttl_secs),
            message_expiry: Duration::from_secs(config.message_expiry_secs),
        }
    }
}

/// Everything delivery needs, injected instead of held in globals.
#[derive(Clone)]
pub struct PushContext {
    pub store: Arc<dyn CorrelationStore>,
    pub transport: Arc<dyn PushTransport>,
    pub registry: Arc<dyn DeviceRegistry>,
    pub identifiers: Arc<dyn IdentifierGenerator>,
    pub settings: DeliverySettings,
}

impl PushContext {
    /// Context with random 32-bit identifiers and default settings.
    pub fn new(
        store: Arc<dyn CorrelationStore>,
        transport: Arc<dyn PushTransport>,
        registry: Arc<dyn DeviceRegistry>,
    ) -> Self {
        Self {
            store,
            transport,
            registry,
            identifiers: Arc::new(RandomIdentifierGenerator::default()),
            settings: DeliverySettings::default(),
        }
    }

    pub fn with_identifiers(mut self, identifiers: Arc<dyn IdentifierGenerator>) -> Self {
        self.identifiers = identifiers;
        self
    }

    pub fn with_settings(mut self, settings: DeliverySettings) -> Self {
        self.settings = settings;
        self
    }
}
