//! Test doubles shared by the unit tests.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use herald_common::error::AppError;

use crate::context::PushContext;
use crate::correlation::MemoryCorrelationStore;
use crate::identifier::{IdentifierGenerator, RandomIdentifierGenerator, SequenceIdentifierGenerator};
use crate::registry::MemoryDeviceRegistry;
use crate::transport::PushTransport;
use crate::wire::WireMessage;

pub const APP_ID: &str = "org.herald.test";

pub fn tokens(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Transport that keeps every message and fails for chosen tokens.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<WireMessage>>,
    failing: Mutex<HashSet<Vec<u8>>>,
}

impl RecordingTransport {
    pub fn fail_for(&self, token_hex: &str) {
        let token = hex::decode(token_hex).unwrap();
        self.failing.lock().unwrap().insert(token);
    }

    pub fn sent(&self) -> Vec<WireMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushTransport for RecordingTransport {
    async fn send(&self, message: &WireMessage) -> Result<(), AppError> {
        if self.failing.lock().unwrap().contains(&message.token) {
            return Err(AppError::Transport("connection reset by peer".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// In-memory collaborators wired into a [`PushContext`].
pub struct TestHarness {
    pub store: Arc<MemoryCorrelationStore>,
    pub registry: Arc<MemoryDeviceRegistry>,
    pub transport: Arc<RecordingTransport>,
    identifiers: Arc<dyn IdentifierGenerator>,
}

impl TestHarness {
    pub fn with_identifiers(values: Vec<u32>) -> Self {
        Self::build(Arc::new(SequenceIdentifierGenerator::new(values).unwrap()))
    }

    pub fn random() -> Self {
        Self::build(Arc::new(RandomIdentifierGenerator::default()))
    }

    fn build(identifiers: Arc<dyn IdentifierGenerator>) -> Self {
        Self {
            store: Arc::new(MemoryCorrelationStore::new()),
            registry: Arc::new(MemoryDeviceRegistry::new(APP_ID)),
            transport: Arc::new(RecordingTransport::default()),
            identifiers,
        }
    }

    pub fn context(&self) -> PushContext {
        PushContext::new(
            self.store.clone(),
            self.transport.clone(),
            self.registry.clone(),
        )
        .with_identifiers(self.identifiers.clone())
    }
}

/// Captured WARN events rendered as `field=value` text.
#[derive(Clone, Default)]
pub struct Warnings(Arc<Mutex<Vec<String>>>);

impl Warnings {
    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

struct WarnLayer {
    warnings: Warnings,
}

struct FieldWriter(String);

impl Visit for FieldWriter {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let _ = write!(self.0, "{}={:?} ", field.name(), value);
    }
}

impl<S: Subscriber> Layer<S> for WarnLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::WARN {
            return;
        }
        let mut writer = FieldWriter(String::new());
        event.record(&mut writer);
        self.warnings.0.lock().unwrap().push(writer.0);
    }
}

/// Capture warnings emitted on the current thread until the guard drops.
pub fn capture_warnings() -> (DefaultGuard, Warnings) {
    let warnings = Warnings::default();
    let subscriber = tracing_subscriber::registry().with(WarnLayer {
        warnings: warnings.clone(),
    });
    (tracing::subscriber::set_default(subscriber), warnings)
}
