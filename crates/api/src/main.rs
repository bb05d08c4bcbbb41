//! Herald API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use herald_common::config::AppConfig;
use herald_common::db::{create_pool, run_migrations};
use herald_common::redis_pool::create_redis_pool;
use herald_notifier::context::{DeliverySettings, PushContext};
use herald_notifier::correlation::RedisCorrelationStore;
use herald_notifier::feedback::FeedbackProcessor;
use herald_notifier::gateway::GatewayConnection;
use herald_notifier::identifier::RandomIdentifierGenerator;
use herald_notifier::reconciler::Reconciler;
use herald_notifier::registry::PgDeviceRegistry;

use herald_api::routes::create_router;
use herald_api::state::AppState;

/// How often the feedback service is polled for dead devices.
const FEEDBACK_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("herald_api=debug,herald_notifier=info,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting Herald API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Device registrations
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    run_migrations(&pool).await?;
    let registry = Arc::new(PgDeviceRegistry::new(pool, config.ios_app_id.clone()));

    // Correlation records
    let redis = create_redis_pool(&config.redis_url).await?;
    let store = Arc::new(RedisCorrelationStore::new(redis));

    // Gateway connection and its response stream
    let (gateway, responses) = GatewayConnection::connect(&config.apns_gateway_addr).await?;

    let ctx = PushContext::new(store, Arc::new(gateway), registry.clone())
        .with_identifiers(Arc::new(RandomIdentifierGenerator::new(
            config.identifier_bits,
        )))
        .with_settings(DeliverySettings::from_config(&config));

    let reconciler = Reconciler::new(ctx.clone());
    tokio::spawn(async move {
        reconciler.run(responses).await;
        tracing::warn!("Gateway response stream ended; responses are no longer reconciled");
    });

    let feedback = FeedbackProcessor::new(registry);
    let feedback_addr = config.apns_feedback_addr.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(FEEDBACK_INTERVAL);
        loop {
            interval.tick().await;
            match feedback.run(&feedback_addr).await {
                Ok(removed) => tracing::info!(removed, "Push feedback processed"),
                Err(e) => tracing::error!(error = %e, "Push feedback run failed"),
            }
        }
    });

    // Build router
    let app = create_router(AppState::new(ctx))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr: SocketAddr = config.api_listen_addr.parse()?;
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
