use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string (device registrations)
    pub database_url: String,

    /// Redis connection string (correlation records)
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// `host:port` of the push gateway endpoint (TLS terminated upstream)
    pub apns_gateway_addr: String,

    /// `host:port` of the push feedback endpoint
    pub apns_feedback_addr: String,

    /// App identifier that device registrations are scoped to
    pub ios_app_id: String,

    /// Lifetime of a correlation record in seconds (default: 3600)
    pub correlation_ttl_secs: u64,

    /// How long the gateway should keep retrying a message, in seconds (default: 86400)
    pub message_expiry_secs: u64,

    /// Width of generated notification identifiers in bits, 1..=32 (default: 32)
    pub identifier_bits: u32,

    /// Address the HTTP API binds to
    pub api_listen_addr: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let identifier_bits: u32 = std::env::var("APNS_IDENTIFIER_BITS")
            .unwrap_or_else(|_| "32".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("APNS_IDENTIFIER_BITS must be a valid u32"))?;
        if !(1..=32).contains(&identifier_bits) {
            anyhow::bail!("APNS_IDENTIFIER_BITS must be between 1 and 32");
        }

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            apns_gateway_addr: std::env::var("APNS_GATEWAY_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:2195".to_string()),
            apns_feedback_addr: std::env::var("APNS_FEEDBACK_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:2196".to_string()),
            ios_app_id: std::env::var("IOS_APP_ID")
                .map_err(|_| anyhow::anyhow!("IOS_APP_ID environment variable is required"))?,
            correlation_ttl_secs: std::env::var("APNS_CORRELATION_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("APNS_CORRELATION_TTL_SECS must be a valid u64"))?,
            message_expiry_secs: std::env::var("APNS_MESSAGE_EXPIRY_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("APNS_MESSAGE_EXPIRY_SECS must be a valid u64"))?,
            identifier_bits,
            api_listen_addr: std::env::var("API_LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
        })
    }
}
