/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Budget for draining background tasks on shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Interval between WebSocket ping frames and presence refreshes
    /// (default: `30`).
    pub heartbeat_interval_secs: u64,
    /// How long a shared presence handle stays valid without a refresh
    /// (default: three heartbeat intervals).
    pub presence_ttl_secs: u64,
    /// Postgres URL. When unset, rooms and messages live in memory.
    pub database_url: Option<String>,
    /// Redis URL. When unset, presence and the backplane are process-local.
    pub redis_url: Option<String>,
    /// Prefix for Redis presence keys and pub/sub channels.
    pub redis_key_prefix: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                    |
    /// |---------------------------|----------------------------|
    /// | `HOST`                    | `0.0.0.0`                  |
    /// | `PORT`                    | `3000`                     |
    /// | `CORS_ORIGINS`            | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `30`                       |
    /// | `HEARTBEAT_INTERVAL_SECS` | `30`                       |
    /// | `PRESENCE_TTL_SECS`       | 3 × heartbeat interval     |
    /// | `DATABASE_URL`            | unset (in-memory store)    |
    /// | `REDIS_URL`               | unset (single process)     |
    /// | `REDIS_KEY_PREFIX`        | `bazaar:`                  |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = secs_from_env("REQUEST_TIMEOUT_SECS", 30);
        let shutdown_timeout_secs = secs_from_env("SHUTDOWN_TIMEOUT_SECS", 30);
        let heartbeat_interval_secs = secs_from_env("HEARTBEAT_INTERVAL_SECS", 30);
        assert!(heartbeat_interval_secs > 0, "HEARTBEAT_INTERVAL_SECS must be positive");
        let presence_ttl_secs = secs_from_env("PRESENCE_TTL_SECS", 3 * heartbeat_interval_secs);
        assert!(
            presence_ttl_secs > heartbeat_interval_secs,
            "PRESENCE_TTL_SECS must exceed HEARTBEAT_INTERVAL_SECS"
        );

        let database_url = non_empty_var("DATABASE_URL");
        let redis_url = non_empty_var("REDIS_URL");
        let redis_key_prefix =
            std::env::var("REDIS_KEY_PREFIX").unwrap_or_else(|_| "bazaar:".into());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            heartbeat_interval_secs,
            presence_ttl_secs,
            database_url,
            redis_url,
            redis_key_prefix,
        }
    }
}

/// Read a duration in seconds.
fn secs_from_env(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be a valid u64: {e}")),
        Err(_) => default,
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
