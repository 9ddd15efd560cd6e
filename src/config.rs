/// Engine configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,
    pub redis_url: String,
    pub max_connections: u32,
    /// Prefix for ranking keys in Redis.
    pub ranking_key_prefix: String,
}

impl EngineConfig {
    /// Load configuration from environment variables with tolerant
    /// defaults for everything except the database URL.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or_default(),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse::<u32>()
                .unwrap_or(5),
            ranking_key_prefix: std::env::var("RANKING_KEY_PREFIX")
                .unwrap_or_else(|_| "points".to_string()),
        }
    }
}
