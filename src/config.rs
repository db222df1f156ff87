// config.rs
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub port: u16,
    pub quote_sweep_interval_secs: u64,
    pub event_channel_capacity: usize,
    pub db_max_connections: u32,
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        let jwt_secret = std::env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set");

        Config {
            database_url,
            jwt_secret,
            port: env_or("PORT", 8000),
            quote_sweep_interval_secs: env_or("QUOTE_SWEEP_INTERVAL_SECS", 60),
            event_channel_capacity: env_or("EVENT_CHANNEL_CAPACITY", 256),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 20),
        }
    }
}
