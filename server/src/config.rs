use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub vote_window_secs: u64,
    pub frontend_origin: String,
    pub token_ttl_hours: i64,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("PORT", "5000"),
            database_path: try_load("DATABASE_PATH", "forum.db"),
            vote_window_secs: try_load("VOTE_WINDOW_SECS", "60"),
            frontend_origin: try_load("FRONTEND_URL", "http://localhost:5173"),
            token_ttl_hours: try_load("TOKEN_TTL_HOURS", "24"),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}
