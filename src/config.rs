use crate::domain::UserId;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub order_feed_url: String,
    /// Enables the shared cache tier when set.
    pub redis_url: Option<String>,
    pub cache_ttl_secs: u64,
    pub refresh_interval_secs: u64,
    pub run_timeout_secs: u64,
    pub default_lookback_days: u32,
    /// Upper bound on the lookback of a fresh detection served on a cache and store miss.
    pub fallback_lookback_days: u32,
    pub min_orders: usize,
    pub refresh_users: Vec<UserId>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", 8080u16, "must be a valid u16")?;

        let database_path = required(&env_map, "DATABASE_PATH")?;
        let order_feed_url = required(&env_map, "ORDER_FEED_URL")?;
        let redis_url = env_map
            .get("REDIS_URL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let cache_ttl_secs = parse_or(&env_map, "CACHE_TTL_SECS", 900u64, "must be a valid u64")?;
        let refresh_interval_secs =
            parse_or(&env_map, "REFRESH_INTERVAL_SECS", 1800u64, "must be a valid u64")?;
        let run_timeout_secs =
            parse_or(&env_map, "RUN_TIMEOUT_SECS", 300u64, "must be a valid u64")?;
        if refresh_interval_secs == 0 || run_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "REFRESH_INTERVAL_SECS/RUN_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let default_lookback_days =
            parse_or(&env_map, "DEFAULT_LOOKBACK_DAYS", 365u32, "must be a valid u32")?;
        let fallback_lookback_days =
            parse_or(&env_map, "FALLBACK_LOOKBACK_DAYS", 90u32, "must be a valid u32")?;

        let min_orders = parse_or(&env_map, "MIN_ORDERS", 2usize, "must be a valid integer")?;
        if min_orders == 0 {
            return Err(ConfigError::InvalidValue(
                "MIN_ORDERS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let refresh_users = parse_refresh_users_from_map(&env_map)?;

        Ok(Config {
            port,
            database_path,
            order_feed_url,
            redis_url,
            cache_ttl_secs,
            refresh_interval_secs,
            run_timeout_secs,
            default_lookback_days,
            fallback_lookback_days,
            min_orders,
            refresh_users,
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
    expectation: &str,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), expectation.to_string())),
    }
}

fn parse_refresh_users_from_map(
    env_map: &HashMap<String, String>,
) -> Result<Vec<UserId>, ConfigError> {
    let raw: Vec<String> = if let Some(users_str) = env_map.get("REFRESH_USERS") {
        users_str.split(',').map(|s| s.trim().to_string()).collect()
    } else if let Some(file_path) = env_map.get("REFRESH_USERS_FILE") {
        let content = std::fs::read_to_string(file_path).map_err(|_| {
            ConfigError::InvalidValue(
                "REFRESH_USERS_FILE".to_string(),
                "file not found or unreadable".to_string(),
            )
        })?;
        content.lines().map(|line| line.trim().to_string()).collect()
    } else {
        Vec::new()
    };

    let mut users: Vec<UserId> = Vec::new();
    for id in raw.into_iter().filter(|s| !s.is_empty() && !s.starts_with('#')) {
        let user = UserId::new(id);
        if !users.contains(&user) {
            users.push(user);
        }
    }
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn base_env() -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("DATABASE_PATH".to_string(), "/tmp/chains.db".to_string());
        env.insert("ORDER_FEED_URL".to_string(), "http://feed.local".to_string());
        env
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(base_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.cache_ttl(), Duration::from_secs(900));
        assert_eq!(config.refresh_interval(), Duration::from_secs(1800));
        assert_eq!(config.run_timeout(), Duration::from_secs(300));
        assert_eq!(config.default_lookback_days, 365);
        assert_eq!(config.fallback_lookback_days, 90);
        assert_eq!(config.min_orders, 2);
        assert!(config.redis_url.is_none());
        assert!(config.refresh_users.is_empty());
    }

    #[test]
    fn test_missing_required() {
        let mut env = base_env();
        env.remove("ORDER_FEED_URL");
        assert!(matches!(
            Config::from_env_map(env),
            Err(ConfigError::MissingEnv(k)) if k == "ORDER_FEED_URL"
        ));
    }

    #[test]
    fn test_invalid_values() {
        let mut env = base_env();
        env.insert("PORT".to_string(), "99999".to_string());
        assert!(matches!(
            Config::from_env_map(env),
            Err(ConfigError::InvalidValue(k, _)) if k == "PORT"
        ));

        let mut env = base_env();
        env.insert("MIN_ORDERS".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_env_map(env),
            Err(ConfigError::InvalidValue(k, _)) if k == "MIN_ORDERS"
        ));
    }

    #[test]
    fn test_refresh_users_list_dedupes() {
        let mut env = base_env();
        env.insert("REFRESH_USERS".to_string(), " u1, u2 ,,u1".to_string());
        env.insert("REDIS_URL".to_string(), "redis://127.0.0.1/".to_string());
        let config = Config::from_env_map(env).unwrap();
        assert_eq!(config.refresh_users, vec![UserId::new("u1"), UserId::new("u2")]);
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1/"));
    }

    #[test]
    fn test_refresh_users_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "u1\n# comment\n\nu3").unwrap();

        let mut env = base_env();
        env.insert(
            "REFRESH_USERS_FILE".to_string(),
            file.path().to_string_lossy().to_string(),
        );
        let config = Config::from_env_map(env).unwrap();
        assert_eq!(config.refresh_users, vec![UserId::new("u1"), UserId::new("u3")]);

        let mut env = base_env();
        env.insert("REFRESH_USERS_FILE".to_string(), "/nonexistent/users".to_string());
        assert!(Config::from_env_map(env).is_err());
    }
}
