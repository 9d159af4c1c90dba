use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::ingest::DEFAULT_MAX_UPLOAD_BYTES;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_DATABASE_DIR: &str = "database";
const SESSION_DURATION: u64 = 24 * 60 * 60; // 24 hours in seconds
const PORT_ATTEMPTS: u16 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Server configuration
///
/// Read from the environment (after loading a `.env` file if present):
///
/// | Variable | Default |
/// |---|---|
/// | `HOST` | `127.0.0.1` |
/// | `PORT` | `5000` |
/// | `UPLOAD_DIR` | `uploads` |
/// | `DATABASE_DIR` | `database` |
/// | `MAX_UPLOAD_BYTES` | `10485760` |
/// | `STATIC_DIR` | unset |
/// | `ADMIN_USERS` | unset (comma-separated usernames) |
/// | `SESSION_TTL_SECS` | `86400` |
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// How many consecutive ports to try when `port` is taken
    pub port_attempts: u16,
    pub upload_dir: PathBuf,
    pub database_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Built frontend to serve for any unmatched route
    pub static_dir: Option<PathBuf>,
    /// Usernames granted the admin role when they register
    pub admin_users: Vec<String>,
    pub session_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            port_attempts: PORT_ATTEMPTS,
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            database_dir: PathBuf::from(DEFAULT_DATABASE_DIR),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            static_dir: None,
            admin_users: Vec::new(),
            session_ttl: Duration::from_secs(SESSION_DURATION),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset or blank keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(host) = get("HOST") {
            config.host = host;
        }
        if let Some(port) = get("PORT") {
            config.port = parse("PORT", &port)?;
        }
        if let Some(dir) = get("UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("DATABASE_DIR") {
            config.database_dir = PathBuf::from(dir);
        }
        if let Some(max) = get("MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = parse("MAX_UPLOAD_BYTES", &max)?;
        }
        config.static_dir = get("STATIC_DIR").map(PathBuf::from);
        if let Some(admins) = get("ADMIN_USERS") {
            config.admin_users = admins
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(ttl) = get("SESSION_TTL_SECS") {
            config.session_ttl = Duration::from_secs(parse("SESSION_TTL_SECS", &ttl)?);
        }

        Ok(config)
    }

    pub fn users_file(&self) -> PathBuf {
        self.database_dir.join("users.json")
    }

    pub fn uploads_db_dir(&self) -> PathBuf {
        self.database_dir.join("uploads")
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert!(config.static_dir.is_none());
        assert_eq!(config.session_ttl, Duration::from_secs(86400));
    }

    #[test]
    fn overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("MAX_UPLOAD_BYTES", "1024"),
            ("ADMIN_USERS", "root, ops ,,"),
            ("STATIC_DIR", "frontend/build"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.admin_users, vec!["root", "ops"]);
        assert_eq!(config.static_dir, Some(PathBuf::from("frontend/build")));
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = Config::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
