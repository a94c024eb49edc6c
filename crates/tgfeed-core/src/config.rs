use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use crate::{errors::Error, store::StorageBackend, Result};

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
const MIN_UPDATE_INTERVAL_SECS: u64 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppEnv {
    Local,
    Development,
    Testing,
    Production,
}

impl AppEnv {
    /// Unknown values fall back to production.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "local" => AppEnv::Local,
            "development" | "dev" => AppEnv::Development,
            "testing" | "test" => AppEnv::Testing,
            _ => AppEnv::Production,
        }
    }

    pub fn is_production(self) -> bool {
        self == AppEnv::Production
    }
}

/// Typed configuration, read from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_api_url: String,
    pub allowed_users: Vec<i64>,

    // Storage
    pub storage_path: PathBuf,
    pub storage_backend: StorageBackend,

    // HTTP
    pub http_host: String,
    pub http_port: u16,
    pub public_base_url: String,

    // Monitor
    pub update_interval: Duration,

    pub app_env: AppEnv,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Existing variables win over `.env`.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `load` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).and_then(non_empty);

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        let telegram_api_url = get("TELEGRAM_API_URL")
            .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let allowed_users = parse_csv_i64(get("ALLOWED_USERS"));

        let storage_path = PathBuf::from(get("STORAGE_PATH").unwrap_or_else(|| "./data".to_string()));
        let storage_backend = match get("STORAGE_BACKEND").map(|s| s.to_lowercase()).as_deref() {
            None | Some("file") => StorageBackend::File,
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(Error::Config(format!(
                    "STORAGE_BACKEND must be `file` or `memory`, got `{other}`"
                )))
            }
        };

        let http_host = get("HTTP_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let http_port = match get("HTTP_PORT") {
            None => 8080,
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("HTTP_PORT is not a valid port: {p}")))?,
        };
        let public_base_url = get("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{http_port}"))
            .trim_end_matches('/')
            .to_string();

        let update_interval = Duration::from_secs(
            get("UPDATE_INTERVAL")
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60)
                .max(MIN_UPDATE_INTERVAL_SECS),
        );

        let app_env = get("APP_ENV")
            .map(|s| AppEnv::parse(&s))
            .unwrap_or(AppEnv::Production);

        Ok(Self {
            telegram_bot_token,
            telegram_api_url,
            allowed_users,
            storage_path,
            storage_backend,
            http_host,
            http_port,
            public_base_url,
            update_interval,
            app_env,
        })
    }

    pub fn http_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.http_host, self.http_port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid HTTP_HOST/HTTP_PORT: {e}")))
    }

    pub fn uses_default_api_url(&self) -> bool {
        self.telegram_api_url == DEFAULT_TELEGRAM_API_URL
    }
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn token_is_required() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(load(&[("TELEGRAM_BOT_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn defaults() {
        let cfg = load(&[("TELEGRAM_BOT_TOKEN", "t")]).unwrap();
        assert_eq!(cfg.storage_path, PathBuf::from("./data"));
        assert_eq!(cfg.storage_backend, StorageBackend::File);
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.public_base_url, "http://localhost:8080");
        assert_eq!(cfg.update_interval, Duration::from_secs(60));
        assert_eq!(cfg.app_env, AppEnv::Production);
        assert!(cfg.allowed_users.is_empty());
        assert!(cfg.uses_default_api_url());
        assert_eq!(cfg.http_addr().unwrap().port(), 8080);
    }

    #[test]
    fn overrides() {
        let cfg = load(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("ALLOWED_USERS", "1, 2,bogus,,3"),
            ("HTTP_PORT", "9000"),
            ("PUBLIC_BASE_URL", "https://feeds.example.org/"),
            ("UPDATE_INTERVAL", "0"),
            ("STORAGE_BACKEND", "Memory"),
            ("APP_ENV", "LOCAL"),
            ("TELEGRAM_API_URL", "http://127.0.0.1:8081/"),
        ])
        .unwrap();
        assert_eq!(cfg.allowed_users, vec![1, 2, 3]);
        assert_eq!(cfg.http_port, 9000);
        assert_eq!(cfg.public_base_url, "https://feeds.example.org");
        assert_eq!(cfg.update_interval, Duration::from_secs(1));
        assert_eq!(cfg.storage_backend, StorageBackend::Memory);
        assert_eq!(cfg.app_env, AppEnv::Local);
        assert_eq!(cfg.telegram_api_url, "http://127.0.0.1:8081");
        assert!(!cfg.uses_default_api_url());
    }

    #[test]
    fn bad_values_are_config_errors() {
        assert!(load(&[("TELEGRAM_BOT_TOKEN", "t"), ("HTTP_PORT", "99999")]).is_err());
        assert!(load(&[("TELEGRAM_BOT_TOKEN", "t"), ("STORAGE_BACKEND", "sql")]).is_err());
    }

    #[test]
    fn unknown_app_env_is_production() {
        assert_eq!(AppEnv::parse("staging"), AppEnv::Production);
        assert_eq!(AppEnv::parse(" Testing "), AppEnv::Testing);
    }
}
