use std::path::PathBuf;

use anyhow::Context;

pub const DEFAULT_SLEEP_API_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_DEVICE_ID_FILE: &str = ".device_id";

/// Settings read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub sleep_api_url: String,
    pub device_id: Option<String>,
    pub device_id_file: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            database_url: non_empty("DATABASE_URL"),
            sleep_api_url: non_empty("SLEEP_API_URL")
                .unwrap_or_else(|| DEFAULT_SLEEP_API_URL.to_string()),
            device_id: non_empty("DEVICE_ID"),
            device_id_file: non_empty("DEVICE_ID_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DEVICE_ID_FILE)),
        }
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a Postgres instance")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(|_| None);
        assert!(config.database_url().is_err());
        assert_eq!(config.sleep_api_url, DEFAULT_SLEEP_API_URL);
        assert_eq!(config.device_id, None);
        assert_eq!(config.device_id_file, PathBuf::from(DEFAULT_DEVICE_ID_FILE));
    }

    #[test]
    fn reads_values_and_ignores_blank_ones() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("DATABASE_URL", "postgres://localhost/sleep"),
            ("SLEEP_API_URL", "https://api.example.com"),
            ("DEVICE_ID", "  "),
        ]);
        let config = Config::from_lookup(|key| env.get(key).map(|value| value.to_string()));

        assert_eq!(config.database_url().unwrap(), "postgres://localhost/sleep");
        assert_eq!(config.sleep_api_url, "https://api.example.com");
        assert_eq!(config.device_id, None);
    }
}
