use std::{env, path::PathBuf};

use dotenv::dotenv;

pub const DB_HOST: &str = "DB_HOST";
pub const DB_PORT: &str = "DB_PORT";
pub const DB_NAME: &str = "DB_NAME";
pub const DB_USER: &str = "DB_USER";
pub const DB_PASSWORD: &str = "DB_PASSWORD";
pub const CSV_FILE_PATH: &str = "CSV_FILE_PATH";

/// Keys that must be present and non-empty, in the order they are reported.
pub const REQUIRED_KEYS: [&str; 4] = [DB_HOST, DB_NAME, DB_USER, DB_PASSWORD];

pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_CSV_FILE_PATH: &str = "/workspace/transactions.csv";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variables: {}", .0.join(", "))]
    MissingKeys(Vec<&'static str>),

    #[error("DB_PORT must be a valid port number, got `{0}`")]
    InvalidPort(String),
}

/// Everything the loader needs, read once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub csv_file_path: PathBuf,
}

// The password stays out of logs.
impl std::fmt::Debug for LoaderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("csv_file_path", &self.csv_file_path)
            .finish()
    }
}

impl LoaderConfig {
    /// Reads the process environment, after loading a `.env` file from the working
    /// directory if one exists. Variables already set win over the file.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let missing: Vec<&'static str> =
            REQUIRED_KEYS.iter().copied().filter(|key| value(*key).is_none()).collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingKeys(missing));
        }

        let port = match value(DB_PORT) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort(raw))?,
            None => DEFAULT_DB_PORT,
        };

        let csv_file_path =
            value(CSV_FILE_PATH).unwrap_or_else(|| DEFAULT_CSV_FILE_PATH.to_string());

        Ok(LoaderConfig {
            host: value(DB_HOST).unwrap_or_default(),
            port,
            database: value(DB_NAME).unwrap_or_default(),
            user: value(DB_USER).unwrap_or_default(),
            password: value(DB_PASSWORD).unwrap_or_default(),
            csv_file_path: PathBuf::from(csv_file_path),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            (DB_HOST, "db.internal"),
            (DB_NAME, "curso_db"),
            (DB_USER, "curso_user"),
            (DB_PASSWORD, "secret"),
        ]
    }

    #[test]
    fn test_defaults_applied() {
        let config = LoaderConfig::from_lookup(lookup_from(&full_env())).unwrap();

        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 5432);
        assert_eq!(config.database, "curso_db");
        assert_eq!(config.user, "curso_user");
        assert_eq!(config.password, "secret");
        assert_eq!(config.csv_file_path, PathBuf::from("/workspace/transactions.csv"));
    }

    #[test]
    fn test_optional_values_override_defaults() {
        let mut env = full_env();
        env.push((DB_PORT, "6543"));
        env.push((CSV_FILE_PATH, "/tmp/input.csv"));

        let config = LoaderConfig::from_lookup(lookup_from(&env)).unwrap();

        assert_eq!(config.port, 6543);
        assert_eq!(config.csv_file_path, PathBuf::from("/tmp/input.csv"));
    }

    #[test]
    fn test_missing_password_reported() {
        let env: Vec<_> = full_env().into_iter().filter(|(k, _)| *k != DB_PASSWORD).collect();

        let err = LoaderConfig::from_lookup(lookup_from(&env)).unwrap_err();

        assert_eq!(err, ConfigError::MissingKeys(vec![DB_PASSWORD]));
        assert_eq!(err.to_string(), "Missing environment variables: DB_PASSWORD");
    }

    #[test]
    fn test_every_missing_key_enumerated() {
        let err = LoaderConfig::from_lookup(lookup_from(&[(DB_NAME, "curso_db")])).unwrap_err();

        assert_eq!(err, ConfigError::MissingKeys(vec![DB_HOST, DB_USER, DB_PASSWORD]));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let mut env = full_env();
        env.retain(|(k, _)| *k != DB_USER);
        env.push((DB_USER, ""));

        let err = LoaderConfig::from_lookup(lookup_from(&env)).unwrap_err();

        assert_eq!(err, ConfigError::MissingKeys(vec![DB_USER]));
    }

    #[test]
    fn test_invalid_port_rejected() {
        let mut env = full_env();
        env.push((DB_PORT, "not-a-port"));

        let err = LoaderConfig::from_lookup(lookup_from(&env)).unwrap_err();

        assert_eq!(err, ConfigError::InvalidPort("not-a-port".to_string()));
    }

    #[test]
    fn test_debug_hides_password() {
        let config = LoaderConfig::from_lookup(lookup_from(&full_env())).unwrap();

        let debug = format!("{:?}", config);

        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }
}
