//! Layered configuration for the lending service
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. `config/default.toml` (optional)
//! 3. `config/{RUN_MODE}.toml` (optional)
//! 4. `LIBRARY__SECTION__KEY` environment variables
//! 5. `DATABASE_URL` and `PORT`

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::application::LendingPolicy;
use crate::domain::loan::DEFAULT_LOAN_PERIOD_DAYS;

/// インメモリストアでの起動を許す実行モード
const DEVELOPMENT_MODES: [&str; 2] = ["development", "test"];

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// None selects the in-memory store
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LendingConfig {
    pub loan_period_days: u64,
    pub max_loans_per_member: Option<usize>,
    pub lock_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CatalogConfig {
    pub case_sensitive_search: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub session_ttl_hours: u64,
    pub bootstrap_admin: BootstrapAdmin,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    /// `RUN_MODE`。未設定は開発モードとして扱う
    pub run_mode: Option<String>,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub lending: LendingConfig,
    pub catalog: CatalogConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // e.g. LIBRARY__LENDING__LOAN_PERIOD_DAYS=21
            .add_source(
                Environment::with_prefix("LIBRARY")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override("run_mode", run_mode)?
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .set_override_option("server.port", env::var("PORT").ok())?
            .build()?;

        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        config.try_deserialize()
    }

    pub fn is_development(&self) -> bool {
        self.run_mode
            .as_deref()
            .is_none_or(|mode| DEVELOPMENT_MODES.contains(&mode))
    }

    /// 使用するデータベースURL
    ///
    /// 未設定の場合、開発モードでは`None`（インメモリストア）、
    /// それ以外の実行モードではエラー。インメモリストアは再起動で状態を失う。
    pub fn database_url(&self) -> Result<Option<&str>, ConfigError> {
        match self.database.url.as_deref() {
            Some(url) => Ok(Some(url)),
            None if self.is_development() => Ok(None),
            None => Err(ConfigError::Message(format!(
                "database.url (or DATABASE_URL) is required when RUN_MODE={}",
                self.run_mode.as_deref().unwrap_or_default()
            ))),
        }
    }

    /// 貸出ルールの設定値を組み立てる
    pub fn lending_policy(&self) -> LendingPolicy {
        LendingPolicy {
            loan_period_days: self.lending.loan_period_days,
            max_loans_per_member: self.lending.max_loans_per_member,
            lock_timeout: Duration::from_millis(self.lending.lock_timeout_ms),
            case_sensitive_search: self.catalog.case_sensitive_search,
        }
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        let hours = i64::try_from(self.auth.session_ttl_hours).unwrap_or(i64::MAX);
        chrono::Duration::try_hours(hours).unwrap_or(chrono::Duration::MAX)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

impl Default for LendingConfig {
    fn default() -> Self {
        Self {
            loan_period_days: DEFAULT_LOAN_PERIOD_DAYS,
            max_loans_per_member: None,
            lock_timeout_ms: 2000,
        }
    }
}

impl Default for BootstrapAdmin {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 12,
            bootstrap_admin: BootstrapAdmin::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> AppConfig {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap();
        AppConfig::from_config(config).unwrap()
    }

    #[test]
    fn test_defaults_match_lending_policy_defaults() {
        let config = from_toml("");
        assert_eq!(config.lending_policy(), LendingPolicy::default());
        assert_eq!(config.database.url, None);
        assert_eq!(config.auth.bootstrap_admin.username, "admin");
        assert_eq!(config.session_ttl(), chrono::Duration::hours(12));
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = from_toml(
            r#"
            [lending]
            max_loans_per_member = 3

            [catalog]
            case_sensitive_search = true
            "#,
        );

        let policy = config.lending_policy();
        assert_eq!(policy.max_loans_per_member, Some(3));
        assert_eq!(policy.loan_period_days, 14);
        assert_eq!(policy.lock_timeout, Duration::from_millis(2000));
        assert!(policy.case_sensitive_search);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_in_memory_store_only_in_development() {
        let config = from_toml("");
        assert!(config.is_development());
        assert_eq!(config.database_url().unwrap(), None);

        let config = from_toml(r#"run_mode = "test""#);
        assert_eq!(config.database_url().unwrap(), None);

        let config = from_toml(r#"run_mode = "production""#);
        assert!(!config.is_development());
        assert!(config.database_url().is_err());

        let config = from_toml(
            r#"
            run_mode = "production"

            [database]
            url = "postgres://localhost/library_lending"
            "#,
        );
        assert_eq!(
            config.database_url().unwrap(),
            Some("postgres://localhost/library_lending")
        );
    }
}
