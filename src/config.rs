use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;
pub(crate) const DEFAULT_IDEMPOTENCY_TTL_SECS: u64 = 600; // 10 minutes

/// How a job-completion batch treats a failing issue.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchPolicy {
    /// Each issue is reconciled on its own; failures are reported per issue
    #[default]
    BestEffort,
    /// Every issue is validated first; any failure aborts the whole batch
    Atomic,
}

/// Reconciliation settings
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ReconciliationConfig {
    #[serde(default)]
    pub batch_policy: BatchPolicy,
}

/// Allocation settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AllocationConfig {
    /// How long a committed request id is remembered for replay (seconds)
    #[serde(default = "default_idempotency_ttl_secs")]
    #[validate(range(min = 1, max = 86400))]
    pub idempotency_ttl_secs: u64,

    /// Reject commits that do not carry a request id
    #[serde(default)]
    pub require_request_id: bool,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl_secs: default_idempotency_ttl_secs(),
            require_request_id: false,
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    #[serde(default)]
    #[validate]
    pub reconciliation: ReconciliationConfig,

    #[serde(default)]
    #[validate]
    pub allocation: AllocationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENV.to_string(),
            log_level: default_log_level(),
            log_json: false,
            event_channel_capacity: default_event_channel_capacity(),
            reconciliation: ReconciliationConfig::default(),
            allocation: AllocationConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn batch_policy(&self) -> BatchPolicy {
        self.reconciliation.batch_policy
    }

    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.allocation.idempotency_ttl_secs)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn default_idempotency_ttl_secs() -> u64 {
    DEFAULT_IDEMPOTENCY_TTL_SECS
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("rackline={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration from the `config` directory
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (`{dir}/default.toml`)
/// 3. Environment-specific config (`{dir}/{env}.toml`)
/// 4. Environment variables (`APP__*`, nested keys separated by `__`)
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; using built-in defaults and environment",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(&run_env)).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, filename: &str, content: &str) {
        fs::write(dir.path().join(filename), content).unwrap();
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.batch_policy(), BatchPolicy::BestEffort);
        assert_eq!(cfg.idempotency_ttl(), Duration::from_secs(600));
        assert!(cfg.is_development());
    }

    #[test]
    fn invalid_log_level_fails_validation() {
        let cfg = AppConfig {
            log_level: "chatty".into(),
            ..AppConfig::default()
        };
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("log_level"));
    }

    #[test]
    fn zero_event_capacity_fails_validation() {
        let cfg = AppConfig {
            event_channel_capacity: 0,
            ..AppConfig::default()
        };
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("event_channel_capacity"));

        let cfg = AppConfig {
            event_channel_capacity: 1,
            ..AppConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_idempotency_ttl_fails_validation() {
        let cfg = AppConfig {
            allocation: AllocationConfig {
                idempotency_ttl_secs: 0,
                require_request_id: false,
            },
            ..AppConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn batch_policy_parses_from_snake_case() {
        assert_eq!(BatchPolicy::from_str("atomic").unwrap(), BatchPolicy::Atomic);
        assert_eq!(BatchPolicy::BestEffort.to_string(), "best_effort");
    }

    #[test]
    fn init_tracing_tolerates_repeat_calls() {
        init_tracing("debug", true);
        init_tracing("info", false);
    }

    #[test]
    fn load_config_reads_default_file() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            "default.toml",
            r#"
                log_level = "debug"
                event_channel_capacity = 64

                [reconciliation]
                batch_policy = "atomic"

                [allocation]
                idempotency_ttl_secs = 30
                require_request_id = true
            "#,
        );

        let cfg = load_config_from(dir.path()).unwrap();

        assert_eq!(cfg.log_level(), "debug");
        assert_eq!(cfg.event_channel_capacity, 64);
        assert_eq!(cfg.batch_policy(), BatchPolicy::Atomic);
        assert_eq!(cfg.idempotency_ttl(), Duration::from_secs(30));
        assert!(cfg.allocation.require_request_id);
    }

    #[test]
    fn load_config_without_directory_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = load_config_from(&dir.path().join("missing")).unwrap();
        assert_eq!(cfg.log_level(), DEFAULT_LOG_LEVEL);
        assert_eq!(cfg.batch_policy(), BatchPolicy::BestEffort);
    }

    #[test]
    fn load_config_rejects_invalid_values() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "default.toml", "log_level = \"loud\"\n");

        let result = load_config_from(dir.path());
        assert!(matches!(result, Err(AppConfigError::Validation(_))));
    }

    #[test]
    fn load_config_rejects_unknown_keys() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "default.toml", "jwt_secret = \"nope\"\n");

        let result = load_config_from(dir.path());
        assert!(matches!(result, Err(AppConfigError::Load(_))));
    }
}
