use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::booking::delivery::{DeliveryScheduler, DEFAULT_TURNAROUND_HOURS};
use crate::booking::retry::RetryPolicy;
use crate::booking::DEFAULT_CURRENCY;

pub const DEFAULT_CONFIG_FILE: &str = "peerbook.toml";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub booking: BookingConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingConfig {
    /// ISO 4217 code stamped on every booking.
    pub currency: String,
    /// Turnaround used when a service declares none.
    pub default_turnaround_hours: u32,
    pub max_write_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_backoff_multiplier: u32,
}

impl BookingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_write_attempts,
            base_delay_ms: self.retry_base_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    pub fn delivery_scheduler(&self) -> DeliveryScheduler {
        DeliveryScheduler::new(self.default_turnaround_hours)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub currency: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://peerbook.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            booking: BookingConfig {
                currency: DEFAULT_CURRENCY.to_string(),
                default_turnaround_hours: DEFAULT_TURNAROUND_HOURS,
                max_write_attempts: 3,
                retry_base_delay_ms: 50,
                retry_backoff_multiplier: 2,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    /// Defaults, then the config file, then `PEERBOOK_*` variables, then explicit overrides.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(booking) = patch.booking {
            if let Some(currency) = booking.currency {
                self.booking.currency = currency;
            }
            if let Some(hours) = booking.default_turnaround_hours {
                self.booking.default_turnaround_hours = hours;
            }
            if let Some(attempts) = booking.max_write_attempts {
                self.booking.max_write_attempts = attempts;
            }
            if let Some(delay) = booking.retry_base_delay_ms {
                self.booking.retry_base_delay_ms = delay;
            }
            if let Some(multiplier) = booking.retry_backoff_multiplier {
                self.booking.retry_backoff_multiplier = multiplier;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PEERBOOK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PEERBOOK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("PEERBOOK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PEERBOOK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PEERBOOK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PEERBOOK_BOOKING_CURRENCY") {
            self.booking.currency = value;
        }
        if let Some(value) = read_env("PEERBOOK_BOOKING_DEFAULT_TURNAROUND_HOURS") {
            self.booking.default_turnaround_hours =
                parse_u32("PEERBOOK_BOOKING_DEFAULT_TURNAROUND_HOURS", &value)?;
        }
        if let Some(value) = read_env("PEERBOOK_BOOKING_MAX_WRITE_ATTEMPTS") {
            self.booking.max_write_attempts =
                parse_u32("PEERBOOK_BOOKING_MAX_WRITE_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("PEERBOOK_BOOKING_RETRY_BASE_DELAY_MS") {
            self.booking.retry_base_delay_ms =
                parse_u64("PEERBOOK_BOOKING_RETRY_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("PEERBOOK_BOOKING_RETRY_BACKOFF_MULTIPLIER") {
            self.booking.retry_backoff_multiplier =
                parse_u32("PEERBOOK_BOOKING_RETRY_BACKOFF_MULTIPLIER", &value)?;
        }

        let log_level =
            read_env("PEERBOOK_LOGGING_LEVEL").or_else(|| read_env("PEERBOOK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PEERBOOK_LOGGING_FORMAT").or_else(|| read_env("PEERBOOK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(currency) = overrides.currency {
            self.booking.currency = currency;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_booking(&self.booking)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), Path::new("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces every `${VAR}` with the variable's value. Unset variables are an error.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_booking(booking: &BookingConfig) -> Result<(), ConfigError> {
    let currency = booking.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Err(ConfigError::Validation(format!(
            "booking.currency must be a three-letter ISO 4217 code, got `{currency}`"
        )));
    }

    if booking.default_turnaround_hours == 0 || booking.default_turnaround_hours > 24 * 90 {
        return Err(ConfigError::Validation(
            "booking.default_turnaround_hours must be in range 1..=2160".to_string(),
        ));
    }

    if booking.max_write_attempts == 0 || booking.max_write_attempts > 10 {
        return Err(ConfigError::Validation(
            "booking.max_write_attempts must be in range 1..=10".to_string(),
        ));
    }

    if booking.retry_base_delay_ms > 10_000 {
        return Err(ConfigError::Validation(
            "booking.retry_base_delay_ms must not exceed 10000".to_string(),
        ));
    }

    if booking.retry_backoff_multiplier == 0 {
        return Err(ConfigError::Validation(
            "booking.retry_backoff_multiplier must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    booking: Option<BookingPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BookingPatch {
    currency: Option<String>,
    default_turnaround_hours: Option<u32>,
    max_write_attempts: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    retry_backoff_multiplier: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::booking::retry::RetryPolicy;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid() -> Result<(), String> {
        let config = AppConfig::default();
        config.validate().map_err(|err| format!("defaults should validate: {err}"))?;

        ensure(config.booking.currency == "USD", "default currency should be USD")?;
        ensure(config.booking.default_turnaround_hours == 48, "fallback turnaround is 48h")?;
        ensure(
            config.booking.retry_policy() == RetryPolicy::default(),
            "default retry settings should match the default policy",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_PEERBOOK_DB_PATH", "/tmp/peerbook-interp.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("peerbook.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://${TEST_PEERBOOK_DB_PATH}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite:///tmp/peerbook-interp.db",
                "database url should be interpolated from the environment",
            )
        })();

        clear_vars(&["TEST_PEERBOOK_DB_PATH"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["TEST_PEERBOOK_UNSET_VAR"]);

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("peerbook.toml");
        fs::write(&path, "[booking]\ncurrency = \"${TEST_PEERBOOK_UNSET_VAR}\"\n")
            .map_err(|err| err.to_string())?;

        let error =
            match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
            {
                Ok(_) => return Err("expected interpolation failure".to_string()),
                Err(error) => error,
            };
        ensure(
            matches!(
                error,
                ConfigError::MissingEnvInterpolation { ref var } if var == "TEST_PEERBOOK_UNSET_VAR"
            ),
            "error should name the missing variable",
        )
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PEERBOOK_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("PEERBOOK_BOOKING_MAX_WRITE_ATTEMPTS", "5");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("peerbook.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[booking]
currency = "EUR"
max_write_attempts = 2
default_turnaround_hours = 72

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.booking.currency == "EUR", "file currency should beat the default")?;
            ensure(
                config.booking.max_write_attempts == 5,
                "env attempts should win over the file",
            )?;
            ensure(
                config.booking.delivery_scheduler()
                    == crate::booking::delivery::DeliveryScheduler::new(72),
                "file turnaround should reach the scheduler",
            )
        })();

        clear_vars(&["PEERBOOK_DATABASE_URL", "PEERBOOK_BOOKING_MAX_WRITE_ATTEMPTS"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PEERBOOK_LOG_LEVEL", "warn");
        env::set_var("PEERBOOK_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )
        })();

        clear_vars(&["PEERBOOK_LOG_LEVEL", "PEERBOOK_LOG_FORMAT"]);
        result
    }

    #[test]
    fn invalid_env_numbers_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PEERBOOK_BOOKING_DEFAULT_TURNAROUND_HOURS", "two days");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected an invalid override error".to_string()),
            Err(error) => ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "PEERBOOK_BOOKING_DEFAULT_TURNAROUND_HOURS"
                ),
                "error should name the variable",
            ),
        };

        clear_vars(&["PEERBOOK_BOOKING_DEFAULT_TURNAROUND_HOURS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                currency: Some("dollars".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }) {
            Ok(_) => {
                return Err("expected validation failure but config load succeeded".to_string())
            }
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("booking.currency")
        );
        ensure(has_message, "validation failure should mention booking.currency")
    }

    #[test]
    fn required_file_must_exist() -> Result<(), String> {
        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let missing = dir.path().join("absent.toml");

        let error = match AppConfig::load(LoadOptions {
            config_path: Some(missing.clone()),
            require_file: true,
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected missing file error".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::MissingConfigFile(ref path) if path == &missing),
            "error should carry the expected path",
        )
    }
}
