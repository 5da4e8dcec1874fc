use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use peerbook_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use serde::Serialize;
use toml::Value;

use crate::commands::{load_config, to_data, CommandResult};

#[derive(Debug, Serialize)]
struct EffectiveField {
    key: &'static str,
    value: String,
    source: String,
}

/// Where one setting can come from, highest precedence first.
struct FieldOrigin {
    key: &'static str,
    env_keys: &'static [&'static str],
    flag: Option<&'static str>,
}

const FIELDS: [FieldOrigin; 10] = [
    FieldOrigin {
        key: "database.url",
        env_keys: &["PEERBOOK_DATABASE_URL"],
        flag: Some("--database-url"),
    },
    FieldOrigin {
        key: "database.max_connections",
        env_keys: &["PEERBOOK_DATABASE_MAX_CONNECTIONS"],
        flag: None,
    },
    FieldOrigin {
        key: "database.timeout_secs",
        env_keys: &["PEERBOOK_DATABASE_TIMEOUT_SECS"],
        flag: None,
    },
    FieldOrigin { key: "booking.currency", env_keys: &["PEERBOOK_BOOKING_CURRENCY"], flag: None },
    FieldOrigin {
        key: "booking.default_turnaround_hours",
        env_keys: &["PEERBOOK_BOOKING_DEFAULT_TURNAROUND_HOURS"],
        flag: None,
    },
    FieldOrigin {
        key: "booking.max_write_attempts",
        env_keys: &["PEERBOOK_BOOKING_MAX_WRITE_ATTEMPTS"],
        flag: None,
    },
    FieldOrigin {
        key: "booking.retry_base_delay_ms",
        env_keys: &["PEERBOOK_BOOKING_RETRY_BASE_DELAY_MS"],
        flag: None,
    },
    FieldOrigin {
        key: "booking.retry_backoff_multiplier",
        env_keys: &["PEERBOOK_BOOKING_RETRY_BACKOFF_MULTIPLIER"],
        flag: None,
    },
    FieldOrigin {
        key: "logging.level",
        env_keys: &["PEERBOOK_LOGGING_LEVEL", "PEERBOOK_LOG_LEVEL"],
        flag: Some("--log-level"),
    },
    FieldOrigin {
        key: "logging.format",
        env_keys: &["PEERBOOK_LOGGING_FORMAT", "PEERBOOK_LOG_FORMAT"],
        flag: None,
    },
];

/// Effective configuration with the source of every value.
pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return failure.into_result("config"),
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields: Vec<EffectiveField> = FIELDS
        .iter()
        .map(|origin| EffectiveField {
            key: origin.key,
            value: effective_value(&config, origin.key),
            source: field_source(
                origin,
                options,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
        })
        .collect();

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    lines.extend(fields.iter().map(render_line));

    match to_data(&fields) {
        Ok(data) => CommandResult::success_with_data("config", lines.join("\n"), Some(data)),
        Err(failure) => failure.into_result("config"),
    }
}

fn effective_value(config: &AppConfig, key: &str) -> String {
    match key {
        "database.url" => config.database.url.clone(),
        "database.max_connections" => config.database.max_connections.to_string(),
        "database.timeout_secs" => config.database.timeout_secs.to_string(),
        "booking.currency" => config.booking.currency.clone(),
        "booking.default_turnaround_hours" => config.booking.default_turnaround_hours.to_string(),
        "booking.max_write_attempts" => config.booking.max_write_attempts.to_string(),
        "booking.retry_base_delay_ms" => config.booking.retry_base_delay_ms.to_string(),
        "booking.retry_backoff_multiplier" => config.booking.retry_backoff_multiplier.to_string(),
        "logging.level" => config.logging.level.clone(),
        "logging.format" => format!("{:?}", config.logging.format).to_lowercase(),
        _ => "<unknown>".to_string(),
    }
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from(DEFAULT_CONFIG_FILE);
    if root.exists() {
        return Some(root);
    }

    let nested = Path::new("config").join(DEFAULT_CONFIG_FILE);
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    origin: &FieldOrigin,
    options: &LoadOptions,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(flag) = origin.flag {
        let flagged = match origin.key {
            "database.url" => options.overrides.database_url.is_some(),
            "logging.level" => options.overrides.log_level.is_some(),
            _ => false,
        };
        if flagged {
            return format!("flag ({flag})");
        }
    }

    if let Some(env_key) = origin.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, origin.key) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(field: &EffectiveField) -> String {
    format!("- {} = {} (source: {})", field.key, field.value, field.source)
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::contains_path;

    #[test]
    fn dotted_paths_walk_nested_tables() {
        let doc: Value = "[booking]\ncurrency = \"EUR\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "booking.currency"));
        assert!(!contains_path(&doc, "booking.max_write_attempts"));
        assert!(!contains_path(&doc, "database.url"));
    }
}
