use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use peerbook_cli::commands::book::{self, BookArgs};
use peerbook_cli::commands::quote::{self, QuoteArgs};
use peerbook_cli::commands::transition::{self, ReviewArgs, TransitionArgs};
use peerbook_cli::commands::{config, doctor, migrate, seed};
use peerbook_core::config::LoadOptions;
use serde_json::{json, Value};
use tempfile::TempDir;

#[test]
fn migrate_returns_success_against_a_fresh_database() {
    let workspace = Workspace::new();
    with_env(&[("PEERBOOK_DATABASE_URL", workspace.database_url().as_str())], || {
        let result = migrate::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn invalid_configuration_fails_with_config_exit_code() {
    let workspace = Workspace::new();
    with_env(
        &[
            ("PEERBOOK_DATABASE_URL", workspace.database_url().as_str()),
            ("PEERBOOK_BOOKING_CURRENCY", "usd"),
        ],
        || {
            let result = migrate::run(&LoadOptions::default());
            assert_eq!(result.exit_code, 2, "expected config validation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");
        },
    );
}

#[test]
fn config_reports_env_sources() {
    let workspace = Workspace::new();
    with_env(
        &[
            ("PEERBOOK_DATABASE_URL", workspace.database_url().as_str()),
            ("PEERBOOK_LOG_LEVEL", "debug"),
        ],
        || {
            let result = config::run(&LoadOptions::default());
            assert_eq!(result.exit_code, 0);

            let payload = parse_payload(&result.output);
            let fields = payload["data"].as_array().expect("field list");
            let source_of = |key: &str| {
                fields
                    .iter()
                    .find(|field| field["key"] == key)
                    .map(|field| field["source"].as_str().unwrap_or_default().to_owned())
                    .expect("field present")
            };

            assert_eq!(source_of("database.url"), "env (PEERBOOK_DATABASE_URL)");
            assert_eq!(source_of("logging.level"), "env (PEERBOOK_LOG_LEVEL)");
            assert_eq!(source_of("booking.currency"), "default");
        },
    );
}

#[test]
fn doctor_passes_once_the_schema_is_current() {
    let workspace = Workspace::new();
    with_env(&[("PEERBOOK_DATABASE_URL", workspace.database_url().as_str())], || {
        let before = doctor::run(&LoadOptions::default(), true);
        assert_eq!(before.exit_code, 1, "fresh database has no schema: {}", before.output);
        let report = parse_payload(&before.output);
        let schema = report["checks"]
            .as_array()
            .and_then(|checks| checks.iter().find(|check| check["name"] == "schema_migrations"))
            .expect("schema check");
        assert_eq!(schema["status"], "fail");

        assert_eq!(migrate::run(&LoadOptions::default()).exit_code, 0);

        let after = doctor::run(&LoadOptions::default(), true);
        assert_eq!(after.exit_code, 0, "doctor report: {}", after.output);
        assert_eq!(parse_payload(&after.output)["overall_status"], "pass");
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let workspace = Workspace::new();
    with_env(&[("PEERBOOK_DATABASE_URL", workspace.database_url().as_str())], || {
        let first = seed::run(&LoadOptions::default(), None);
        assert_eq!(first.exit_code, 0, "expected first seed success: {}", first.output);
        let first_payload = parse_payload(&first.output);
        assert!(first_payload["message"]
            .as_str()
            .unwrap_or_default()
            .contains("svc-essay-review"));

        let second = seed::run(&LoadOptions::default(), None);
        assert_eq!(second.exit_code, 0, "expected second seed success");
        assert_eq!(first_payload["message"], parse_payload(&second.output)["message"]);
    });
}

#[test]
fn quote_prices_an_essay_submission() {
    let workspace = Workspace::new();
    let submission = workspace.write_json("essay.json", &essay_submission("sub-quote"));
    with_env(&[("PEERBOOK_DATABASE_URL", workspace.database_url().as_str())], || {
        assert_eq!(seed::run(&LoadOptions::default(), None).exit_code, 0);

        let result = quote::run(
            &LoadOptions::default(),
            &QuoteArgs {
                service_id: "svc-essay-review",
                submission_file: &submission,
                at: Some("2024-03-01T12:00:00Z"),
            },
        );
        assert_eq!(result.exit_code, 0, "quote output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert!(payload["message"].as_str().unwrap_or_default().starts_with("120.00 USD"));
        assert_eq!(payload["data"]["currency"], "USD");
    });
}

#[test]
fn quote_for_unknown_service_is_not_found() {
    let workspace = Workspace::new();
    let submission = workspace.write_json("essay.json", &essay_submission("sub-missing"));
    with_env(&[("PEERBOOK_DATABASE_URL", workspace.database_url().as_str())], || {
        let result = quote::run(
            &LoadOptions::default(),
            &QuoteArgs { service_id: "svc-astrology", submission_file: &submission, at: None },
        );
        assert_eq!(result.exit_code, 8);
        assert_eq!(parse_payload(&result.output)["error_class"], "service_not_found");
    });
}

#[test]
fn quote_reports_field_errors_for_incomplete_submissions() {
    let workspace = Workspace::new();
    let mut incomplete = essay_submission("sub-incomplete");
    if let Some(answers) = incomplete["answers"].as_object_mut() {
        answers.remove("essayCategory");
    }
    let submission = workspace.write_json("incomplete.json", &incomplete);
    with_env(&[("PEERBOOK_DATABASE_URL", workspace.database_url().as_str())], || {
        assert_eq!(seed::run(&LoadOptions::default(), None).exit_code, 0);

        let result = quote::run(
            &LoadOptions::default(),
            &QuoteArgs { service_id: "svc-essay-review", submission_file: &submission, at: None },
        );
        assert_eq!(result.exit_code, 7, "quote output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "validation_failed");
        let fields = payload["data"]["field_errors"].as_array().expect("field errors");
        assert!(fields.iter().any(|error| error["field"] == "essayCategory"));
    });
}

#[test]
fn unreadable_submission_is_an_input_error() {
    let workspace = Workspace::new();
    let missing = workspace.path("nope.json");
    with_env(&[("PEERBOOK_DATABASE_URL", workspace.database_url().as_str())], || {
        let result = book::run(
            &LoadOptions::default(),
            &BookArgs { student_id: "student-1", submission_file: &missing },
        );
        assert_eq!(result.exit_code, 6);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

#[test]
fn booking_replays_and_moves_through_its_lifecycle() {
    let workspace = Workspace::new();
    let submission = workspace.write_json("essay.json", &essay_submission("sub-book"));
    with_env(&[("PEERBOOK_DATABASE_URL", workspace.database_url().as_str())], || {
        let options = LoadOptions::default();
        assert_eq!(seed::run(&options, None).exit_code, 0);

        let args = BookArgs { student_id: "student-1", submission_file: &submission };
        let first = book::run(&options, &args);
        assert_eq!(first.exit_code, 0, "book output: {}", first.output);
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["data"]["replayed"], false);
        assert_eq!(first_payload["data"]["booking"]["status"], "pending");
        let booking_id =
            first_payload["data"]["booking"]["id"].as_str().expect("booking id").to_owned();

        let replay = book::run(&options, &args);
        assert_eq!(replay.exit_code, 0);
        let replay_payload = parse_payload(&replay.output);
        assert_eq!(replay_payload["data"]["replayed"], true);
        assert_eq!(replay_payload["data"]["booking"]["id"], booking_id.as_str());
        assert!(replay_payload["message"].as_str().unwrap_or_default().contains("already existed"));

        let refused = transition::run(
            &options,
            &TransitionArgs {
                booking_id: &booking_id,
                to: "confirmed",
                actor: "student",
                reason: None,
            },
        );
        assert_eq!(refused.exit_code, 7, "students cannot confirm: {}", refused.output);

        for status in ["confirmed", "in_progress", "completed"] {
            let result = transition::run(
                &options,
                &TransitionArgs {
                    booking_id: &booking_id,
                    to: status,
                    actor: "consultant",
                    reason: None,
                },
            );
            assert_eq!(result.exit_code, 0, "transition to {status}: {}", result.output);
            assert_eq!(parse_payload(&result.output)["data"]["status"], status);
        }

        let reviewed = transition::run_review(
            &options,
            &ReviewArgs { booking_id: &booking_id, rating: 5, text: Some("Sharp feedback") },
        );
        assert_eq!(reviewed.exit_code, 0, "review output: {}", reviewed.output);
    });
}

#[test]
fn transition_of_unknown_booking_is_not_found() {
    let workspace = Workspace::new();
    with_env(&[("PEERBOOK_DATABASE_URL", workspace.database_url().as_str())], || {
        let result = transition::run(
            &LoadOptions::default(),
            &TransitionArgs {
                booking_id: "bk-missing",
                to: "confirmed",
                actor: "consultant",
                reason: None,
            },
        );
        assert_eq!(result.exit_code, 8, "transition output: {}", result.output);
    });
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self { dir: TempDir::new().expect("temp dir") }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn database_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path("peerbook.db").display())
    }

    fn write_json(&self, name: &str, value: &Value) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, value.to_string()).expect("write submission");
        path
    }
}

fn essay_submission(submission_id: &str) -> Value {
    json!({
        "submission_id": submission_id,
        "service_id": "svc-essay-review",
        "price_tier_index": 0,
        "answers": {
            "essayCategory": "common_app_personal",
            "essayText": "The summer I rebuilt a tractor with my grandfather...",
            "wordCount": 640
        }
    })
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "PEERBOOK_DATABASE_URL",
        "PEERBOOK_DATABASE_MAX_CONNECTIONS",
        "PEERBOOK_DATABASE_TIMEOUT_SECS",
        "PEERBOOK_BOOKING_CURRENCY",
        "PEERBOOK_BOOKING_DEFAULT_TURNAROUND_HOURS",
        "PEERBOOK_BOOKING_MAX_WRITE_ATTEMPTS",
        "PEERBOOK_BOOKING_RETRY_BASE_DELAY_MS",
        "PEERBOOK_BOOKING_RETRY_BACKOFF_MULTIPLIER",
        "PEERBOOK_LOGGING_LEVEL",
        "PEERBOOK_LOGGING_FORMAT",
        "PEERBOOK_LOG_LEVEL",
        "PEERBOOK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
