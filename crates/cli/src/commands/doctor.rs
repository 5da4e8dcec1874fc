use peerbook_core::config::{AppConfig, LoadOptions};
use peerbook_core::default_form_configuration;
use peerbook_core::domain::service::ServiceType;
use peerbook_db::{connect_with_config, migrations::MIGRATOR, DbPool};
use serde::Serialize;
use sqlx::Row;

use crate::commands::{build_runtime, CommandResult};

const SERVICE_TYPES: [ServiceType; 7] = [
    ServiceType::EssayReview,
    ServiceType::InterviewPrep,
    ServiceType::SatTutoring,
    ServiceType::ActTutoring,
    ServiceType::TestPrep,
    ServiceType::ApplicationStrategy,
    ServiceType::Other,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: &LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                concat!(
                    "{{\"overall_status\":\"fail\",",
                    "\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}"
                ),
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(options: &LoadOptions) -> DoctorReport {
    let mut checks = vec![check_form_templates()];

    match AppConfig::load(options.clone()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: format!(
                    "configuration loaded; bookings priced in {}",
                    config.booking.currency
                ),
            });
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["database_connectivity", "schema_migrations"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_form_templates() -> DoctorCheck {
    let broken: Vec<String> = SERVICE_TYPES
        .iter()
        .filter_map(|service_type| {
            default_form_configuration(*service_type)
                .validate()
                .err()
                .map(|error| format!("{}: {error}", service_type.as_str()))
        })
        .collect();

    if broken.is_empty() {
        DoctorCheck {
            name: "form_templates",
            status: CheckStatus::Pass,
            details: format!("{} default form templates are valid", SERVICE_TYPES.len()),
        }
    } else {
        DoctorCheck {
            name: "form_templates",
            status: CheckStatus::Fail,
            details: broken.join("; "),
        }
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match build_runtime() {
        Ok(runtime) => runtime,
        Err(failure) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: failure.message,
            }];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    DoctorCheck {
                        name: "schema_migrations",
                        status: CheckStatus::Skipped,
                        details: "skipped because the database is unreachable".to_string(),
                    },
                ];
            }
        };

        let connectivity = DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        };
        let migrations = check_migrations(&pool).await;
        pool.close().await;
        vec![connectivity, migrations]
    })
}

async fn check_migrations(pool: &DbPool) -> DoctorCheck {
    let known = MIGRATOR.iter().filter(|m| !m.migration_type.is_down_migration()).count();

    match applied_migrations(pool).await {
        Ok(applied) if applied as usize >= known => DoctorCheck {
            name: "schema_migrations",
            status: CheckStatus::Pass,
            details: format!("{applied} of {known} migrations applied"),
        },
        Ok(applied) => DoctorCheck {
            name: "schema_migrations",
            status: CheckStatus::Fail,
            details: format!("{applied} of {known} migrations applied; run `peerbook migrate`"),
        },
        Err(error) => DoctorCheck {
            name: "schema_migrations",
            status: CheckStatus::Fail,
            details: format!("could not read migration history: {error}"),
        },
    }
}

async fn applied_migrations(pool: &DbPool) -> Result<i64, sqlx::Error> {
    let tracked: i64 = sqlx::query(
        "SELECT COUNT(*) AS count FROM sqlite_master
         WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?
    .try_get("count")?;
    if tracked == 0 {
        return Ok(0);
    }

    sqlx::query("SELECT COUNT(*) AS count FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await?
        .try_get("count")
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
