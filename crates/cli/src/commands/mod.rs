pub mod book;
pub mod config;
pub mod doctor;
pub mod form_template;
pub mod migrate;
pub mod quote;
pub mod seed;
pub mod transition;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use peerbook_core::booking::ports::{IdentityProvider, ServiceCatalog};
use peerbook_core::booking::BookingEngine;
use peerbook_core::config::{AppConfig, LoadOptions};
use peerbook_core::domain::service::{Service, ServiceId};
use peerbook_core::errors::{ApplicationError, BookingError, InterfaceError};
use peerbook_core::forms::DeterministicSubmissionValidator;
use peerbook_core::{BookingOrchestrator, DeterministicPricingCalculator, TracingAuditSink};
use peerbook_db::{connect_with_config, migrations, DbPool, SqlStores};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DB_CONNECTIVITY: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_INPUT: u8 = 6;
pub const EXIT_REJECTED: u8 = 7;
pub const EXIT_NOT_FOUND: u8 = 8;
pub const EXIT_UNAVAILABLE: u8 = 9;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &'static str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        CommandFailure::new(error_class, message, exit_code).into_result(command)
    }
}

/// A command that stopped early, carried up to `run` and rendered as an error payload.
#[derive(Debug)]
pub struct CommandFailure {
    pub error_class: &'static str,
    pub message: String,
    pub exit_code: u8,
    pub data: Option<Value>,
}

impl CommandFailure {
    pub fn new(error_class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { error_class, message: message.into(), exit_code, data: None }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::new("invalid_input", message, EXIT_INPUT)
    }

    pub fn into_result(self, command: &str) -> CommandResult {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(self.error_class.to_string()),
            message: self.message,
            data: self.data,
        };
        CommandResult { exit_code: self.exit_code, output: serialize_payload(payload) }
    }
}

impl From<BookingError> for CommandFailure {
    fn from(error: BookingError) -> Self {
        let error_class = error.error_class();
        let field_errors = error.field_errors().to_vec();
        let correlation_id = format!("cli-{}", chrono::Utc::now().timestamp_millis());
        let interface = ApplicationError::from(error.clone()).into_interface(correlation_id);

        let (message, exit_code) = match &interface {
            InterfaceError::NotFound { .. } => (error.to_string(), EXIT_NOT_FOUND),
            InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => {
                (interface.user_message().to_owned(), EXIT_UNAVAILABLE)
            }
            InterfaceError::Unauthorized { .. }
            | InterfaceError::BadRequest { .. }
            | InterfaceError::Conflict { .. } => (error.to_string(), EXIT_REJECTED),
        };

        let failure = Self::new(error_class, message, exit_code);
        if field_errors.is_empty() {
            failure
        } else {
            failure.with_data(serde_json::json!({ "field_errors": field_errors }))
        }
    }
}

pub(crate) fn load_config(options: &LoadOptions) -> Result<AppConfig, CommandFailure> {
    AppConfig::load(options.clone()).map_err(|error| {
        CommandFailure::new(
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

pub(crate) fn build_runtime() -> Result<Runtime, CommandFailure> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandFailure::new(
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

/// Connects and brings the schema up to date; every data command starts here.
pub(crate) async fn open_database(config: &AppConfig) -> Result<DbPool, CommandFailure> {
    let pool = connect_with_config(&config.database).await.map_err(|error| {
        CommandFailure::new("db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY)
    })?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| CommandFailure::new("migration", error.to_string(), EXIT_MIGRATION))?;
    Ok(pool)
}

pub(crate) fn booking_engine(
    config: &AppConfig,
) -> BookingEngine<DeterministicSubmissionValidator, DeterministicPricingCalculator> {
    BookingEngine::new(
        DeterministicSubmissionValidator,
        DeterministicPricingCalculator,
        config.booking.delivery_scheduler(),
        config.booking.currency.clone(),
    )
}

pub(crate) fn orchestrator(
    config: &AppConfig,
    stores: &SqlStores,
    identity: Arc<dyn IdentityProvider>,
) -> BookingOrchestrator {
    BookingOrchestrator::new(booking_engine(config), stores.ports(identity))
        .with_retry_policy(config.booking.retry_policy())
        .with_audit_sink(Arc::new(TracingAuditSink))
}

pub(crate) async fn find_service(
    catalog: &dyn ServiceCatalog,
    id: &ServiceId,
) -> Result<Service, CommandFailure> {
    match catalog.find(id).await {
        Ok(Some(service)) => Ok(service),
        Ok(None) => Err(CommandFailure::new(
            "service_not_found",
            format!("service {id} does not exist; run `peerbook seed` first"),
            EXIT_NOT_FOUND,
        )),
        Err(error) => {
            Err(CommandFailure::new("persistence_failed", error.to_string(), EXIT_UNAVAILABLE))
        }
    }
}

pub(crate) fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, CommandFailure> {
    read_json(path).map_err(|error| CommandFailure::input(format!("{error:#}")))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("`{}` is not valid JSON", path.display()))
}

pub(crate) fn to_data<T: Serialize>(value: &T) -> Result<Value, CommandFailure> {
    serde_json::to_value(value).map_err(|error| {
        CommandFailure::new("serialization", error.to_string(), EXIT_RUNTIME)
    })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            concat!(
                "{{\"command\":\"unknown\",\"status\":\"error\",",
                "\"error_class\":\"serialization\",\"message\":\"{}\"}}"
            ),
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use peerbook_core::errors::{BookingError, PersistenceError};
    use peerbook_core::forms::{FieldError, FieldErrorReason};
    use serde_json::Value;

    use super::{CommandFailure, CommandResult, EXIT_REJECTED, EXIT_UNAVAILABLE};

    fn payload(result: &CommandResult) -> Value {
        serde_json::from_str(&result.output).expect("valid json")
    }

    #[test]
    fn success_payload_omits_absent_data() {
        let result = CommandResult::success("migrate", "applied pending migrations");
        let payload = payload(&result);

        assert_eq!(result.exit_code, 0);
        assert_eq!(payload["status"], "ok");
        assert!(payload["error_class"].is_null());
        assert!(payload.get("data").is_none());
    }

    #[test]
    fn persistence_failures_hide_the_cause() {
        let failure = CommandFailure::from(BookingError::PersistenceFailed(
            PersistenceError::Unavailable("database is locked".to_owned()),
        ));

        assert_eq!(failure.exit_code, EXIT_UNAVAILABLE);
        assert_eq!(failure.error_class, "persistence_failed");
        assert_eq!(failure.message, "Couldn't complete booking, try again.");
    }

    #[test]
    fn validation_failures_carry_field_errors() {
        let failure = CommandFailure::from(BookingError::ValidationFailed(vec![FieldError {
            field: "essayCategory".to_owned(),
            reason: FieldErrorReason::MissingRequired,
            message: "Essay category is required".to_owned(),
        }]));
        assert_eq!(failure.exit_code, EXIT_REJECTED);

        let payload = payload(&failure.into_result("quote"));
        assert_eq!(payload["error_class"], "validation_failed");
        assert_eq!(payload["data"]["field_errors"][0]["field"], "essayCategory");
        assert_eq!(payload["data"]["field_errors"][0]["reason"], "missing_required");
    }
}
