use peerbook_core::default_form_configuration;
use peerbook_core::domain::service::ServiceType;

use crate::commands::{to_data, CommandFailure, CommandResult};

/// Prints the intake form a new service of `service_type` starts with.
pub fn run(service_type: &str) -> CommandResult {
    match execute(service_type) {
        Ok((service_type, data)) => CommandResult::success_with_data(
            "form-template",
            format!("default {} form", service_type.as_str()),
            Some(data),
        ),
        Err(failure) => failure.into_result("form-template"),
    }
}

fn execute(raw: &str) -> Result<(ServiceType, serde_json::Value), CommandFailure> {
    let service_type = ServiceType::parse(raw).ok_or_else(|| {
        CommandFailure::input(format!(
            "unknown service type `{raw}`; expected one of essay_review, interview_prep, \
             sat_tutoring, act_tutoring, test_prep, application_strategy, other"
        ))
    })?;
    let data = to_data(&default_form_configuration(service_type))?;
    Ok((service_type, data))
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::run;

    #[test]
    fn essay_template_lists_priced_categories() {
        let result = run("essay_review");
        assert_eq!(result.exit_code, 0);

        let payload: Value = serde_json::from_str(&result.output).expect("json");
        assert_eq!(payload["command"], "form-template");
        assert!(payload["data"].to_string().contains("common_app_personal"));
    }

    #[test]
    fn unknown_type_is_an_input_error() {
        let result = run("astrology");
        assert_eq!(result.exit_code, 6);

        let payload: Value = serde_json::from_str(&result.output).expect("json");
        assert_eq!(payload["error_class"], "invalid_input");
    }
}
