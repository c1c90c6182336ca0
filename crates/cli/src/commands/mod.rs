pub mod config;
pub mod context;
pub mod decide;
pub mod lifecycle;
pub mod migrate;
pub mod seed;
pub mod show;
pub mod stats;
pub mod views;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use countersign_core::domain::{parse_amount, Decision};
use countersign_core::{ApplicationStatus, EngineError, InterfaceError, Priority};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: Some(message.into()),
            hint: None,
            correlation_id: None,
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn success_with_data(command: &str, data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => {
                let payload = CommandOutcome {
                    command: command.to_string(),
                    status: "ok".to_string(),
                    error_class: None,
                    message: None,
                    hint: None,
                    correlation_id: None,
                    data: Some(data),
                };
                Self { exit_code: 0, output: serialize_payload(payload) }
            }
            Err(error) => Self::failure(command, "serialization", error.to_string(), 3),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        CommandFailure::new_owned(error_class, message, exit_code).into_result(command)
    }
}

/// A failed command step, already classified for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub error_class: String,
    pub message: String,
    pub exit_code: u8,
    pub hint: Option<String>,
    pub correlation_id: Option<String>,
}

impl CommandFailure {
    pub fn new(error_class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self::new_owned(error_class, message, exit_code)
    }

    fn new_owned(error_class: &str, message: impl Into<String>, exit_code: u8) -> Self {
        Self {
            error_class: error_class.to_string(),
            message: message.into(),
            exit_code,
            hint: None,
            correlation_id: None,
        }
    }

    pub fn into_result(self, command: &str) -> CommandResult {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(self.error_class),
            message: Some(self.message),
            hint: self.hint,
            correlation_id: self.correlation_id,
            data: None,
        };
        CommandResult { exit_code: self.exit_code, output: serialize_payload(payload) }
    }
}

impl From<InterfaceError> for CommandFailure {
    fn from(error: InterfaceError) -> Self {
        let exit_code = match &error {
            InterfaceError::BadRequest { .. } => 10,
            InterfaceError::Forbidden { .. } => 11,
            InterfaceError::Conflict { .. } => 12,
            InterfaceError::NotFound { .. } => 13,
            InterfaceError::ServiceUnavailable { .. } => 14,
        };
        Self {
            error_class: error.class().to_string(),
            message: error.message().to_string(),
            exit_code,
            hint: Some(error.user_message().to_string()),
            correlation_id: Some(error.correlation_id().to_string()),
        }
    }
}

impl From<EngineError> for CommandFailure {
    fn from(error: EngineError) -> Self {
        Self::from(error.into_interface(Uuid::new_v4().to_string()))
    }
}

/// Turns the outcome of a runtime step into the single JSON payload a command prints.
pub fn finish<T: Serialize>(command: &str, result: Result<T, CommandFailure>) -> CommandResult {
    match result {
        Ok(data) => CommandResult::success_with_data(command, data),
        Err(failure) => failure.into_result(command),
    }
}

pub(crate) fn parse_amount_arg(raw: &str) -> Result<Decimal, String> {
    parse_amount(raw).ok_or_else(|| format!("`{raw}` is not a decimal amount"))
}

pub(crate) fn parse_priority_arg(raw: &str) -> Result<Priority, String> {
    Priority::parse(raw).ok_or_else(|| format!("`{raw}` is not one of low, normal, high, urgent"))
}

pub(crate) fn parse_decision_arg(raw: &str) -> Result<Decision, String> {
    Decision::parse(raw).ok_or_else(|| format!("`{raw}` is not one of approve, reject"))
}

pub(crate) fn parse_status_arg(raw: &str) -> Result<ApplicationStatus, String> {
    ApplicationStatus::parse(raw).ok_or_else(|| {
        format!("`{raw}` is not one of draft, in_review, approved, rejected, cancelled")
    })
}

/// Lower bound: a bare date means midnight UTC at the start of that day.
pub(crate) fn parse_date_arg(raw: &str) -> Result<DateTime<Utc>, String> {
    parse_date_bound(raw, |date| date.and_hms_opt(0, 0, 0))
}

/// Upper bound: a bare date covers the whole of that day.
pub(crate) fn parse_end_date_arg(raw: &str) -> Result<DateTime<Utc>, String> {
    parse_date_bound(raw, |date| date.and_hms_nano_opt(23, 59, 59, 999_999_999))
}

fn parse_date_bound(
    raw: &str,
    at: impl FnOnce(NaiveDate) -> Option<NaiveDateTime>,
) -> Result<DateTime<Utc>, String> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(at)
        .map(|instant| instant.and_utc())
        .ok_or_else(|| format!("`{raw}` is neither RFC 3339 nor YYYY-MM-DD"))
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use countersign_core::{
        ApplicationId, ApplicationStatus, EngineError, Priority, ValidationError,
    };
    use rust_decimal::Decimal;
    use serde_json::Value;

    use super::{finish, parse_amount_arg, parse_date_arg, parse_end_date_arg, parse_priority_arg};
    use super::{CommandFailure, CommandResult};

    #[test]
    fn failure_payload_omits_data_and_carries_class() {
        let result = CommandResult::failure("submit", "invalid_state", "already submitted", 12);
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(result.exit_code, 12);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "invalid_state");
        assert!(payload.get("data").is_none());
    }

    #[test]
    fn engine_errors_map_to_distinct_exit_codes() {
        let validation = CommandFailure::from(EngineError::from(ValidationError::BlankTitle));
        assert_eq!((validation.error_class.as_str(), validation.exit_code), ("validation", 10));
        assert_eq!(validation.message, "title must not be blank");

        let missing = CommandFailure::from(EngineError::NotFound {
            application_id: ApplicationId("APP-404".to_string()),
        });
        assert_eq!((missing.error_class.as_str(), missing.exit_code), ("not_found", 13));
        assert_eq!(missing.hint.as_deref(), Some("The application does not exist."));
        assert!(missing.correlation_id.is_some_and(|id| !id.is_empty()));
    }

    #[test]
    fn engine_failure_payload_carries_hint_and_correlation_id() {
        let error = EngineError::invalid_state(
            &ApplicationId("APP-7".to_string()),
            ApplicationStatus::Approved,
            "application is complete",
        );
        let result = CommandFailure::from(error).into_result("decide");
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(result.exit_code, 12);
        assert_eq!(payload["error_class"], "invalid_state");
        assert_eq!(
            payload["hint"],
            "The application has changed since it was loaded. Refresh before retrying."
        );
        assert!(payload["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[test]
    fn success_payload_carries_data_without_error_class() {
        let result = finish("pending", Ok::<_, CommandFailure>(vec!["APP-1"]));
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(result.exit_code, 0);
        assert_eq!(payload["data"][0], "APP-1");
        assert!(payload.get("error_class").is_none());
    }

    #[test]
    fn argument_parsers_accept_operator_spellings() {
        assert_eq!(parse_amount_arg("12,500.50"), Ok(Decimal::new(1_250_050, 2)));
        assert!(parse_amount_arg("twelve").is_err());
        assert_eq!(parse_priority_arg("URGENT"), Ok(Priority::Urgent));

        let midnight = parse_date_arg("2026-03-01").expect("date");
        assert_eq!(midnight.to_rfc3339(), "2026-03-01T00:00:00+00:00");
        assert!(parse_date_arg("yesterday").is_err());

        let end_of_day = parse_end_date_arg("2026-03-01").expect("date");
        assert_eq!(end_of_day.to_rfc3339(), "2026-03-01T23:59:59.999999999+00:00");
        let exact = parse_end_date_arg("2026-03-01T12:00:00Z").expect("timestamp");
        assert_eq!(exact.to_rfc3339(), "2026-03-01T12:00:00+00:00");
    }
}
