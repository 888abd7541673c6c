use thiserror::Error;
use uuid::Uuid;

/// The automation runtime sent something we cannot read.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Result object from the automation runtime could not be parsed")]
    ParsingErrorObjectFailed,

    #[error("Missing `{field}` in {action_type} response")]
    MissingResponse {
        action_type: &'static str,
        field: &'static str,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A broker definition that cannot be used at all.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Broker '{0}' has no scan step")]
    UnrecoverableError(String),

    #[error("Broker '{broker}' declares {count} scan steps")]
    DuplicateScanStep { broker: String, count: usize },

    #[error("Broker '{broker}' has {field} = {hours} hours; expected 1 to {max}")]
    InvalidSchedule {
        broker: String,
        field: &'static str,
        hours: i64,
        max: i64,
    },

    #[error("Invalid broker definition: {0}")]
    InvalidDefinition(#[from] serde_json::Error),
}

/// Failures while running a job's action sequence. All of these end up as
/// `error` history events and are retried on the broker's retry cadence.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Action {action_id} failed: {message}")]
    ActionFailed { action_id: String, message: String },

    #[error("Action {0} timed out")]
    ActionTimeout(String),

    #[error("Timed out waiting for a captcha solution")]
    CaptchaTimeout,

    #[error("solveCaptcha ran before any captcha information was submitted")]
    MissingCaptchaTransaction,

    #[error("Captcha service error: {0}")]
    CaptchaService(String),

    #[error("Timed out waiting for the confirmation email")]
    EmailConfirmationTimeout,

    #[error("No email address available for the confirmation step")]
    EmailNotFound,

    #[error("Email service error: {0}")]
    EmailService(String),

    #[error("Automation runtime transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Job cancelled")]
    Cancelled,
}

impl ExecutionError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ExecutionError::Cancelled)
    }
}

/// Caller mistakes when asking the runner to do something.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("No opt-out job exists for extracted profile {0}")]
    NoOperationDataForExtractedProfile(Uuid),
}
