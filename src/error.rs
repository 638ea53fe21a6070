//! Error types for concierge-apply.

use std::time::Duration;

use uuid::Uuid;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// A step catalog that breaks the ordering or ownership rules.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Catalog has no steps")]
    Empty,

    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("Step {id} has ordinal {found}, expected {expected}")]
    OrdinalGap {
        id: String,
        expected: usize,
        found: usize,
    },

    #[error("Duplicate field: {0}")]
    DuplicateField(String),

    #[error("Step {step} references undeclared field {field}")]
    UndeclaredField { step: String, field: String },

    #[error("Step {step} requires {field} which it does not own")]
    RequiredNotOwned { step: String, field: String },

    #[error("Field {field} on step {step} has the wrong kind for that step")]
    WrongFieldKind { step: String, field: String },

    #[error("Field {field} is owned by both {first} and {second}")]
    SharedField {
        field: String,
        first: String,
        second: String,
    },
}

/// Rejected wizard operations. None of these mutate the session.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WizardError {
    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Session {0} is closed")]
    SessionClosed(Uuid),

    #[error("Cannot {action} from step {step}")]
    NavigationUnavailable { action: &'static str, step: usize },

    #[error("Submit is only available on the final step (at step {step} of {total})")]
    NotOnFinalStep { step: usize, total: usize },

    #[error("A submission is already in flight")]
    SubmissionInFlight,

    #[error("Cannot {action} while submission is {state}")]
    SessionLocked {
        action: &'static str,
        state: &'static str,
    },

    #[error("Cannot submit: step {step_id} is missing {missing}")]
    IncompleteApplication { step_id: String, missing: String },

    #[error("Nothing to retry: submission is {0}")]
    NothingToRetry(&'static str),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Field {field} is a {actual} field, not {expected}")]
    FieldKindMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },
}

/// Submission gateway failures.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway request failed: {0}")]
    RequestFailed(String),

    #[error("Gateway rejected submission with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Gateway timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        Self::RequestFailed(e.to_string())
    }
}
