//! Engine error taxonomy.
//!
//! Every failure inside an attempt is an `EngineError`. The orchestrator
//! classifies it with [`EngineError::kind`] to decide between the endpoint's
//! error response and a fatal result, and persists the kind in the audit row.

use endpoints_types::error::RepositoryError;
use endpoints_types::request_log::FailureKind;
use thiserror::Error;

/// Defects in the task graph of an endpoint. Never attributable to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulingError {
    #[error("cycle detected among intermediate values involving task '{0}'")]
    CycleDetected(String),

    #[error("'{consumer}' requires intermediate value '{value}' which no task produces")]
    UnknownIntermediateValue { consumer: String, value: String },

    #[error("intermediate value '{value}' is produced by both '{first}' and '{second}'")]
    DuplicateProducer {
        value: String,
        first: String,
        second: String,
    },

    #[error("forward-to-endpoint nesting exceeded {max} levels")]
    ForwardDepthExceeded { max: usize },
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or missing input, failed hash check, whitelist violation.
    #[error("{0}")]
    RequestInvalid(String),

    /// The transformation script attributed a failure to the request.
    #[error("transformation reported an error: {error}")]
    TransformationReportedError { error: String },

    /// The transformation could not be evaluated.
    #[error("transformation failed: {0}")]
    TransformationFailed(String),

    #[error("HTTP request to '{url}' failed: {message}")]
    HttpRequestFailed {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("task '{task}' failed: {message}")]
    TaskFailed { task: String, message: String },

    #[error("execution failed with status {status_code}: {message}")]
    ExecutionFailed { status_code: u16, message: String },

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("no unused random request id found after {attempts} attempts")]
    RandomIdExhausted { attempts: u32 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn request_invalid(message: impl Into<String>) -> Self {
        EngineError::RequestInvalid(message.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            EngineError::RequestInvalid(_) => FailureKind::ClientInput,
            EngineError::TransformationReportedError { .. }
            | EngineError::TransformationFailed(_) => FailureKind::Transformation,
            EngineError::HttpRequestFailed { .. }
            | EngineError::TaskFailed { .. }
            | EngineError::ExecutionFailed { .. } => FailureKind::TaskExecution,
            EngineError::Scheduling(_) => FailureKind::Scheduling,
            EngineError::Configuration(_)
            | EngineError::Repository(_)
            | EngineError::RandomIdExhausted { .. }
            | EngineError::Internal(_) => FailureKind::Unclassified,
        }
    }

    /// Scheduling defects bypass the endpoint's error response.
    pub fn is_fatal(&self) -> bool {
        self.kind() == FailureKind::Scheduling
    }

    /// Message safe to show to the caller.
    pub fn external_message(&self) -> String {
        match self {
            EngineError::RequestInvalid(message) => message.clone(),
            EngineError::TransformationReportedError { error } => error.clone(),
            EngineError::ExecutionFailed { message, .. } => message.clone(),
            _ => "Internal server error".to_string(),
        }
    }
}

/// The only error returned across `execute`.
#[derive(Debug, Error)]
pub enum ExecutionFailure {
    /// A defect that bypassed the endpoint's error response.
    #[error("fatal: {0}")]
    Fatal(Box<EngineError>),

    /// The error response itself failed.
    #[error("error response failed: {secondary} (original failure: {original})")]
    ErrorResponseFailed {
        original: Box<EngineError>,
        secondary: Box<EngineError>,
    },
}

impl ExecutionFailure {
    pub fn status_code(&self) -> u16 {
        500
    }

    pub fn external_message(&self) -> &'static str {
        "Internal server error"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            EngineError::request_invalid("bad").kind(),
            FailureKind::ClientInput
        );
        assert_eq!(
            EngineError::TransformationReportedError { error: "x".into() }.kind(),
            FailureKind::Transformation
        );
        assert_eq!(
            EngineError::HttpRequestFailed {
                url: "http://x".into(),
                status: Some(503),
                message: "unavailable".into(),
            }
            .kind(),
            FailureKind::TaskExecution
        );
        assert_eq!(
            EngineError::from(SchedulingError::CycleDetected("a".into())).kind(),
            FailureKind::Scheduling
        );
        assert_eq!(
            EngineError::from(RepositoryError::Connection).kind(),
            FailureKind::Unclassified
        );
    }

    #[test]
    fn test_only_scheduling_is_fatal() {
        assert!(EngineError::from(SchedulingError::ForwardDepthExceeded { max: 8 }).is_fatal());
        assert!(!EngineError::Internal("boom".into()).is_fatal());
        assert!(!EngineError::request_invalid("bad").is_fatal());
    }

    #[test]
    fn test_external_message_hides_internals() {
        assert_eq!(EngineError::request_invalid("Missing parameter 'a'").external_message(), "Missing parameter 'a'");
        assert_eq!(
            EngineError::from(RepositoryError::Query("secret sql".into())).external_message(),
            "Internal server error"
        );
    }

    #[test]
    fn test_error_response_failed_display() {
        let failure = ExecutionFailure::ErrorResponseFailed {
            original: Box::new(EngineError::request_invalid("bad input")),
            secondary: Box::new(EngineError::Internal("disk full".into())),
        };
        assert_eq!(
            failure.to_string(),
            "error response failed: internal error: disk full (original failure: bad input)"
        );
        assert_eq!(failure.status_code(), 500);
    }
}
