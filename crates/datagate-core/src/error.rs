//! Error types for the datagate system

use thiserror::Error;

/// Main error type for all datagate operations
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scan job submission failed: {0}")]
    Submission(String),

    #[error("Transient I/O failure: {0}")]
    Transient(String),

    #[error("Findings drain failed: {0}")]
    Aggregation(String),

    #[error("Invalid approval token: {0}")]
    InvalidToken(String),

    #[error("Run is in the wrong state: {0}")]
    WrongState(String),

    #[error("Scan job {job_id} ended as {status}")]
    JobFailed { job_id: String, status: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl PipelineError {
    /// Whether the operation that produced this error may be retried.
    ///
    /// Gate misuse, bad configuration and terminal job statuses are final;
    /// store and service call failures are assumed recoverable.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Io(_) | Self::Transient(_) | Self::Aggregation(_)
        )
    }
}

/// Result type for datagate operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PipelineError::Transient("socket reset".to_string()).is_transient());
        assert!(PipelineError::Aggregation("page read failed".to_string()).is_transient());
        assert!(!PipelineError::InvalidToken("unknown".to_string()).is_transient());
        assert!(!PipelineError::Config("missing bucket".to_string()).is_transient());
        assert!(!PipelineError::JobFailed {
            job_id: "j-1".to_string(),
            status: "FAILED".to_string()
        }
        .is_transient());
    }
}
