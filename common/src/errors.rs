// Error handling framework

use thiserror::Error;

/// Input validation errors, rejected at the submission boundary
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("Content cannot be empty")]
    EmptyContent,

    #[error("Content exceeds maximum length of {max} characters")]
    ContentTooLong { max: usize },

    #[error("Publish time must be strictly in the future")]
    PublishTimeNotFuture,

    #[error("Unknown artifact kind: {0}")]
    UnknownArtifactKind(String),

    #[error("Unknown voice: {0}")]
    UnknownVoice(String),
}

/// Authentication, authorization, and admission errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Unrecognized owner key")]
    UnknownOwner,

    #[error("Owner does not have access to this job")]
    OwnerMismatch,

    #[error("Rate limit exceeded. Maximum {max_per_minute} requests per minute")]
    RateLimitExceeded { max_per_minute: u32 },

    #[error("Concurrent job limit reached. Maximum {max} active jobs allowed")]
    ConcurrentJobsExceeded { max: u32 },
}

/// Job store persistence errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {id} is already {status}; no transition out of a terminal status")]
    TerminalStatus { id: String, status: String },

    #[error("Duplicate job id: {0}")]
    DuplicateId(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Invalid stored value for {field}: {reason}")]
    CorruptRow { field: String, reason: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::JobNotFound("record not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::DuplicateId(db_err.message().to_string())
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Upload queue persistence errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to read queue file: {0}")]
    Read(String),

    #[error("Failed to write queue file: {0}")]
    Write(String),

    #[error("Queue serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}

/// External service errors (generation, publish target, notification)
#[derive(Error, Debug)]
pub enum ExternalError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Service rejected request with status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Service reported failure: {0}")]
    ServiceReported(String),

    #[error("Malformed service response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for ExternalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // Budget is carried on the client; call sites log the configured value.
            ExternalError::Timeout(0)
        } else {
            ExternalError::RequestFailed(err.to_string())
        }
    }
}

/// Boundary error for the submission service, wrapping everything a caller
/// (the external HTTP front end) can observe
#[derive(Error, Debug)]
pub enum RequestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Cannot cancel job in terminal status: {0}")]
    CannotCancel(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
