use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Not found")]
    NotFound,

    /// Optimistic concurrency check failed; the record changed underneath us.
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Notification delivery failed: {0}")]
    Notification(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Short machine-readable code stored with failed ledger entries.
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::InvalidInput(_) => ErrorCode::InvalidInput,
            AppError::InvalidSignature(_) => ErrorCode::InvalidSignature,
            AppError::NotFound => ErrorCode::NotFound,
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::Notification(_) => ErrorCode::NotificationFailed,
            AppError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    DatabaseError,
    InvalidInput,
    InvalidSignature,
    NotFound,
    Conflict,
    NotificationFailed,
    InternalError,
    EventInProgress,
    EventPermanentlyFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::NotificationFailed => "NOTIFICATION_FAILED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::EventInProgress => "EVENT_IN_PROGRESS",
            ErrorCode::EventPermanentlyFailed => "EVENT_PERMANENTLY_FAILED",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
