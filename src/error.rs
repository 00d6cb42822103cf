use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ClassmarkError {
    DatabaseError(String),
    GradingError(String),
    SubmissionError(String),
    NotificationError(String),
    EventError(String),
    InvalidStateError(String),
    ConfigurationError(String),
}

impl fmt::Display for ClassmarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassmarkError::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            ClassmarkError::GradingError(msg) => write!(f, "Grading error: {msg}"),
            ClassmarkError::SubmissionError(msg) => write!(f, "Submission error: {msg}"),
            ClassmarkError::NotificationError(msg) => write!(f, "Notification error: {msg}"),
            ClassmarkError::EventError(msg) => write!(f, "Event error: {msg}"),
            ClassmarkError::InvalidStateError(msg) => write!(f, "Invalid state: {msg}"),
            ClassmarkError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for ClassmarkError {}

pub type Result<T> = std::result::Result<T, ClassmarkError>;
