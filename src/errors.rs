use crate::models::ProjectStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("INVALID_INPUT: {0}")]
    Invalid(String),
    #[error("ADMISSION_DENIED: {0}")]
    Admission(#[from] AdmissionError),
    #[error("CONFLICT: {0}")]
    Conflict(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

/// Reasons a task cannot be planned right now. Surfaced to the user as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("tasks cannot be added while the project is {0}")]
    InvalidProjectStatus(ProjectStatus),
    #[error("the project needs at least one category first")]
    NoCategories,
    #[error("the project already has the maximum of {0} categories")]
    CategoryLimitReached(u32),
    #[error("the working day already holds the maximum of {0} tasks")]
    TaskLimitReached(u32),
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
