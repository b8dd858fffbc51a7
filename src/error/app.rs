use thiserror::Error;

use super::{CaseError, ControlError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("HTTP client error: {source}")]
    Reqwest {
        #[from]
        source: reqwest::Error,
    },
    #[error("Join error: {source}")]
    Join {
        #[from]
        source: tokio::task::JoinError,
    },
    #[error("Control plane error: {0}")]
    Control(#[from] ControlError),
    #[error("Case error: {0}")]
    Case(#[from] CaseError),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn control<E>(error: E) -> Self
    where
        E: Into<ControlError>,
    {
        error.into().into()
    }

    pub fn case<E>(error: E) -> Self
    where
        E: Into<CaseError>,
    {
        error.into().into()
    }
}
