use std::io;

use serde::Serialize;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("reverse geocoding failed: {0}")]
    GeocodeFailed(String),
    #[error("preference storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("venue request failed: {0}")]
    NetworkFailure(String),
    #[error("malformed venue response: {0}")]
    MalformedResponse(String),
    #[error("unsupported city: {0}")]
    UnknownCity(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Config(String),
}

/// Coarse failure class surfaced to diagnostics and the rendering layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PermissionDenied,
    PositionUnavailable,
    GeocodeFailed,
    StorageUnavailable,
    NetworkFailure,
    MalformedResponse,
    InvalidInput,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::PermissionDenied => "permission_denied",
            FailureKind::PositionUnavailable => "position_unavailable",
            FailureKind::GeocodeFailed => "geocode_failed",
            FailureKind::StorageUnavailable => "storage_unavailable",
            FailureKind::NetworkFailure => "network_failure",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::InvalidInput => "invalid_input",
        }
    }
}

impl AppError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AppError::PermissionDenied => FailureKind::PermissionDenied,
            AppError::PositionUnavailable(_) => FailureKind::PositionUnavailable,
            AppError::GeocodeFailed(_) => FailureKind::GeocodeFailed,
            AppError::StorageUnavailable(_) | AppError::Io(_) | AppError::Database(_) => {
                FailureKind::StorageUnavailable
            }
            AppError::NetworkFailure(_) | AppError::Http(_) => FailureKind::NetworkFailure,
            AppError::MalformedResponse(_) | AppError::Json(_) => FailureKind::MalformedResponse,
            AppError::UnknownCity(_) | AppError::Config(_) => FailureKind::InvalidInput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_library_errors_fold_into_taxonomy() {
        let json = serde_json::from_str::<Vec<u8>>("{").unwrap_err();
        assert_eq!(AppError::from(json).kind(), FailureKind::MalformedResponse);

        let io = io::Error::new(io::ErrorKind::PermissionDenied, "read-only");
        assert_eq!(AppError::from(io).kind(), FailureKind::StorageUnavailable);

        assert_eq!(
            AppError::UnknownCity("Chicago".into()).kind().as_str(),
            "invalid_input"
        );
    }
}
