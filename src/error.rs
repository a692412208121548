//! Application error types and HTTP response mapping.
//!
//! Defines `AppError` for every failure the watcher can hit and implements
//! Axum's `IntoResponse` so command errors reach the caller as a plain-text
//! message instead of escaping the command boundary.
//!
//! Error mappings:
//! - `NotFollowing` → 404
//! - `UnresolvedSource`, `InvalidRepoId` → 400
//! - `GatewayUnavailable` → 502, `Timeout` → 504
//! - everything else → 500

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Repository unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("I cannot find {0} repos")]
    NotFollowing(String),

    #[error("Cannot resolve {0} to a git repository")]
    UnresolvedSource(String),

    #[error("Registry entry for {0} is corrupted")]
    RegistryCorruption(String),

    #[error("Invalid repository name: {0}")]
    InvalidRepoId(String),

    #[error("Invalid revision: {0}")]
    InvalidRevision(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn poisoned() -> Self {
        AppError::Internal("Lock poisoned".to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFollowing(_) => StatusCode::NOT_FOUND,
            AppError::UnresolvedSource(_) | AppError::InvalidRepoId(_) => StatusCode::BAD_REQUEST,
            AppError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
