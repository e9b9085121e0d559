//! services/store/src/error.rs
//!
//! Defines the primary error type for the store service.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use study_assistant_core::ports::PortError;
use tracing::error;

/// The primary error type for the `store` service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from a repository operation.
    #[error(transparent)]
    Port(#[from] PortError),

    /// Represents an error from the MongoDB driver outside of a port call
    /// (connecting, pinging, building indexes).
    #[error("Database Error: {0}")]
    Database(#[from] mongodb::error::Error),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Port(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Store request failed: {:?}", self);
        }
        (status, self.to_string()).into_response()
    }
}
