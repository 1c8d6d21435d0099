//! API error type and its HTTP mapping.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use investmtl_database::DbError;
use investmtl_scoring::ScoringError;
use investmtl_server_models::ParamError;

/// Errors a handler can return.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed query parameter.
    #[error(transparent)]
    Params(#[from] ParamError),

    /// Unknown area or rejected request.
    #[error(transparent)]
    Scoring(#[from] ScoringError),

    /// Score repository failure.
    #[error(transparent)]
    Database(#[from] DbError),

    /// Score repository read exceeded the configured timeout.
    #[error("Score repository read timed out after {timeout_ms} ms")]
    Timeout {
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// Anything else that went wrong server side.
    #[error("{0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Params(_) | Self::Scoring(ScoringError::Validation { .. }) => {
                StatusCode::BAD_REQUEST
            }
            Self::Scoring(ScoringError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            Self::Database(e) => {
                log::error!("Failed to read scores: {e}");
                "Failed to read scores".to_string()
            }
            Self::Internal(e) => {
                log::error!("Internal error: {e}");
                "Internal server error".to_string()
            }
            Self::Timeout { .. } => {
                log::warn!("{self}");
                self.to_string()
            }
            Self::Params(_) | Self::Scoring(_) => self.to_string(),
        };

        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": message
        }))
    }
}
