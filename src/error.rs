use actix_web::HttpResponse;
use serde_json::json;
use thiserror::Error;

use crate::storage::StorageError;

/// Request-level failure taxonomy shared by the ingestion and read handlers.
///
/// Validation failures are never retried by the server; authorization
/// failures mean the caller should re-authenticate before retrying; storage
/// failures are safe to retry because every write is idempotent.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    Storage(String),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        ApiError::Authorization(msg.into())
    }

    /// A failed storage call, with the pipeline step it failed in. The
    /// underlying message is surfaced verbatim for operator diagnosis.
    pub fn storage(context: &str, source: StorageError) -> Self {
        ApiError::Storage(format!("{}: {}", context, source))
    }

    /// Map the error to an HTTP response with an `{"error": ...}` body.
    pub fn to_response(&self) -> HttpResponse {
        let body = json!({ "error": self.to_string() });
        match self {
            ApiError::Validation(_) => HttpResponse::BadRequest().json(body),
            ApiError::Authorization(_) => HttpResponse::Forbidden().json(body),
            ApiError::Storage(_) => HttpResponse::InternalServerError().json(body),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(source: StorageError) -> Self {
        ApiError::Storage(source.to_string())
    }
}
