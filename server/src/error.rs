//! Shared error types for the relay server.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;
use thiserror::Error;

/// Domain errors that cross the Table Gateway boundary (spec §7). Every
/// other store failure passes through as an opaque `Store` error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("NoSuchItem")]
    NoSuchItem,
    #[error("AlreadyExists")]
    AlreadyExists,
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NoSuchItem)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            Error::NoSuchItem => (StatusCode::NOT_FOUND, self.to_string()),
            Error::AlreadyExists => (StatusCode::CONFLICT, self.to_string()),
            Error::Store(_) | Error::Other(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
