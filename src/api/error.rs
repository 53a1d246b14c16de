//! Mapping of directory errors onto HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::error::DirectoryError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError(pub DirectoryError);

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn forbidden(message: &str) -> Self {
        ApiError(DirectoryError::Forbidden(message.to_string()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DirectoryError::NotFound(_) => StatusCode::NOT_FOUND,
            DirectoryError::Conflict(_) => StatusCode::CONFLICT,
            DirectoryError::Forbidden(_) => StatusCode::FORBIDDEN,
            DirectoryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DirectoryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            DirectoryError::Storage(e) => {
                error!(error = %e, "Request failed on storage");
                "internal storage error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
