use axum::http::StatusCode;
use serde_json::{Value, json};
use thiserror::Error;

/// Expected failures surfaced to HTTP clients as `{"error": <message>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Please provide request body!")]
    MissingBody,
    /// Kept on 404 for compatibility with existing clients.
    #[error("Please fill all required data {{username: str, age: number, hobbies: array(string)}}")]
    Validation,
    #[error("Provided ID is not a valid UUID value!")]
    InvalidId,
    #[error("User not found")]
    UserNotFound,
    #[error("Please provide a valid URL string for this request method")]
    BadRoute,
    #[error("Unexpected server side error!")]
    Internal,
}

impl ApiError {
    pub fn status(self) -> StatusCode {
        match self {
            ApiError::MissingBody | ApiError::UserNotFound | ApiError::BadRoute => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Validation | ApiError::InvalidId => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn envelope(self) -> Value {
        json!({ "error": self.to_string() })
    }
}
