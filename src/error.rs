use serde::Serialize;
use warp::http::StatusCode;

use crate::db::DbError;

/// Failures an endpoint can report to a client.
#[derive(Debug)]
pub enum ApiError {
    /// no `url` in the request, or it was blank
    MissingInput,
    /// `url` did not survive normalization
    InvalidUrl(String),
    /// no record for the requested short code
    NotFound(String),
    /// anything else; the detail is logged, never sent to the client
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::MissingInput => write!(f, "URL is required"),
            ApiError::InvalidUrl(url) => write!(f, "invalid url: {}", url),
            ApiError::NotFound(code) => write!(f, "short code not found: {}", code),
            ApiError::Internal(message) => write!(f, "internal error: {}", message),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingInput | ApiError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message a client gets to see.
    pub fn public_message(&self) -> &'static str {
        match self {
            ApiError::MissingInput => "URL is required",
            ApiError::InvalidUrl(_) => "Invalid URL format",
            ApiError::NotFound(_) => "Short URL not found",
            ApiError::Internal(_) => "Internal server error",
        }
    }

    pub fn into_reply(self) -> Box<dyn warp::Reply> {
        match &self {
            ApiError::Internal(_) => tracing::error!("{self}"),
            _ => tracing::debug!("{self}"),
        }
        let body = ErrorBody {
            error: self.public_message().to_string(),
        };
        Box::new(warp::reply::with_status(warp::reply::json(&body), self.status()))
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(code) => ApiError::NotFound(code),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
