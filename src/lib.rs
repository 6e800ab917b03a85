use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub mod code;
pub mod db;
pub mod error;
pub mod model;
pub mod render;
pub mod routes;

/// Body of `POST /shorten`, either JSON or a urlencoded form.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ShortenRequest {
    #[serde(default)]
    pub url: Option<String>,
}

impl ShortenRequest {
    pub fn new(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
        }
    }

    /// Decodes a request body. Form bodies are recognized by their content
    /// type, everything else is read as JSON. An undecodable body is treated
    /// the same as one without a url.
    pub fn from_body(content_type: Option<&str>, body: &[u8]) -> Result<Self, ApiError> {
        let is_form = content_type.is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        let decoded = if is_form {
            serde_urlencoded::from_bytes::<ShortenRequest>(body).map_err(|e| e.to_string())
        } else {
            serde_json::from_slice::<ShortenRequest>(body).map_err(|e| e.to_string())
        };
        decoded.map_err(|e| {
            tracing::debug!("undecodable shorten body: {e}");
            ApiError::MissingInput
        })
    }

    /// The normalized url, or why there isn't one.
    pub fn normalized_url(&self) -> Result<String, ApiError> {
        match &self.url {
            Some(url) => model::normalize_url(url),
            None => Err(ApiError::MissingInput),
        }
    }
}
