use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// LinkRecord is the row stored for each shortened URL.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LinkRecord {
    pub short_code: String,   // the random "aB3xY9" part of "http://host/aB3xY9"
    pub original_url: String, // normalized target, always absolute
    pub created_at: chrono::DateTime<Utc>,
    pub click_count: i64, // successful redirects so far
}

impl std::fmt::Display for LinkRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{} -> {}", self.short_code, self.original_url)?;
        write!(f, " [created: {}, clicks: {}]", self.created_at, self.click_count)?;
        Ok(())
    }
}

/// A record as reported by the stats endpoints, with the short url computed
/// against the base url of the current request.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LinkStats {
    pub original_url: String,
    pub short_code: String,
    pub created_at: chrono::DateTime<Utc>,
    pub click_count: i64,
    pub short_url: String,
}

impl LinkStats {
    pub fn new(record: LinkRecord, base_url: &str) -> Self {
        let short_url = short_url(base_url, &record.short_code);
        Self {
            original_url: record.original_url,
            short_code: record.short_code,
            created_at: record.created_at,
            click_count: record.click_count,
            short_url,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ShortenResponse {
    pub original_url: String,
    pub short_url: String,
    pub short_code: String,
}

impl ShortenResponse {
    pub fn new(record: LinkRecord, base_url: &str) -> Self {
        Self {
            short_url: short_url(base_url, &record.short_code),
            original_url: record.original_url,
            short_code: record.short_code,
        }
    }
}

/// joins the public base url and a code, tolerating a trailing slash on the base.
pub fn short_url(base_url: &str, short_code: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), short_code)
}

/// returns the normalized form of a submitted URL.
///
/// Input without an `http://` or `https://` prefix is assumed to be https.
/// The result must parse, carry a scheme and a host, and the host must
/// contain a dot. Nothing is fetched.
pub fn normalize_url(input: &str) -> Result<String, ApiError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ApiError::MissingInput);
    }

    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = url::Url::parse(&candidate).map_err(|_| ApiError::InvalidUrl(candidate.clone()))?;
    let has_dotted_host = parsed.host_str().is_some_and(|host| host.contains('.'));
    if parsed.scheme().is_empty() || !has_dotted_host {
        return Err(ApiError::InvalidUrl(candidate));
    }

    Ok(candidate)
}
