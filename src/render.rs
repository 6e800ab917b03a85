use std::{convert::Infallible, path::Path};

use handlebars::Handlebars;
use warp::http::StatusCode;

use crate::{
    ShortenRequest, code, db,
    error::ApiError,
    model::{self, LinkStats, ShortenResponse},
};

pub const TEMPLATES: [&str; 3] = ["base", "index", "not_found"];

struct Message {
    msg: String,
}

impl Message {
    fn new(message: &str) -> Self {
        Self {
            msg: message.to_string(),
        }
    }
}

impl warp::Reply for Message {
    fn into_response(self) -> warp::reply::Response {
        warp::reply::Response::new(self.msg.into())
    }
}

/// Registers every page template found as `<name>.hbs` under `dir`.
pub fn load_templates(dir: &Path) -> Result<Handlebars<'static>, handlebars::TemplateError> {
    let mut handlebars = Handlebars::new();
    for name in TEMPLATES {
        handlebars.register_template_file(name, dir.join(format!("{}.hbs", name)))?;
    }
    Ok(handlebars)
}

/// Renderer answers every endpoint. Clones are cheap and share the store.
#[derive(Clone, Debug)]
pub struct Renderer {
    host: String,
    public_url: Option<String>,
    code_length: usize,
    pub(crate) db: db::Db,
    pub(crate) handlebars: Handlebars<'static>,
}

impl Renderer {
    pub fn empty() -> Result<Self, rusqlite::Error> {
        Ok(Self::new("localhost", db::Db::in_memory()?, Handlebars::new()))
    }

    /// `host` is what short urls are built from when neither a public url
    /// nor a Host header is available.
    pub fn new(host: &str, db: db::Db, handlebars: Handlebars<'static>) -> Self {
        Self {
            host: host.to_string(),
            public_url: None,
            code_length: code::DEFAULT_LENGTH,
            db,
            handlebars,
        }
    }

    pub fn with_public_url(mut self, public_url: Option<String>) -> Self {
        self.public_url = public_url;
        self
    }

    pub fn with_code_length(mut self, code_length: usize) -> Self {
        self.code_length = code_length;
        self
    }

    pub fn db(&self) -> &db::Db {
        &self.db
    }

    /// Base url short urls are built on, never with a trailing slash.
    pub fn base_url(&self, host_header: Option<&str>) -> String {
        let base = match (&self.public_url, host_header) {
            (Some(public), _) => public.clone(),
            (None, Some(host)) => format!("http://{}", host),
            (None, None) => format!("http://{}", self.host),
        };
        base.trim_end_matches('/').to_string()
    }
}

fn redirect(location: String) -> Result<Box<dyn warp::Reply>, Infallible> {
    Ok(Box::new(warp::reply::with_header(
        warp::reply::with_header(StatusCode::FOUND, "Location", location),
        "Cache-Control",
        "no-cache",
    )))
}

fn response(message: &str, status: StatusCode) -> Result<Box<dyn warp::Reply>, Infallible> {
    Ok(Box::new(warp::reply::with_status(Message::new(message), status)))
}

fn failure(e: impl Into<ApiError>) -> Result<Box<dyn warp::Reply>, Infallible> {
    Ok(e.into().into_reply())
}

/// Stored urls are sent back as submitted, fragment included. Anything that
/// is not plain visible ascii (spaces, non-ascii) goes out percent-encoded.
fn location(original_url: &str) -> Result<String, ApiError> {
    if !original_url.is_empty() && original_url.bytes().all(|b| b.is_ascii_graphic()) {
        return Ok(original_url.to_string());
    }
    url::Url::parse(original_url)
        .map(|parsed| parsed.as_str().to_string())
        .map_err(|e| ApiError::Internal(format!("stored url {original_url} does not parse: {e}")))
}

impl Renderer {
    pub async fn home(&self) -> Result<Box<dyn warp::Reply>, Infallible> {
        match self.handlebars.render("index", &serde_json::json!({})) {
            Ok(page) => Ok(Box::new(warp::reply::html(page))),
            Err(e) => {
                tracing::error!("{e}");
                response("Internal server error", StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    pub async fn not_found(&self, short_code: &str) -> Result<Box<dyn warp::Reply>, Infallible> {
        match self
            .handlebars
            .render("not_found", &serde_json::json!({"short_code": short_code}))
        {
            Ok(page) => Ok(Box::new(warp::reply::with_status(
                warp::reply::html(page),
                StatusCode::NOT_FOUND,
            ))),
            Err(e) => {
                tracing::warn!("falling back to plain 404: {e}");
                response("Short URL not found", StatusCode::NOT_FOUND)
            }
        }
    }

    pub async fn shorten(&self, request: ShortenRequest, host: Option<&str>) -> Result<Box<dyn warp::Reply>, Infallible> {
        let original_url = match request.normalized_url() {
            Ok(url) => url,
            Err(e) => return failure(e),
        };

        match self.db.link.get_or_create(&original_url, self.code_length).await {
            Ok((record, created)) => {
                if created {
                    tracing::info!("shortened {}", &record);
                }
                let response = ShortenResponse::new(record, &self.base_url(host));
                Ok(Box::new(warp::reply::json(&response)))
            }
            Err(e) => failure(e),
        }
    }

    pub async fn redirect(&self, short_code: &str) -> Result<Box<dyn warp::Reply>, Infallible> {
        if !code::is_well_formed(short_code) {
            return self.not_found(short_code).await;
        }

        let record = match self.db.link.record_click(short_code).await {
            Ok(Some(record)) => record,
            Ok(None) => return self.not_found(short_code).await,
            Err(e) => return failure(e),
        };

        match location(&record.original_url) {
            Ok(target) => {
                tracing::debug!("redirecting /{} to {} (click {})", short_code, target, record.click_count);
                redirect(target)
            }
            Err(e) => failure(e),
        }
    }

    pub async fn stats(&self, short_code: &str, host: Option<&str>) -> Result<Box<dyn warp::Reply>, Infallible> {
        match self.db.link.find_by_code(short_code).await {
            Ok(Some(record)) => Ok(Box::new(warp::reply::json(&LinkStats::new(
                record,
                &self.base_url(host),
            )))),
            Ok(None) => failure(ApiError::NotFound(short_code.to_string())),
            Err(e) => failure(e),
        }
    }

    pub async fn all_stats(&self, host: Option<&str>) -> Result<Box<dyn warp::Reply>, Infallible> {
        match self.db.link.list_all().await {
            Ok(records) => {
                let base_url = self.base_url(host);
                let stats: Vec<model::LinkStats> = records
                    .into_iter()
                    .map(|record| LinkStats::new(record, &base_url))
                    .collect();
                Ok(Box::new(warp::reply::json(&stats)))
            }
            Err(e) => failure(e),
        }
    }
}
