use std::convert::Infallible;

use warp::{Filter, http::StatusCode};

use crate::{ShortenRequest, error::ErrorBody, render::Renderer};

const BODY_LIMIT: u64 = 1024 * 16;

fn with_renderer(renderer: Renderer) -> impl Filter<Extract = (Renderer,), Error = Infallible> + Clone {
    warp::any().map(move || renderer.clone())
}

fn host() -> impl Filter<Extract = (Option<String>,), Error = Infallible> + Clone {
    warp::header::optional::<String>("host").or_else(|_| async { Ok::<_, Infallible>((None,)) })
}

fn home(renderer: Renderer) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path::end()
        .and(warp::get())
        .and(with_renderer(renderer))
        .and_then(|renderer: Renderer| async move { renderer.home().await })
}

fn shorten(renderer: Renderer) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("shorten")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::header::optional::<String>("content-type"))
        .and(host())
        .and(warp::body::content_length_limit(BODY_LIMIT))
        .and(warp::body::bytes())
        .and(with_renderer(renderer))
        .and_then(
            |content_type: Option<String>, host: Option<String>, body: bytes::Bytes, renderer: Renderer| async move {
                match ShortenRequest::from_body(content_type.as_deref(), &body) {
                    Ok(request) => renderer.shorten(request, host.as_deref()).await,
                    Err(e) => Ok(e.into_reply()),
                }
            },
        )
}

fn api_stats(renderer: Renderer) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("api" / "stats")
        .and(warp::get())
        .and(host())
        .and(with_renderer(renderer))
        .and_then(|host: Option<String>, renderer: Renderer| async move {
            renderer.all_stats(host.as_deref()).await
        })
}

fn stats(renderer: Renderer) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("stats" / String)
        .and(warp::get())
        .and(host())
        .and(with_renderer(renderer))
        .and_then(|short_code: String, host: Option<String>, renderer: Renderer| async move {
            renderer.stats(&short_code, host.as_deref()).await
        })
}

fn redirect(renderer: Renderer) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path::param::<String>()
        .and(warp::path::end())
        .and(warp::get())
        .and(with_renderer(renderer))
        .and_then(|short_code: String, renderer: Renderer| async move { renderer.redirect(&short_code).await })
}

fn json_error(message: &str, status: StatusCode) -> Box<dyn warp::Reply> {
    let body = ErrorBody {
        error: message.to_string(),
    };
    Box::new(warp::reply::with_status(warp::reply::json(&body), status))
}

/// Turns whatever no route accepted into a response: oversized or unsized
/// bodies and wrong methods get a JSON error, everything else the 404 page.
///
/// Every route matches its path before its method, so a method rejection
/// only shows up when some route owns the path.
async fn rejection(err: warp::Rejection, renderer: Renderer) -> Result<Box<dyn warp::Reply>, Infallible> {
    if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(json_error("Request body too large", StatusCode::PAYLOAD_TOO_LARGE));
    }
    if err.find::<warp::reject::LengthRequired>().is_some() {
        return Ok(json_error("Content-Length required", StatusCode::LENGTH_REQUIRED));
    }
    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(json_error("Method not allowed", StatusCode::METHOD_NOT_ALLOWED));
    }
    tracing::debug!("unmatched request: {:?}", err);
    renderer.not_found("").await
}

pub fn get_routes(renderer: Renderer) -> impl Filter<Extract = impl warp::Reply, Error = Infallible> + Clone {
    let fallback = renderer.clone();
    home(renderer.clone())
        .or(shorten(renderer.clone()))
        .or(api_stats(renderer.clone()))
        .or(stats(renderer.clone()))
        .or(redirect(renderer.clone()))
        .recover(move |err: warp::Rejection| {
            let renderer = fallback.clone();
            async move { rejection(err, renderer).await }
        })
}
