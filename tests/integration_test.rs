use std::path::Path;

use http_body_util::BodyExt;
use shorty::{ShortenRequest, db, model, render, routes};
use warp::reply::Reply;

fn renderer() -> Result<render::Renderer, Box<dyn std::error::Error + 'static>> {
    let templates = render::load_templates(&Path::new(env!("CARGO_MANIFEST_DIR")).join("templates"))?;
    Ok(render::Renderer::new("127.0.0.1:5000", db::Db::in_memory()?, templates))
}

async fn body_string(reply: Box<dyn warp::Reply>) -> Result<(u16, String), Box<dyn std::error::Error + 'static>> {
    let response = reply.into_response();
    let status = response.status().as_u16();
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok((status, String::from_utf8(bytes.to_vec())?))
}

#[tokio::test]
async fn test_db() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let db = db::Db::in_memory()?;

    // Insert
    let inserted = db.link.insert("https://nytimes.com", "aB3xY9").await?;
    assert_eq!(inserted.click_count, 0);

    // Find
    let by_code = db.link.find_by_code("aB3xY9").await?;
    assert_eq!(by_code.as_ref(), Some(&inserted));
    let by_url = db.link.find_by_url("https://nytimes.com").await?;
    assert_eq!(by_url, Some(inserted.clone()));
    assert!(db.link.find_by_code("aB3xY8").await?.is_none());
    assert!(db.link.find_by_url("https://nytimes.com/").await?.is_none());

    // Increment
    for expected in 1..=3 {
        db.link.increment_click("aB3xY9").await?;
        let record = db.link.find_by_code("aB3xY9").await?.unwrap();
        assert_eq!(record.click_count, expected);
        assert_eq!(record.created_at, inserted.created_at);
    }

    // List, newest first
    let second = db.link.insert("https://example.com", "Zz0000").await?;
    let all = db.link.list_all().await?;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0], second);
    assert_eq!(all[1].short_code, "aB3xY9");

    Ok(())
}

#[tokio::test]
async fn test_durable_reopen() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("shorty.db");

    let code = {
        let db = db::Db::open(&path)?;
        let (record, created) = db.link.get_or_create("https://example.com", 6).await?;
        assert!(created);
        db.link.increment_click(&record.short_code).await?;
        record.short_code
    };

    let db = db::Db::open(&path)?;
    let record = db.link.find_by_code(&code).await?.unwrap();
    assert_eq!(record.original_url, "https://example.com");
    assert_eq!(record.click_count, 1);

    let (again, created) = db.link.get_or_create("https://example.com", 6).await?;
    assert!(!created);
    assert_eq!(again.short_code, code);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_shorten_and_clicks() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let db = db::Db::in_memory()?;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let link = db.link.clone();
        handles.push(tokio::spawn(async move {
            link.get_or_create("https://example.com/same", 6).await
        }));
    }
    let mut codes = Vec::new();
    for handle in handles {
        codes.push(handle.await??.0.short_code);
    }
    codes.dedup();
    assert_eq!(codes.len(), 1);
    assert_eq!(db.link.list_all().await?.len(), 1);

    let mut handles = Vec::new();
    for _ in 0..25 {
        let link = db.link.clone();
        let code = codes[0].clone();
        handles.push(tokio::spawn(async move { link.increment_click(&code).await }));
    }
    for handle in handles {
        handle.await??;
    }
    let record = db.link.find_by_code(&codes[0]).await?.unwrap();
    assert_eq!(record.click_count, 25);

    Ok(())
}

#[tokio::test]
async fn test_shorten_redirect_stats() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let renderer = renderer()?;

    // Shorten, with https:// filled in
    let (status, body) = body_string(renderer.shorten(ShortenRequest::new("example.com"), Some("sho.test")).await?).await?;
    assert_eq!(status, 200);
    let shortened: model::ShortenResponse = serde_json::from_str(&body)?;
    assert_eq!(shortened.original_url, "https://example.com");
    assert_eq!(shortened.short_code.len(), 6);
    assert!(shortened.short_code.chars().all(|c| c.is_ascii_alphanumeric()));
    assert_eq!(shortened.short_url, format!("http://sho.test/{}", shortened.short_code));

    // Same url again, same code
    let (status, body) =
        body_string(renderer.shorten(ShortenRequest::new("https://example.com"), Some("sho.test")).await?).await?;
    assert_eq!(status, 200);
    let again: model::ShortenResponse = serde_json::from_str(&body)?;
    assert_eq!(again.short_code, shortened.short_code);

    // Redirect
    let response = renderer.redirect(&shortened.short_code).await?.into_response();
    assert_eq!(response.status(), warp::http::StatusCode::FOUND);
    assert_eq!(
        response.headers().get("Location").unwrap().to_str().unwrap(),
        "https://example.com"
    );
    assert_eq!(
        response.headers().get("Cache-Control").unwrap().to_str().unwrap(),
        "no-cache"
    );

    // Stats
    let (status, body) = body_string(renderer.stats(&shortened.short_code, Some("sho.test")).await?).await?;
    assert_eq!(status, 200);
    let stats: model::LinkStats = serde_json::from_str(&body)?;
    assert_eq!(stats.click_count, 1);
    assert_eq!(stats.original_url, "https://example.com");
    assert_eq!(stats.short_url, shortened.short_url);

    Ok(())
}

#[tokio::test]
async fn test_click_count_follows_redirects() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let renderer = renderer()?;
    let (record, _) = renderer.db().link.get_or_create("https://www.rust-lang.org/learn", 6).await?;

    for _ in 0..7 {
        let response = renderer.redirect(&record.short_code).await?.into_response();
        assert_eq!(response.status(), warp::http::StatusCode::FOUND);
    }
    // misses do not count
    let response = renderer.redirect("zzzzzz").await?.into_response();
    assert_eq!(response.status(), warp::http::StatusCode::NOT_FOUND);

    let stored = renderer.db().link.find_by_code(&record.short_code).await?.unwrap();
    assert_eq!(stored.click_count, 7);

    Ok(())
}

#[tokio::test]
async fn test_shorten_rejects() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let renderer = renderer()?;

    let (status, body) = body_string(renderer.shorten(ShortenRequest::new(""), None).await?).await?;
    assert_eq!(status, 400);
    let error: serde_json::Value = serde_json::from_str(&body)?;
    assert_eq!(error["error"], "URL is required");

    let (status, body) = body_string(renderer.shorten(ShortenRequest::default(), None).await?).await?;
    assert_eq!(status, 400);
    let error: serde_json::Value = serde_json::from_str(&body)?;
    assert!(!error["error"].as_str().unwrap_or_default().is_empty());

    let (status, body) = body_string(renderer.shorten(ShortenRequest::new("not-a-valid-url"), None).await?).await?;
    assert_eq!(status, 400);
    let error: serde_json::Value = serde_json::from_str(&body)?;
    assert_eq!(error["error"], "Invalid URL format");

    assert!(renderer.db().link.list_all().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_unknown_codes() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let renderer = renderer()?;

    let response = renderer.redirect("nonexistent").await?.into_response();
    assert_eq!(response.status(), warp::http::StatusCode::NOT_FOUND);
    assert!(
        response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
    let (_, page) = body_string(renderer.redirect("nonexistent").await?).await?;
    assert!(page.contains("/nonexistent"));

    let (status, body) = body_string(renderer.stats("nonexistent", None).await?).await?;
    assert_eq!(status, 404);
    let error: serde_json::Value = serde_json::from_str(&body)?;
    assert_eq!(error["error"], "Short URL not found");

    Ok(())
}

#[tokio::test]
async fn test_not_found_without_templates() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let renderer = render::Renderer::empty()?;
    let (status, body) = body_string(renderer.redirect("abc123").await?).await?;
    assert_eq!(status, 404);
    assert_eq!(body, "Short URL not found");
    Ok(())
}

#[tokio::test]
async fn test_all_stats() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let renderer = renderer()?.with_public_url(Some("https://sho.rt/".to_string()));

    let (status, body) = body_string(renderer.all_stats(None).await?).await?;
    assert_eq!(status, 200);
    assert_eq!(body, "[]");

    for url in ["https://a.example.com", "https://b.example.com", "https://c.example.com"] {
        body_string(renderer.shorten(ShortenRequest::new(url), None).await?).await?;
    }

    let (status, body) = body_string(renderer.all_stats(Some("ignored:5000")).await?).await?;
    assert_eq!(status, 200);
    let all: Vec<model::LinkStats> = serde_json::from_str(&body)?;
    let urls: Vec<&str> = all.iter().map(|s| s.original_url.as_str()).collect();
    assert_eq!(urls, vec!["https://c.example.com", "https://b.example.com", "https://a.example.com"]);
    for stats in &all {
        assert_eq!(stats.short_url, format!("https://sho.rt/{}", stats.short_code));
        assert_eq!(stats.click_count, 0);
    }

    Ok(())
}

#[tokio::test]
async fn test_home_page() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let renderer = renderer()?;
    let (status, page) = body_string(renderer.home().await?).await?;
    assert_eq!(status, 200);
    assert!(page.contains(r#"action="/shorten""#));
    Ok(())
}

#[tokio::test]
async fn test_code_length_setting() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let renderer = renderer()?.with_code_length(10);
    let (_, body) = body_string(renderer.shorten(ShortenRequest::new("example.org"), None).await?).await?;
    let shortened: model::ShortenResponse = serde_json::from_str(&body)?;
    assert_eq!(shortened.short_code.len(), 10);
    assert_eq!(shortened.short_url, format!("http://127.0.0.1:5000/{}", shortened.short_code));
    Ok(())
}

#[tokio::test]
async fn test_redirect_keeps_fragment() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let renderer = renderer()?;
    let (record, _) = renderer
        .db()
        .link
        .get_or_create("https://example.com/docs#section-2", 6)
        .await?;

    let response = renderer.redirect(&record.short_code).await?.into_response();
    assert_eq!(response.status(), warp::http::StatusCode::FOUND);
    assert_eq!(
        response.headers().get("Location").unwrap().to_str().unwrap(),
        "https://example.com/docs#section-2"
    );

    Ok(())
}

#[tokio::test]
async fn test_routes_shorten_redirect_stats() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let routes = routes::get_routes(renderer()?);

    // form body
    let response = warp::test::request()
        .method("POST")
        .path("/shorten")
        .header("host", "sho.test")
        .header("content-type", "application/x-www-form-urlencoded")
        .body("url=example.com%2Fdocs%23section-2")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 200);
    let from_form: model::ShortenResponse = serde_json::from_slice(response.body())?;
    assert_eq!(from_form.original_url, "https://example.com/docs#section-2");
    assert_eq!(from_form.short_url, format!("http://sho.test/{}", from_form.short_code));

    // json body, same url, same code
    let response = warp::test::request()
        .method("POST")
        .path("/shorten")
        .header("host", "sho.test")
        .json(&serde_json::json!({"url": "https://example.com/docs#section-2"}))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 200);
    let from_json: model::ShortenResponse = serde_json::from_slice(response.body())?;
    assert_eq!(from_json.short_code, from_form.short_code);

    // redirect
    let response = warp::test::request()
        .path(&format!("/{}", from_form.short_code))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 302);
    assert_eq!(
        response.headers().get("location").unwrap().to_str().unwrap(),
        "https://example.com/docs#section-2"
    );

    // stats
    let response = warp::test::request()
        .path(&format!("/stats/{}", from_form.short_code))
        .header("host", "other.test:8080")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 200);
    let stats: model::LinkStats = serde_json::from_slice(response.body())?;
    assert_eq!(stats.click_count, 1);
    assert_eq!(stats.short_url, format!("http://other.test:8080/{}", from_form.short_code));

    // listing
    let response = warp::test::request().path("/api/stats").reply(&routes).await;
    assert_eq!(response.status(), 200);
    let all: Vec<model::LinkStats> = serde_json::from_slice(response.body())?;
    assert_eq!(all.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_routes_rejections() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let routes = routes::get_routes(renderer()?);

    // invalid url
    let response = warp::test::request()
        .method("POST")
        .path("/shorten")
        .json(&serde_json::json!({"url": "not-a-valid-url"}))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 400);
    let error: serde_json::Value = serde_json::from_slice(response.body())?;
    assert_eq!(error["error"], "Invalid URL format");

    // unknown stats is a JSON 404
    let response = warp::test::request().path("/stats/nonexistent").reply(&routes).await;
    assert_eq!(response.status(), 404);
    let error: serde_json::Value = serde_json::from_slice(response.body())?;
    assert_eq!(error["error"], "Short URL not found");

    // unknown paths get the 404 page, not a method error
    for path in ["/unknown/deeper", "/a/b", "/favicon.ico", "/nonexistent"] {
        let response = warp::test::request().path(path).reply(&routes).await;
        assert_eq!(response.status(), 404, "{path}");
        let content_type = response.headers().get("content-type").unwrap().to_str()?;
        assert!(content_type.starts_with("text/html"), "{path}: {content_type}");
    }

    // oversized body
    let response = warp::test::request()
        .method("POST")
        .path("/shorten")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(vec![b'a'; 1024 * 17])
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 413);

    // wrong method on a path some route owns
    let response = warp::test::request().method("DELETE").path("/x").reply(&routes).await;
    assert_eq!(response.status(), 405);
    let error: serde_json::Value = serde_json::from_slice(response.body())?;
    assert_eq!(error["error"], "Method not allowed");

    // home page
    let response = warp::test::request().path("/").reply(&routes).await;
    assert_eq!(response.status(), 200);

    Ok(())
}
