//! DuckDuckGo discovery against a local stand-in

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use imgseek::config::FetchConfig;
use imgseek::error::DiscoveryError;
use imgseek::{DuckDuckGoProvider, ImageSearchProvider};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn search_page() -> Html<&'static str> {
    Html(r#"<html><script>nrj('/d.js?q=cats&vqd="4-1234567890";</script></html>"#)
}

/// Two pages of results; the second is only served with a valid token.
async fn image_json(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    if params.get("vqd").map(String::as_str) != Some("4-1234567890") {
        return (StatusCode::FORBIDDEN, Json(json!({}))).into_response();
    }
    let page = params.get("s").map(String::as_str).unwrap_or("0");
    let body = match page {
        "0" => json!({
            "results": [
                {"image": "http://img.example/1.jpg", "title": "one"},
                {"image": "http://img.example/2.jpg", "title": "two"},
            ],
            "next": "i.js?q=cats&o=json&p=2&s=2",
        }),
        _ => json!({
            "results": [
                {"image": "http://img.example/3.jpg", "title": "three"},
            ],
        }),
    };
    Json(body).into_response()
}

fn provider(addr: SocketAddr) -> DuckDuckGoProvider {
    DuckDuckGoProvider::with_base_url(&FetchConfig::default(), &format!("http://{}/", addr)).unwrap()
}

#[tokio::test]
async fn test_discover_follows_pages() {
    let app = Router::new()
        .route("/", get(search_page))
        .route("/i.js", get(image_json));
    let addr = serve(app).await;

    let urls = provider(addr).discover("cats", 10).await.unwrap();
    assert_eq!(
        urls,
        vec![
            "http://img.example/1.jpg",
            "http://img.example/2.jpg",
            "http://img.example/3.jpg",
        ]
    );
}

#[tokio::test]
async fn test_discover_stops_at_limit() {
    let app = Router::new()
        .route("/", get(search_page))
        .route("/i.js", get(image_json));
    let addr = serve(app).await;

    let urls = provider(addr).discover("cats", 1).await.unwrap();
    assert_eq!(urls, vec!["http://img.example/1.jpg"]);
}

#[tokio::test]
async fn test_rate_limited() {
    let app = Router::new().route("/", get(|| async { StatusCode::TOO_MANY_REQUESTS }));
    let addr = serve(app).await;

    let error = provider(addr).discover("cats", 10).await.unwrap_err();
    assert!(matches!(error, DiscoveryError::RateLimited(429)));
}

#[tokio::test]
async fn test_missing_token() {
    let app = Router::new().route("/", get(|| async { Html("<html>no token</html>") }));
    let addr = serve(app).await;

    let error = provider(addr).discover("cats", 10).await.unwrap_err();
    assert!(matches!(error, DiscoveryError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_empty_results() {
    let app = Router::new()
        .route("/", get(search_page))
        .route("/i.js", get(|| async { Json(json!({"results": []})) }));
    let addr = serve(app).await;

    let error = provider(addr).discover("cats", 10).await.unwrap_err();
    assert!(matches!(error, DiscoveryError::NoResults { .. }));
}

#[tokio::test]
async fn test_unreachable_host() {
    let addr = serve(Router::new()).await;
    // Nothing routed: every request is a 404
    let error = provider(addr).discover("cats", 10).await.unwrap_err();
    assert!(matches!(error, DiscoveryError::Unreachable(_)));
}

#[tokio::test]
async fn test_region_is_sent() {
    let app = Router::new().route("/", get(search_page)).route(
        "/i.js",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            let hits = match params.get("l").map(String::as_str) {
                Some("de-de") => json!([{"image": "http://img.example/de.jpg"}]),
                _ => json!([]),
            };
            Json(json!({ "results": hits }))
        }),
    );
    let addr = serve(app).await;

    let urls = provider(addr)
        .with_region("de-de")
        .discover("katzen", 10)
        .await
        .unwrap();
    assert_eq!(urls, vec!["http://img.example/de.jpg"]);
}
