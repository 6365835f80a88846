//! End-to-end coverage against a local mock origin server (spec §8): simple
//! GET, redirect chains, 303 method/body rewrite, auth gating, capacity
//! enforcement, and same-session cookie continuity.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Redirect;
use axum::routing::{get, post};
use serde_json::json;
use tower::ServiceExt;

use fp_proxy::api::{self, AppState};
use fp_proxy::ProxyConfig;

async fn spawn_origin() -> SocketAddr {
    let app = axum::Router::new()
        .route("/ok", get(|| async { "hello" }))
        .route("/redirect-1", get(|| async { Redirect::temporary("/redirect-2") }))
        .route("/redirect-2", get(|| async { "landed" }))
        .route(
            "/see-other",
            post(|| async { (StatusCode::SEE_OTHER, [("Location", "/ok")], "") }),
        )
        .route(
            "/set-cookie",
            get(|| async { ([("Set-Cookie", "session=abc123; Path=/")], "cookie set") }),
        )
        .route(
            "/echo-cookie",
            get(|headers: HeaderMap| async move {
                headers
                    .get("cookie")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("none")
                    .to_string()
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    addr
}

fn test_state(api_key: &str) -> Arc<AppState> {
    let config = ProxyConfig {
        api_key: api_key.to_string(),
        ..ProxyConfig::default()
    };
    Arc::new(AppState::new(config))
}

async fn send_json(
    app: axum::Router,
    method: &str,
    uri: &str,
    api_key: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-api-key", api_key)
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

#[tokio::test]
async fn simple_get_request_round_trips() {
    let addr = spawn_origin().await;
    let app = api::router(test_state("secret"));

    let (status, body) = send_json(
        app,
        "POST",
        "/proxy/request",
        "secret",
        json!({ "method": "GET", "url": format!("http://{addr}/ok") }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status_code"], 200);
    assert_eq!(body["body"], "hello");
}

#[tokio::test]
async fn redirect_chain_is_followed_and_reported() {
    let addr = spawn_origin().await;
    let app = api::router(test_state("secret"));

    let (status, body) = send_json(
        app,
        "POST",
        "/proxy/request",
        "secret",
        json!({ "method": "GET", "url": format!("http://{addr}/redirect-1") }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["redirect_count"], 1);
    assert_eq!(body["body"], "landed");
}

#[tokio::test]
async fn see_other_rewrites_post_to_get_and_drops_body() {
    let addr = spawn_origin().await;
    let app = api::router(test_state("secret"));

    let (status, body) = send_json(
        app,
        "POST",
        "/proxy/request",
        "secret",
        json!({ "method": "POST", "url": format!("http://{addr}/see-other"), "body": {"x": 1} }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["body"], "hello");
}

#[tokio::test]
async fn missing_api_key_is_rejected() {
    let addr = spawn_origin().await;
    let app = api::router(test_state("secret"));

    let req = Request::builder()
        .method("POST")
        .uri("/proxy/request")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "method": "GET", "url": format!("http://{addr}/ok") }).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_capacity_is_enforced() {
    let config = ProxyConfig {
        api_key: "secret".to_string(),
        max_sessions: 1,
        ..ProxyConfig::default()
    };
    let app = api::router(Arc::new(AppState::new(config)));

    let make_req = || {
        Request::builder()
            .method("POST")
            .uri("/proxy/session/create")
            .header("x-api-key", "secret")
            .body(Body::empty())
            .unwrap()
    };

    let first = app.clone().oneshot(make_req()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(make_req()).await.unwrap();
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unseen_caller_supplied_session_id_is_bound_not_rejected() {
    let addr = spawn_origin().await;
    let app = api::router(test_state("secret"));

    let (status, body) = send_json(
        app,
        "POST",
        "/proxy/request",
        "secret",
        json!({
            "method": "GET",
            "url": format!("http://{addr}/ok"),
            "session_id": "caller-chosen-handle",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], "caller-chosen-handle");
}

#[tokio::test]
async fn cookies_persist_across_requests_in_same_session() {
    let addr = spawn_origin().await;
    let app = api::router(test_state("secret"));

    let create_req = Request::builder()
        .method("POST")
        .uri("/proxy/session/create")
        .header("x-api-key", "secret")
        .body(Body::empty())
        .unwrap();
    let create_resp = app.clone().oneshot(create_req).await.unwrap();
    let bytes = axum::body::to_bytes(create_resp.into_body(), usize::MAX).await.unwrap();
    let created: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let session_id = created["session_id"].as_str().unwrap().to_string();

    let (status, _) = send_json(
        app.clone(),
        "POST",
        "/proxy/request",
        "secret",
        json!({
            "method": "GET",
            "url": format!("http://{addr}/set-cookie"),
            "session_id": session_id,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_json(
        app,
        "POST",
        "/proxy/request",
        "secret",
        json!({
            "method": "GET",
            "url": format!("http://{addr}/echo-cookie"),
            "session_id": session_id,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["body"].as_str().unwrap().contains("session=abc123"));
}
