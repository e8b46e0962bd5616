use super::*;
use crate::publisher::test_helpers::{SAMPLE_CONTENT, TestEnv, create_test_env};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use std::time::Duration;
use tower::ServiceExt;


/// Helper to create a test environment and a router serving it
async fn create_test_app() -> (Router, TestEnv) {
    let env = create_test_env().await;
    let config = env.publisher.get_config();
    let app = create_router(Arc::new(env.publisher.clone()), config);
    (app, env)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_api_server_spawns() {
    let env = create_test_env().await;

    // Port 0 = OS assigns a free port
    let mut config = (*env.publisher.get_config()).clone();
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let config = Arc::new(config);

    let api_handle = tokio::spawn({
        let publisher = Arc::new(env.publisher.clone());
        let config = config.clone();
        async move { start_api_server(publisher, config).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished(), "server should still be running");
    api_handle.abort();
}

#[tokio::test]
async fn test_cors_enabled() {
    let (app, _env) = create_test_app().await;

    let request = Request::builder()
        .uri("/api/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let env = create_test_env().await;
    let mut config = (*env.publisher.get_config()).clone();
    config.server.api.cors_enabled = false;
    let app = create_router(Arc::new(env.publisher.clone()), Arc::new(config));

    let request = Request::builder()
        .uri("/api/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_cors_specific_origin() {
    let env = create_test_env().await;
    let mut config = (*env.publisher.get_config()).clone();
    config.server.api.cors_origins = vec!["http://allowed.example".to_string()];
    let app = create_router(Arc::new(env.publisher.clone()), Arc::new(config));

    let request = Request::builder()
        .uri("/api/health")
        .header("Origin", "http://allowed.example")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://allowed.example"
    );

    let request = Request::builder()
        .uri("/api/health")
        .header("Origin", "http://other.example")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_routes_are_mounted_under_api() {
    let (app, _env) = create_test_app().await;

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
