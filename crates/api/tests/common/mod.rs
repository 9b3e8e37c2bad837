#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use fetchline_api::config::ServerConfig;
use fetchline_api::router::build_app_router;
use fetchline_api::state::{AppState, AppStateBuilder};
use fetchline_core::clock::ManualClock;
use http_body_util::BodyExt;
use tower::ServiceExt;

/// Test `ServerConfig`: defaults with a loopback host and an ephemeral port.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..ServerConfig::default()
    }
}

/// The full application plus handles tests need to poke at it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    /// Wall clock seen by the registry and the artifact issuer.
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    /// Build with `config`, letting the caller override collaborators.
    pub fn with(
        config: ServerConfig,
        configure: impl FnOnce(AppStateBuilder) -> AppStateBuilder,
    ) -> Self {
        let clock = Arc::new(ManualClock::starting_now());
        let state = configure(AppState::builder(config).clock(clock.clone())).build();
        let router = build_app_router(state.clone());
        Self {
            router,
            state,
            clock,
        }
    }

    pub fn app(&self) -> Router {
        self.router.clone()
    }
}

/// Build the application with production collaborators and a manual clock.
pub fn build_test_app() -> TestApp {
    TestApp::with(test_config(), |builder| builder)
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    post_raw(app, uri, body.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, body: String) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Negotiate a job and return the `data` object of the response.
pub async fn estimate(app: Router, file_ids: &[i64]) -> serde_json::Value {
    let response = post_json(
        app,
        "/api/v1/download/estimate",
        serde_json::json!({ "file_ids": file_ids }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    body_json(response).await["data"].clone()
}

/// Serve `router` on an ephemeral loopback port.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}
