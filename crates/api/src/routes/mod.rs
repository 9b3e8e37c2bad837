pub mod download;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /download/estimate              negotiate a job (POST)
/// /download/initiate              start a pull-mode job (POST)
/// /download/status/{job_id}       poll (GET)
/// /download/ws?job_id=            push (WebSocket)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/download", download::router())
}
