use axum::routing::{get, post};
use axum::Router;

use crate::handlers::download;
use crate::state::AppState;
use crate::ws;

/// Routes mounted at `/download`.
///
/// ```text
/// POST   /estimate            -> estimate
/// POST   /initiate            -> initiate
/// GET    /status/{job_id}     -> status
/// GET    /ws                  -> download_ws
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/estimate", post(download::estimate))
        .route("/initiate", post(download::initiate))
        .route("/status/{job_id}", get(download::status))
        .route("/ws", get(ws::download_ws))
}
